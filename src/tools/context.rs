//! Execution context resolution
//!
//! Turns executor options into the [`ExecutionContext`] a handler sees,
//! asking a [`SessionResolver`] for the project root when the caller only
//! knows the session id.

use crate::tools::types::{ExecuteOptions, ExecutionContext};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Longest accepted session id
const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    /// Malformed id, kept apart from `NotFound` so a typo is not mistaken
    /// for a stale reference
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "not_found",
            SessionError::InvalidSessionId(_) => "invalid_session_id",
        }
    }
}

/// Maps a session to its sandbox root. Implemented by whatever owns
/// session lifecycle.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn project_root(&self, session_id: &str) -> Result<PathBuf, SessionError>;
}

/// No sessions. Every lookup is `NotFound`.
pub struct NoSessionResolver;

#[async_trait]
impl SessionResolver for NoSessionResolver {
    async fn project_root(&self, session_id: &str) -> Result<PathBuf, SessionError> {
        Err(SessionError::NotFound(session_id.to_string()))
    }
}

/// In-memory session table
#[derive(Debug, Default)]
pub struct StaticSessionResolver {
    roots: RwLock<HashMap<String, PathBuf>>,
}

impl StaticSessionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, session_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.insert(session_id, root);
        self
    }

    pub fn insert(&self, session_id: impl Into<String>, root: impl Into<PathBuf>) {
        self.roots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.into(), root.into());
    }

    pub fn remove(&self, session_id: &str) -> Option<PathBuf> {
        self.roots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }
}

#[async_trait]
impl SessionResolver for StaticSessionResolver {
    async fn project_root(&self, session_id: &str) -> Result<PathBuf, SessionError> {
        if !is_valid_session_id(session_id) {
            return Err(SessionError::InvalidSessionId(session_id.to_string()));
        }
        self.roots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }
}

/// 1..=128 characters of `[A-Za-z0-9_-]`
pub fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Build a context for one call from executor options
pub async fn build_context(
    opts: &ExecuteOptions,
    resolver: &dyn SessionResolver,
) -> Result<ExecutionContext, SessionError> {
    let ctx = ExecutionContext {
        session_id: opts.session_id.clone(),
        project_root: opts.project_root.clone(),
        timeout: opts.timeout,
        extra: opts.extra.clone(),
    };
    enrich_context(ctx, resolver).await
}

/// Fill in `project_root` from the session. Idempotent: an existing root is
/// never replaced, and a context without a session passes through.
pub async fn enrich_context(
    mut ctx: ExecutionContext,
    resolver: &dyn SessionResolver,
) -> Result<ExecutionContext, SessionError> {
    if ctx.project_root.is_some() {
        return Ok(ctx);
    }
    let Some(session_id) = ctx.session_id.as_deref() else {
        return Ok(ctx);
    };
    if !is_valid_session_id(session_id) {
        return Err(SessionError::InvalidSessionId(session_id.to_string()));
    }
    let root = resolver.project_root(session_id).await?;
    ctx.project_root = Some(root);
    Ok(ctx)
}
