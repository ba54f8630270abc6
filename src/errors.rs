//! Error types for toolgate
//!
//! Crate-level error enum. Each subsystem owns a narrower error type
//! (`SecurityError`, `ParseError`, `ValidationError`, ...) that converts
//! into `GateError` when it crosses a module boundary.

use crate::tools::context::SessionError;
use crate::tools::parser::ParseError;
use crate::tools::registry::RegistryError;
use crate::tools::schema::ValidationError;
use crate::tools::security::SecurityError;
use thiserror::Error;

/// Main error type for the toolgate dispatch core
#[derive(Error, Debug)]
pub enum GateError {
    /// Malformed tool-call envelope or arguments
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Arguments did not satisfy the tool schema
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Registration failures
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Requested tool is not registered
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Session lookup failures
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Path guard rejections and guarded I/O failures
    #[error(transparent)]
    Security(#[from] SecurityError),
}

/// Result type alias for toolgate operations
pub type Result<T> = std::result::Result<T, GateError>;

impl GateError {
    /// Short machine-readable kind, stable across message wording changes
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::Parse(_) => "parse_error",
            GateError::Validation(_) => "validation_error",
            GateError::Registry(_) => "registry_error",
            GateError::ToolNotFound(_) => "not_found",
            GateError::Session(e) => e.kind(),
            GateError::Security(e) => e.kind(),
        }
    }
}
