//! Tool registry
//!
//! Shared store of tool definitions keyed by name. Reads run concurrently;
//! `register` and `clear` take the write lock, so two registrations of the
//! same name serialize and the second is rejected.

use crate::tools::schema::{to_llm_function, Tool};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::info;

/// Registration failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    #[error("invalid tool {name}: {reason}")]
    InvalidTool { name: String, reason: String },
}

/// Tool registry
#[derive(Debug, Default)]
pub struct ToolRegistry {
    /// Map of tool name to definition
    tools: RwLock<HashMap<String, Arc<Tool>>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry behind a shareable handle
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a tool. Duplicate names are rejected, never overwritten.
    pub fn register(&self, tool: Tool) -> Result<(), RegistryError> {
        tool.validate().map_err(|reason| RegistryError::InvalidTool {
            name: tool.name().to_string(),
            reason,
        })?;

        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.contains_key(tool.name()) {
            return Err(RegistryError::DuplicateTool(tool.name().to_string()));
        }
        info!(tool = tool.name(), params = tool.params().len(), "registered tool");
        tools.insert(tool.name().to_string(), Arc::new(tool));
        Ok(())
    }

    /// Get tool by name
    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Check if tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Remove every tool. Test and reload use only.
    pub fn clear(&self) {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Get all tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Function-calling schemas for every tool, sorted by name
    pub fn llm_functions(&self) -> Vec<Value> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        let mut sorted: Vec<&Arc<Tool>> = tools.values().collect();
        sorted.sort_by(|a, b| a.name().cmp(b.name()));
        sorted.into_iter().map(|t| to_llm_function(t)).collect()
    }

    /// Get total number of tools
    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
