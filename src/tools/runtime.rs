//! Tool runtime coordinator
//!
//! Wires a registry preloaded with the built-in tools, a path guard for one
//! project root, and an executor into a single entry point. Embedders that
//! need their own tools register them on top.

use crate::config::Config;
use crate::errors::Result;
use crate::tools::context::SessionResolver;
use crate::tools::events::Broadcaster;
use crate::tools::executor::Executor;
use crate::tools::implementations::builtin_tools;
use crate::tools::parser::parse_tool_calls_str;
use crate::tools::registry::ToolRegistry;
use crate::tools::schema::Tool;
use crate::tools::security::{GuardOptions, PathGuard};
use crate::tools::types::{ExecuteOptions, ToolCall, ToolResult};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Tool runtime coordinator
pub struct ToolRuntime {
    executor: Executor,
    guard: PathGuard,
    defaults: ExecuteOptions,
}

impl ToolRuntime {
    /// Create a runtime rooted at `project_root` with the built-in tools
    pub fn new(project_root: impl AsRef<Path>, options: GuardOptions) -> Result<Self> {
        let guard = PathGuard::new(project_root, options)?;
        let registry = ToolRegistry::shared();
        for tool in builtin_tools(guard.options()) {
            registry.register(tool)?;
        }

        let defaults = ExecuteOptions::default().with_project_root(guard.root());
        Ok(Self {
            executor: Executor::new(registry),
            guard,
            defaults,
        })
    }

    /// Create a runtime from loaded configuration
    pub fn from_config(project_root: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let mut runtime = Self::new(project_root, config.guard_options())?;
        let root = runtime.defaults.project_root.take();
        runtime.defaults = config.execute_options();
        runtime.defaults.project_root = root;
        Ok(runtime)
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionResolver>) -> Self {
        self.executor = self.executor.with_sessions(sessions);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.executor = self.executor.with_broadcaster(broadcaster);
        self
    }

    /// Register an additional tool
    pub fn register(&self, tool: Tool) -> Result<()> {
        self.executor.registry().register(tool)?;
        Ok(())
    }

    /// Execute one call with the runtime defaults
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        self.executor.execute(call, &self.defaults).await
    }

    /// Execute one call with explicit options
    pub async fn execute_with(&self, call: &ToolCall, opts: &ExecuteOptions) -> ToolResult {
        self.executor.execute(call, opts).await
    }

    pub async fn execute_batch(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        self.executor.execute_batch(calls, &self.defaults).await
    }

    /// Parse and run a decoded tool-call payload
    pub async fn execute_payload(&self, payload: &Value) -> Result<Vec<ToolResult>> {
        Ok(self.executor.execute_payload(payload, &self.defaults).await?)
    }

    /// Parse and run a raw JSON tool-call payload
    pub async fn execute_payload_str(&self, payload: &str) -> Result<Vec<ToolResult>> {
        let calls = parse_tool_calls_str(payload)?;
        Ok(self.executor.execute_batch(&calls, &self.defaults).await)
    }

    /// Options applied to calls without explicit ones
    pub fn defaults(&self) -> &ExecuteOptions {
        &self.defaults
    }

    pub fn set_defaults(&mut self, defaults: ExecuteOptions) {
        self.defaults = defaults;
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    /// Get tool registry
    pub fn registry(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    /// Get all tool names
    pub fn tool_names(&self) -> Vec<String> {
        self.registry().tool_names()
    }

    /// Check if tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.registry().contains(name)
    }

    /// Function-calling schemas for every registered tool
    pub fn llm_functions(&self) -> Vec<Value> {
        self.registry().llm_functions()
    }
}
