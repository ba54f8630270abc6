//! Tool call, context, and result types
//!
//! Core types flowing through the executor: the inbound call, the context a
//! handler runs in, and the uniform outcome returned for every call.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Default per-call time budget
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One invocation request, typically model-generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque caller-supplied id, echoed back on the result
    pub id: String,

    /// Tool name to dispatch to
    pub name: String,

    /// Decoded arguments
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: Map::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Terminal state of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
    Timeout,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Ok => "ok",
            ResultStatus::Error => "error",
            ResultStatus::Timeout => "timeout",
        }
    }
}

/// Result of tool execution. Exactly one per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,

    pub tool_name: String,

    pub status: ResultStatus,

    /// Handler output as text, or the error message
    pub content: String,

    /// Execution duration in milliseconds
    pub duration_ms: u64,
}

impl ToolResult {
    /// Create successful result
    pub fn ok(call: &ToolCall, content: String, duration: Duration) -> Self {
        Self::with_status(call, ResultStatus::Ok, content, duration)
    }

    /// Create failed result
    pub fn error(call: &ToolCall, message: impl Into<String>, duration: Duration) -> Self {
        Self::with_status(call, ResultStatus::Error, message.into(), duration)
    }

    /// Create timed-out result
    pub fn timeout(call: &ToolCall, budget: Duration, duration: Duration) -> Self {
        Self::with_status(
            call,
            ResultStatus::Timeout,
            format!(
                "tool {} timed out after {}ms",
                call.name,
                budget.as_millis()
            ),
            duration,
        )
    }

    fn with_status(call: &ToolCall, status: ResultStatus, content: String, duration: Duration) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status,
            content,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }

    /// Project to a `role: tool` chat message
    pub fn to_message(&self) -> Value {
        let content = match self.status {
            ResultStatus::Ok => self.content.clone(),
            ResultStatus::Error | ResultStatus::Timeout => format!("Error: {}", self.content),
        };
        json!({
            "role": "tool",
            "tool_call_id": self.tool_call_id,
            "content": content,
        })
    }
}

/// Context a handler runs in
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub session_id: Option<String>,

    /// Sandbox boundary for filesystem-touching tools
    pub project_root: Option<PathBuf>,

    /// Budget the executor waits for this call
    pub timeout: Duration,

    /// Arbitrary caller-supplied fields
    pub extra: Map<String, Value>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            session_id: None,
            project_root: None,
            timeout: DEFAULT_TIMEOUT,
            extra: Map::new(),
        }
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// How a batch is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    #[default]
    Sequential,
    Parallel,
}

/// Per-invocation executor options
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub timeout: Duration,
    pub session_id: Option<String>,
    pub project_root: Option<PathBuf>,
    pub extra: Map<String, Value>,
    pub batch_mode: BatchMode,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            session_id: None,
            project_root: None,
            extra: Map::new(),
            batch_mode: BatchMode::Sequential,
        }
    }
}

impl ExecuteOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    pub fn with_batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = mode;
        self
    }

    pub fn parallel(self) -> Self {
        self.with_batch_mode(BatchMode::Parallel)
    }
}

/// Batch outcome counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub timed_out_executions: u64,
    pub total_duration_ms: u64,
}

impl ToolStats {
    pub fn from_results(results: &[ToolResult]) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.record(result);
        }
        stats
    }

    pub fn record(&mut self, result: &ToolResult) {
        self.total_executions += 1;
        self.total_duration_ms += result.duration_ms;
        match result.status {
            ResultStatus::Ok => self.successful_executions += 1,
            ResultStatus::Error => self.failed_executions += 1,
            ResultStatus::Timeout => self.timed_out_executions += 1,
        }
    }

    /// Calculate success rate
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> ToolCall {
        ToolCall::new("call_1", "read_file").with_arg("path", "a.txt")
    }

    #[test]
    fn test_tool_result_ok() {
        let result = ToolResult::ok(&call(), "output".to_string(), Duration::from_millis(100));

        assert!(result.is_ok());
        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(result.tool_name, "read_file");
        assert_eq!(result.duration_ms, 100);
    }

    #[test]
    fn test_tool_result_timeout_message() {
        let result = ToolResult::timeout(&call(), Duration::from_millis(100), Duration::from_millis(101));
        assert_eq!(result.status, ResultStatus::Timeout);
        assert!(result.content.contains("timed out after 100ms"));
    }

    #[test]
    fn test_message_projection() {
        let ok = ToolResult::ok(&call(), "data".to_string(), Duration::ZERO);
        assert_eq!(
            ok.to_message(),
            json!({"role": "tool", "tool_call_id": "call_1", "content": "data"})
        );

        let err = ToolResult::error(&call(), "boom", Duration::ZERO);
        assert_eq!(err.to_message()["content"], "Error: boom");

        let timeout = ToolResult::timeout(&call(), Duration::from_millis(5), Duration::ZERO);
        assert!(timeout.to_message()["content"].as_str().unwrap().starts_with("Error: "));
    }

    #[test]
    fn test_result_serialization() {
        let result = ToolResult::error(&call(), "boom", Duration::from_millis(3));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["duration_ms"], 3);
    }

    #[test]
    fn test_context_builder() {
        let ctx = ExecutionContext::new()
            .with_session("s-1")
            .with_project_root("/project")
            .with_timeout(Duration::from_secs(5))
            .with_extra("user", "dev");

        assert_eq!(ctx.session_id.as_deref(), Some("s-1"));
        assert_eq!(ctx.project_root, Some(PathBuf::from("/project")));
        assert_eq!(ctx.timeout, Duration::from_secs(5));
        assert_eq!(ctx.extra["user"], "dev");
    }

    #[test]
    fn test_execute_options_default() {
        let opts = ExecuteOptions::default();
        assert_eq!(opts.timeout, DEFAULT_TIMEOUT);
        assert_eq!(opts.batch_mode, BatchMode::Sequential);
        assert_eq!(opts.parallel().batch_mode, BatchMode::Parallel);
    }

    #[test]
    fn test_tool_stats_tracking() {
        let results = vec![
            ToolResult::ok(&call(), String::new(), Duration::from_millis(100)),
            ToolResult::ok(&call(), String::new(), Duration::from_millis(200)),
            ToolResult::error(&call(), "x", Duration::from_millis(150)),
            ToolResult::timeout(&call(), Duration::from_millis(50), Duration::from_millis(50)),
        ];
        let stats = ToolStats::from_results(&results);

        assert_eq!(stats.total_executions, 4);
        assert_eq!(stats.successful_executions, 2);
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.timed_out_executions, 1);
        assert_eq!(stats.total_duration_ms, 500);
        assert!((stats.success_rate() - 0.5).abs() < f64::EPSILON);
    }
}
