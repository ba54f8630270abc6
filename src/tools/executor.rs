//! Tool-call executor
//!
//! Per call: `Parsed → Validated → Dispatched → {Completed | Failed | TimedOut}`.
//! The handler body runs in its own tokio task raced against a timer, so a
//! panic or an overrun is captured into the result instead of escaping.
//! Every accepted call yields exactly one [`ToolResult`]; only a malformed
//! payload (see [`parse_tool_calls`]) is a top-level error.

use crate::errors::GateError;
use crate::tools::context::{build_context, NoSessionResolver, SessionResolver};
use crate::tools::events::{broadcast, Broadcaster, NoopBroadcaster, ToolEvent};
use crate::tools::handler::HandlerOutput;
use crate::tools::parser::{parse_tool_calls, ParseError};
use crate::tools::registry::ToolRegistry;
use crate::tools::schema::{validate_args, Tool};
use crate::tools::types::{BatchMode, ExecuteOptions, ExecutionContext, ToolCall, ToolResult};
use futures_util::future::join_all;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Lifecycle of one call, used in trace output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Parsed,
    Validated,
    Dispatched,
    Completed,
    Failed,
    TimedOut,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Parsed => "parsed",
            CallState::Validated => "validated",
            CallState::Dispatched => "dispatched",
            CallState::Completed => "completed",
            CallState::Failed => "failed",
            CallState::TimedOut => "timed_out",
        }
    }
}

/// Dispatches tool calls against a registry
pub struct Executor {
    registry: Arc<ToolRegistry>,
    sessions: Arc<dyn SessionResolver>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl Executor {
    /// Executor without sessions or event subscribers
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            sessions: Arc::new(NoSessionResolver),
            broadcaster: Arc::new(NoopBroadcaster),
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionResolver>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Get registry reference
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn validate_tool_exists(&self, name: &str) -> Result<Arc<Tool>, GateError> {
        self.registry
            .get(name)
            .ok_or_else(|| GateError::ToolNotFound(name.to_string()))
    }

    /// Parse a wire payload and run the batch
    pub async fn execute_payload(
        &self,
        payload: &Value,
        opts: &ExecuteOptions,
    ) -> Result<Vec<ToolResult>, ParseError> {
        let calls = parse_tool_calls(payload)?;
        Ok(self.execute_batch(&calls, opts).await)
    }

    /// Execute one call. Never fails: every outcome is encoded in the result.
    pub async fn execute(&self, call: &ToolCall, opts: &ExecuteOptions) -> ToolResult {
        let start = Instant::now();
        trace_state(call, CallState::Parsed);

        let result = match self.prepare(call, opts).await {
            Ok((tool, ctx)) => {
                broadcast(
                    self.broadcaster.as_ref(),
                    &ToolEvent::started(
                        &call.id,
                        &call.name,
                        ctx.session_id.as_deref(),
                        call.arguments.keys().cloned().collect(),
                    ),
                );
                self.dispatch(call, &tool, ctx, start).await
            }
            Err(e) => {
                trace_state(call, CallState::Failed);
                ToolResult::error(call, e.to_string(), start.elapsed())
            }
        };

        broadcast(
            self.broadcaster.as_ref(),
            &ToolEvent::finished(&result, opts.session_id.as_deref()),
        );
        result
    }

    /// Execute calls in order (sequential) or all at once (parallel). The
    /// output always has the same length and order as the input.
    pub async fn execute_batch(&self, calls: &[ToolCall], opts: &ExecuteOptions) -> Vec<ToolResult> {
        debug!(calls = calls.len(), mode = ?opts.batch_mode, "executing batch");
        match opts.batch_mode {
            BatchMode::Sequential => {
                let mut results = Vec::with_capacity(calls.len());
                for call in calls {
                    results.push(self.execute(call, opts).await);
                }
                results
            }
            BatchMode::Parallel => join_all(calls.iter().map(|call| self.execute(call, opts))).await,
        }
    }

    async fn prepare(
        &self,
        call: &ToolCall,
        opts: &ExecuteOptions,
    ) -> Result<(Arc<Tool>, ExecutionContext), GateError> {
        let tool = self.validate_tool_exists(&call.name)?;
        validate_args(&tool, &call.arguments)?;
        trace_state(call, CallState::Validated);

        let ctx = build_context(opts, self.sessions.as_ref()).await?;
        Ok((tool, ctx))
    }

    async fn dispatch(
        &self,
        call: &ToolCall,
        tool: &Tool,
        ctx: ExecutionContext,
        start: Instant,
    ) -> ToolResult {
        let handler = tool.handler();
        let args = call.arguments.clone();
        let budget = ctx.timeout;

        trace_state(call, CallState::Dispatched);
        let task = tokio::spawn(async move { handler.execute(&args, &ctx).await });
        let abort = task.abort_handle();

        match tokio::time::timeout(budget, task).await {
            Ok(Ok(Ok(output))) => {
                trace_state(call, CallState::Completed);
                ToolResult::ok(call, render_output(output), start.elapsed())
            }
            Ok(Ok(Err(e))) => {
                trace_state(call, CallState::Failed);
                debug!(tool = %call.name, error = %e, "handler returned error");
                ToolResult::error(call, e.message(), start.elapsed())
            }
            Ok(Err(join_err)) => {
                trace_state(call, CallState::Failed);
                let message = if join_err.is_panic() {
                    format!("tool {} crashed: {}", call.name, panic_message(join_err.into_panic()))
                } else {
                    format!("tool {} was cancelled", call.name)
                };
                warn!(tool = %call.name, call_id = %call.id, "{message}");
                ToolResult::error(call, message, start.elapsed())
            }
            Err(_) => {
                // Stops the task at its next await point; a blocking handler
                // keeps running until it returns
                abort.abort();
                trace_state(call, CallState::TimedOut);
                warn!(tool = %call.name, call_id = %call.id, budget_ms = budget.as_millis() as u64, "tool call timed out");
                ToolResult::timeout(call, budget, start.elapsed())
            }
        }
    }
}

fn trace_state(call: &ToolCall, state: CallState) {
    debug!(call_id = %call.id, tool = %call.name, state = state.as_str());
}

fn render_output(output: HandlerOutput) -> String {
    match output {
        HandlerOutput::Text(text) => text,
        HandlerOutput::Json(value) => value.to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::StaticSessionResolver;
    use crate::tools::events::EventBus;
    use crate::tools::handler::{HandlerError, ToolHandler};
    use crate::tools::schema::Param;
    use crate::tools::types::ResultStatus;
    use serde_json::{json, Map};
    use std::time::Duration;

    struct EchoHandler;

    #[async_trait::async_trait]
    impl ToolHandler for EchoHandler {
        async fn execute(&self, args: &Map<String, Value>, _ctx: &ExecutionContext) -> Result<HandlerOutput, HandlerError> {
            Ok(HandlerOutput::Text(args["text"].as_str().unwrap_or_default().to_string()))
        }
    }

    struct SleepHandler;

    #[async_trait::async_trait]
    impl ToolHandler for SleepHandler {
        async fn execute(&self, args: &Map<String, Value>, _ctx: &ExecutionContext) -> Result<HandlerOutput, HandlerError> {
            let ms = args["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(format!("slept {ms}").into())
        }
    }

    struct FailHandler;

    #[async_trait::async_trait]
    impl ToolHandler for FailHandler {
        async fn execute(&self, _args: &Map<String, Value>, _ctx: &ExecutionContext) -> Result<HandlerOutput, HandlerError> {
            Err(HandlerError::structured(json!({"message": "disk full", "code": 28})))
        }
    }

    struct PanicHandler;

    #[async_trait::async_trait]
    impl ToolHandler for PanicHandler {
        async fn execute(&self, _args: &Map<String, Value>, _ctx: &ExecutionContext) -> Result<HandlerOutput, HandlerError> {
            panic!("handler exploded");
        }
    }

    struct JsonHandler;

    #[async_trait::async_trait]
    impl ToolHandler for JsonHandler {
        async fn execute(&self, _args: &Map<String, Value>, _ctx: &ExecutionContext) -> Result<HandlerOutput, HandlerError> {
            Ok(HandlerOutput::Json(json!({"files": ["a", "b"]})))
        }
    }

    struct RootHandler;

    #[async_trait::async_trait]
    impl ToolHandler for RootHandler {
        async fn execute(&self, _args: &Map<String, Value>, ctx: &ExecutionContext) -> Result<HandlerOutput, HandlerError> {
            ctx.project_root
                .as_ref()
                .map(|p| HandlerOutput::Text(p.display().to_string()))
                .ok_or_else(|| HandlerError::new("no project root"))
        }
    }

    fn setup_executor() -> Executor {
        let registry = ToolRegistry::shared();
        registry
            .register(Tool::new("echo", "Echo text", EchoHandler).with_param(Param::string("text", "").required()))
            .unwrap();
        registry
            .register(Tool::new("sleep", "Sleep", SleepHandler).with_param(Param::integer("ms", "").required()))
            .unwrap();
        registry.register(Tool::new("fail", "Fail", FailHandler)).unwrap();
        registry.register(Tool::new("panic", "Panic", PanicHandler)).unwrap();
        registry.register(Tool::new("listing", "Listing", JsonHandler)).unwrap();
        registry.register(Tool::new("root", "Root", RootHandler)).unwrap();
        registry
            .register(
                Tool::new("read_file", "Read", EchoHandler).with_param(Param::string("path", "").required()),
            )
            .unwrap();
        Executor::new(registry)
    }

    #[tokio::test]
    async fn test_execute_ok() {
        let executor = setup_executor();
        let call = ToolCall::new("c1", "echo").with_arg("text", "hello");
        let result = executor.execute(&call, &ExecuteOptions::default()).await;

        assert_eq!(result.status, ResultStatus::Ok);
        assert_eq!(result.content, "hello");
        assert_eq!(result.tool_call_id, "c1");
        assert_eq!(result.tool_name, "echo");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let executor = setup_executor();
        let result = executor.execute(&ToolCall::new("c1", "nope"), &ExecuteOptions::default()).await;
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result.content.contains("tool not found: nope"));
    }

    #[tokio::test]
    async fn test_validate_tool_exists() {
        let executor = setup_executor();
        assert!(executor.validate_tool_exists("echo").is_ok());
        assert_eq!(executor.validate_tool_exists("nope").unwrap_err().kind(), "not_found");
    }

    #[tokio::test]
    async fn test_missing_required_parameter() {
        let executor = setup_executor();
        let result = executor.execute(&ToolCall::new("c1", "read_file"), &ExecuteOptions::default()).await;
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result.content.contains("missing required parameter: path"));
    }

    #[tokio::test]
    async fn test_handler_error_is_flattened() {
        let executor = setup_executor();
        let result = executor.execute(&ToolCall::new("c1", "fail"), &ExecuteOptions::default()).await;
        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(result.content, "disk full");
    }

    #[tokio::test]
    async fn test_handler_panic_is_captured() {
        let executor = setup_executor();
        let result = executor.execute(&ToolCall::new("c1", "panic"), &ExecuteOptions::default()).await;
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result.content.contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_json_output_is_serialized() {
        let executor = setup_executor();
        let result = executor.execute(&ToolCall::new("c1", "listing"), &ExecuteOptions::default()).await;
        assert_eq!(result.status, ResultStatus::Ok);
        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(parsed, json!({"files": ["a", "b"]}));
    }

    #[tokio::test]
    async fn test_timeout() {
        let executor = setup_executor();
        let call = ToolCall::new("c1", "sleep").with_arg("ms", 500);
        let opts = ExecuteOptions::default().with_timeout(Duration::from_millis(100));

        let start = Instant::now();
        let result = executor.execute(&call, &opts).await;

        assert_eq!(result.status, ResultStatus::Timeout);
        assert!(result.content.contains("timed out"));
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_session_root_reaches_handler() {
        let sessions = StaticSessionResolver::new().with_session("s1", "/projects/one");
        let executor = setup_executor().with_sessions(Arc::new(sessions));

        let opts = ExecuteOptions::default().with_session("s1");
        let result = executor.execute(&ToolCall::new("c1", "root"), &opts).await;
        assert_eq!(result.content, "/projects/one");

        let opts = ExecuteOptions::default().with_session("s2");
        let result = executor.execute(&ToolCall::new("c1", "root"), &opts).await;
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result.content.contains("session not found"));
    }

    #[tokio::test]
    async fn test_sequential_batch_keeps_order_and_continues() {
        let executor = setup_executor();
        let calls = vec![
            ToolCall::new("1", "echo").with_arg("text", "a"),
            ToolCall::new("2", "fail"),
            ToolCall::new("3", "nope"),
            ToolCall::new("4", "echo").with_arg("text", "d"),
        ];
        let results = executor.execute_batch(&calls, &ExecuteOptions::default()).await;

        assert_eq!(results.len(), 4);
        let ids: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(results[3].content, "d");
    }

    #[tokio::test]
    async fn test_parallel_batch_is_concurrent() {
        let executor = setup_executor();
        let calls: Vec<ToolCall> = (0..5)
            .map(|i| ToolCall::new(i.to_string(), "sleep").with_arg("ms", 200))
            .collect();

        let start = Instant::now();
        let results = executor
            .execute_batch(&calls, &ExecuteOptions::default().parallel())
            .await;
        let elapsed = start.elapsed();

        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.is_ok()));
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.tool_call_id, i.to_string());
        }
        assert!(elapsed < Duration::from_millis(700), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_parallel_batch_mixed_statuses_keep_order() {
        let executor = setup_executor();
        let calls = vec![
            ToolCall::new("slow", "sleep").with_arg("ms", 150),
            ToolCall::new("bad", "read_file"),
            ToolCall::new("fast", "echo").with_arg("text", "x"),
        ];
        let results = executor
            .execute_batch(&calls, &ExecuteOptions::default().parallel())
            .await;
        let statuses: Vec<ResultStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![ResultStatus::Ok, ResultStatus::Error, ResultStatus::Ok]);
        assert_eq!(results[0].tool_call_id, "slow");
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let (bus, mut receiver) = EventBus::new();
        let executor = setup_executor().with_broadcaster(Arc::new(bus));

        executor
            .execute(&ToolCall::new("c1", "echo").with_arg("text", "secret"), &ExecuteOptions::default())
            .await;

        let started = receiver.recv().await.unwrap();
        assert!(matches!(started.event, ToolEvent::CallStarted { .. }));
        let finished = receiver.recv().await.unwrap();
        match finished.event {
            ToolEvent::CallFinished { result, .. } => assert_eq!(result.tool_call_id, "c1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_payload() {
        let executor = setup_executor();
        let payload = json!({"tool_calls": [
            {"id": "a", "type": "function", "function": {"name": "echo", "arguments": "{\"text\":\"hi\"}"}}
        ]});
        let results = executor.execute_payload(&payload, &ExecuteOptions::default()).await.unwrap();
        assert_eq!(results[0].content, "hi");

        let err = executor.execute_payload(&json!({"tool_calls": []}), &ExecuteOptions::default()).await;
        assert_eq!(err.unwrap_err(), ParseError::NoToolCalls);
    }
}
