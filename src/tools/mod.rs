//! Tool dispatch core
//!
//! Everything between a model's tool-call payload and a handler running on
//! the host:
//! - Registry of schema-described tools
//! - Argument validation and LLM function schemas
//! - Path guard for filesystem access
//! - Executor with per-call timeouts and batch modes
//! - Built-in filesystem tools and a runtime coordinator

pub mod context;
pub mod events;
pub mod executor;
pub mod handler;
pub mod implementations;
pub mod parser;
pub mod registry;
pub mod runtime;
pub mod schema;
pub mod security;
pub mod types;

// Re-export commonly used types
pub use context::{SessionError, SessionResolver, StaticSessionResolver};
pub use events::{Broadcaster, EventBus, ToolEvent};
pub use executor::Executor;
pub use handler::{HandlerError, HandlerOutput, ToolHandler};
pub use parser::{parse_tool_calls, ParseError};
pub use registry::{RegistryError, ToolRegistry};
pub use runtime::ToolRuntime;
pub use schema::{to_llm_function, validate_args, Param, ParamType, Tool, ValidationError};
pub use security::{GuardOptions, PathGuard, SecurityError};
pub use types::{BatchMode, ExecuteOptions, ExecutionContext, ResultStatus, ToolCall, ToolResult, ToolStats};
