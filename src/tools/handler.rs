//! Handler contract implemented by every concrete capability

use crate::tools::types::ExecutionContext;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

/// What a handler produced on success
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    /// Plain text, passed through untouched
    Text(String),
    /// Structured output (list or map), serialized to JSON text
    Json(Value),
}

impl From<String> for HandlerOutput {
    fn from(s: String) -> Self {
        HandlerOutput::Text(s)
    }
}

impl From<&str> for HandlerOutput {
    fn from(s: &str) -> Self {
        HandlerOutput::Text(s.to_string())
    }
}

impl From<Value> for HandlerOutput {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => HandlerOutput::Text(s),
            other => HandlerOutput::Json(other),
        }
    }
}

/// Why a handler failed. The reason may be a plain message or a structured
/// value (a nested `{"error": ..}` or a map with a `message` field); the
/// executor flattens either to text.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerError {
    reason: Value,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            reason: Value::String(message.into()),
        }
    }

    pub fn structured(reason: Value) -> Self {
        Self { reason }
    }

    pub fn reason(&self) -> &Value {
        &self.reason
    }

    /// Flatten the reason to a message suitable for the calling model
    pub fn message(&self) -> String {
        flatten_reason(&self.reason)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for HandlerError {}

impl From<crate::tools::security::SecurityError> for HandlerError {
    fn from(e: crate::tools::security::SecurityError) -> Self {
        HandlerError::new(e.to_string())
    }
}

fn flatten_reason(reason: &Value) -> String {
    match reason {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(inner) = map.get("error") {
                return flatten_reason(inner);
            }
            if let Some(Value::String(msg)) = map.get("message") {
                return msg.clone();
            }
            reason.to_string()
        }
        // ["error", reason] tuples
        Value::Array(items) if items.len() == 2 && items[0] == "error" => flatten_reason(&items[1]),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}

/// A tool's execution handler. One implementation per capability, chosen
/// at registration time.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError>;
}
