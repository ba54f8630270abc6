//! Tool-call wire format parsing
//!
//! Accepts the three shapes models and provider SDKs emit:
//! - `{"tool_calls": [{"id", "type": "function", "function": {"name", "arguments"}}]}`
//! - a bare list of `{"id", "name", "arguments"}`
//! - a chat completion with the first shape under `choices[0].message`
//!
//! `arguments` may be a JSON-encoded string or an already-decoded object.
//! Any structural problem becomes a [`ParseError`]; decoder failures never
//! escape as anything else.

use crate::tools::types::ToolCall;
use serde_json::{Map, Value};
use thiserror::Error;

/// Structurally invalid batch, raised before any result can exist
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("no tool calls in payload")]
    NoToolCalls,

    #[error("invalid tool call: {0}")]
    InvalidToolCall(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Parse a raw JSON payload string
pub fn parse_tool_calls_str(payload: &str) -> Result<Vec<ToolCall>, ParseError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| ParseError::InvalidPayload(e.to_string()))?;
    parse_tool_calls(&value)
}

/// Parse a decoded payload into calls, preserving wire order
pub fn parse_tool_calls(payload: &Value) -> Result<Vec<ToolCall>, ParseError> {
    let raw_calls = extract_calls(payload)?;
    if raw_calls.is_empty() {
        return Err(ParseError::NoToolCalls);
    }
    raw_calls
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_call(index, raw))
        .collect()
}

fn extract_calls(payload: &Value) -> Result<&[Value], ParseError> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(map) => match map.get("choices") {
            Some(Value::Array(choices)) => match choices.first() {
                None => Err(ParseError::NoToolCalls),
                Some(choice) => {
                    let message = choice.get("message").ok_or_else(|| {
                        ParseError::InvalidToolCall("choices[0] has no message".to_string())
                    })?;
                    calls_in_message(message)
                }
            },
            Some(_) => Err(ParseError::InvalidToolCall(
                "choices must be an array".to_string(),
            )),
            None => calls_in_message(payload),
        },
        _ => Err(ParseError::InvalidPayload(
            "expected a JSON object or array".to_string(),
        )),
    }
}

fn calls_in_message(message: &Value) -> Result<&[Value], ParseError> {
    match message.get("tool_calls") {
        None | Some(Value::Null) => Err(ParseError::NoToolCalls),
        Some(Value::Array(calls)) => Ok(calls),
        Some(_) => Err(ParseError::InvalidToolCall(
            "tool_calls must be an array".to_string(),
        )),
    }
}

fn parse_call(index: usize, raw: &Value) -> Result<ToolCall, ParseError> {
    let obj = raw.as_object().ok_or_else(|| {
        ParseError::InvalidToolCall(format!("tool call {index} is not an object"))
    })?;

    let id = match obj.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        _ => {
            return Err(ParseError::InvalidToolCall(format!(
                "tool call {index} is missing id"
            )))
        }
    };

    if let Some(kind) = obj.get("type") {
        if kind.as_str() != Some("function") {
            return Err(ParseError::InvalidToolCall(format!(
                "tool call {id} has unsupported type {kind}"
            )));
        }
    }

    // OpenAI-style calls nest name/arguments under `function`
    let body = match obj.get("function") {
        Some(Value::Object(function)) => function,
        Some(_) => {
            return Err(ParseError::InvalidToolCall(format!(
                "tool call {id} has a non-object function field"
            )))
        }
        None => obj,
    };

    let name = match body.get("name") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        _ => {
            return Err(ParseError::InvalidToolCall(format!(
                "tool call {id} is missing name"
            )))
        }
    };

    let arguments = decode_arguments(&id, body.get("arguments"))?;

    Ok(ToolCall {
        id,
        name,
        arguments,
    })
}

fn decode_arguments(id: &str, raw: Option<&Value>) -> Result<Map<String, Value>, ParseError> {
    match raw {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(encoded)) => {
            let decoded: Value = serde_json::from_str(encoded).map_err(|e| {
                ParseError::InvalidToolCall(format!(
                    "tool call {id} has malformed arguments JSON: {e}"
                ))
            })?;
            match decoded {
                Value::Object(map) => Ok(map),
                Value::Null => Ok(Map::new()),
                _ => Err(ParseError::InvalidToolCall(format!(
                    "tool call {id} arguments must be a JSON object"
                ))),
            }
        }
        Some(_) => Err(ParseError::InvalidToolCall(format!(
            "tool call {id} arguments must be a JSON object or string"
        ))),
    }
}
