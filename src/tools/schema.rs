//! Tool and parameter schema model
//!
//! A [`Tool`] is an immutable description of a capability plus the handler
//! that backs it. Its parameter list drives both the JSON-Schema projection
//! advertised to the model ([`to_llm_function`]) and structural argument
//! validation ([`validate_args`]).

use crate::tools::handler::ToolHandler;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Closed set of parameter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Runtime type check. `number` accepts integers and floats, `integer`
    /// accepts only values without a fractional representation.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Element type for arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ParamType>,
    /// Nested properties for objects
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Param>,
}

impl Param {
    pub fn new(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: false,
            default: None,
            enum_values: None,
            items: None,
            properties: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::String, description)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer, description)
    }

    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean, description)
    }

    pub fn array(name: impl Into<String>, description: impl Into<String>, items: ParamType) -> Self {
        let mut param = Self::new(name, ParamType::Array, description);
        param.items = Some(items);
        param
    }

    pub fn object(name: impl Into<String>, description: impl Into<String>, properties: Vec<Param>) -> Self {
        let mut param = Self::new(name, ParamType::Object, description);
        param.properties = properties;
        param
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_enum<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    fn validate(&self) -> Result<(), String> {
        if !is_identifier(&self.name) {
            return Err(format!("invalid parameter name: {:?}", self.name));
        }
        if self.param_type == ParamType::Array && self.items.is_none() {
            return Err(format!("array parameter {} must declare an items type", self.name));
        }
        if self.param_type != ParamType::Object && !self.properties.is_empty() {
            return Err(format!("only object parameters may declare properties: {}", self.name));
        }
        check_unique(&self.properties)?;
        self.properties.iter().try_for_each(Param::validate)
    }

    fn to_schema(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".to_string(), json!(self.param_type.as_str()));
        if !self.description.is_empty() {
            prop.insert("description".to_string(), json!(self.description));
        }
        if let Some(default) = &self.default {
            prop.insert("default".to_string(), default.clone());
        }
        if let Some(values) = &self.enum_values {
            prop.insert("enum".to_string(), Value::Array(values.clone()));
        }
        if let Some(items) = self.items {
            prop.insert("items".to_string(), json!({ "type": items.as_str() }));
        }
        if self.param_type == ParamType::Object {
            let (properties, required) = object_schema(&self.properties);
            prop.insert("properties".to_string(), properties);
            prop.insert("required".to_string(), required);
        }
        Value::Object(prop)
    }
}

/// A named, schema-described capability. Fields are private: a tool is
/// immutable once built.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    params: Vec<Param>,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }

    /// Structural check run at registration
    pub fn validate(&self) -> Result<(), String> {
        if !is_tool_name(&self.name) {
            return Err(format!(
                "invalid tool name {:?}: expected lowercase letters, digits and underscores",
                self.name
            ));
        }
        check_unique(&self.params)?;
        self.params.iter().try_for_each(Param::validate)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Argument validation failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("{}", missing_message(.0))]
    MissingParameters(Vec<String>),

    #[error("invalid type for parameter {name}: expected {expected}")]
    InvalidType { name: String, expected: ParamType },

    #[error("invalid value for parameter {name}: expected one of {allowed}")]
    InvalidValue { name: String, allowed: String },
}

fn missing_message(names: &[String]) -> String {
    match names {
        [one] => format!("missing required parameter: {one}"),
        many => format!("missing required parameters: {}", many.join(", ")),
    }
}

/// Project a tool to the function-calling schema sent to model providers
pub fn to_llm_function(tool: &Tool) -> Value {
    let (properties, required) = object_schema(&tool.params);
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        }
    })
}

fn object_schema(params: &[Param]) -> (Value, Value) {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in params {
        properties.insert(param.name.clone(), param.to_schema());
        if param.required {
            required.push(json!(param.name));
        }
    }
    (Value::Object(properties), Value::Array(required))
}

/// Structural validation of call arguments. No coercion.
///
/// Order of checks: undeclared keys, then every missing required parameter
/// in one error, then per-value type and enum checks. A `null` value counts
/// as absent. Object parameters that declare properties are checked the
/// same way, with nested names reported as `outer.inner`.
pub fn validate_args(tool: &Tool, args: &Map<String, Value>) -> Result<(), ValidationError> {
    validate_fields(&tool.params, args, "")
}

fn validate_fields(
    params: &[Param],
    args: &Map<String, Value>,
    prefix: &str,
) -> Result<(), ValidationError> {
    if let Some(unknown) = args.keys().find(|k| !params.iter().any(|p| &p.name == *k)) {
        return Err(ValidationError::UnknownParameter(qualify(prefix, unknown)));
    }

    let missing: Vec<String> = params
        .iter()
        .filter(|p| p.required && args.get(&p.name).map_or(true, Value::is_null))
        .map(|p| qualify(prefix, &p.name))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingParameters(missing));
    }

    for param in params {
        match args.get(&param.name) {
            None | Some(Value::Null) => continue,
            Some(value) => check_value(param, value, prefix)?,
        }
    }
    Ok(())
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn check_value(param: &Param, value: &Value, prefix: &str) -> Result<(), ValidationError> {
    let name = qualify(prefix, &param.name);
    if !param.param_type.matches(value) {
        return Err(ValidationError::InvalidType {
            name,
            expected: param.param_type,
        });
    }

    if let Some(allowed) = &param.enum_values {
        if !allowed.contains(value) {
            let listed = Value::Array(allowed.clone()).to_string();
            return Err(ValidationError::InvalidValue {
                name,
                allowed: listed,
            });
        }
    }

    match (param.items, value) {
        (Some(items), Value::Array(elements)) => {
            if let Some(i) = elements.iter().position(|e| !items.matches(e)) {
                return Err(ValidationError::InvalidType {
                    name: format!("{name}[{i}]"),
                    expected: items,
                });
            }
        }
        // Objects without declared properties are free-form
        (_, Value::Object(fields)) if !param.properties.is_empty() => {
            validate_fields(&param.properties, fields, &name)?;
        }
        _ => {}
    }
    Ok(())
}

fn check_unique(params: &[Param]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for p in params {
        if !seen.insert(p.name.as_str()) {
            return Err(format!("duplicate parameter name: {}", p.name));
        }
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_tool_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::handler::{HandlerError, HandlerOutput};
    use crate::tools::types::ExecutionContext;

    struct NoopHandler;

    #[async_trait::async_trait]
    impl ToolHandler for NoopHandler {
        async fn execute(
            &self,
            _args: &Map<String, Value>,
            _ctx: &ExecutionContext,
        ) -> Result<HandlerOutput, HandlerError> {
            Ok("ok".into())
        }
    }

    fn read_file_tool() -> Tool {
        Tool::new("read_file", "Read a file", NoopHandler)
            .with_param(Param::string("path", "File path").required())
            .with_param(Param::integer("offset", "Start line").with_default(0))
            .with_param(Param::string("encoding", "Text encoding").with_enum(["utf8", "latin1"]))
            .with_param(Param::array("tags", "Labels", ParamType::String))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_llm_function_projection() {
        let schema = to_llm_function(&read_file_tool());

        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "read_file");
        assert_eq!(schema["function"]["parameters"]["type"], "object");

        let props = &schema["function"]["parameters"]["properties"];
        assert_eq!(props.as_object().unwrap().len(), 4);
        assert_eq!(props["path"]["type"], "string");
        assert_eq!(props["offset"]["default"], 0);
        assert_eq!(props["encoding"]["enum"], json!(["utf8", "latin1"]));
        assert_eq!(props["tags"]["items"]["type"], "string");

        let required = schema["function"]["parameters"]["required"].as_array().unwrap();
        assert_eq!(required, &vec![json!("path")]);
    }

    #[test]
    fn test_nested_object_projection() {
        let tool = Tool::new("edit", "Edit", NoopHandler).with_param(Param::object(
            "range",
            "Line range",
            vec![Param::integer("start", "").required(), Param::integer("end", "")],
        ));
        let schema = to_llm_function(&tool);
        let range = &schema["function"]["parameters"]["properties"]["range"];
        assert_eq!(range["type"], "object");
        assert_eq!(range["properties"]["start"]["type"], "integer");
        assert_eq!(range["required"], json!(["start"]));
    }

    #[test]
    fn test_valid_args() {
        let tool = read_file_tool();
        assert!(validate_args(&tool, &args(json!({"path": "a.txt"}))).is_ok());
        assert!(validate_args(
            &tool,
            &args(json!({"path": "a.txt", "offset": 3, "encoding": "utf8", "tags": ["x"]}))
        )
        .is_ok());
    }

    #[test]
    fn test_unknown_parameter() {
        let err = validate_args(&read_file_tool(), &args(json!({"path": "a", "mode": "x"}))).unwrap_err();
        assert_eq!(err.to_string(), "unknown parameter: mode");
    }

    #[test]
    fn test_missing_single_parameter() {
        let err = validate_args(&read_file_tool(), &Map::new()).unwrap_err();
        assert_eq!(err.to_string(), "missing required parameter: path");
    }

    #[test]
    fn test_missing_parameters_are_all_reported() {
        let tool = Tool::new("write_file", "Write", NoopHandler)
            .with_param(Param::string("path", "").required())
            .with_param(Param::string("content", "").required())
            .with_param(Param::boolean("append", ""));
        let err = validate_args(&tool, &args(json!({"append": true}))).unwrap_err();
        assert_eq!(err, ValidationError::MissingParameters(vec!["path".into(), "content".into()]));
        assert_eq!(err.to_string(), "missing required parameters: path, content");
    }

    #[test]
    fn test_null_counts_as_missing() {
        let err = validate_args(&read_file_tool(), &args(json!({"path": null}))).unwrap_err();
        assert_eq!(err.to_string(), "missing required parameter: path");
        assert!(validate_args(&read_file_tool(), &args(json!({"path": "a", "offset": null}))).is_ok());
    }

    #[test]
    fn test_type_mismatch() {
        let err = validate_args(&read_file_tool(), &args(json!({"path": 7}))).unwrap_err();
        assert_eq!(err.to_string(), "invalid type for parameter path: expected string");

        let err = validate_args(&read_file_tool(), &args(json!({"path": "a", "offset": 1.5}))).unwrap_err();
        assert_eq!(err.to_string(), "invalid type for parameter offset: expected integer");

        let err = validate_args(&read_file_tool(), &args(json!({"path": "a", "tags": ["x", 2]}))).unwrap_err();
        assert_eq!(err.to_string(), "invalid type for parameter tags[1]: expected string");
    }

    #[test]
    fn test_number_accepts_integer_and_float() {
        let tool = Tool::new("scale", "Scale", NoopHandler).with_param(Param::number("factor", "").required());
        assert!(validate_args(&tool, &args(json!({"factor": 2}))).is_ok());
        assert!(validate_args(&tool, &args(json!({"factor": 2.5}))).is_ok());
        assert!(validate_args(&tool, &args(json!({"factor": "2"}))).is_err());
    }

    #[test]
    fn test_enum_violation() {
        let err = validate_args(&read_file_tool(), &args(json!({"path": "a", "encoding": "ebcdic"}))).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
        assert!(err.to_string().contains("encoding"));
    }

    #[test]
    fn test_nested_object_fields_are_validated() {
        let tool = Tool::new("edit", "Edit", NoopHandler).with_param(
            Param::object(
                "range",
                "Line range",
                vec![Param::integer("start", "").required(), Param::integer("end", "")],
            )
            .required(),
        );

        assert!(validate_args(&tool, &args(json!({"range": {"start": 1, "end": 4}}))).is_ok());

        let err = validate_args(&tool, &args(json!({"range": {"end": 4}}))).unwrap_err();
        assert_eq!(err.to_string(), "missing required parameter: range.start");

        let err = validate_args(&tool, &args(json!({"range": {"start": "one"}}))).unwrap_err();
        assert_eq!(err.to_string(), "invalid type for parameter range.start: expected integer");

        let err = validate_args(&tool, &args(json!({"range": {"start": 1, "step": 2}}))).unwrap_err();
        assert_eq!(err.to_string(), "unknown parameter: range.step");
    }

    #[test]
    fn test_free_form_object_accepts_any_fields() {
        let tool = Tool::new("tag", "Tag", NoopHandler)
            .with_param(Param::new("meta", ParamType::Object, "Arbitrary metadata"));
        assert!(validate_args(&tool, &args(json!({"meta": {"anything": [1, 2]}}))).is_ok());
    }

    #[test]
    fn test_tool_validation() {
        assert!(read_file_tool().validate().is_ok());
        assert!(Tool::new("ReadFile", "", NoopHandler).validate().is_err());
        assert!(Tool::new("", "", NoopHandler).validate().is_err());
        assert!(Tool::new("x", "", NoopHandler)
            .with_param(Param::string("a", ""))
            .with_param(Param::string("a", ""))
            .validate()
            .is_err());
        assert!(Tool::new("x", "", NoopHandler)
            .with_param(Param::new("list", ParamType::Array, ""))
            .validate()
            .is_err());
        assert!(Tool::new("x", "", NoopHandler)
            .with_param(Param::string("bad-name", ""))
            .validate()
            .is_err());
    }

    #[test]
    fn test_param_serde_shape() {
        let param = Param::string("mode", "Mode").with_enum(["a", "b"]).required();
        let value = serde_json::to_value(&param).unwrap();
        assert_eq!(value["type"], "string");
        assert_eq!(value["enum"], json!(["a", "b"]));
        let back: Param = serde_json::from_value(value).unwrap();
        assert_eq!(back, param);
    }
}
