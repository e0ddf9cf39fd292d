pub mod wikipedia;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::{SchemaError, ToolError};
use crate::llm::ModelToolDefinition;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Result fed back to the model.
    Text(String),
    /// Ends the agent run with this message as the final answer.
    Done(String),
}

type ToolHandler = dyn Fn(Value) -> BoxFuture<'static, Result<ToolOutcome, ToolError>> + Send + Sync;

#[derive(Clone)]
pub struct ToolSpec {
    name: String,
    description: String,
    json_schema: Value,
    handler: Arc<ToolHandler>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": true,
            }),
            handler: Arc::new(|_args| {
                Box::pin(async {
                    Err(ToolError::Execution(
                        "tool handler not configured".to_string(),
                    ))
                })
            }),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Result<Self, SchemaError> {
        validate_schema(&schema)?;
        self.json_schema = schema;
        Ok(self)
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutcome, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |args| Box::pin(handler(args)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    pub fn definition(&self) -> ModelToolDefinition {
        ModelToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.json_schema.clone(),
        }
    }

    pub async fn execute(&self, args: Value) -> Result<ToolOutcome, ToolError> {
        validate_arguments(self.name(), &self.json_schema, &args)?;
        (self.handler)(args).await
    }
}

fn validate_schema(schema: &Value) -> Result<(), SchemaError> {
    let schema_obj = schema.as_object().ok_or(SchemaError::SchemaNotObject)?;

    match schema_obj.get("type").and_then(Value::as_str) {
        Some("object") => {}
        _ => return Err(SchemaError::RootTypeMustBeObject),
    }

    if let Some(required) = schema_obj.get("required") {
        let all_strings = required
            .as_array()
            .is_some_and(|fields| fields.iter().all(Value::is_string));
        if !all_strings {
            return Err(SchemaError::InvalidRequired);
        }
    }

    Ok(())
}

fn validate_arguments(tool_name: &str, schema: &Value, args: &Value) -> Result<(), ToolError> {
    let invalid = |message: String| ToolError::InvalidArguments {
        tool: tool_name.to_string(),
        message,
    };

    let args_obj = args
        .as_object()
        .ok_or_else(|| invalid("arguments must be a JSON object".to_string()))?;

    let empty = serde_json::Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);
    for field in required {
        if !args_obj.contains_key(field) {
            return Err(invalid(format!("missing required field: {field}")));
        }
    }

    let closed = schema.get("additionalProperties").and_then(Value::as_bool) == Some(false);

    for (key, value) in args_obj {
        match properties.get(key) {
            None if closed => return Err(invalid(format!("unknown field: {key}"))),
            None => {}
            Some(field_schema) => {
                if let Some(type_name) = field_schema.get("type").and_then(Value::as_str) {
                    if !value_matches_type(value, type_name) {
                        return Err(invalid(format!("field '{key}' must be of type {type_name}")));
                    }
                }
            }
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn echo_tool() -> ToolSpec {
        ToolSpec::new("echo", "echo the text")
            .with_schema(json!({
                "type": "object",
                "properties": {"text": {"type": "string"}, "times": {"type": "integer"}},
                "required": ["text"],
                "additionalProperties": false
            }))
            .expect("schema valid")
            .with_handler(|args| async move {
                let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
                Ok(ToolOutcome::Text(text.to_string()))
            })
    }

    #[test]
    fn schema_validation_rejects_non_object_root() {
        let result = ToolSpec::new("bad", "bad").with_schema(json!({"type": "string"}));
        assert!(matches!(result, Err(SchemaError::RootTypeMustBeObject)));
    }

    #[test]
    fn schema_validation_rejects_non_string_required() {
        let result = ToolSpec::new("bad", "bad")
            .with_schema(json!({"type": "object", "required": [1]}));
        assert!(matches!(result, Err(SchemaError::InvalidRequired)));
    }

    #[tokio::test]
    async fn default_handler_reports_missing_configuration() {
        let err = ToolSpec::new("noop", "noop")
            .execute(json!({}))
            .await
            .expect_err("no handler");
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn argument_validation_reports_missing_required() {
        let err = echo_tool()
            .execute(json!({}))
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("missing required field: text"));
    }

    #[tokio::test]
    async fn argument_validation_rejects_unknown_and_mistyped_fields() {
        let unknown = echo_tool()
            .execute(json!({"text": "hi", "extra": 1}))
            .await
            .expect_err("unknown field");
        assert!(unknown.to_string().contains("unknown field: extra"));

        let mistyped = echo_tool()
            .execute(json!({"text": "hi", "times": "twice"}))
            .await
            .expect_err("mistyped field");
        assert!(mistyped.to_string().contains("must be of type integer"));
    }

    #[tokio::test]
    async fn valid_arguments_reach_handler() {
        let outcome = echo_tool()
            .execute(json!({"text": "hello", "times": 2}))
            .await
            .expect("executes");
        assert_eq!(outcome, ToolOutcome::Text("hello".to_string()));
    }

    #[test]
    fn definition_mirrors_tool() {
        let definition = echo_tool().definition();
        assert_eq!(definition.name, "echo");
        assert_eq!(definition.parameters["required"], json!(["text"]));
    }
}
