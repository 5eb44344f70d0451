//! Tool system for agents
//!
//! Tools are named capabilities with a declared JSON schema for their
//! arguments. The runner validates arguments against that schema before a
//! tool runs; tools never touch sessions or agent definitions directly, their
//! results flow back through the runner.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::warn;

use crate::error::{AgentsError, Result};

/// Result from a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output from the tool
    pub output: Value,
    /// Optional error message if the tool failed
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: Value) -> Self {
        Self {
            output,
            error: None,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: Value::Null,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Trait for all tools that can be used by agents
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    /// Get the name of the tool
    fn name(&self) -> &str;

    /// Get the description of the tool
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's parameters
    fn parameters_schema(&self) -> Value;

    /// Check arguments against the declared schema.
    fn validate(&self, arguments: &Value) -> Result<()> {
        validate_against_schema(self.name(), &self.parameters_schema(), arguments)
    }

    /// Execute the tool with the given arguments
    async fn execute(&self, arguments: Value) -> Result<ToolResult>;
}

/// Validate `arguments` against a JSON schema, collecting every violation.
pub fn validate_against_schema(tool: &str, schema: &Value, arguments: &Value) -> Result<()> {
    let validator = jsonschema::validator_for(schema).map_err(|e| AgentsError::SchemaViolation {
        tool: tool.to_string(),
        message: format!("invalid tool schema: {}", e),
    })?;
    if validator.is_valid(arguments) {
        return Ok(());
    }
    let errors: Vec<String> = validator
        .iter_errors(arguments)
        .map(|e| e.to_string())
        .collect();
    Err(AgentsError::SchemaViolation {
        tool: tool.to_string(),
        message: errors.join("; "),
    })
}

type ToolFn = dyn Fn(Value) -> Result<Value> + Send + Sync;

/// A function-based tool
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters_schema: Value,
    function: Arc<ToolFn>,
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters_schema", &self.parameters_schema)
            .finish()
    }
}

impl FunctionTool {
    /// Create a new function tool from an explicit schema
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        function: F,
    ) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            function: Arc::new(function),
        }
    }

    /// Create a tool whose schema is derived from a typed argument struct.
    ///
    /// Arguments are deserialized into `A` before `function` runs; the schema
    /// is generated with `schemars`.
    pub fn typed<A, R, F>(name: impl Into<String>, description: impl Into<String>, function: F) -> Self
    where
        A: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Result<R> + Send + Sync + 'static,
    {
        let schema = schemars::schema_for!(A);
        let parameters_schema = serde_json::to_value(schema.schema)
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
        let wrapped = move |raw: Value| {
            let args: A = serde_json::from_value(raw)?;
            let out = function(args)?;
            Ok(serde_json::to_value(out)?)
        };
        Self::new(name, description, parameters_schema, wrapped)
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters_schema.clone()
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult> {
        match (self.function)(arguments) {
            Ok(output) => Ok(ToolResult::success(output)),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

/// Named set of tools available to the composition root
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Replaced previously registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Resolve tools by name, preserving the requested order.
    pub fn select(&self, names: &[&str]) -> Result<Vec<Arc<dyn Tool>>> {
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| AgentsError::UnknownTool {
                    name: name.to_string(),
                })
            })
            .collect()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct EchoArgs {
        text: String,
        #[serde(default)]
        repeat: Option<u32>,
    }

    fn echo_tool() -> FunctionTool {
        FunctionTool::typed("echo", "Echoes text", |args: EchoArgs| {
            Ok(args.text.repeat(args.repeat.unwrap_or(1) as usize))
        })
    }

    #[test]
    fn test_tool_result_creation() {
        let result = ToolResult::success(serde_json::json!({"data": "test"}));
        assert!(!result.is_error());

        let error_result = ToolResult::error("Something went wrong");
        assert_eq!(error_result.error, Some("Something went wrong".to_string()));
        assert_eq!(error_result.output, Value::Null);
    }

    #[test]
    fn test_typed_tool_schema() {
        let tool = echo_tool();
        let schema = tool.parameters_schema();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["text"].is_object());
        assert_eq!(schema["required"], serde_json::json!(["text"]));
    }

    #[tokio::test]
    async fn test_typed_tool_execution() {
        let tool = echo_tool();
        let result = tool
            .execute(serde_json::json!({"text": "ab", "repeat": 2}))
            .await
            .unwrap();
        assert_eq!(result.output, serde_json::json!("abab"));
    }

    #[test]
    fn test_schema_validation_rejects_bad_arguments() {
        let tool = echo_tool();
        assert!(tool.validate(&serde_json::json!({"text": "ok"})).is_ok());

        let err = tool.validate(&serde_json::json!({"repeat": 1})).unwrap_err();
        match err {
            AgentsError::SchemaViolation { tool, message } => {
                assert_eq!(tool, "echo");
                assert!(message.contains("text"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(tool
            .validate(&serde_json::json!({"text": 5}))
            .is_err());
    }

    #[tokio::test]
    async fn test_function_tool_error_handling() {
        let tool = FunctionTool::new("failing_tool", "A tool that fails", serde_json::json!({}), |_| {
            Err(AgentsError::tool("Intentional failure"))
        });

        let result = tool.execute(serde_json::json!({})).await.unwrap();
        assert!(result.error.unwrap().contains("Intentional failure"));
    }

    #[test]
    fn test_registry_select_preserves_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(echo_tool()));
        registry.register(Arc::new(FunctionTool::new(
            "noop",
            "Does nothing",
            serde_json::json!({"type": "object"}),
            |_| Ok(Value::Null),
        )));

        let selected = registry.select(&["noop", "echo"]).unwrap();
        let names: Vec<&str> = selected.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["noop", "echo"]);
        assert_eq!(registry.names(), vec!["echo", "noop"]);

        let missing = registry.select(&["echo", "web_search"]).unwrap_err();
        assert!(matches!(missing, AgentsError::UnknownTool { name } if name == "web_search"));
    }
}
