//! Tool registry for the agent loop.
//!
//! Tools are registered once at startup and are immutable afterwards. The
//! registry hands the model a list of [`ToolDescriptor`]s and dispatches
//! [`ToolCallRequest`]s by name, validating arguments against each tool's
//! JSON schema before invocation.

mod search;

pub use search::SerperSearch;

use crate::config::Settings;
use crate::conversation::ToolCallRequest;
use crate::error::{Result, TolkError};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// A callable tool exposed to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to request this tool.
    fn name(&self) -> &str;

    /// Natural-language description used by the model to decide when to call it.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments object.
    fn parameters_schema(&self) -> Value;

    /// Invoke the tool with already-validated arguments.
    async fn invoke(&self, args: Value) -> Result<String>;
}

/// Model-facing description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    descriptor: ToolDescriptor,
    validator: jsonschema::Validator,
}

/// Immutable set of tools available to the agent.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry of tools enabled by the given settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut registry = Self::new();

        match settings.search_api_key() {
            Some(key) => {
                registry = registry.with_tool(SerperSearch::new(&settings.tools.search, &key)?)?;
            }
            None => debug!("No search API key configured, search tool disabled"),
        }

        Ok(registry)
    }

    /// Add a tool. Names must be unique and schemas must compile.
    pub fn with_tool<T: Tool + 'static>(self, tool: T) -> Result<Self> {
        self.with_shared(Arc::new(tool))
    }

    /// Add a shared tool instance.
    pub fn with_shared(mut self, tool: Arc<dyn Tool>) -> Result<Self> {
        let name = tool.name().to_string();
        if self.get(&name).is_some() {
            return Err(TolkError::DuplicateTool(name));
        }

        let parameters = tool.parameters_schema();
        let validator = jsonschema::Validator::new(&parameters).map_err(|e| {
            TolkError::Config(format!("Invalid schema for tool '{}': {}", name, e))
        })?;

        let descriptor = ToolDescriptor {
            name,
            description: tool.description().to_string(),
            parameters,
        };

        self.tools.push(RegisteredTool {
            tool,
            descriptor,
            validator,
        });
        Ok(self)
    }

    /// Descriptors for every registered tool, in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.find(name).map(|t| &t.tool)
    }

    fn find(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.descriptor.name == name)
    }

    /// Parse, validate and execute a tool-call request.
    pub async fn invoke(&self, request: &ToolCallRequest) -> Result<String> {
        let registered = self
            .find(&request.name)
            .ok_or_else(|| TolkError::UnknownTool(request.name.clone()))?;

        let args = parse_arguments(&request.name, &request.arguments)?;

        let violations: Vec<String> = registered
            .validator
            .iter_errors(&args)
            .map(|e| e.to_string())
            .collect();
        if !violations.is_empty() {
            return Err(TolkError::InvalidToolArguments {
                tool: request.name.clone(),
                reason: violations.join("; "),
            });
        }

        debug!("Arguments for {} passed schema validation", request.name);
        registered.tool.invoke(args).await
    }
}

/// Parse model-emitted argument text. An empty string means "no arguments".
fn parse_arguments(tool: &str, arguments: &str) -> Result<Value> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(arguments).map_err(|e| TolkError::InvalidToolArguments {
        tool: tool.to_string(),
        reason: format!("arguments are not valid JSON: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text back"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }

        async fn invoke(&self, args: Value) -> Result<String> {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with_tool(Echo).unwrap()
    }

    #[tokio::test]
    async fn test_invoke_known_tool() {
        let request = ToolCallRequest::new("c1", "echo", r#"{"text": "hello"}"#);
        assert_eq!(registry().invoke(&request).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let request = ToolCallRequest::new("c1", "jira", "{}");
        let err = registry().invoke(&request).await.unwrap_err();
        assert!(matches!(err, TolkError::UnknownTool(name) if name == "jira"));
    }

    #[tokio::test]
    async fn test_schema_violation_is_rejected_before_invocation() {
        let request = ToolCallRequest::new("c1", "echo", r#"{"text": 42}"#);
        let err = registry().invoke(&request).await.unwrap_err();
        assert!(matches!(err, TolkError::InvalidToolArguments { .. }));

        let request = ToolCallRequest::new("c2", "echo", "");
        let err = registry().invoke(&request).await.unwrap_err();
        assert!(matches!(err, TolkError::InvalidToolArguments { .. }));
    }

    #[tokio::test]
    async fn test_malformed_json_arguments() {
        let request = ToolCallRequest::new("c1", "echo", "{not json");
        let err = registry().invoke(&request).await.unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = registry().with_tool(Echo).err().unwrap();
        assert!(matches!(err, TolkError::DuplicateTool(name) if name == "echo"));
    }

    #[test]
    fn test_descriptors_in_registration_order() {
        let descriptors = registry().descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "echo");
        assert_eq!(descriptors[0].parameters["required"], json!(["text"]));
    }
}
