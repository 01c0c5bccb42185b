//! Tool trait, tool executor, and the default registry

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wren_ai::ToolSpec;

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text handed back to the model and recorded on the task
    pub content: String,
    /// Whether the execution resulted in an error
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// Trait for executable tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in task plans)
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given input.
    ///
    /// Failures are reported through [`ToolResult::error`], never by panicking.
    async fn execute(&self, input: serde_json::Value, cancel: CancellationToken) -> ToolResult;
}

/// Type alias for a boxed tool
pub type BoxedTool = Arc<dyn Tool>;

/// Describe a tool for prompts
pub fn to_spec(tool: &dyn Tool) -> ToolSpec {
    ToolSpec::new(tool.name(), tool.description(), tool.parameters_schema())
}

/// Executes tools by name on behalf of the execution loop
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Definitions of every available tool
    fn specs(&self) -> Vec<ToolSpec>;

    /// Whether a tool with this name can be executed
    fn has_tool(&self, name: &str) -> bool {
        self.specs().iter().any(|s| s.name == name)
    }

    /// Run a tool. Unknown tools and bad input come back as error results.
    async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        cancel: CancellationToken,
    ) -> ToolResult;
}

/// A name-keyed set of tools with cached argument validators
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<BoxedTool>,
    schema_cache: HashMap<String, Arc<jsonschema::Validator>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: BoxedTool) {
        self.tools.retain(|t| t.name() != tool.name());
        self.cache_tool_schema(&tool);
        self.tools.push(tool);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_tool(mut self, tool: BoxedTool) -> Self {
        self.register(tool);
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Compile and cache the JSON schema validator for a tool.
    fn cache_tool_schema(&mut self, tool: &BoxedTool) {
        let schema = tool.parameters_schema();
        match jsonschema::validator_for(&schema) {
            Ok(validator) => {
                self.schema_cache
                    .insert(tool.name().to_string(), Arc::new(validator));
            }
            Err(e) => {
                self.schema_cache.remove(tool.name());
                tracing::warn!(
                    "Invalid tool parameter schema for '{}', skipping validation: {}",
                    tool.name(),
                    e
                );
            }
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| to_spec(t.as_ref())).collect()
    }

    fn has_tool(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        cancel: CancellationToken,
    ) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::error(format!("Tool not found: {}", name));
        };

        if let Some(err) = self
            .schema_cache
            .get(name)
            .and_then(|validator| validate_with_validator(&input, validator))
        {
            tracing::debug!(tool = name, "rejected tool input: {}", err);
            return ToolResult::error(err);
        }

        tool.execute(input, cancel).await
    }
}

/// Validate tool input using a pre-compiled validator.
/// Returns `Some(error_message)` if validation fails, `None` if valid.
fn validate_with_validator(
    input: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(input)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Tool argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A simple test tool that echoes its input.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "count": { "type": "integer" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, input: serde_json::Value, _cancel: CancellationToken) -> ToolResult {
            let text = input
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("(empty)");
            ToolResult::text(text)
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with_tool(Arc::new(EchoTool))
    }

    #[tokio::test]
    async fn test_execute_known_tool() {
        let result = registry()
            .execute("echo", json!({"text": "hello"}), CancellationToken::new())
            .await;
        assert_eq!(result, ToolResult::text("hello"));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let result = registry()
            .execute("nonexistent_tool", json!({}), CancellationToken::new())
            .await;
        assert!(result.is_error);
        assert_eq!(result.content, "Tool not found: nonexistent_tool");
    }

    #[tokio::test]
    async fn test_missing_required_field_is_error_result() {
        let result = registry()
            .execute("echo", json!({"count": 2}), CancellationToken::new())
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("validation failed"));
        assert!(result.content.contains("text"));
    }

    #[tokio::test]
    async fn test_wrong_type_reports_path() {
        let result = registry()
            .execute(
                "echo",
                json!({"text": "hi", "count": "two"}),
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("/count"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = registry();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.len(), 1);
        assert!(registry.has_tool("echo"));
        assert!(!registry.has_tool("read_file"));
    }

    #[test]
    fn test_specs_describe_tools() {
        let specs = registry().specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
        assert_eq!(specs[0].description, "Echoes input");
        assert_eq!(specs[0].parameters["required"][0], "text");
    }
}
