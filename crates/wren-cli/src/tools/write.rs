//! File writing tool

use async_trait::async_trait;
use serde_json::json;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use wren_agent::tool::{Tool, ToolResult};

use crate::utils::expand_path;

/// Tool for writing file contents
#[derive(Default)]
pub struct WriteFileTool;

impl WriteFileTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist, overwrites if it does. Creates parent directories as needed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write (relative or absolute)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: serde_json::Value, cancel: CancellationToken) -> ToolResult {
        let Some(path_str) = input.get("path").and_then(|v| v.as_str()) else {
            return ToolResult::error("Missing 'path' argument");
        };
        let Some(content) = input.get("content").and_then(|v| v.as_str()) else {
            return ToolResult::error("Missing 'content' argument");
        };

        if path_str == "~" {
            return ToolResult::error("Cannot write to home directory itself");
        }
        let path = expand_path(path_str);

        if cancel.is_cancelled() {
            return ToolResult::error("Operation cancelled");
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent).await {
                    return ToolResult::error(format!("Failed to create directory: {}", e));
                }
            }
        }

        match fs::write(&path, content).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), bytes = content.len(), "wrote file");
                ToolResult::text(format!(
                    "Successfully wrote {} bytes to {}",
                    content.len(),
                    path_str
                ))
            }
            Err(e) => ToolResult::error(format!("Failed to write {}: {}", path_str, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::scratch_dir;

    #[tokio::test]
    async fn test_write_creates_parents() {
        let dir = scratch_dir();
        let path = dir.join("nested/deeper/out.md");

        let result = WriteFileTool::new()
            .execute(
                json!({"path": path.to_str().unwrap(), "content": "hello"}),
                CancellationToken::new(),
            )
            .await;

        assert!(!result.is_error, "{}", result.content);
        assert!(result.content.contains("5 bytes"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_write_cancelled_does_nothing() {
        let dir = scratch_dir();
        let path = dir.join("never.md");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = WriteFileTool::new()
            .execute(json!({"path": path.to_str().unwrap(), "content": "x"}), cancel)
            .await;

        assert!(result.is_error);
        assert!(!path.exists());
    }
}
