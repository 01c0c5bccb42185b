//! File reading tool

use async_trait::async_trait;
use serde_json::json;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use wren_agent::tool::{Tool, ToolResult};

use crate::utils::expand_path;

const MAX_LINES: usize = 2000;
const MAX_LINE_LENGTH: usize = 2000;

/// Tool for reading file contents
#[derive(Default)]
pub struct ReadFileTool;

impl ReadFileTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. For large files, use offset and limit parameters."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read (relative or absolute)"
                },
                "offset": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Line number to start reading from (1-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of lines to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: serde_json::Value, cancel: CancellationToken) -> ToolResult {
        let Some(path_str) = input.get("path").and_then(|v| v.as_str()) else {
            return ToolResult::error("Missing 'path' argument");
        };
        let path = expand_path(path_str);

        if cancel.is_cancelled() {
            return ToolResult::error("Operation cancelled");
        }

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read {}: {}", path_str, e)),
        };

        if content.is_empty() {
            return ToolResult::text("(empty file)");
        }

        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();

        // 1-indexed on the wire
        let offset = input
            .get("offset")
            .and_then(|v| v.as_u64())
            .map(|o| (o as usize).saturating_sub(1))
            .unwrap_or(0);

        let limit = input
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|l| l as usize)
            .unwrap_or(MAX_LINES);

        if offset >= total_lines {
            return ToolResult::error(format!(
                "Offset {} is beyond end of file ({} lines total)",
                offset + 1,
                total_lines
            ));
        }

        let end = offset.saturating_add(limit).min(total_lines);

        let mut had_truncated = false;
        let formatted: Vec<String> = lines[offset..end]
            .iter()
            .map(|line| {
                if line.chars().count() > MAX_LINE_LENGTH {
                    had_truncated = true;
                    line.chars().take(MAX_LINE_LENGTH).collect()
                } else {
                    line.to_string()
                }
            })
            .collect();

        let mut output = formatted.join("\n");

        let mut notices = Vec::new();
        if had_truncated {
            notices.push(format!(
                "Some lines were truncated to {} characters",
                MAX_LINE_LENGTH
            ));
        }
        if end < total_lines {
            notices.push(format!(
                "{} more lines not shown. Use offset={} to continue reading",
                total_lines - end,
                end + 1
            ));
        }
        if !notices.is_empty() {
            output.push_str(&format!("\n\n... ({})", notices.join(". ")));
        }

        ToolResult::text(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::scratch_dir;

    async fn read(input: serde_json::Value) -> ToolResult {
        ReadFileTool::new().execute(input, CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_read_whole_file() {
        let dir = scratch_dir();
        let path = dir.join("notes.md");
        std::fs::write(&path, "one\ntwo\nthree\n").unwrap();

        let result = read(json!({"path": path.to_str().unwrap()})).await;
        assert_eq!(result, ToolResult::text("one\ntwo\nthree"));
    }

    #[tokio::test]
    async fn test_read_with_offset_and_limit() {
        let dir = scratch_dir();
        let path = dir.join("lines.txt");
        std::fs::write(&path, "a\nb\nc\nd\n").unwrap();

        let result = read(json!({"path": path.to_str().unwrap(), "offset": 2, "limit": 2})).await;
        assert!(!result.is_error);
        assert!(result.content.starts_with("b\nc"));
        assert!(result.content.contains("1 more lines not shown. Use offset=4"));
    }

    #[tokio::test]
    async fn test_read_missing_file_is_error() {
        let dir = scratch_dir();
        let result = read(json!({"path": dir.join("nope.txt").to_str().unwrap()})).await;
        assert!(result.is_error);
        assert!(result.content.starts_with("Failed to read"));
    }

    #[tokio::test]
    async fn test_offset_past_end() {
        let dir = scratch_dir();
        let path = dir.join("short.txt");
        std::fs::write(&path, "only\n").unwrap();
        let result = read(json!({"path": path.to_str().unwrap(), "offset": 5})).await;
        assert!(result.is_error);
        assert!(result.content.contains("beyond end of file"));
    }
}
