//! Shell command execution tool

use async_trait::async_trait;
use serde_json::json;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use wren_agent::tool::{Tool, ToolResult};

/// Maximum output size in bytes before truncation
const MAX_OUTPUT_SIZE: usize = 100_000; // 100KB
/// Maximum number of lines before truncation
const MAX_OUTPUT_LINES: usize = 1000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Tool for executing shell commands
#[derive(Default)]
pub struct ExecuteCommandTool;

impl ExecuteCommandTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the current working directory. Returns stdout and stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Timeout in seconds (default: 120)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: serde_json::Value, cancel: CancellationToken) -> ToolResult {
        let Some(command) = input.get("command").and_then(|v| v.as_str()) else {
            return ToolResult::error("Missing 'command' argument");
        };
        let timeout_secs = input
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let (shell, shell_arg) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let child = match Command::new(shell)
            .arg(shell_arg)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to spawn command: {}", e)),
        };

        tracing::debug!(command, timeout_secs, "running command");

        // Dropping the wait future kills the child
        let output = tokio::select! {
            _ = cancel.cancelled() => return ToolResult::error("Command cancelled"),
            _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => {
                return ToolResult::error(format!("Command timed out after {} seconds", timeout_secs));
            }
            output = child.wait_with_output() => match output {
                Ok(o) => o,
                Err(e) => return ToolResult::error(format!("Failed to wait for command: {}", e)),
            },
        };

        let mut result = cap_output(&String::from_utf8_lossy(&output.stdout), "stdout");
        let stderr = cap_output(&String::from_utf8_lossy(&output.stderr), "stderr");
        if !stderr.is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(&stderr);
        }
        if result.is_empty() {
            result = "(no output)".to_string();
        }

        if output.status.success() {
            ToolResult::text(result)
        } else {
            let code = output.status.code().unwrap_or(-1);
            ToolResult::error(format!("{}\n\nCommand exited with code {}", result, code))
        }
    }
}

/// Keep at most `MAX_OUTPUT_LINES` lines and `MAX_OUTPUT_SIZE` bytes.
fn cap_output(text: &str, stream: &str) -> String {
    let text = text.trim_end();
    let mut out = String::new();
    let mut lines = 0usize;
    let mut truncated = false;

    for line in text.lines() {
        if lines >= MAX_OUTPUT_LINES || out.len() + line.len() > MAX_OUTPUT_SIZE {
            truncated = true;
            break;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
        lines += 1;
    }

    if truncated {
        out.push_str(&format!(
            "\n\n... ({} truncated at {} lines / {}KB)",
            stream,
            lines,
            MAX_OUTPUT_SIZE / 1024
        ));
    }
    out
}
