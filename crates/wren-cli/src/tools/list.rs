//! Directory listing tool

use async_trait::async_trait;
use serde_json::json;
use std::fs;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use wren_agent::tool::{Tool, ToolResult};

use crate::utils::expand_path;

const DEFAULT_LIMIT: usize = 100;

/// Directories skipped when listing recursively
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", ".git"];

/// Tool for listing directory contents
#[derive(Default)]
pub struct ListDirectoryTool;

impl ListDirectoryTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the contents of a directory with file sizes. Directories end with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path to list (defaults to current directory)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Whether to list recursively (default: false)"
                },
                "show_hidden": {
                    "type": "boolean",
                    "description": "Whether to show hidden files (default: false)"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of entries to return (default: 100)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, input: serde_json::Value, cancel: CancellationToken) -> ToolResult {
        let path = expand_path(input.get("path").and_then(|v| v.as_str()).unwrap_or("."));
        let recursive = input
            .get("recursive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let show_hidden = input
            .get("show_hidden")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let limit = input
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LIMIT);

        if !path.exists() {
            return ToolResult::error(format!("Path does not exist: {}", path.display()));
        }
        if !path.is_dir() {
            return ToolResult::error(format!("Path is not a directory: {}", path.display()));
        }

        let mut lister = Lister {
            show_hidden,
            limit,
            cancel: &cancel,
            entries: Vec::new(),
        };
        if let Err(e) = lister.collect(&path, &path, recursive) {
            return ToolResult::error(format!("Error reading directory: {}", e));
        }

        if cancel.is_cancelled() {
            return ToolResult::error("List cancelled");
        }

        let entries = lister.entries;
        if entries.is_empty() {
            return ToolResult::text("(empty directory)");
        }

        let truncated = entries.len() >= limit;
        let mut output = entries.join("\n");
        if truncated {
            output.push_str(&format!("\n\n(showing first {} entries)", limit));
        }
        ToolResult::text(output)
    }
}

struct Lister<'a> {
    show_hidden: bool,
    limit: usize,
    cancel: &'a CancellationToken,
    entries: Vec<String>,
}

impl Lister<'_> {
    /// Walk `dir`, naming entries relative to `base`. Only the top-level read
    /// error is reported; unreadable subdirectories are skipped.
    fn collect(&mut self, base: &Path, dir: &Path, recursive: bool) -> std::io::Result<()> {
        let mut items: Vec<_> = fs::read_dir(dir)?.flatten().collect();
        items.sort_by_key(|e| e.path());

        for entry in items {
            if self.cancel.is_cancelled() || self.entries.len() >= self.limit {
                break;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if !self.show_hidden && name.starts_with('.') {
                continue;
            }
            let full_path = entry.path();
            let is_dir = full_path.is_dir();
            if recursive && is_dir && SKIPPED_DIRS.contains(&name.as_str()) {
                continue;
            }

            let relative = full_path.strip_prefix(base).unwrap_or(&full_path);
            self.entries
                .push(format_entry(&relative.to_string_lossy(), is_dir, entry.metadata().ok()));

            if recursive && is_dir {
                let _ = self.collect(base, &full_path, true);
            }
        }
        Ok(())
    }
}

fn format_entry(name: &str, is_dir: bool, metadata: Option<fs::Metadata>) -> String {
    if is_dir {
        return format!("{}/\t-", name);
    }
    match metadata {
        Some(m) => format!("{}\t{}", name, format_size(m.len())),
        None => name.to_string(),
    }
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1}G", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}K", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}
