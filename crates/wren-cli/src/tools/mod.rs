//! Built-in tools

mod exec;
mod list;
mod read;
mod write;

pub use exec::ExecuteCommandTool;
pub use list::ListDirectoryTool;
pub use read::ReadFileTool;
pub use write::WriteFileTool;

use std::sync::Arc;
use wren_agent::ToolRegistry;

/// A registry holding every built-in tool
pub fn registry() -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(Arc::new(ReadFileTool::new()))
        .with_tool(Arc::new(WriteFileTool::new()))
        .with_tool(Arc::new(ListDirectoryTool::new()))
        .with_tool(Arc::new(ExecuteCommandTool::new()))
}
