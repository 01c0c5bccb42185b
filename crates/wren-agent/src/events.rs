//! Agent event types

use serde::{Deserialize, Serialize};

use crate::task::ThinkingStep;

/// Events emitted during a turn, in the order they happen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A user turn started
    TurnStart { turn_id: String },

    /// A chunk of streamed assistant text
    TextChunk { text: String },

    /// A tool is about to run for a task
    ToolUse {
        task_id: String,
        name: String,
        input: serde_json::Value,
    },

    /// A tool finished running
    ToolResult {
        task_id: String,
        name: String,
        result: String,
        is_error: bool,
    },

    /// An internal decision, described in prose
    Thinking { step: ThinkingStep },

    /// The turn finished and the assistant reply was committed
    TurnEnd {
        turn_id: String,
        iterations: u32,
        tasks: usize,
    },

    /// The turn failed or was cancelled
    Error { message: String },
}

impl AgentEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::TurnEnd { .. } | AgentEvent::Error { .. })
    }
}
