//! wren-agent: Task orchestration and context budgeting
//!
//! This crate turns one user instruction into a bounded plan → execute →
//! reflect cycle over a set of tools, then streams a synthesized answer. It
//! also keeps the conversation inside the model's context window by
//! summarizing older messages when needed.

pub mod agent;
pub mod budget;
pub mod decision;
pub mod error;
pub mod events;
pub mod handle;
pub mod orchestrator;
mod prompts;
pub mod task;
pub mod tool;

#[cfg(test)]
mod testing;

pub use agent::{Agent, AgentConfig, TurnReport, WriteVerification};
pub use budget::{BudgetConfig, TokenBudget, TokenUsage};
pub use decision::Decision;
pub use error::{Error, Result};
pub use events::AgentEvent;
pub use handle::AgentHandle;
pub use orchestrator::{Orchestrator, OrchestratorConfig, Plan, PlanDecision, Reflection};
pub use task::{Task, TaskLedger, ThinkingKind, ThinkingStep};
pub use tool::{BoxedTool, Tool, ToolExecutor, ToolRegistry, ToolResult};
