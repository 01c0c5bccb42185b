//! Tasks, the per-turn task ledger, and thinking steps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One planned unit of work, optionally bound to a tool invocation.
///
/// Execution state (`completed`, `successful`, `result`) can only be written
/// once, by the execution loop, through [`Task::record`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    id: String,
    description: String,
    tool_name: Option<String>,
    tool_input: Option<Value>,
    completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    successful: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
}

impl Task {
    /// Create a pending task with no tool
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            tool_name: None,
            tool_input: None,
            completed: false,
            successful: None,
            result: None,
        }
    }

    /// Bind the task to a tool invocation
    pub fn with_tool(mut self, name: impl Into<String>, input: Value) -> Self {
        self.tool_name = Some(name.into());
        self.tool_input = Some(input);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    pub fn tool_input(&self) -> Option<&Value> {
        self.tool_input.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn successful(&self) -> Option<bool> {
        self.successful
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// The result rendered as text. Strings are returned as-is, `null` as `None`.
    pub fn result_text(&self) -> Option<String> {
        match self.result.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Result text capped at `max_chars`, with a truncation marker when clipped.
    pub fn result_preview(&self, max_chars: usize) -> Option<String> {
        self.result_text().map(|text| preview(&text, max_chars))
    }

    /// Record the outcome of the single execution attempt.
    ///
    /// Returns `false` (and leaves the task untouched) if an outcome was
    /// already recorded.
    pub(crate) fn record(&mut self, successful: bool, result: Value) -> bool {
        if self.completed {
            tracing::warn!(task = %self.id, "ignoring second outcome for completed task");
            return false;
        }
        self.completed = true;
        self.successful = Some(successful);
        self.result = Some(result);
        true
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Clip `text` to `max_chars` characters, appending
/// `(truncated, total length N)` when anything was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}... (truncated, total length {})", head, total)
}

/// The authoritative, append-only list of tasks for one user turn.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TaskLedger {
    tasks: Vec<Task>,
}

impl TaskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task and return its index.
    ///
    /// Empty or already-used ids are replaced with `task-N` so ids stay unique
    /// within the turn.
    pub fn push(&mut self, mut task: Task) -> usize {
        if task.id.trim().is_empty() || self.contains_id(&task.id) {
            let fresh = self.fresh_id();
            task.set_id(fresh);
        }
        self.tasks.push(task);
        self.tasks.len() - 1
    }

    pub fn extend(&mut self, tasks: impl IntoIterator<Item = Task>) {
        for task in tasks {
            self.push(task);
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    pub fn as_slice(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Task> {
        self.tasks.get_mut(index)
    }

    /// Index of the first task that has not run yet
    pub fn next_pending(&self) -> Option<usize> {
        self.tasks.iter().position(|t| !t.completed)
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.completed).count()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.tasks.iter().any(|t| t.id == id)
    }

    pub fn into_vec(self) -> Vec<Task> {
        self.tasks
    }

    fn fresh_id(&self) -> String {
        let mut n = self.tasks.len() + 1;
        loop {
            let candidate = format!("task-{}", n);
            if !self.contains_id(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Kind of internal decision a thinking step describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingKind {
    Planning,
    Reflection,
    Decision,
}

impl ThinkingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingKind::Planning => "planning",
            ThinkingKind::Reflection => "reflection",
            ThinkingKind::Decision => "decision",
        }
    }
}

/// A human-readable description of an internal decision, emitted to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingStep {
    #[serde(rename = "type")]
    pub kind: ThinkingKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ThinkingStep {
    pub fn new(kind: ThinkingKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn planning(content: impl Into<String>) -> Self {
        Self::new(ThinkingKind::Planning, content)
    }

    pub fn reflection(content: impl Into<String>) -> Self {
        Self::new(ThinkingKind::Reflection, content)
    }

    pub fn decision(content: impl Into<String>) -> Self {
        Self::new(ThinkingKind::Decision, content)
    }
}
