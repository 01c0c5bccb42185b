//! Agent state management and the per-turn execution loop

use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use wren_ai::{ChatClient, CompletionOptions, Message, ToolSpec};

use crate::{
    budget::{BudgetConfig, TokenBudget, TokenUsage},
    error::{Error, Result},
    events::AgentEvent,
    handle::AgentHandle,
    orchestrator::{Orchestrator, OrchestratorConfig},
    prompts,
    task::{Task, TaskLedger, ThinkingStep, preview},
    tool::ToolExecutor,
};

/// Reads a file back after it was written.
///
/// When a task runs `write_tool` successfully, a task running `read_tool` with
/// the same `target_key` input is added and run straight away.
#[derive(Debug, Clone)]
pub struct WriteVerification {
    pub write_tool: String,
    pub read_tool: String,
    pub target_key: String,
}

impl Default for WriteVerification {
    fn default() -> Self {
        Self {
            write_tool: "write_file".to_string(),
            read_tool: "read_file".to_string(),
            target_key: "path".to_string(),
        }
    }
}

impl WriteVerification {
    fn follow_up(&self, task: &Task) -> Option<Task> {
        if task.tool_name() != Some(self.write_tool.as_str()) {
            return None;
        }
        let target = task.tool_input()?.get(&self.target_key)?.as_str()?;
        let mut input = serde_json::Map::new();
        input.insert(self.target_key.clone(), Value::String(target.to_string()));
        Some(
            Task::new("", format!("Verify {} by reading it back", target))
                .with_tool(self.read_tool.clone(), Value::Object(input)),
        )
    }
}

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// System prompt sent ahead of the history
    pub system_prompt: String,
    /// Upper bound on execute/reflect rounds per turn
    pub max_iterations: u32,
    /// Messages kept verbatim when the history is summarized
    pub keep_recent_messages: usize,
    /// Headroom left below the context window when sizing replies
    pub completion_reserve: u32,
    /// Sampling temperature for replies
    pub temperature: Option<f32>,
    /// Longest task result shown in the final-answer prompt
    pub final_preview_chars: usize,
    /// Recent messages shown to the orchestrator
    pub decision_history: usize,
    /// Read-back rule for written files
    pub verification: Option<WriteVerification>,
    pub budget: BudgetConfig,
    pub orchestrator: OrchestratorConfig,
}

impl AgentConfig {
    pub fn new(system_prompt: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_iterations: max_iterations.max(1),
            keep_recent_messages: 10,
            completion_reserve: 1024,
            temperature: Some(0.7),
            final_preview_chars: 1000,
            decision_history: 6,
            verification: Some(WriteVerification::default()),
            budget: BudgetConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// What a turn produced
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// The assistant reply added to the history
    pub response: String,
    /// The task ledger, in execution-record order
    pub tasks: Vec<Task>,
    /// Execute/reflect rounds run
    pub iterations: u32,
    /// Whether the request went through planning
    pub planned: bool,
}

/// The main agent that drives the orchestrator and the tools
pub struct Agent {
    config: AgentConfig,
    messages: Vec<Message>,
    client: Arc<dyn ChatClient>,
    tools: Arc<dyn ToolExecutor>,
    orchestrator: Orchestrator,
    budget: TokenBudget,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<AgentEvent>>>,
    handle: AgentHandle,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        config: AgentConfig,
        client: Arc<dyn ChatClient>,
        tools: Arc<dyn ToolExecutor>,
    ) -> Self {
        let orchestrator = Orchestrator::new(client.clone(), config.orchestrator.clone());
        let budget = TokenBudget::new(config.budget.clone());
        Self {
            config,
            messages: vec![],
            client,
            tools,
            orchestrator,
            budget,
            subscribers: Mutex::new(vec![]),
            handle: AgentHandle::new(),
        }
    }

    /// Subscribe to agent events. Events arrive in emission order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    fn emit(&self, event: AgentEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn think(&self, step: ThinkingStep) {
        self.emit(AgentEvent::Thinking { step });
    }

    /// Get the agent config
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Definitions of the tools the agent can run
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools.specs()
    }

    /// Get all messages (without the system prompt)
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Set messages
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Clear all messages
    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// Get a cloneable handle for aborting the agent from external code.
    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    /// Abort the current turn
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// System prompt followed by the history
    fn context(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(Message::system(self.config.system_prompt.clone()));
        out.extend(self.messages.iter().cloned());
        out
    }

    /// Context-window usage of the next request
    pub fn usage(&self) -> TokenUsage {
        self.budget.usage(&self.context())
    }

    /// Summarize older history regardless of the threshold.
    pub async fn compact(&mut self) -> TokenUsage {
        let before = self.usage();
        self.messages = self
            .budget
            .summarize_conversation(
                self.client.as_ref(),
                &self.messages,
                self.config.keep_recent_messages,
            )
            .await;
        let after = self.usage();
        tracing::debug!(
            before = before.current_tokens,
            after = after.current_tokens,
            "compacted history"
        );
        after
    }

    /// Summarize older history when the next request (with `extra` appended)
    /// would cross the threshold.
    async fn enforce_budget(&mut self, extra: &[Message]) {
        let mut request = self.context();
        request.extend_from_slice(extra);
        let before = self.budget.usage(&request);
        if !before.should_summarize {
            return;
        }

        self.compact().await;

        let mut request = self.context();
        request.extend_from_slice(extra);
        let after = self.budget.usage(&request);
        self.think(ThinkingStep::decision(format!(
            "The conversation was using {:.1}% of the context window, so older messages were \
             summarized. It now uses {:.1}%.",
            before.percentage_used, after.percentage_used
        )));
    }

    /// Recent history as `role: content` lines for orchestrator prompts
    fn history_lines(&self) -> Vec<String> {
        let skip = self
            .messages
            .len()
            .saturating_sub(self.config.decision_history);
        self.messages[skip..]
            .iter()
            .map(|m| preview(&m.to_line(), 500))
            .collect()
    }

    /// Run one user turn to completion.
    pub async fn prompt(&mut self, input: &str) -> Result<TurnReport> {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let cancel = self.handle.begin_turn();
        let span = tracing::info_span!("turn", turn_id = %turn_id);

        self.emit(AgentEvent::TurnStart {
            turn_id: turn_id.clone(),
        });

        let result = self.run_turn(input, &cancel).instrument(span).await;

        match &result {
            Ok(report) => self.emit(AgentEvent::TurnEnd {
                turn_id,
                iterations: report.iterations,
                tasks: report.tasks.len(),
            }),
            Err(e) => {
                tracing::debug!("turn failed: {}", e);
                self.emit(AgentEvent::Error {
                    message: e.to_string(),
                });
            }
        }

        self.handle.end_turn();
        result
    }

    async fn run_turn(&mut self, input: &str, cancel: &CancellationToken) -> Result<TurnReport> {
        self.enforce_budget(&[]).await;

        let history = self.history_lines();
        let specs = self.tools.specs();
        self.messages.push(Message::user(input));

        let decision = self
            .orchestrator
            .should_create_plan(input, &specs, &history)
            .await?;

        if !decision.should_plan {
            self.think(ThinkingStep::planning(format!(
                "Answering directly. {}",
                decision.reasoning
            )));
            self.enforce_budget(&[]).await;
            let response = self.stream_reply(self.context(), cancel).await?;
            self.messages.push(Message::assistant(response.clone()));
            return Ok(TurnReport {
                response,
                tasks: vec![],
                iterations: 0,
                planned: false,
            });
        }

        self.think(ThinkingStep::planning(format!(
            "Planning. {}",
            decision.reasoning
        )));

        let plan = self.orchestrator.create_plan(input, &specs, &history).await?;
        self.think(ThinkingStep::planning(format!(
            "{} ({} task(s) planned)",
            plan.thinking,
            plan.tasks.len()
        )));

        let mut ledger = TaskLedger::new();
        ledger.extend(plan.tasks);

        let iterations = self.run_tasks(input, &specs, &mut ledger, cancel).await?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let final_prompt = Message::user(prompts::final_answer(
            input,
            ledger.as_slice(),
            self.config.final_preview_chars,
        ));
        self.enforce_budget(std::slice::from_ref(&final_prompt)).await;

        let mut request = self.context();
        request.push(final_prompt);
        let response = self.stream_reply(request, cancel).await?;
        self.messages.push(Message::assistant(response.clone()));

        Ok(TurnReport {
            response,
            tasks: ledger.into_vec(),
            iterations,
            planned: true,
        })
    }

    /// The bounded execute/reflect cycle. Returns the number of rounds run.
    async fn run_tasks(
        &self,
        input: &str,
        specs: &[ToolSpec],
        ledger: &mut TaskLedger,
        cancel: &CancellationToken,
    ) -> Result<u32> {
        if ledger.is_empty() {
            return Ok(0);
        }

        let mut iterations = 0;
        let mut complete = false;

        while iterations < self.config.max_iterations {
            iterations += 1;
            tracing::debug!(iteration = iterations, pending = ledger.pending_count(), "executing tasks");

            self.execute_pending(ledger, cancel).await?;

            let reflection = self
                .orchestrator
                .reflect_on_results(input, ledger.as_slice(), specs, &mut |step| self.think(step))
                .await?;

            if reflection.is_complete {
                complete = true;
                break;
            }

            let (kept, dropped): (Vec<Task>, Vec<Task>) = reflection
                .next_actions
                .into_iter()
                .partition(|t| t.tool_name().is_none_or(|name| self.tools.has_tool(name)));

            for task in &dropped {
                tracing::warn!(
                    tool = task.tool_name().unwrap_or_default(),
                    "dropping follow-up task for unknown tool"
                );
            }
            let dropped_note = if dropped.is_empty() {
                String::new()
            } else {
                let names: Vec<&str> = dropped.iter().filter_map(|t| t.tool_name()).collect();
                format!(" Skipped {} task(s) for unknown tools: {}.", dropped.len(), names.join(", "))
            };

            if kept.is_empty() {
                self.think(ThinkingStep::decision(format!(
                    "No runnable follow-up tasks, finishing with the results so far.{}",
                    dropped_note
                )));
                complete = true;
                break;
            }

            let descriptions: Vec<&str> = kept.iter().map(|t| t.description()).collect();
            self.think(ThinkingStep::decision(format!(
                "Adding {} follow-up task(s): {}.{}",
                kept.len(),
                descriptions.join("; "),
                dropped_note
            )));
            ledger.extend(kept);
        }

        if !complete {
            self.think(ThinkingStep::decision(format!(
                "Stopped after {} round(s) without the results being judged complete.",
                iterations
            )));
        }

        Ok(iterations)
    }

    /// Run every pending task in ledger order.
    async fn execute_pending(&self, ledger: &mut TaskLedger, cancel: &CancellationToken) -> Result<()> {
        while let Some(idx) = ledger.next_pending() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let succeeded = self.execute_task(ledger, idx, cancel).await;

            if !succeeded {
                continue;
            }
            let follow_up = match (&self.config.verification, ledger.get(idx)) {
                (Some(rule), Some(task)) if self.tools.has_tool(&rule.read_tool) => {
                    rule.follow_up(task)
                }
                _ => None,
            };
            if let Some(check) = follow_up {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let check_idx = ledger.push(check);
                self.execute_task(ledger, check_idx, cancel).await;
            }
        }
        Ok(())
    }

    /// Run one task and record its outcome. Returns whether it succeeded.
    async fn execute_task(
        &self,
        ledger: &mut TaskLedger,
        idx: usize,
        cancel: &CancellationToken,
    ) -> bool {
        let Some(task) = ledger.get(idx) else {
            return false;
        };
        let task_id = task.id().to_string();

        let (successful, result) = match task.tool_name() {
            None => {
                tracing::debug!(task = %task_id, "task needs no tool");
                (true, Value::Null)
            }
            Some(name) => {
                let name = name.to_string();
                let input = task.tool_input().cloned().unwrap_or_else(|| json!({}));

                self.emit(AgentEvent::ToolUse {
                    task_id: task_id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });

                let outcome = self.tools.execute(&name, input, cancel.clone()).await;

                self.emit(AgentEvent::ToolResult {
                    task_id: task_id.clone(),
                    name: name.clone(),
                    result: outcome.content.clone(),
                    is_error: outcome.is_error,
                });

                if outcome.is_error {
                    tracing::debug!(task = %task_id, tool = %name, "tool failed");
                }
                (!outcome.is_error, Value::String(outcome.content))
            }
        };

        if let Some(task) = ledger.get_mut(idx) {
            task.record(successful, result);
        }
        successful
    }

    /// Stream a reply, forwarding chunks as they arrive.
    ///
    /// Nothing is added to the history here.
    async fn stream_reply(&self, request: Vec<Message>, cancel: &CancellationToken) -> Result<String> {
        let max_tokens = self
            .budget
            .available_completion_tokens(&request, self.config.completion_reserve);
        let options = CompletionOptions::text(max_tokens, self.config.temperature);
        tracing::debug!(
            messages = request.len(),
            tokens = self.budget.count_conversation_tokens(&request),
            max_tokens,
            "requesting reply"
        );

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            stream = self.client.stream(&request, &options) => stream?,
        };

        let mut text = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = stream.next() => next,
            };
            match next {
                None => break,
                Some(Ok(delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    text.push_str(&delta);
                    self.emit(AgentEvent::TextChunk { text: delta });
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ThinkingKind;
    use crate::testing::{MockClient, RecordingTool, Reply};
    use crate::tool::{Tool, ToolRegistry, ToolResult};
    use async_trait::async_trait;
    use wren_ai::Role;

    const PLAN: &str = r#"{"shouldPlan": true, "reasoning": "needs tools"}"#;
    const NO_PLAN: &str = r#"{"shouldPlan": false, "reasoning": "small talk"}"#;
    const DONE: &str = r#"{"isComplete": true, "reasoning": "all good", "issues": [], "nextActions": []}"#;

    fn agent(client: &MockClient, registry: ToolRegistry, max_iterations: u32) -> Agent {
        Agent::new(
            AgentConfig::new("You are a test assistant.", max_iterations),
            Arc::new(client.clone()),
            Arc::new(registry),
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_direct_response() {
        let client = MockClient::new([NO_PLAN, "Hello there!"]);
        let mut agent = agent(&client, ToolRegistry::new(), 5);
        let mut rx = agent.subscribe();

        let report = agent.prompt("hi").await.unwrap();

        assert!(!report.planned);
        assert!(report.tasks.is_empty());
        assert_eq!(report.response, "Hello there!");
        assert_eq!(agent.messages().len(), 2);
        assert_eq!(agent.messages()[0], Message::user("hi"));
        assert_eq!(agent.messages()[1], Message::assistant("Hello there!"));

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(AgentEvent::TurnStart { .. })));
        assert!(matches!(events.last(), Some(AgentEvent::TurnEnd { iterations: 0, tasks: 0, .. })));
        let streamed: String = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::TextChunk { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(streamed, "Hello there!");
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::ToolUse { .. })));
    }

    #[tokio::test]
    async fn test_write_is_verified_before_reflection() {
        let plan = r#"{"thinking": "write then list", "tasks": [
            {"id": "t1", "description": "write notes", "toolName": "write_file", "toolInput": {"path": "notes.md", "content": "hi"}},
            {"id": "t2", "description": "list dir", "toolName": "list_directory", "toolInput": {}}
        ]}"#;
        let client = MockClient::new([PLAN, plan, DONE, "Wrote notes.md."]);
        let read = RecordingTool::ok("read_file", "hi");
        let reads = read.inputs.clone();
        let list = RecordingTool::ok("list_directory", "notes.md");
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(RecordingTool::ok("write_file", "Wrote 2 bytes")))
            .with_tool(Arc::new(read))
            .with_tool(Arc::new(list));
        let mut agent = agent(&client, registry, 5);
        let mut rx = agent.subscribe();

        let report = agent.prompt("write notes.md").await.unwrap();

        assert_eq!(report.iterations, 1);
        assert_eq!(report.tasks.len(), 3);
        assert_eq!(report.tasks[2].tool_name(), Some("read_file"));
        assert_eq!(report.tasks[2].tool_input(), Some(&json!({"path": "notes.md"})));
        assert!(report.tasks.iter().all(|t| t.successful() == Some(true)));
        assert_eq!(reads.lock().as_slice(), &[json!({"path": "notes.md"})]);

        // Tool order: write, read-back, then the next planned task
        let order: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                AgentEvent::ToolUse { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec!["write_file", "read_file", "list_directory"]);

        // The reflection request already sees the read-back result
        let calls = client.calls.lock();
        let reflect_prompt = &calls[2].0[1].content;
        assert!(reflect_prompt.contains("Verify notes.md by reading it back (succeeded)"));
    }

    #[tokio::test]
    async fn test_no_verification_without_read_tool() {
        let plan = r#"{"thinking": "", "tasks": [
            {"id": "t1", "description": "write", "toolName": "write_file", "toolInput": {"path": "a.md", "content": "x"}}
        ]}"#;
        let client = MockClient::new([PLAN, plan, DONE, "ok"]);
        let registry = ToolRegistry::new().with_tool(Arc::new(RecordingTool::ok("write_file", "ok")));
        let mut agent = agent(&client, registry, 5);

        let report = agent.prompt("write a.md").await.unwrap();
        assert_eq!(report.tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_follow_up_tool_is_dropped() {
        let plan = r#"{"thinking": "", "tasks": [
            {"id": "t1", "description": "list", "toolName": "list_directory", "toolInput": {}}
        ]}"#;
        let reflect = r#"{"isComplete": false, "reasoning": "more", "issues": [], "nextActions": [
            {"id": "n1", "description": "magic", "toolName": "nonexistent_tool", "toolInput": {}},
            {"id": "n2", "description": "list again", "toolName": "list_directory", "toolInput": {"path": "src"}}
        ]}"#;
        let client = MockClient::new([PLAN, plan, reflect, DONE, "Listed."]);
        let list = RecordingTool::ok("list_directory", "a.md");
        let inputs = list.inputs.clone();
        let mut agent = agent(&client, ToolRegistry::new().with_tool(Arc::new(list)), 5);
        let mut rx = agent.subscribe();

        let report = agent.prompt("list").await.unwrap();

        assert_eq!(report.iterations, 2);
        assert_eq!(report.tasks.len(), 2);
        assert!(report.tasks.iter().all(|t| t.tool_name() != Some("nonexistent_tool")));
        assert_eq!(inputs.lock().len(), 2);

        let decision_steps: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                AgentEvent::Thinking { step } if step.kind == ThinkingKind::Decision => Some(step.content),
                _ => None,
            })
            .collect();
        assert!(decision_steps.iter().any(|s| s.contains("nonexistent_tool")));
    }

    #[tokio::test]
    async fn test_only_unknown_follow_ups_finishes() {
        let plan = r#"{"thinking": "", "tasks": [{"id": "t1", "description": "think"}]}"#;
        let reflect = r#"{"isComplete": false, "reasoning": "more", "nextActions": [
            {"description": "magic", "toolName": "nonexistent_tool"}
        ]}"#;
        let client = MockClient::new([PLAN, plan, reflect, "Final."]);
        let mut agent = agent(&client, ToolRegistry::new(), 5);

        let report = agent.prompt("x").await.unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.response, "Final.");
    }

    #[tokio::test]
    async fn test_iterations_are_bounded() {
        let plan = r#"{"thinking": "", "tasks": [{"id": "t1", "description": "think"}]}"#;
        let never_done = r#"{"isComplete": false, "reasoning": "keep going", "nextActions": [
            {"description": "think more"}
        ]}"#;
        let mut replies = vec![PLAN, plan];
        replies.extend(std::iter::repeat_n(never_done, 3));
        let client = MockClient::new(replies);
        let mut agent = agent(&client, ToolRegistry::new(), 3);
        let mut rx = agent.subscribe();

        let report = agent.prompt("loop forever").await.unwrap();

        assert_eq!(report.iterations, 3);
        let reflections = drain(&mut rx)
            .iter()
            .filter(|e| matches!(e, AgentEvent::Thinking { step } if step.kind == ThinkingKind::Reflection))
            .count();
        assert_eq!(reflections, 3);
        // Tasks added after the last reflection are reported as not executed
        assert_eq!(report.tasks.len(), 4);
        assert!(!report.tasks[3].is_completed());
        assert_eq!(report.response, "done");
    }

    #[tokio::test]
    async fn test_empty_next_actions_terminates() {
        let plan = r#"{"thinking": "", "tasks": [{"id": "t1", "description": "think"}]}"#;
        let reflect = r#"{"isComplete": false, "reasoning": "unsure", "nextActions": []}"#;
        let client = MockClient::new([PLAN, plan, reflect, "Answer."]);
        let mut agent = agent(&client, ToolRegistry::new(), 5);

        let report = agent.prompt("x").await.unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(client.decision_count(), 3);
    }

    #[tokio::test]
    async fn test_tool_less_task_succeeds() {
        let plan = r#"{"thinking": "", "tasks": [{"id": "t1", "description": "consider options", "toolName": null}]}"#;
        let client = MockClient::new([PLAN, plan, DONE, "ok"]);
        let mut agent = agent(&client, ToolRegistry::new(), 5);

        let report = agent.prompt("x").await.unwrap();
        let task = &report.tasks[0];
        assert!(task.is_completed());
        assert_eq!(task.successful(), Some(true));
    }

    #[tokio::test]
    async fn test_empty_plan_goes_to_final_answer() {
        let client = MockClient::new([PLAN, r#"{"thinking": "nothing to do", "tasks": []}"#, "Nothing needed."]);
        let mut agent = agent(&client, ToolRegistry::new(), 5);

        let report = agent.prompt("x").await.unwrap();
        assert!(report.planned);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.response, "Nothing needed.");
        assert_eq!(client.decision_count(), 2);
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_abort() {
        let plan = r#"{"thinking": "", "tasks": [
            {"id": "t1", "description": "run", "toolName": "execute_command", "toolInput": {"command": "false"}},
            {"id": "t2", "description": "list", "toolName": "list_directory", "toolInput": {}}
        ]}"#;
        let client = MockClient::new([PLAN, plan, DONE, "The command failed."]);
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(RecordingTool::failing("execute_command", "exit code 1")))
            .with_tool(Arc::new(RecordingTool::ok("list_directory", "a.md")));
        let mut agent = agent(&client, registry, 5);

        let report = agent.prompt("run false").await.unwrap();
        assert_eq!(report.tasks[0].successful(), Some(false));
        assert_eq!(report.tasks[0].result_text().as_deref(), Some("exit code 1"));
        assert_eq!(report.tasks[1].successful(), Some(true));

        // The final-answer prompt is not committed to history
        assert_eq!(agent.messages().len(), 2);
        let calls = client.calls.lock();
        let final_request = &calls[3].0;
        assert!(final_request.last().unwrap().content.contains("(failed)"));
    }

    /// Cancels the turn's token when run
    struct AbortingTool;

    #[async_trait]
    impl Tool for AbortingTool {
        fn name(&self) -> &str {
            "abort"
        }
        fn description(&self) -> &str {
            "Cancels the turn"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _input: Value, cancel: CancellationToken) -> ToolResult {
            cancel.cancel();
            ToolResult::text("cancelled")
        }
    }

    #[tokio::test]
    async fn test_cancellation_between_tasks() {
        let plan = r#"{"thinking": "", "tasks": [
            {"id": "t1", "description": "stop", "toolName": "abort"},
            {"id": "t2", "description": "list", "toolName": "list_directory"}
        ]}"#;
        let client = MockClient::new([PLAN, plan]);
        let list = RecordingTool::ok("list_directory", "a.md");
        let inputs = list.inputs.clone();
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(AbortingTool))
            .with_tool(Arc::new(list));
        let mut agent = agent(&client, registry, 5);
        let mut rx = agent.subscribe();

        let err = agent.prompt("x").await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(inputs.lock().is_empty());
        assert!(!agent.handle().is_running());
        assert_eq!(agent.messages().len(), 1);
        assert_eq!(agent.messages()[0].role, Role::User);
        assert!(matches!(drain(&mut rx).last(), Some(AgentEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_stream_failure_commits_nothing() {
        let client = MockClient::scripted([Reply::Text(NO_PLAN.into()), Reply::Fail]);
        let mut agent = agent(&client, ToolRegistry::new(), 5);
        let mut rx = agent.subscribe();

        let err = agent.prompt("hi").await.unwrap_err();
        assert!(matches!(err, Error::Ai(_)));
        assert_eq!(agent.messages(), &[Message::user("hi")]);
        assert!(matches!(drain(&mut rx).last(), Some(AgentEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_history_is_summarized_before_turn() {
        let mut config = AgentConfig::new("sys", 5);
        config.budget = BudgetConfig {
            max_tokens: 200,
            threshold: 0.5,
        };
        config.keep_recent_messages = 2;
        let client = MockClient::new(["Earlier: long chat.", NO_PLAN, "Hi again."]);
        let mut agent = Agent::new(config, Arc::new(client.clone()), Arc::new(ToolRegistry::new()));
        agent.set_messages(
            (0..6)
                .map(|i| Message::user(format!("{} {}", i, "word ".repeat(20))))
                .collect(),
        );
        let mut rx = agent.subscribe();

        agent.prompt("hi").await.unwrap();

        let messages = agent.messages();
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("Earlier: long chat."));
        assert_eq!(messages.len(), 1 + 2 + 2);
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            AgentEvent::Thinking { step } if step.kind == ThinkingKind::Decision && step.content.contains("summarized")
        )));
    }

    #[tokio::test]
    async fn test_completion_size_within_budget() {
        let client = MockClient::new([NO_PLAN, "ok"]);
        let mut agent = agent(&client, ToolRegistry::new(), 5);
        agent.prompt("hi").await.unwrap();

        let calls = client.calls.lock();
        let (_, options) = &calls[1];
        let max = options.max_tokens.unwrap();
        assert!(max >= 16 && max <= agent.budget().max_tokens());
        assert!(!options.json_mode);
    }

    #[tokio::test]
    async fn test_direct_reply_stays_within_budget_after_user_message() {
        let mut config = AgentConfig::new("sys", 5);
        config.budget = BudgetConfig {
            max_tokens: 400,
            threshold: 0.9,
        };
        config.keep_recent_messages = 2;
        let client = MockClient::new([NO_PLAN, "Earlier: greetings.", "Hi."]);
        let mut agent = Agent::new(config, Arc::new(client.clone()), Arc::new(ToolRegistry::new()));
        agent.set_messages((0..6).map(|i| Message::user(format!("{}", i).repeat(180))).collect());
        assert!(!agent.usage().should_summarize);

        let input = "q".repeat(500);
        agent.prompt(&input).await.unwrap();

        let calls = client.calls.lock();
        let (request, options) = calls.last().unwrap();
        assert!(!options.json_mode);
        assert!(agent.budget().count_conversation_tokens(request) <= agent.budget().max_tokens());
        assert_eq!(request.last(), Some(&Message::user(input.clone())));
        assert!(request.iter().any(|m| m.content.contains("Earlier: greetings.")));
    }

    /// Aborts the turn as soon as the first chunk of a reply is read.
    struct AbortMidStream {
        handle: Mutex<Option<AgentHandle>>,
    }

    #[async_trait]
    impl ChatClient for AbortMidStream {
        async fn complete(&self, _: &[Message], _: &CompletionOptions) -> wren_ai::Result<String> {
            Ok(NO_PLAN.to_string())
        }

        async fn stream(
            &self,
            _: &[Message],
            _: &CompletionOptions,
        ) -> wren_ai::Result<wren_ai::TextStream> {
            let handle = self.handle.lock().clone();
            let chunks = wren_ai::stream::from_chunks(["Hello ", "there ", "friend"]);
            Ok(Box::pin(chunks.inspect(move |_| {
                if let Some(ref handle) = handle {
                    handle.abort();
                }
            })))
        }
    }

    #[tokio::test]
    async fn test_cancellation_between_stream_chunks() {
        let client = Arc::new(AbortMidStream {
            handle: Mutex::new(None),
        });
        let mut agent = Agent::new(
            AgentConfig::new("sys", 5),
            client.clone(),
            Arc::new(ToolRegistry::new()),
        );
        *client.handle.lock() = Some(agent.handle());
        let mut rx = agent.subscribe();

        let err = agent.prompt("hi").await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(agent.messages(), &[Message::user("hi")]);
        let events = drain(&mut rx);
        let chunks: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::TextChunk { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, vec!["Hello "]);
        assert!(matches!(events.last(), Some(AgentEvent::Error { .. })));
    }
}
