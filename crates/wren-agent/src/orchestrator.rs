//! The orchestrator: structured decisions about planning and completion
//!
//! The orchestrator only asks the model for decisions. It never runs tools and
//! keeps no state between calls; the execution loop in [`crate::agent`] drives it.
//!
//! Every decision is requested in JSON mode and parsed into a
//! [`Decision`](crate::decision::Decision). A reply that cannot be read never
//! fails the turn; each decision falls back to its own safe default:
//!
//! | decision       | fallback                                    |
//! |----------------|---------------------------------------------|
//! | should plan    | answer directly                             |
//! | create plan    | empty plan, straight to the final answer    |
//! | reflect        | complete, with the parse failure as an issue |
//!
//! Transport failures are different: they are returned as errors.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use wren_ai::{ChatClient, CompletionOptions, Message, ToolSpec};

use crate::{
    decision::parse_decision,
    error::Result,
    prompts,
    task::{Task, TaskLedger, ThinkingStep},
};

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Sampling temperature for decisions
    pub temperature: f32,
    /// Completion size for a decision
    pub decision_max_tokens: u32,
    /// Longest task result shown during reflection
    pub result_preview_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            decision_max_tokens: 1024,
            result_preview_chars: 2000,
        }
    }
}

/// Whether a request needs a plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanDecision {
    pub should_plan: bool,
    pub reasoning: String,
}

/// An initial task plan
#[derive(Debug, Clone)]
pub struct Plan {
    pub thinking: String,
    pub tasks: Vec<Task>,
}

/// Verdict on the tasks run so far
#[derive(Debug, Clone)]
pub struct Reflection {
    pub is_complete: bool,
    pub reasoning: String,
    pub issues: Vec<String>,
    pub next_actions: Vec<Task>,
}

// --- Wire shapes ---
//
// The model is loose about naming and types, so these accept both camelCase and
// snake_case keys and default anything optional.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlanDecision {
    #[serde(alias = "should_plan")]
    should_plan: bool,
    #[serde(default)]
    reasoning: String,
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    thinking: String,
    #[serde(default)]
    tasks: Vec<RawTask>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReflection {
    #[serde(alias = "is_complete")]
    is_complete: bool,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default, alias = "next_actions")]
    next_actions: Vec<RawTask>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTask {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "tool_name", alias = "tool")]
    tool_name: Option<String>,
    #[serde(default, alias = "tool_input", alias = "input")]
    tool_input: Option<Value>,
}

impl RawTask {
    fn into_task(self) -> Task {
        let id = match self.id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        };
        let task = Task::new(id, self.description);
        match self.tool_name.filter(|n| !n.trim().is_empty()) {
            Some(name) => {
                let input = match self.tool_input {
                    None | Some(Value::Null) => Value::Object(Default::default()),
                    Some(v) => v,
                };
                task.with_tool(name.trim(), input)
            }
            None => task,
        }
    }
}

/// Normalize raw tasks into pending tasks with unique ids
fn normalize(raw: Vec<RawTask>) -> Vec<Task> {
    let mut ledger = TaskLedger::new();
    ledger.extend(raw.into_iter().map(RawTask::into_task));
    ledger.into_vec()
}

/// Stateless decision engine over a chat client
pub struct Orchestrator {
    client: Arc<dyn ChatClient>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ChatClient>, config: OrchestratorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    async fn decide(&self, prompt: String) -> Result<String> {
        let messages = [
            Message::system(prompts::DECISION_SYSTEM_PROMPT),
            Message::user(prompt),
        ];
        let options =
            CompletionOptions::json(self.config.decision_max_tokens, self.config.temperature);
        Ok(self.client.complete(&messages, &options).await?)
    }

    /// Ask whether `request` needs a multi-step plan.
    pub async fn should_create_plan(
        &self,
        request: &str,
        tools: &[ToolSpec],
        history: &[String],
    ) -> Result<PlanDecision> {
        let raw = self.decide(prompts::should_plan(request, tools, history)).await?;
        let decision = parse_decision::<RawPlanDecision>(&raw)
            .or_fail_closed(|reason| {
                tracing::warn!("Could not read planning decision: {}", reason);
                RawPlanDecision {
                    should_plan: false,
                    reasoning: format!("Answering directly because {}.", reason),
                }
            });

        tracing::debug!(should_plan = decision.should_plan, "planning decision");
        Ok(PlanDecision {
            should_plan: decision.should_plan,
            reasoning: decision.reasoning,
        })
    }

    /// Ask for an ordered task plan for `request`.
    pub async fn create_plan(
        &self,
        request: &str,
        tools: &[ToolSpec],
        history: &[String],
    ) -> Result<Plan> {
        let raw = self.decide(prompts::create_plan(request, tools, history)).await?;
        let plan = parse_decision::<RawPlan>(&raw).or_fail_closed(|reason| {
            tracing::warn!("Could not read task plan: {}", reason);
            RawPlan {
                thinking: format!(
                    "No plan could be made because {}. Going straight to the answer.",
                    reason
                ),
                tasks: vec![],
            }
        });

        let tasks = normalize(plan.tasks);
        tracing::debug!(tasks = tasks.len(), "task plan");
        Ok(Plan {
            thinking: plan.thinking,
            tasks,
        })
    }

    /// Ask whether the tasks so far satisfy `request`, and what to run next if not.
    ///
    /// A reflection thinking step is passed to `on_step` before returning.
    pub async fn reflect_on_results(
        &self,
        request: &str,
        tasks: &[Task],
        tools: &[ToolSpec],
        on_step: &mut (dyn FnMut(ThinkingStep) + Send),
    ) -> Result<Reflection> {
        let prompt = prompts::reflect(request, tasks, tools, self.config.result_preview_chars);
        let raw = self.decide(prompt).await?;
        let parsed = parse_decision::<RawReflection>(&raw).or_fail_closed(|reason| {
            tracing::warn!("Could not read reflection: {}", reason);
            RawReflection {
                is_complete: true,
                reasoning: "Stopping here because the review of the results could not be read."
                    .to_string(),
                issues: vec![format!("The reflection reply was unusable: {}.", reason)],
                next_actions: vec![],
            }
        });

        let reflection = Reflection {
            is_complete: parsed.is_complete,
            reasoning: parsed.reasoning,
            issues: parsed.issues,
            next_actions: normalize(parsed.next_actions),
        };

        on_step(ThinkingStep::reflection(describe(&reflection)));
        tracing::debug!(
            complete = reflection.is_complete,
            next_actions = reflection.next_actions.len(),
            "reflection"
        );
        Ok(reflection)
    }
}

fn describe(reflection: &Reflection) -> String {
    let mut text = if reflection.is_complete {
        "The results answer the request.".to_string()
    } else {
        format!(
            "More work is needed ({} follow-up task(s) proposed).",
            reflection.next_actions.len()
        )
    };
    if !reflection.reasoning.trim().is_empty() {
        text.push(' ');
        text.push_str(reflection.reasoning.trim());
    }
    if !reflection.issues.is_empty() {
        text.push_str(" Issues: ");
        text.push_str(&reflection.issues.join("; "));
    }
    text
}
