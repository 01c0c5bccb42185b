//! Token budgeting for long conversations
//!
//! Counts tokens with a chars/4 heuristic, reports how full the context
//! window is, sizes completion requests, and summarizes older messages when
//! the conversation approaches the window limit.

use serde::Serialize;
use wren_ai::{ChatClient, CompletionOptions, Message, Role};

use crate::task::preview;

/// Role framing added to every message
pub const MESSAGE_OVERHEAD: u32 = 4;
/// Framing added to every tool call on an assistant message
pub const TOOL_CALL_OVERHEAD: u32 = 3;
/// Tokens the endpoint spends priming the reply
pub const REPLY_PRIMING: u32 = 3;
/// Smallest context window the budget accepts
pub const MIN_CONTEXT_TOKENS: u32 = 64;

/// Completion size when the context is already full
const EXHAUSTED_COMPLETION_TOKENS: u32 = 32;
/// Floor for any completion size
const MIN_COMPLETION_TOKENS: u32 = 16;

/// Longest tool output carried into a summarization request
const SUMMARY_TOOL_OUTPUT_CHARS: usize = 2000;

const SUMMARIZATION_SYSTEM_PROMPT: &str = "\
You are a summarization assistant. You condense earlier parts of a conversation between \
a user and an assistant that can run tools. The summary replaces the original messages, \
so keep every fact, decision, file path and open question needed to continue.";

const SUMMARIZATION_PROMPT: &str = "\
Summarize the conversation below in a few short paragraphs. Cover what the user wants, \
what has been done so far (including tool results that matter), and anything still open. \
Reply with the summary only.

<conversation>
{conversation}
</conversation>";

/// Budget settings
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// Context window of the model, in tokens
    pub max_tokens: u32,
    /// Fraction of the window at which summarization kicks in
    pub threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: wren_ai::models::DEFAULT_CONTEXT_WINDOW,
            threshold: 0.9,
        }
    }
}

/// How full the context window is
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub current_tokens: u32,
    pub max_tokens: u32,
    pub percentage_used: f64,
    pub should_summarize: bool,
}

/// Token counting and context-window accounting
#[derive(Debug, Clone)]
pub struct TokenBudget {
    max_tokens: u32,
    threshold: f64,
}

impl TokenBudget {
    pub fn new(config: BudgetConfig) -> Self {
        let threshold = if config.threshold.is_finite() && config.threshold > 0.0 {
            config.threshold.min(1.0)
        } else {
            BudgetConfig::default().threshold
        };
        Self {
            max_tokens: config.max_tokens.max(MIN_CONTEXT_TOKENS),
            threshold,
        }
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Estimate tokens for a single message
    pub fn count_message_tokens(&self, message: &Message) -> u32 {
        let mut tokens = MESSAGE_OVERHEAD + count_text_tokens(&message.content);
        if let Some(id) = &message.tool_call_id {
            tokens += count_text_tokens(id);
        }
        for call in &message.tool_calls {
            let args = serde_json::to_string(&call.arguments).unwrap_or_default();
            tokens += TOOL_CALL_OVERHEAD + count_text_tokens(&call.name) + count_text_tokens(&args);
        }
        tokens
    }

    /// Estimate tokens for a whole request. An empty list costs nothing.
    pub fn count_conversation_tokens(&self, messages: &[Message]) -> u32 {
        if messages.is_empty() {
            return 0;
        }
        messages
            .iter()
            .map(|m| self.count_message_tokens(m))
            .fold(REPLY_PRIMING, u32::saturating_add)
    }

    pub fn usage(&self, messages: &[Message]) -> TokenUsage {
        let current = self.count_conversation_tokens(messages);
        let percentage_used = current as f64 / self.max_tokens as f64 * 100.0;
        TokenUsage {
            current_tokens: current,
            max_tokens: self.max_tokens,
            percentage_used,
            should_summarize: percentage_used >= self.threshold * 100.0,
        }
    }

    /// Completion size for a request over `messages`, keeping `reserve`
    /// tokens of headroom when possible. Always within `[16, max_tokens]`.
    pub fn available_completion_tokens(&self, messages: &[Message], reserve: u32) -> u32 {
        let used = self.count_conversation_tokens(messages);
        let remaining = self.max_tokens.saturating_sub(used);
        let tokens = if remaining == 0 {
            EXHAUSTED_COMPLETION_TOKENS
        } else if remaining > reserve {
            remaining - reserve
        } else {
            (remaining / 2).max(MIN_COMPLETION_TOKENS)
        };
        tokens.clamp(MIN_COMPLETION_TOKENS, self.max_tokens)
    }

    /// Replace everything but the last `keep_recent` messages with a summary.
    ///
    /// Returns the input unchanged when there is nothing older to summarize.
    /// If the summarization request fails or comes back empty, the older
    /// messages are dropped and only the recent ones are returned.
    pub async fn summarize_conversation(
        &self,
        client: &dyn ChatClient,
        messages: &[Message],
        keep_recent: usize,
    ) -> Vec<Message> {
        if messages.len() <= keep_recent {
            return messages.to_vec();
        }

        let split = messages.len() - keep_recent;
        let (older, recent) = messages.split_at(split);

        let prompt = SUMMARIZATION_PROMPT.replace("{conversation}", &render_for_summary(older));
        let request = [
            Message::system(SUMMARIZATION_SYSTEM_PROMPT),
            Message::user(prompt),
        ];
        let summary_tokens = (self.max_tokens / 4).clamp(MIN_COMPLETION_TOKENS, 2048);
        let options = CompletionOptions::text(summary_tokens, Some(0.3));

        tracing::debug!(
            older = older.len(),
            recent = recent.len(),
            "summarizing conversation"
        );

        let summary = match client.complete(&request, &options).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!("Summarization returned an empty reply, keeping recent messages only");
                return recent.to_vec();
            }
            Err(e) => {
                tracing::warn!("Summarization failed, keeping recent messages only: {}", e);
                return recent.to_vec();
            }
        };

        let mut out = Vec::with_capacity(recent.len() + 1);
        out.push(Message::system(format!(
            "Summary of the earlier conversation:\n{}",
            summary.trim()
        )));
        out.extend_from_slice(recent);
        out
    }
}

/// Estimate tokens for a piece of text: one token per four characters, rounded up
pub fn count_text_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4)
}

/// Render messages as `role: content` lines with long tool output clipped.
fn render_for_summary(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        let content = if msg.role == Role::Tool {
            preview(&msg.content, SUMMARY_TOOL_OUTPUT_CHARS)
        } else {
            msg.content.clone()
        };
        out.push_str(&format!("{}: {}", msg.role, content));
        out.push('\n');
        for call in &msg.tool_calls {
            out.push_str(&format!("{}: called {}({})\n", msg.role, call.name, call.arguments));
        }
    }
    out
}
