//! Scripted test doubles shared by the unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wren_ai::{ChatClient, CompletionOptions, Message, TextStream};

use crate::tool::{Tool, ToolResult};

/// One scripted reply
pub enum Reply {
    Text(String),
    Fail,
}

/// A chat client that answers from a queue and records every request.
///
/// Once the queue is empty it answers `"done"`.
#[derive(Clone, Default)]
pub struct MockClient {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    pub calls: Arc<Mutex<Vec<(Vec<Message>, CompletionOptions)>>>,
}

impl MockClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scripted(replies.into_iter().map(|r| Reply::Text(r.into())))
    }

    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            calls: Arc::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of JSON-mode requests, i.e. orchestrator decisions
    pub fn decision_count(&self) -> usize {
        self.calls.lock().iter().filter(|(_, o)| o.json_mode).count()
    }

    fn next(&self, messages: &[Message], options: &CompletionOptions) -> wren_ai::Result<String> {
        self.calls.lock().push((messages.to_vec(), options.clone()));
        match self.replies.lock().pop_front() {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail) => Err(wren_ai::Error::api("mock", "scripted failure")),
            None => Ok("done".to_string()),
        }
    }
}

#[async_trait]
impl ChatClient for MockClient {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> wren_ai::Result<String> {
        self.next(messages, options)
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> wren_ai::Result<TextStream> {
        let text = self.next(messages, options)?;
        let chunks: Vec<String> = text.split_inclusive(' ').map(String::from).collect();
        Ok(wren_ai::stream::from_chunks(chunks))
    }
}

/// A tool that records its inputs and answers with a fixed result
pub struct RecordingTool {
    name: String,
    reply: ToolResult,
    pub inputs: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl RecordingTool {
    pub fn ok(name: &str, reply: &str) -> Self {
        Self::with_result(name, ToolResult::text(reply))
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_result(name, ToolResult::error(message))
    }

    fn with_result(name: &str, reply: ToolResult) -> Self {
        Self {
            name: name.to_string(),
            reply,
            inputs: Arc::default(),
        }
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(&self, input: serde_json::Value, _cancel: CancellationToken) -> ToolResult {
        self.inputs.lock().push(input);
        self.reply.clone()
    }
}
