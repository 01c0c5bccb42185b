//! Chat-completion client for OpenAI-compatible endpoints

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource, retry::Never};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    stream::TextStream,
    types::{CompletionOptions, Message},
};

/// Trait for chat-completion backends
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Request a single, non-streamed completion and return its text
    async fn complete(&self, messages: &[Message], options: &CompletionOptions)
    -> Result<String>;

    /// Request a streamed completion, yielding text deltas in order
    async fn stream(&self, messages: &[Message], options: &CompletionOptions)
    -> Result<TextStream>;
}

/// Endpoint configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Bearer token; `None` for keyless local servers
    pub api_key: Option<String>,
    /// Model identifier sent with every request
    pub model: String,
}

impl ClientConfig {
    /// Create a new endpoint configuration
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    /// Delay to wait after `error` on `attempt`, or `None` if we should give up.
    fn next_delay(&self, error: &Error, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries || error.is_context_overflow() || !error.is_retryable() {
            return None;
        }
        match error {
            Error::RateLimited {
                retry_after: Some(secs),
            } => Some(Duration::from_secs(*secs).min(self.max_delay)),
            _ => Some(self.delay_for_attempt(attempt)),
        }
    }
}

/// Client for any endpoint speaking the OpenAI Chat Completions protocol
pub struct OpenAiClient {
    client: reqwest::Client,
    config: ClientConfig,
    retry_config: RetryConfig,
}

impl OpenAiClient {
    /// Create a new client
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// The endpoint configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build_request(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        stream: bool,
    ) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            stream,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            response_format: options
                .json_mode
                .then(|| serde_json::json!({ "type": "json_object" })),
        }
    }

    fn request_builder(&self, body: &ChatRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(self.config.completions_url())
            .header("content-type", "application/json")
            .json(body);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    /// Sleep before the next attempt, or hand `error` back when giving up.
    async fn backoff(&self, error: Error, attempt: &mut u32) -> Result<()> {
        let Some(delay) = self.retry_config.next_delay(&error, *attempt) else {
            return Err(error);
        };
        tracing::warn!(
            "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
            *attempt + 1,
            self.retry_config.max_retries + 1,
            error,
            delay
        );
        *attempt += 1;
        tokio::time::sleep(delay).await;
        Ok(())
    }

    /// Connect and wait for the stream to open, so status errors surface here.
    async fn open_stream(&self, body: &ChatRequest) -> Result<EventSource> {
        let mut event_source = EventSource::new(self.request_builder(body))
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;
        event_source.set_retry_policy(Box::new(Never));

        let error = match event_source.next().await {
            Some(Ok(Event::Open)) => return Ok(event_source),
            Some(Ok(Event::Message(_))) => {
                Error::UnexpectedResponse("stream sent data before opening".to_string())
            }
            Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, response))) => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                let text = response.text().await.unwrap_or_default();
                Error::from_status(status.as_u16(), &text, retry_after)
            }
            Some(Err(reqwest_eventsource::Error::Transport(e))) => Error::Http(e),
            Some(Err(reqwest_eventsource::Error::InvalidContentType(content_type, _))) => {
                Error::UnexpectedResponse(format!(
                    "expected an event stream, got {:?}",
                    content_type
                ))
            }
            Some(Err(e)) => Error::Sse(e.to_string()),
            None => Error::Sse("stream ended before opening".to_string()),
        };
        event_source.close();
        Err(error)
    }

    async fn complete_once(&self, body: &ChatRequest) -> Result<String> {
        let response = self.request_builder(body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), &text, retry_after));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::UnexpectedResponse("completion has no content".to_string()))
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<String> {
        let body = self.build_request(messages, options, false);
        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            json = options.json_mode,
            "chat completion request"
        );

        let mut attempt = 0u32;
        loop {
            match self.complete_once(&body).await {
                Ok(text) => return Ok(text),
                Err(e) => self.backoff(e, &mut attempt).await?,
            }
        }
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TextStream> {
        let body = self.build_request(messages, options, true);
        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            "streaming chat completion request"
        );

        // Only opening the stream is retried; once deltas flow, failures end it.
        let mut attempt = 0u32;
        loop {
            match self.open_stream(&body).await {
                Ok(event_source) => return Ok(Box::pin(create_stream(event_source))),
                Err(e) => self.backoff(e, &mut attempt).await?,
            }
        }
    }
}

fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = Result<String>> {
    stream! {
        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }
                    match serde_json::from_str::<StreamChunk>(&msg.data) {
                        Ok(chunk) => {
                            for choice in chunk.choices {
                                if let Some(content) = choice.delta.content {
                                    if !content.is_empty() {
                                        yield Ok(content);
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            yield Err(Error::UnexpectedResponse(format!(
                                "Failed to parse chunk: {}",
                                e
                            )));
                            break;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let text = response.text().await.unwrap_or_default();
                    yield Err(Error::from_status(status.as_u16(), &text, None));
                    break;
                }
                Err(e) => {
                    yield Err(Error::Sse(e.to_string()));
                    break;
                }
            }
        }
        event_source.close();
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        let tool_calls = if msg.tool_calls.is_empty() {
            None
        } else {
            Some(
                msg.tool_calls
                    .iter()
                    .map(|tc| WireToolCall {
                        id: tc.id.clone(),
                        call_type: "function",
                        function: WireFunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.to_string(),
                        },
                    })
                    .collect(),
            )
        };

        Self {
            role: msg.role.as_str(),
            content: msg.content.clone(),
            tool_call_id: msg.tool_call_id.clone(),
            tool_calls,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
