//! Error types for wren-ai

use thiserror::Error;

/// Result type alias using wren-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a chat-completion endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Context overflow / too many tokens
    #[error("Context overflow: {0}")]
    ContextOverflow(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status and its body to an error.
    ///
    /// The body is expected to carry `{"error": {"type": .., "message": ..}}` but
    /// anything else is tolerated and reported verbatim.
    pub fn from_status(status: u16, body: &str, retry_after: Option<u64>) -> Self {
        #[derive(serde::Deserialize)]
        struct Envelope {
            error: ErrorBody,
        }
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            #[serde(rename = "type", default)]
            error_type: Option<String>,
            #[serde(default)]
            message: Option<String>,
        }

        let (error_type, message) = match serde_json::from_str::<Envelope>(body) {
            Ok(env) => (
                env.error.error_type.unwrap_or_else(|| format!("http_{}", status)),
                env.error.message.unwrap_or_else(|| body.to_string()),
            ),
            Err(_) => (format!("http_{}", status), body.to_string()),
        };

        match status {
            401 | 403 => Error::Auth(message),
            429 => Error::RateLimited { retry_after },
            _ => {
                let err = Error::api(error_type, message);
                if err.is_context_overflow() {
                    Error::ContextOverflow(err.to_string())
                } else {
                    err
                }
            }
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::RateLimited { .. } | Error::Sse(_) => true,
            Error::Api {
                error_type,
                message,
            } => {
                let et = error_type.to_lowercase();
                let msg = message.to_lowercase();
                et.contains("rate_limit")
                    || et.contains("overloaded")
                    || et.starts_with("http_5")
                    || msg.contains("rate limit")
                    || msg.contains("overloaded")
                    || msg.contains("too many requests")
            }
            _ => false,
        }
    }

    /// Check if this error indicates a context overflow / too many tokens
    pub fn is_context_overflow(&self) -> bool {
        match self {
            Error::ContextOverflow(_) => true,
            Error::Api { message, .. } => {
                let msg = message.to_lowercase();
                msg.contains("too many tokens")
                    || msg.contains("context length")
                    || msg.contains("context window")
                    || msg.contains("token limit")
                    || msg.contains("prompt is too long")
                    || msg.contains("reduce the length")
                    || msg.contains("context_length_exceeded")
                    || msg.contains("input too long")
            }
            _ => false,
        }
    }
}
