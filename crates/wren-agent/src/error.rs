//! Error types for wren-agent

use thiserror::Error;

/// Result type alias using wren-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that terminate an agent turn
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the chat-completion layer
    #[error(transparent)]
    Ai(#[from] wren_ai::Error),

    /// The turn was aborted through the agent handle
    #[error("Turn cancelled")]
    Cancelled,

    /// A generic agent error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if this error indicates a context overflow
    pub fn is_context_overflow(&self) -> bool {
        match self {
            Error::Ai(e) => e.is_context_overflow(),
            _ => false,
        }
    }

    /// Check if this error was caused by cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
