//! wren-ai: Chat-completion client layer
//!
//! This crate provides the message types and the client used to talk to an
//! OpenAI-compatible `/chat/completions` endpoint, both for streamed
//! conversational replies and for single-shot structured JSON decisions.

pub mod client;
pub mod error;
pub mod models;
pub mod stream;
pub mod types;

pub use client::{ChatClient, ClientConfig, OpenAiClient, RetryConfig};
pub use error::{Error, Result};
pub use stream::TextStream;
pub use types::*;
