//! Parsing of structured JSON decisions returned by the model.
//!
//! Model output is never trusted to be well formed. Every decision is parsed
//! into a [`Decision`], and each call site chooses its own fail-closed default
//! for the [`Decision::ParseError`] case.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

/// Outcome of parsing a model decision
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<T> {
    /// The response had the expected shape
    Parsed(T),
    /// The response could not be read; the string is a human-readable reason
    ParseError(String),
}

impl<T> Decision<T> {
    /// Take the parsed value, or build a fallback from the parse-error reason.
    pub fn or_fail_closed(self, fallback: impl FnOnce(String) -> T) -> T {
        match self {
            Decision::Parsed(value) => value,
            Decision::ParseError(reason) => fallback(reason),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Decision::Parsed(_))
    }
}

/// Matches a fenced code block, optionally tagged `json`.
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("fenced block pattern is valid")
});

/// Find the JSON object in a raw model reply.
///
/// Accepts a bare object, an object inside a fenced block, or an object
/// embedded in surrounding prose (outermost braces).
pub fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    if let Some(caps) = FENCED_BLOCK.captures(trimmed) {
        if let Some(body) = caps.get(1) {
            let body = body.as_str().trim();
            if body.starts_with('{') {
                return Some(body);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Parse a model reply into `T`.
pub fn parse_decision<T: DeserializeOwned>(raw: &str) -> Decision<T> {
    let Some(json) = extract_json(raw) else {
        tracing::warn!(chars = raw.chars().count(), "decision reply has no JSON object");
        return Decision::ParseError("the model's reply did not contain a decision".to_string());
    };

    match serde_json::from_str::<T>(json) {
        Ok(value) => Decision::Parsed(value),
        Err(e) => {
            tracing::warn!(error = %e, "decision reply has the wrong shape");
            Decision::ParseError("the model's reply was not in the expected shape".to_string())
        }
    }
}
