//! Known context windows for common chat models.

/// Context window used when a model is not in the table.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 128_000;

/// (model id prefix, context window in tokens). Longest prefixes first so
/// `gpt-4o` wins over `gpt-4`.
const CONTEXT_WINDOWS: &[(&str, u32)] = &[
    ("gpt-4.1", 1_047_576),
    ("gpt-4o-mini", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("o1", 200_000),
    ("o3", 200_000),
    ("o4-mini", 200_000),
    ("claude", 200_000),
    ("gemini", 1_000_000),
    ("llama3.1", 128_000),
    ("llama3", 8_192),
    ("qwen2.5", 32_768),
    ("mistral", 32_768),
    ("deepseek", 64_000),
];

/// Look up the context window for a model id.
///
/// Provider prefixes such as `openai/` or `anthropic/` are ignored.
pub fn context_window(model_id: &str) -> Option<u32> {
    let id = model_id.rsplit('/').next().unwrap_or(model_id).to_lowercase();
    CONTEXT_WINDOWS
        .iter()
        .find(|(prefix, _)| id.starts_with(prefix))
        .map(|(_, window)| *window)
}

/// Context window for a model id, falling back to [`DEFAULT_CONTEXT_WINDOW`].
pub fn context_window_or_default(model_id: &str) -> u32 {
    context_window(model_id).unwrap_or(DEFAULT_CONTEXT_WINDOW)
}
