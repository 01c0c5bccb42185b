//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use wren_agent::{AgentConfig, BudgetConfig};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Environment variables checked for an API key, in order
const API_KEY_VARS: &[&str] = &["WREN_API_KEY", "OPENAI_API_KEY"];

/// Configuration for wren
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default model to use
    pub model: Option<String>,
    /// Base URL of the OpenAI-compatible endpoint
    pub base_url: Option<String>,
    /// API key (alternative to environment variables)
    pub api_key: Option<String>,
    /// Custom system prompt file path
    pub system_prompt_file: Option<String>,
    /// Sampling temperature for replies
    pub temperature: Option<f32>,
    pub agent: AgentSettings,
    pub budget: BudgetSettings,
}

/// `[agent]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_iterations: Option<u32>,
    pub keep_recent_messages: Option<usize>,
    pub completion_reserve: Option<u32>,
}

/// `[budget]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    /// Context window in tokens; looked up from the model when unset
    pub context_window: Option<u32>,
    /// Fraction of the window at which history is summarized
    pub summarize_threshold: Option<f64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wren")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("WREN_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write the example config if no config file exists yet
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// API key from the config file, then `WREN_API_KEY`, then `OPENAI_API_KEY`
    pub fn api_key(&self) -> Option<String> {
        self.resolve_api_key(|var| std::env::var(var).ok())
    }

    fn resolve_api_key(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                API_KEY_VARS
                    .iter()
                    .find_map(|var| env(var).filter(|k| !k.trim().is_empty()))
            })
    }

    /// Agent settings for `model`, with `max_iterations` overriding the file
    pub fn agent_config(
        &self,
        system_prompt: String,
        model: &str,
        max_iterations: Option<u32>,
    ) -> AgentConfig {
        let iterations = max_iterations
            .or(self.agent.max_iterations)
            .unwrap_or(DEFAULT_MAX_ITERATIONS);
        let mut config = AgentConfig::new(system_prompt, iterations);

        if let Some(n) = self.agent.keep_recent_messages {
            config.keep_recent_messages = n;
        }
        if let Some(n) = self.agent.completion_reserve {
            config.completion_reserve = n;
        }
        if let Some(t) = self.temperature {
            config.temperature = Some(t);
        }

        let defaults = BudgetConfig::default();
        config.budget = BudgetConfig {
            max_tokens: self
                .budget
                .context_window
                .unwrap_or_else(|| wren_ai::models::context_window_or_default(model)),
            threshold: self.budget.summarize_threshold.unwrap_or(defaults.threshold),
        };
        config
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# wren configuration file
# Place at ~/.config/wren/config.toml (Linux), ~/Library/Application Support/wren/config.toml (macOS)
# or %APPDATA%\wren\config.toml (Windows), or point WREN_CONFIG_PATH at it.

# Model and OpenAI-compatible endpoint
model = "gpt-4o-mini"
base_url = "https://api.openai.com/v1"

# API key (optional - WREN_API_KEY or OPENAI_API_KEY are used otherwise)
# api_key = "sk-..."

# Custom system prompt file (optional)
# system_prompt_file = "~/.config/wren/system_prompt.txt"

# temperature = 0.7

[agent]
# Upper bound on execute/reflect rounds per request
max_iterations = 5
# Messages kept verbatim when older history is summarized
keep_recent_messages = 10
# Tokens kept free below the context window when sizing replies
completion_reserve = 1024

[budget]
# Context window in tokens (looked up from the model name when unset)
# context_window = 128000
# Summarize history once this fraction of the window is used
summarize_threshold = 0.9
"#
}
