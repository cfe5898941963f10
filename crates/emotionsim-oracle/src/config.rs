//! Oracle backend configuration.

use serde::{Deserialize, Serialize};

/// Which backend implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// OpenAI-compatible chat completions API (also `DeepSeek`, Ollama).
    #[default]
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
    /// Deterministic scripted responses (tests, offline runs).
    Scripted,
}

impl BackendType {
    /// Map an agent template's provider tag onto a backend type.
    ///
    /// Unknown tags fall back to the OpenAI-compatible backend, which is
    /// the least opinionated wire format.
    pub fn from_provider_tag(tag: &str) -> Self {
        match tag.to_lowercase().as_str() {
            "anthropic" | "claude" => Self::Anthropic,
            "scripted" | "stub" | "test" => Self::Scripted,
            _ => Self::OpenAi,
        }
    }
}

/// Connection settings for one oracle backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// The backend implementation.
    #[serde(default)]
    pub backend_type: BackendType,
    /// Base URL of the API (e.g. `https://api.openai.com/v1`).
    #[serde(default)]
    pub api_url: String,
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// Default model when a template does not name one.
    #[serde(default)]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Per-call timeout in seconds; the engine enforces it.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Default sampling temperature.
fn default_temperature() -> f64 {
    0.7
}

/// Default per-call timeout.
const fn default_timeout_seconds() -> u64 {
    30
}

/// Default completion budget.
const fn default_max_tokens() -> u32 {
    1024
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend_type: BackendType::default(),
            api_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout_seconds(),
            max_tokens: default_max_tokens(),
        }
    }
}
