//! Typed settings for the server binary.
//!
//! The canonical configuration lives in `emotionsim.yaml` next to the
//! binary. Environment variables with the `EMOTIONSIM__` prefix override
//! file values (e.g. `EMOTIONSIM__DATABASE__URL`), and a bare
//! `DATABASE_URL` overrides the database URL for container deployments.

use serde::Deserialize;

use emotionsim_db::PostgresConfig;
use emotionsim_oracle::OracleConfig;

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Default bind host.
fn default_host() -> String {
    "127.0.0.1".to_owned()
}

/// Default bind port.
const fn default_port() -> u16 {
    8700
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Engine-loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Per-agent oracle timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_seconds: u64,
    /// Whether HTTP oracle backends stream tokens.
    #[serde(default = "default_stream_tokens")]
    pub stream_tokens: bool,
    /// Sampling temperature for oracle calls.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

/// Default oracle timeout.
const fn default_llm_timeout() -> u64 {
    30
}

/// Streaming is on by default.
const fn default_stream_tokens() -> bool {
    true
}

/// Default sampling temperature.
fn default_temperature() -> f64 {
    0.7
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            llm_timeout_seconds: default_llm_timeout(),
            stream_tokens: default_stream_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// HTTP listener.
    #[serde(default)]
    pub server: ServerSettings,
    /// Database connection.
    pub database: PostgresConfig,
    /// Oracle backend.
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Engine loop tuning.
    #[serde(default)]
    pub engine: EngineSettings,
    /// Directory of scenario definition files (`*.json`).
    #[serde(default)]
    pub scenario_dir: Option<String>,
}

impl Settings {
    /// Load settings from a file plus environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("EMOTIONSIM")
                    .separator("__")
                    .try_parsing(true),
            );
        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", url)?;
        }
        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}
