//! EmotionSim server binary.
//!
//! Startup sequence: tracing, settings, database connection plus schema
//! bootstrap, interrupted-run recovery, scenario library loading, then the
//! control API with its embedded run manager.

mod settings;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use emotionsim_core::EngineConfig;
use emotionsim_db::SimStore;
use emotionsim_server::{AppState, RunManager, serve};
use emotionsim_types::Scenario;

use crate::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "emotionsim".to_owned());
    let settings = Settings::load(&config_path).context("failed to load settings")?;

    let store = SimStore::connect(&settings.database)
        .await
        .context("failed to connect to PostgreSQL")?;
    store
        .ensure_schema()
        .await
        .context("failed to ensure schema")?;
    let recovered = store
        .recover_interrupted_runs()
        .await
        .context("failed to recover interrupted runs")?;
    if recovered > 0 {
        info!(recovered, "interrupted runs reset to paused");
    }

    let engine_config = EngineConfig {
        tick_delay: Duration::ZERO,
        llm_timeout: Duration::from_secs(settings.engine.llm_timeout_seconds),
        stream_tokens: settings.engine.stream_tokens,
        temperature: settings.engine.temperature,
    };
    let manager = RunManager::new(store.clone(), settings.oracle.clone(), engine_config);

    if let Some(dir) = &settings.scenario_dir {
        let loaded = load_scenarios(&manager, dir).await;
        info!(loaded, dir, "scenario library loaded");
    }

    let state = Arc::new(AppState::new(manager, store));
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("invalid server address")?;

    serve(state, addr).await.context("server exited")?;
    Ok(())
}

/// Register every `*.json` scenario under `dir`, skipping invalid files.
async fn load_scenarios(manager: &RunManager, dir: &str) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        warn!(dir, "scenario directory is not readable");
        return 0;
    };

    let mut loaded = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(contents) = std::fs::read_to_string(&path) else {
            warn!(path = %path.display(), "scenario file is not readable");
            continue;
        };
        let scenario: Scenario = match serde_json::from_str(&contents) {
            Ok(scenario) => scenario,
            Err(error) => {
                warn!(path = %path.display(), %error, "scenario file is invalid");
                continue;
            }
        };
        match manager.register_scenario(scenario).await {
            Ok(id) => {
                info!(scenario = %id, path = %path.display(), "scenario registered");
                loaded = loaded.saturating_add(1);
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "scenario registration failed");
            }
        }
    }
    loaded
}
