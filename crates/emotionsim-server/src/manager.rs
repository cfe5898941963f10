//! The run manager: one engine task per run, with shared control handles.
//!
//! Creating a run instantiates the scenario, persists the pending run row,
//! and spawns the engine loop as a detached task. The manager keeps the
//! control state and event emitter of every run so the HTTP surface can
//! issue commands and attach subscribers while the loop executes. Runs are
//! independent of each other; the engine guarantees ordering only within
//! a run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{error, info};

use emotionsim_core::{EngineConfig, RunControl, instantiate, run_simulation};
use emotionsim_db::SimStore;
use emotionsim_events::{EventStream, SharedEmitter, shared_emitter};
use emotionsim_oracle::{OracleClient, OracleConfig, PromptEngine};
use emotionsim_types::{
    ControlAction, EventKind, Run, RunId, RunStatus, Scenario, ScenarioId,
};

use crate::error::ServerError;

/// Per-run handles retained by the manager.
pub struct RunHandle {
    /// Control state shared with the engine task.
    pub control: Arc<RunControl>,
    /// Event emitter shared with the engine task.
    pub emitter: SharedEmitter,
    /// The scenario the run instantiates.
    pub scenario_id: ScenarioId,
}

/// Owns every live run and the scenario library.
pub struct RunManager {
    store: SimStore,
    oracle_config: OracleConfig,
    engine_config: EngineConfig,
    scenarios: RwLock<BTreeMap<ScenarioId, Scenario>>,
    runs: RwLock<BTreeMap<RunId, RunHandle>>,
}

impl RunManager {
    /// Create a manager backed by the given store and oracle settings.
    pub fn new(store: SimStore, oracle_config: OracleConfig, engine_config: EngineConfig) -> Self {
        Self {
            store,
            oracle_config,
            engine_config,
            scenarios: RwLock::new(BTreeMap::new()),
            runs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a scenario in the library (and persist its definition).
    pub async fn register_scenario(&self, scenario: Scenario) -> Result<ScenarioId, ServerError> {
        let id = scenario.id;
        self.store.upsert_scenario(&scenario).await?;
        self.scenarios.write().await.insert(id, scenario);
        Ok(id)
    }

    /// Look up a scenario, falling back to the store.
    async fn scenario(&self, id: ScenarioId) -> Result<Scenario, ServerError> {
        if let Some(scenario) = self.scenarios.read().await.get(&id) {
            return Ok(scenario.clone());
        }
        self.store
            .get_scenario(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("scenario {id}")))
    }

    /// Allocate a run (status `pending`) and spawn its engine task.
    pub async fn create_run(
        &self,
        scenario_id: ScenarioId,
        seed: Option<u64>,
        max_steps: Option<u64>,
    ) -> Result<Run, ServerError> {
        let scenario = self.scenario(scenario_id).await?;
        let mut state = instantiate(&scenario, seed, max_steps)?;
        let run = state.run.clone();

        self.store.insert_run(&run).await?;
        let snapshots: Vec<_> = state
            .agent_order
            .iter()
            .filter_map(|id| state.agents.get(id))
            .map(|agent| agent.snapshot())
            .collect();
        self.store.save_agent_snapshots(run.id, &snapshots).await?;

        let control = Arc::new(RunControl::new());
        let emitter = shared_emitter();

        // The scenario's tick delay overrides the server default.
        let mut engine_config = self.engine_config.clone();
        let delay = scenario.world.tick_delay_seconds;
        if delay.is_finite() && delay > 0.0 {
            engine_config.tick_delay = Duration::from_secs_f64(delay);
        }

        let oracle = OracleClient::from_config(&self.oracle_config);
        let task_control = Arc::clone(&control);
        let task_emitter = emitter.clone();
        let mut task_sink = self.store.clone();
        let run_id = run.id;

        tokio::spawn(async move {
            let prompts = match PromptEngine::new() {
                Ok(prompts) => prompts,
                Err(prompt_error) => {
                    error!(run = %run_id, error = %prompt_error, "prompt engine init failed");
                    return;
                }
            };
            match run_simulation(
                &mut state,
                &oracle,
                &prompts,
                &task_control,
                &task_emitter,
                &mut task_sink,
                &engine_config,
            )
            .await
            {
                Ok(result) => {
                    info!(run = %run_id, status = %result.final_status, ticks = result.total_ticks, "run finished");
                }
                Err(run_error) => {
                    error!(run = %run_id, error = %run_error, "run loop failed");
                }
            }
        });

        self.runs.write().await.insert(
            run.id,
            RunHandle {
                control,
                emitter,
                scenario_id,
            },
        );

        Ok(run)
    }

    /// Apply a control command to a run and broadcast the status change.
    pub async fn control(
        &self,
        run_id: RunId,
        action: ControlAction,
    ) -> Result<RunStatus, ServerError> {
        let runs = self.runs.read().await;
        let handle = runs
            .get(&run_id)
            .ok_or_else(|| ServerError::NotFound(format!("run {run_id}")))?;
        let status = handle.control.apply(action)?;
        handle
            .emitter
            .lock()
            .await
            .emit(
                EventKind::RunStatus,
                serde_json::json!({ "run_id": run_id, "status": status }),
            )
            .await;
        Ok(status)
    }

    /// The live status of a run, if the manager owns it.
    pub async fn status(&self, run_id: RunId) -> Option<RunStatus> {
        let runs = self.runs.read().await;
        runs.get(&run_id).map(|handle| handle.control.status())
    }

    /// Attach an event subscriber to a run.
    ///
    /// Returns the stream plus the run's control handle (for `get_status`
    /// replies on the socket).
    pub async fn attach(&self, run_id: RunId) -> Option<(EventStream, Arc<RunControl>)> {
        let runs = self.runs.read().await;
        let handle = runs.get(&run_id)?;
        let stream = handle.emitter.lock().await.subscribe();
        Some((stream, Arc::clone(&handle.control)))
    }
}
