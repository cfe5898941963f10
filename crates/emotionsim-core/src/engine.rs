//! The simulation run loop: lifecycle, persistence, and termination.
//!
//! Wraps the single-tick [`run_tick`] with the control plane: start/pause/
//! resume/stop/step commands, the per-step persistence transaction (retry
//! once, then fail the run), terminal transitions, and the evaluator pass
//! on completion.
//!
//! [`run_tick`]: crate::tick::run_tick

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use emotionsim_events::SharedEmitter;
use emotionsim_oracle::{OracleClient, OracleRequest, PromptEngine};
use emotionsim_types::{AgentRole, EventKind, RunStatus};

use crate::context::build_agent_context;
use crate::control::RunControl;
use crate::error::EngineError;
use crate::scenario::SimulationState;
use crate::sink::StepSink;
use crate::tick::{TickContext, run_tick};

/// Engine-level settings for one run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sleep between ticks (cancellable by control commands).
    pub tick_delay: Duration,
    /// Per-agent oracle timeout.
    pub llm_timeout: Duration,
    /// Whether HTTP oracle backends stream tokens.
    pub stream_tokens: bool,
    /// Sampling temperature for oracle calls.
    pub temperature: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_delay: Duration::ZERO,
            llm_timeout: Duration::from_secs(30),
            stream_tokens: true,
            temperature: 0.7,
        }
    }
}

/// Result of a finished run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The terminal status.
    pub final_status: RunStatus,
    /// Number of ticks executed.
    pub total_ticks: u64,
}

/// What the loop should do after a tick.
enum TickFlow {
    /// Keep ticking.
    Continue,
    /// A terminal transition happened; exit the loop.
    Terminal,
}

/// Drive a run until a terminal status.
///
/// The caller transitions the run to `running` via [`RunControl::apply`]
/// (before or after this future starts; the loop waits while pending).
///
/// # Errors
///
/// Returns [`EngineError`] only for programmer-level failures; run-level
/// problems (persistence, oracle) end the run with an `error`/terminal
/// status instead.
pub async fn run_simulation<S: StepSink>(
    state: &mut SimulationState,
    oracle: &OracleClient,
    prompts: &PromptEngine,
    control: &Arc<RunControl>,
    emitter: &SharedEmitter,
    sink: &mut S,
    config: &EngineConfig,
) -> Result<SimulationResult, EngineError> {
    let mut total_ticks: u64 = 0;
    let run_id = state.run.id;

    info!(run = %run_id, max_steps = state.run.max_steps, "simulation loop entered");

    loop {
        match control.status() {
            RunStatus::Pending => {
                control.wait_for_signal().await;
            }
            RunStatus::Completed | RunStatus::Stopped | RunStatus::Cancelled | RunStatus::Error => {
                break;
            }
            RunStatus::Paused => {
                if control.is_stop_requested() {
                    finish_stopped(state, control, emitter, sink).await;
                    break;
                }
                if control.take_step_request() {
                    // `step`: one tick, then back to paused.
                    control.set_status(RunStatus::Running);
                    if reached_step_budget(state) {
                        complete(state, oracle, prompts, control, emitter, sink, config).await;
                        break;
                    }
                    let flow =
                        do_tick(state, oracle, prompts, control, emitter, sink, config).await?;
                    total_ticks = total_ticks.saturating_add(1);
                    match flow {
                        TickFlow::Terminal => break,
                        TickFlow::Continue => control.set_status(RunStatus::Paused),
                    }
                } else {
                    control.wait_for_signal().await;
                }
            }
            RunStatus::Running => {
                if control.is_stop_requested() {
                    finish_stopped(state, control, emitter, sink).await;
                    break;
                }
                if reached_step_budget(state) {
                    complete(state, oracle, prompts, control, emitter, sink, config).await;
                    break;
                }

                match do_tick(state, oracle, prompts, control, emitter, sink, config).await? {
                    TickFlow::Terminal => {
                        total_ticks = total_ticks.saturating_add(1);
                        break;
                    }
                    TickFlow::Continue => {
                        total_ticks = total_ticks.saturating_add(1);
                    }
                }

                if !config.tick_delay.is_zero() {
                    // Cancellable sleep: a control command ends it early so
                    // pause/stop take effect promptly.
                    tokio::select! {
                        () = tokio::time::sleep(config.tick_delay) => {}
                        () = control.wait_for_signal() => {}
                    }
                }
            }
        }
    }

    let final_status = control.status();
    info!(run = %run_id, status = %final_status, total_ticks, "simulation loop exited");
    Ok(SimulationResult {
        final_status,
        total_ticks,
    })
}

/// Whether the run's tick budget is spent.
fn reached_step_budget(state: &SimulationState) -> bool {
    state.run.current_step >= state.run.max_steps
}

/// One tick: execute, persist (retry once), emit `step_completed`, then
/// check terminal conditions.
async fn do_tick<S: StepSink>(
    state: &mut SimulationState,
    oracle: &OracleClient,
    prompts: &PromptEngine,
    control: &Arc<RunControl>,
    emitter: &SharedEmitter,
    sink: &mut S,
    config: &EngineConfig,
) -> Result<TickFlow, EngineError> {
    let tick_ctx = TickContext {
        oracle,
        prompts,
        emitter,
        control,
        llm_timeout: config.llm_timeout,
        stream_tokens: config.stream_tokens,
        temperature: config.temperature,
    };
    let outcome = run_tick(state, &tick_ctx).await?;
    let run_id = state.run.id;
    let step = outcome.record.step_index;

    // Persistence is write-through at the step boundary: retry once, then
    // the run fails.
    let mut persisted = sink
        .persist_step(run_id, &outcome.record, &outcome.messages)
        .await;
    if let Err(error) = &persisted {
        warn!(run = %run_id, step, %error, "step persist failed, retrying");
        persisted = sink
            .persist_step(run_id, &outcome.record, &outcome.messages)
            .await;
    }
    if let Err(error) = persisted {
        control.set_status(RunStatus::Error);
        state.sync_run(RunStatus::Error);
        let _ = sink.update_run(&state.run).await;
        emitter
            .lock()
            .await
            .emit(
                EventKind::Error,
                json!({ "run_id": run_id, "step": step, "error": error.to_string() }),
            )
            .await;
        return Ok(TickFlow::Terminal);
    }

    // Keep the run row and agent snapshots fresh for the control API;
    // failures here are logged but only the step record is load-bearing.
    state.sync_run(control.status());
    if let Err(error) = sink.update_run(&state.run).await {
        warn!(run = %run_id, step, %error, "run row refresh failed");
    }
    let snapshots: Vec<_> = state
        .agent_order
        .iter()
        .filter_map(|id| state.agents.get(id))
        .map(emotionsim_agents::AgentInstance::snapshot)
        .collect();
    if let Err(error) = sink.save_agents(run_id, &snapshots).await {
        warn!(run = %run_id, step, %error, "agent snapshot refresh failed");
    }

    emitter
        .lock()
        .await
        .emit(
            EventKind::StepCompleted,
            json!({
                "run_id": run_id,
                "step": step,
                "actions": outcome.record.actions,
                "messages": outcome.messages,
                "metrics": outcome.record.metrics,
            }),
        )
        .await;

    if outcome.stopped_mid_tick || control.is_stop_requested() {
        finish_stopped(state, control, emitter, sink).await;
        return Ok(TickFlow::Terminal);
    }
    if reached_step_budget(state) {
        complete(state, oracle, prompts, control, emitter, sink, config).await;
        return Ok(TickFlow::Terminal);
    }
    Ok(TickFlow::Continue)
}

/// Terminal transition: `stopped`.
async fn finish_stopped<S: StepSink>(
    state: &mut SimulationState,
    control: &Arc<RunControl>,
    emitter: &SharedEmitter,
    sink: &mut S,
) {
    control.set_status(RunStatus::Stopped);
    state.sync_run(RunStatus::Stopped);
    if let Err(error) = sink.update_run(&state.run).await {
        warn!(run = %state.run.id, %error, "failed to persist stopped run row");
    }
    let run_id = state.run.id;
    let step = state.run.current_step;
    let mut emitter = emitter.lock().await;
    emitter
        .emit(
            EventKind::RunStopped,
            json!({ "run_id": run_id, "step": step }),
        )
        .await;
    emitter
        .emit(
            EventKind::RunStatus,
            json!({ "run_id": run_id, "status": RunStatus::Stopped }),
        )
        .await;
}

/// Terminal transition: `completed`, with the one-shot evaluator pass.
async fn complete<S: StepSink>(
    state: &mut SimulationState,
    oracle: &OracleClient,
    prompts: &PromptEngine,
    control: &Arc<RunControl>,
    emitter: &SharedEmitter,
    sink: &mut S,
    config: &EngineConfig,
) {
    control.set_status(RunStatus::Completed);
    run_evaluator(state, oracle, prompts, emitter, config).await;
    state.sync_run(RunStatus::Completed);
    if let Err(error) = sink.update_run(&state.run).await {
        warn!(run = %state.run.id, %error, "failed to persist completed run row");
    }

    let run_id = state.run.id;
    let step = state.run.current_step;
    let evaluation = state.run.evaluation.clone();
    let mut emitter = emitter.lock().await;
    emitter
        .emit(
            EventKind::RunCompleted,
            json!({ "run_id": run_id, "step": step, "evaluation": evaluation }),
        )
        .await;
    emitter
        .emit(
            EventKind::RunStatus,
            json!({ "run_id": run_id, "status": RunStatus::Completed }),
        )
        .await;
}

/// Run the evaluator agent once at the terminal step; its output is stored
/// opaquely on the run.
async fn run_evaluator(
    state: &mut SimulationState,
    oracle: &OracleClient,
    prompts: &PromptEngine,
    emitter: &SharedEmitter,
    config: &EngineConfig,
) {
    let Some(evaluator_id) = state.agents_with_role(AgentRole::Evaluator).first().copied() else {
        return;
    };
    let Some(evaluator) = state.agents.get(&evaluator_id) else {
        return;
    };
    let agent_name = evaluator.name.clone();
    let model = evaluator.model_id.clone();

    let context = build_agent_context(state, evaluator_id, state.run.current_step, &[]);
    let prompt = match prompts.render(&context) {
        Ok(prompt) => prompt,
        Err(error) => {
            warn!(agent = %agent_name, %error, "evaluator prompt render failed");
            return;
        }
    };
    let request = OracleRequest {
        agent_name: agent_name.clone(),
        model,
        prompt,
        temperature: config.temperature,
        stream: false,
    };
    let sink = |_: &str| {};
    match tokio::time::timeout(config.llm_timeout, oracle.generate(&request, &sink)).await {
        Ok(Ok(response)) => {
            state.run.evaluation = serde_json::to_value(&response).ok();
        }
        Ok(Err(error)) => {
            warn!(agent = %agent_name, %error, "evaluator call failed");
            emitter
                .lock()
                .await
                .emit(
                    EventKind::AgentError,
                    json!({ "agent_id": evaluator_id, "error": error.to_string() }),
                )
                .await;
        }
        Err(_) => {
            warn!(agent = %agent_name, "evaluator call timed out");
            emitter
                .lock()
                .await
                .emit(
                    EventKind::AgentError,
                    json!({ "agent_id": evaluator_id, "error": "timeout" }),
                )
                .await;
        }
    }
}
