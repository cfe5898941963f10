//! The tick procedure: one iteration of the simulation loop.
//!
//! Order within a tick:
//!
//! 1. Increment the step counter and clear per-step caches.
//! 2. Advance in-flight travelers one hop.
//! 3. Scan co-locations and create conversations.
//! 4. Close votes whose window passed.
//! 5. Run environment agents (template order), then human agents in a
//!    seeded random permutation, then the designer -- each turn fully
//!    sequential: context build, oracle call (tokens streamed), parse,
//!    apply.
//! 6. Advance conversations and drop ended ones.
//! 7. Compute step metrics and assemble the step record.
//!
//! Control commands are honored between agents: a pause suspends the tick
//! in place; a stop lets the in-flight turn finish, then the remaining
//! agents are skipped and the partially executed step still finalizes and
//! persists.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use emotionsim_agents::{ActionContext, ActionSignal, activation, execute_action};
use emotionsim_oracle::{OracleClient, OracleRequest, PromptEngine};
use emotionsim_social::MessageTarget;
use emotionsim_types::{
    ActionRecord, ActionType, AgentAction, AgentId, AgentResponse, AgentRole, EventKind,
    MessageRecord, MessageType, StepMetrics, StepRecord, TaskId, TaskStatus, VoteId, memory_kinds,
};
use emotionsim_events::SharedEmitter;

use crate::context::build_agent_context;
use crate::control::RunControl;
use crate::error::EngineError;
use crate::scenario::SimulationState;

/// Everything a tick needs besides the mutable simulation state.
pub struct TickContext<'a> {
    /// The oracle backend.
    pub oracle: &'a OracleClient,
    /// The prompt renderer.
    pub prompts: &'a PromptEngine,
    /// The shared event emitter.
    pub emitter: &'a SharedEmitter,
    /// The run's control state.
    pub control: &'a RunControl,
    /// Per-agent oracle timeout.
    pub llm_timeout: Duration,
    /// Whether HTTP backends stream tokens.
    pub stream_tokens: bool,
    /// Sampling temperature for oracle calls.
    pub temperature: f64,
}

/// What one executed tick produced.
#[derive(Debug)]
pub struct TickOutcome {
    /// The step record to persist.
    pub record: StepRecord,
    /// Messages published during the tick, in publish order.
    pub messages: Vec<MessageRecord>,
    /// Whether a stop request cut the agent schedule short.
    pub stopped_mid_tick: bool,
}

/// Scratch state threaded through one tick.
#[derive(Debug, Default)]
struct TickScratch {
    actions: Vec<ActionRecord>,
    events: Vec<String>,
    spoke: BTreeSet<AgentId>,
}

/// Emit one envelope through the shared emitter.
async fn emit(emitter: &SharedEmitter, kind: EventKind, data: Value) {
    emitter.lock().await.emit(kind, data).await;
}

/// Execute exactly one tick.
///
/// # Errors
///
/// Returns [`EngineError`] only for fatal conditions; oracle and action
/// failures are absorbed per agent.
pub async fn run_tick(
    state: &mut SimulationState,
    ctx: &TickContext<'_>,
) -> Result<TickOutcome, EngineError> {
    state.run.current_step = state.run.current_step.saturating_add(1);
    let step = state.run.current_step;
    let run_id = state.run.id;

    state.resolver.begin_step();
    let mut scratch = TickScratch::default();

    info!(run = %run_id, step, "step started");
    emit(
        ctx.emitter,
        EventKind::StepStarted,
        json!({ "run_id": run_id, "step": step }),
    )
    .await;

    advance_travellers(state, ctx, step, &mut scratch).await;

    let occupancy = state.occupancy();
    state.conversations.scan(step, &occupancy);

    for outcome in state.cooperation.close_due_votes(step) {
        debug!(run = %run_id, vote = %outcome.vote_id, winner = %outcome.winning_option, "vote decided");
        state.run.metrics.vote_outcomes.push(outcome);
    }

    let mut stopped = false;

    // Environment agents first (deterministic template order), then the
    // seeded human permutation, then the designer.
    let mut schedule = state.agents_with_role(AgentRole::Environment);
    let mut humans = state.agents_with_role(AgentRole::Human);
    humans.shuffle(&mut state.rng);
    schedule.extend(humans);
    schedule.extend(state.agents_with_role(AgentRole::Designer));

    for agent_id in schedule {
        ctx.control.wait_if_paused().await;
        if ctx.control.is_stop_requested() {
            stopped = true;
            break;
        }
        run_agent_turn(state, ctx, agent_id, step, &mut scratch).await;
    }

    state.conversations.advance(step, &scratch.spoke);
    let _ = state.conversations.cleanup();

    let metrics = compute_metrics(state);
    state.run.metrics.avg_health = metrics.avg_health;
    state.run.metrics.avg_stress = metrics.avg_stress;
    state.run.metrics.total_actions = state
        .run
        .metrics
        .total_actions
        .saturating_add(u64::try_from(scratch.actions.len()).unwrap_or(u64::MAX));

    let messages: Vec<MessageRecord> = state
        .bus
        .messages_for_step(step)
        .into_iter()
        .cloned()
        .collect();
    state.run.metrics.total_messages = state
        .run
        .metrics
        .total_messages
        .saturating_add(u64::try_from(messages.len()).unwrap_or(u64::MAX));

    let record = StepRecord {
        step_index: step,
        world_state: state.world.snapshot(),
        actions: scratch.actions,
        metrics,
        recorded_at: Utc::now(),
    };

    Ok(TickOutcome {
        record,
        messages,
        stopped_mid_tick: stopped,
    })
}

/// Advance every traveling agent one hop, emitting `agent_moved` per hop
/// and `agent_travelling` while hops remain.
async fn advance_travellers(
    state: &mut SimulationState,
    ctx: &TickContext<'_>,
    step: u64,
    scratch: &mut TickScratch,
) {
    let mut arrivals = Vec::new();
    for agent_id in state.agent_order.clone() {
        let Some(agent) = state.agents.get_mut(&agent_id) else {
            continue;
        };
        if !agent.is_active {
            continue;
        }
        let Some(next) = agent.travel_path.pop_front() else {
            continue;
        };
        agent.location = next.clone();
        let remaining: Vec<_> = agent.travel_path.iter().cloned().collect();
        agent
            .memory
            .record(step, memory_kinds::MOVEMENT, format!("arrived at {next}"));
        scratch
            .events
            .push(format!("{} arrived at {next}", agent.name));
        arrivals.push((agent_id, next, remaining));
    }

    for (agent_id, location, remaining) in arrivals {
        emit(
            ctx.emitter,
            EventKind::AgentMoved,
            json!({ "agent_id": agent_id, "location": location }),
        )
        .await;
        if !remaining.is_empty() {
            emit(
                ctx.emitter,
                EventKind::AgentTravelling,
                json!({ "agent_id": agent_id, "remaining": remaining }),
            )
            .await;
        }
    }
}

/// Mean health/stress over active agents.
fn compute_metrics(state: &SimulationState) -> StepMetrics {
    let active: Vec<_> = state
        .agents
        .values()
        .filter(|agent| agent.is_active)
        .collect();
    if active.is_empty() {
        return StepMetrics::default();
    }
    let count_u32 = u32::try_from(active.len()).unwrap_or(u32::MAX);
    let count = f64::from(count_u32.max(1));
    let health: u32 = active.iter().map(|agent| u32::from(agent.health)).sum();
    let stress: u32 = active.iter().map(|agent| u32::from(agent.stress)).sum();
    StepMetrics {
        avg_health: f64::from(health) / count,
        avg_stress: f64::from(stress) / count,
    }
}

// ---------------------------------------------------------------------------
// Agent turns
// ---------------------------------------------------------------------------

/// Run one agent's full turn: activation gate, context, oracle, apply.
async fn run_agent_turn(
    state: &mut SimulationState,
    ctx: &TickContext<'_>,
    agent_id: AgentId,
    step: u64,
    scratch: &mut TickScratch,
) {
    let Some(agent) = state.agents.get(&agent_id) else {
        return;
    };
    if !agent.is_active || agent.role == AgentRole::Evaluator {
        return;
    }
    let agent_name = agent.name.clone();
    let model_id = agent.model_id.clone();
    let role = agent.role;

    // Response-probability gate (human agents only).
    if role == AgentRole::Human {
        let traits = agent.persona.as_ref().map(|p| p.traits.clone());
        let stress = agent.stress;
        let fraction = activation::activity_fraction(&agent.recent_activity);
        if let Some(traits) = traits
            && !activation::should_respond(&mut state.rng, &traits, stress, fraction)
        {
            debug!(agent = %agent_name, step, "agent sat this tick out");
            if let Some(agent) = state.agents.get_mut(&agent_id) {
                activation::push_activity(&mut agent.recent_activity, false);
            }
            return;
        }
    }

    let context = build_agent_context(state, agent_id, step, &scratch.events);
    let prompt = match ctx.prompts.render(&context) {
        Ok(prompt) => prompt,
        Err(error) => {
            warn!(agent = %agent_name, %error, "prompt render failed");
            emit(
                ctx.emitter,
                EventKind::AgentError,
                json!({ "agent_id": agent_id, "error": error.to_string() }),
            )
            .await;
            return;
        }
    };

    let request = OracleRequest {
        agent_name: agent_name.clone(),
        model: model_id,
        prompt,
        temperature: ctx.temperature,
        stream: ctx.stream_tokens,
    };

    // Forward tokens to the emitter as they arrive. The forwarding task
    // drains a channel so the synchronous sink never blocks the oracle.
    let (token_tx, mut token_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let forward_emitter = ctx.emitter.clone();
    let forward = tokio::spawn(async move {
        while let Some(token) = token_rx.recv().await {
            forward_emitter
                .lock()
                .await
                .emit(
                    EventKind::StreamToken,
                    json!({ "agent_id": agent_id, "token": token }),
                )
                .await;
        }
    });
    let sink = move |token: &str| {
        let _ = token_tx.send(token.to_owned());
    };

    let result = tokio::time::timeout(ctx.llm_timeout, ctx.oracle.generate(&request, &sink)).await;
    drop(sink);
    let _ = forward.await;

    let response = match result {
        Ok(Ok(response)) => response,
        Ok(Err(error)) => {
            warn!(agent = %agent_name, %error, "oracle call failed");
            emit(
                ctx.emitter,
                EventKind::AgentError,
                json!({ "agent_id": agent_id, "error": error.to_string() }),
            )
            .await;
            if let Some(agent) = state.agents.get_mut(&agent_id) {
                activation::push_activity(&mut agent.recent_activity, false);
            }
            return;
        }
        Err(_) => {
            warn!(agent = %agent_name, timeout = ?ctx.llm_timeout, "oracle call timed out");
            emit(
                ctx.emitter,
                EventKind::AgentError,
                json!({ "agent_id": agent_id, "error": "timeout" }),
            )
            .await;
            if let Some(agent) = state.agents.get_mut(&agent_id) {
                activation::push_activity(&mut agent.recent_activity, false);
            }
            return;
        }
    };

    if !response.reasoning.is_empty() {
        debug!(agent = %agent_name, reasoning = %response.reasoning, "agent reasoning");
    }

    apply_response(state, ctx, agent_id, step, &response, scratch).await;

    if let Some(agent) = state.agents.get_mut(&agent_id) {
        activation::push_activity(&mut agent.recent_activity, true);
    }
}

/// Apply a parsed response: actions in order, then state changes, then the
/// message.
async fn apply_response(
    state: &mut SimulationState,
    ctx: &TickContext<'_>,
    agent_id: AgentId,
    step: u64,
    response: &AgentResponse,
    scratch: &mut TickScratch,
) {
    for action in &response.actions {
        match action.action_type {
            ActionType::Speak => {
                apply_speak_action(state, ctx, agent_id, step, action, scratch).await;
            }
            ActionType::JoinConversation
            | ActionType::LeaveConversation
            | ActionType::ProposeTask
            | ActionType::AcceptTask
            | ActionType::ReportProgress
            | ActionType::CallForVote
            | ActionType::CastVote => {
                apply_social_action(state, ctx, agent_id, step, action, scratch).await;
            }
            _ => {
                apply_world_action(state, ctx, agent_id, step, action, scratch).await;
            }
        }
    }

    // Self-reported state changes apply after actions.
    let deltas = response.state_changes;
    if !deltas.is_empty()
        && let Some(agent) = state.agents.get_mut(&agent_id)
    {
        if let Some(health) = deltas.health {
            let _ = agent.apply_health_delta(i16::from(health));
        }
        if let Some(stress) = deltas.stress {
            let _ = agent.apply_stress_delta(i16::from(stress));
        }
        let (health, stress) = (agent.health, agent.stress);
        emit(
            ctx.emitter,
            EventKind::StateChange,
            json!({ "scope": "agent", "agent_id": agent_id, "health": health, "stress": stress }),
        )
        .await;
    }

    // The message publishes last.
    if let Some(message) = &response.message {
        if message.content.trim().is_empty() {
            // An empty message is "chose not to speak"; the conversation
            // index still advances at end of tick.
            return;
        }
        publish_message(
            state,
            ctx,
            agent_id,
            step,
            &message.content,
            &message.to_target,
            message.message_type,
            message.metadata.clone(),
            scratch,
        )
        .await;
    }
}

/// Execute a world-facing action through the executor and apply its
/// deferred effects.
async fn apply_world_action(
    state: &mut SimulationState,
    ctx: &TickContext<'_>,
    agent_id: AgentId,
    step: u64,
    action: &AgentAction,
    scratch: &mut TickScratch,
) {
    // Pre-compute co-location before taking the mutable agent borrow.
    let actor_location = match state.agents.get(&agent_id) {
        Some(agent) => agent.location.clone(),
        None => return,
    };
    let agents_here: Vec<(AgentId, String)> = state
        .agents
        .values()
        .filter(|other| {
            other.id != agent_id && other.is_active && other.location == actor_location
        })
        .map(|other| (other.id, other.name.clone()))
        .collect();

    let Some(actor) = state.agents.get_mut(&agent_id) else {
        return;
    };
    let mut action_ctx = ActionContext {
        graph: &mut state.graph,
        world: &mut state.world,
        resolver: &mut state.resolver,
        dynamics: &state.scenario.world.dynamics,
        items: &state.items,
        rng: &mut state.rng,
        step,
        agents_here,
        agent_names: &state.names,
    };
    let effects = execute_action(actor, action, &mut action_ctx);
    let actor_name = actor.name.clone();
    actor
        .loops
        .record_action(&effects.record.action_type, action.target.as_deref());

    emit(
        ctx.emitter,
        EventKind::AgentAction,
        json!({
            "agent_id": agent_id,
            "action_type": effects.record.action_type,
            "target": effects.record.target,
            "success": effects.record.success,
        }),
    )
    .await;

    for signal in &effects.signals {
        apply_signal(state, ctx, agent_id, &actor_name, signal, scratch).await;
    }

    scratch.actions.push(effects.record);
}

/// Translate one deferred effect into events and cross-agent mutations.
async fn apply_signal(
    state: &mut SimulationState,
    ctx: &TickContext<'_>,
    agent_id: AgentId,
    actor_name: &str,
    signal: &ActionSignal,
    scratch: &mut TickScratch,
) {
    match signal {
        ActionSignal::Moved { to } => {
            scratch.events.push(format!("{actor_name} moved to {to}"));
            emit(
                ctx.emitter,
                EventKind::AgentMoved,
                json!({ "agent_id": agent_id, "location": to }),
            )
            .await;
        }
        ActionSignal::TravelStarted { path } => {
            emit(
                ctx.emitter,
                EventKind::TravelStarted,
                json!({ "agent_id": agent_id, "path": path }),
            )
            .await;
        }
        ActionSignal::Rerouted { to } => {
            emit(
                ctx.emitter,
                EventKind::AgentRerouted,
                json!({ "agent_id": agent_id, "target": to }),
            )
            .await;
        }
        ActionSignal::LocationCreated { location } => {
            scratch
                .events
                .push(format!("a new place was charted: {}", location.id));
            emit(
                ctx.emitter,
                EventKind::LocationCreated,
                json!({ "location": location }),
            )
            .await;
        }
        ActionSignal::MovementFailed { target, reason } => {
            emit(
                ctx.emitter,
                EventKind::MovementFailed,
                json!({ "agent_id": agent_id, "target": target, "reason": reason }),
            )
            .await;
        }
        ActionSignal::Interacted { target } => {
            scratch
                .events
                .push(format!("{actor_name} interacted with {target}"));
            emit(
                ctx.emitter,
                EventKind::AgentInteracted,
                json!({ "agent_id": agent_id, "target": target }),
            )
            .await;
        }
        ActionSignal::ItemsRevealed { items } => {
            scratch.events.push(format!(
                "{actor_name} uncovered {}",
                items
                    .iter()
                    .map(|item| item.as_str().to_owned())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
            emit(
                ctx.emitter,
                EventKind::StateChange,
                json!({ "scope": "location", "agent_id": agent_id, "revealed": items }),
            )
            .await;
        }
        ActionSignal::StateChanged { health, stress } => {
            emit(
                ctx.emitter,
                EventKind::StateChange,
                json!({ "scope": "agent", "agent_id": agent_id, "health": health, "stress": stress }),
            )
            .await;
        }
        ActionSignal::VitalsAdjusted {
            target,
            health_delta,
            stress_delta,
        } => {
            if let Some(other) = state.agents.get_mut(target) {
                let _ = other.apply_health_delta(*health_delta);
                let _ = other.apply_stress_delta(*stress_delta);
                let (health, stress, active) = (other.health, other.stress, other.is_active);
                emit(
                    ctx.emitter,
                    EventKind::StateChange,
                    json!({
                        "scope": "agent",
                        "agent_id": target,
                        "health": health,
                        "stress": stress,
                        "is_active": active,
                    }),
                )
                .await;
            }
        }
        ActionSignal::WorldUpdated { key, value } => {
            scratch.events.push(format!("the world changed: {key} is now {value}"));
            emit(
                ctx.emitter,
                EventKind::StateChange,
                json!({ "scope": "world", "key": key, "value": value }),
            )
            .await;
        }
    }
}

/// Handle the `speak` shorthand: equivalent to the response-level message.
async fn apply_speak_action(
    state: &mut SimulationState,
    ctx: &TickContext<'_>,
    agent_id: AgentId,
    step: u64,
    action: &AgentAction,
    scratch: &mut TickScratch,
) {
    let content = action
        .parameters
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let message_type = action
        .parameters
        .get("message_type")
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_value::<MessageType>(Value::from(raw)).ok())
        .unwrap_or(MessageType::Room);
    let to_target = action
        .target
        .clone()
        .or_else(|| {
            action
                .parameters
                .get("to_target")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        })
        .unwrap_or_default();

    if content.trim().is_empty() {
        scratch.actions.push(ActionRecord {
            agent_id,
            action_type: ActionType::Speak.name().to_owned(),
            target: action.target.clone(),
            parameters: action.parameters.clone(),
            success: false,
            detail: Some("empty_content".to_owned()),
        });
        return;
    }

    let published = publish_message(
        state,
        ctx,
        agent_id,
        step,
        &content,
        &to_target,
        message_type,
        Value::Null,
        scratch,
    )
    .await;

    scratch.actions.push(ActionRecord {
        agent_id,
        action_type: ActionType::Speak.name().to_owned(),
        target: action.target.clone(),
        parameters: action.parameters.clone(),
        success: published,
        detail: if published {
            None
        } else {
            Some("target_absent".to_owned())
        },
    });
}

/// Handle conversation and cooperation actions inline.
async fn apply_social_action(
    state: &mut SimulationState,
    ctx: &TickContext<'_>,
    agent_id: AgentId,
    step: u64,
    action: &AgentAction,
    scratch: &mut TickScratch,
) {
    let location = state
        .agents
        .get(&agent_id)
        .map(|agent| agent.location.clone());

    let result: Result<(), String> = match action.action_type {
        ActionType::JoinConversation => location.map_or_else(
            || Err("agent_missing".to_owned()),
            |location| {
                state
                    .conversations
                    .join(agent_id, &location)
                    .map_err(|e| e.to_string())
            },
        ),
        ActionType::LeaveConversation => state
            .conversations
            .leave(agent_id)
            .map_err(|e| e.to_string()),
        ActionType::ProposeTask => {
            let description = action
                .parameters
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if description.is_empty() {
                Err("missing_description".to_owned())
            } else {
                let priority = action
                    .parameters
                    .get("priority")
                    .and_then(Value::as_u64)
                    .map_or(5, |p| u8::try_from(p.min(10)).unwrap_or(10));
                let skills = action
                    .parameters
                    .get("required_skills")
                    .and_then(Value::as_array)
                    .map(|skills| {
                        skills
                            .iter()
                            .filter_map(Value::as_str)
                            .map(ToOwned::to_owned)
                            .collect()
                    })
                    .unwrap_or_default();
                let task_id =
                    state
                        .cooperation
                        .propose_task(agent_id, step, description, priority, skills);
                scratch
                    .events
                    .push(format!("a task was proposed: {description} ({task_id})"));
                Ok(())
            }
        }
        ActionType::AcceptTask => parse_task_id(action).map_or_else(
            || Err("invalid_task_id".to_owned()),
            |task_id| {
                state
                    .cooperation
                    .accept_task(agent_id, task_id)
                    .map_err(|e| e.to_string())
            },
        ),
        ActionType::ReportProgress => parse_task_id(action).map_or_else(
            || Err("invalid_task_id".to_owned()),
            |task_id| {
                let progress = action
                    .parameters
                    .get("progress")
                    .and_then(Value::as_u64)
                    .map_or(0, |p| u8::try_from(p.min(100)).unwrap_or(100));
                let status = action
                    .parameters
                    .get("status")
                    .and_then(|raw| serde_json::from_value::<TaskStatus>(raw.clone()).ok());
                state
                    .cooperation
                    .report_progress(agent_id, task_id, progress, status)
                    .map_err(|e| e.to_string())
            },
        ),
        ActionType::CallForVote => {
            let proposal = action
                .parameters
                .get("proposal")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let options: Vec<String> = action
                .parameters
                .get("options")
                .and_then(Value::as_array)
                .map(|options| {
                    options
                        .iter()
                        .filter_map(Value::as_str)
                        .map(ToOwned::to_owned)
                        .collect()
                })
                .unwrap_or_default();
            state
                .cooperation
                .call_for_vote(agent_id, step, proposal, options)
                .map(|vote_id| {
                    scratch
                        .events
                        .push(format!("a vote was called: {proposal} ({vote_id})"));
                })
                .map_err(|e| e.to_string())
        }
        ActionType::CastVote => {
            let option = action
                .parameters
                .get("option")
                .and_then(Value::as_str)
                .unwrap_or_default();
            parse_vote_id(action).map_or_else(
                || Err("invalid_vote_id".to_owned()),
                |vote_id| {
                    state
                        .cooperation
                        .cast_ballot(agent_id, vote_id, option)
                        .map_err(|e| e.to_string())
                },
            )
        }
        _ => Err("not a social action".to_owned()),
    };

    let (success, detail) = match result {
        Ok(()) => (true, None),
        Err(reason) => (false, Some(reason)),
    };

    emit(
        ctx.emitter,
        EventKind::AgentAction,
        json!({
            "agent_id": agent_id,
            "action_type": action.action_type.name(),
            "target": action.target,
            "success": success,
        }),
    )
    .await;

    scratch.actions.push(ActionRecord {
        agent_id,
        action_type: action.action_type.name().to_owned(),
        target: action.target.clone(),
        parameters: action.parameters.clone(),
        success,
        detail,
    });
}

/// Parse an action target as a task id.
fn parse_task_id(action: &AgentAction) -> Option<TaskId> {
    action
        .target
        .as_deref()
        .and_then(|raw| uuid::Uuid::parse_str(raw).ok())
        .map(TaskId::from)
}

/// Parse an action target as a vote id.
fn parse_vote_id(action: &AgentAction) -> Option<VoteId> {
    action
        .target
        .as_deref()
        .and_then(|raw| uuid::Uuid::parse_str(raw).ok())
        .map(VoteId::from)
}

/// Resolve a target label and publish a message through the bus.
///
/// Returns whether the message was published (an unknown direct target is
/// the one way to fail).
#[allow(clippy::too_many_arguments)]
async fn publish_message(
    state: &mut SimulationState,
    ctx: &TickContext<'_>,
    from: AgentId,
    step: u64,
    content: &str,
    to_target: &str,
    message_type: MessageType,
    metadata: Value,
    scratch: &mut TickScratch,
) -> bool {
    let target = match message_type {
        MessageType::Direct => {
            let resolved = state.names.get(to_target).copied().or_else(|| {
                uuid::Uuid::parse_str(to_target).ok().map(AgentId::from)
            });
            match resolved {
                Some(agent) if state.agents.contains_key(&agent) => MessageTarget::Agent(agent),
                _ => {
                    warn!(%from, to_target, "direct message to unknown agent");
                    return false;
                }
            }
        }
        MessageType::Room => MessageTarget::Room(emotionsim_types::LocationId::from(to_target)),
        MessageType::Broadcast => MessageTarget::Broadcast,
    };

    let recipients: Vec<AgentId> = match &target {
        MessageTarget::Agent(agent) => vec![*agent],
        MessageTarget::Room(location) => state
            .agents
            .values()
            .filter(|agent| agent.is_active && &agent.location == location)
            .map(|agent| agent.id)
            .collect(),
        MessageTarget::Broadcast => state
            .agents
            .values()
            .filter(|agent| agent.is_active)
            .map(|agent| agent.id)
            .collect(),
    };

    let recipient_ids = recipients.clone();
    let record = state
        .bus
        .publish(from, &target, content, metadata, step, recipients);

    state.conversations.note_message(from, step, record.id);
    scratch.spoke.insert(from);

    let sender_name = state
        .agents
        .get(&from)
        .map(|agent| agent.name.clone())
        .unwrap_or_default();
    scratch
        .events
        .push(format!("{sender_name} said: {content}"));

    // Everyone who heard it keeps an excerpt for later context assembly.
    let excerpt = format!("{sender_name}: {content}");
    for recipient in &recipient_ids {
        if let Some(agent) = state.agents.get_mut(recipient) {
            agent.memory.add_excerpt(excerpt.clone());
        }
    }

    if let Some(agent) = state.agents.get_mut(&from) {
        agent
            .memory
            .record(step, memory_kinds::MESSAGE, format!("said: {content}"));
        agent.loops.record_topic(content);
        if let MessageTarget::Agent(other) = &target {
            agent.memory.note_interaction(*other, None, Utc::now());
        }
    }
    // Receivers remember the exchange too.
    if let MessageTarget::Agent(receiver) = &target
        && let Some(agent) = state.agents.get_mut(receiver)
    {
        agent.memory.record(
            step,
            memory_kinds::MESSAGE,
            format!("{sender_name} said: {content}"),
        );
        agent.memory.note_interaction(from, None, Utc::now());
    }

    let payload = serde_json::to_value(&record).unwrap_or(Value::Null);
    emit(ctx.emitter, EventKind::Message, payload).await;
    true
}
