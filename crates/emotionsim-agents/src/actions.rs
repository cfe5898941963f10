//! Execution handlers for world-facing agent actions.
//!
//! The engine routes cooperation and conversation actions to their own
//! managers; everything that touches the world graph, items, vitals, or
//! world state comes through [`execute_action`]. Handlers mutate the acting
//! agent directly and return deferred effects (events to emit, vital
//! adjustments for *other* agents) so the caller never needs two mutable
//! borrows into the agent table at once.
//!
//! A failing action is recorded with `success = false` and does not abort
//! the rest of the agent's response.

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use serde_json::Value;

use emotionsim_types::{
    ActionRecord, ActionType, AgentAction, AgentId, DynamicBound, Item, ItemId, Location,
    LocationId,
};
use emotionsim_world::{MoveOutcome, MovementResolver, WorldGraph, WorldState};

use crate::instance::AgentInstance;

/// Largest absolute health/stress delta an `affect_agent` action may apply.
pub const MAX_AFFECT_DELTA: i16 = 3;

/// Everything a handler may read or mutate besides the acting agent.
///
/// The caller pre-computes co-location and name resolution before taking
/// the mutable borrow on the acting agent.
pub struct ActionContext<'a> {
    /// The world graph.
    pub graph: &'a mut WorldGraph,
    /// The typed world state.
    pub world: &'a mut WorldState,
    /// The movement resolver with the per-tick failed cache.
    pub resolver: &'a mut MovementResolver,
    /// Scenario-declared dynamics bounds for `environment_update`.
    pub dynamics: &'a BTreeMap<String, DynamicBound>,
    /// The item catalog.
    pub items: &'a BTreeMap<ItemId, Item>,
    /// The run's seeded RNG (dynamic location distances).
    pub rng: &'a mut SmallRng,
    /// The current tick.
    pub step: u64,
    /// Other agents at the actor's location: `(id, name)`.
    pub agents_here: Vec<(AgentId, String)>,
    /// All agents in the run by display name.
    pub agent_names: &'a BTreeMap<String, AgentId>,
}

/// A deferred effect produced by a handler, translated into events and
/// cross-agent mutations by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionSignal {
    /// The agent arrived at a location.
    Moved {
        /// The new location.
        to: LocationId,
    },
    /// A multi-hop journey began.
    TravelStarted {
        /// The full planned path including both endpoints.
        path: Vec<LocationId>,
    },
    /// An in-flight journey was replaced by a new destination.
    Rerouted {
        /// The new destination.
        to: LocationId,
    },
    /// A location was created dynamically.
    LocationCreated {
        /// The created location.
        location: Location,
    },
    /// A movement attempt failed (first failure for this pair this tick).
    MovementFailed {
        /// The unreachable target.
        target: LocationId,
        /// Stable failure reason.
        reason: String,
    },
    /// A free-form interaction occurred.
    Interacted {
        /// The interaction target.
        target: String,
    },
    /// Hidden items were revealed by a search.
    ItemsRevealed {
        /// The revealed item ids.
        items: Vec<ItemId>,
    },
    /// The actor's own vitals changed.
    StateChanged {
        /// Health after the change.
        health: u8,
        /// Stress after the change.
        stress: u8,
    },
    /// Another agent's vitals must be adjusted by the engine.
    VitalsAdjusted {
        /// The affected agent.
        target: AgentId,
        /// Signed health delta.
        health_delta: i16,
        /// Signed stress delta.
        stress_delta: i16,
    },
    /// A world-state key was updated.
    WorldUpdated {
        /// The key.
        key: String,
        /// The new value.
        value: Value,
    },
}

/// The outcome of executing one action.
#[derive(Debug, Clone)]
pub struct ActionEffects {
    /// The record persisted in the step record.
    pub record: ActionRecord,
    /// Deferred effects for the engine.
    pub signals: Vec<ActionSignal>,
}

/// Execute one world-facing action for `actor`.
///
/// Cooperation and conversation action types are not handled here; they
/// are routed by the engine before this function is reached. If one slips
/// through, it is recorded as a failure.
pub fn execute_action(
    actor: &mut AgentInstance,
    action: &AgentAction,
    ctx: &mut ActionContext<'_>,
) -> ActionEffects {
    match action.action_type {
        ActionType::Move => execute_move(actor, action, ctx),
        ActionType::Take => execute_take(actor, action, ctx),
        ActionType::Drop => execute_drop(actor, action, ctx),
        ActionType::Use => execute_use(actor, action, ctx),
        ActionType::Interact => execute_interact(actor, action, ctx),
        ActionType::Search => execute_search(actor, action, ctx),
        ActionType::Wait | ActionType::Reflect => execute_idle(actor, action, ctx),
        ActionType::Help => execute_help(actor, action, ctx),
        ActionType::EnvironmentUpdate => execute_environment_update(actor, action, ctx),
        ActionType::AffectAgent => execute_affect_agent(actor, action, ctx),
        ActionType::Speak
        | ActionType::JoinConversation
        | ActionType::LeaveConversation
        | ActionType::ProposeTask
        | ActionType::AcceptTask
        | ActionType::ReportProgress
        | ActionType::CallForVote
        | ActionType::CastVote => failure(actor, action, "not a world action"),
    }
}

// ---------------------------------------------------------------------------
// Record helpers
// ---------------------------------------------------------------------------

/// Build a success record with no deferred effects.
fn success(actor: &AgentInstance, action: &AgentAction) -> ActionEffects {
    success_with(actor, action, Vec::new(), None)
}

/// Build a success record with deferred effects and an optional note.
fn success_with(
    actor: &AgentInstance,
    action: &AgentAction,
    signals: Vec<ActionSignal>,
    detail: Option<String>,
) -> ActionEffects {
    ActionEffects {
        record: ActionRecord {
            agent_id: actor.id,
            action_type: action.action_type.name().to_owned(),
            target: action.target.clone(),
            parameters: action.parameters.clone(),
            success: true,
            detail,
        },
        signals,
    }
}

/// Build a failure record.
fn failure(actor: &AgentInstance, action: &AgentAction, reason: &str) -> ActionEffects {
    failure_with(actor, action, reason, Vec::new())
}

/// Build a failure record carrying deferred effects (movement failures
/// still emit exactly one event per pair per tick).
fn failure_with(
    actor: &AgentInstance,
    action: &AgentAction,
    reason: &str,
    signals: Vec<ActionSignal>,
) -> ActionEffects {
    ActionEffects {
        record: ActionRecord {
            agent_id: actor.id,
            action_type: action.action_type.name().to_owned(),
            target: action.target.clone(),
            parameters: action.parameters.clone(),
            success: false,
            detail: Some(reason.to_owned()),
        },
        signals,
    }
}

/// Pull the required target out of an action.
fn required_target<'a>(action: &'a AgentAction) -> Option<&'a str> {
    action.target.as_deref().filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

fn execute_move(
    actor: &mut AgentInstance,
    action: &AgentAction,
    ctx: &mut ActionContext<'_>,
) -> ActionEffects {
    let Some(target) = required_target(action) else {
        return failure(actor, action, "missing_target");
    };
    let target = LocationId::from(target);

    let mut signals = Vec::new();
    // A new destination while mid-journey reroutes: the queued hops are
    // discarded before resolving fresh.
    if actor.is_travelling() && target != actor.location {
        actor.travel_path.clear();
        signals.push(ActionSignal::Rerouted { to: target.clone() });
    }

    let outcome = ctx
        .resolver
        .resolve(ctx.graph, actor.id, &actor.location, &target, ctx.rng);

    match outcome {
        MoveOutcome::Unchanged => success(actor, action),
        MoveOutcome::Moved { location } => {
            actor.location = location.clone();
            actor
                .memory
                .record(ctx.step, emotionsim_types::memory_kinds::MOVEMENT, format!("moved to {location}"));
            signals.push(ActionSignal::Moved { to: location });
            success_with(actor, action, signals, None)
        }
        MoveOutcome::Created { location } => {
            actor.location = location.id.clone();
            actor.memory.record(
                ctx.step,
                emotionsim_types::memory_kinds::MOVEMENT,
                format!("discovered and entered {}", location.id),
            );
            let arrived = location.id.clone();
            signals.push(ActionSignal::LocationCreated { location });
            signals.push(ActionSignal::Moved { to: arrived });
            success_with(actor, action, signals, None)
        }
        MoveOutcome::Travelling {
            next_hop,
            remaining,
            full_path,
        } => {
            actor.location = next_hop.clone();
            actor.travel_path = remaining.into_iter().collect();
            actor.memory.record(
                ctx.step,
                emotionsim_types::memory_kinds::MOVEMENT,
                format!("set out for {target} via {next_hop}"),
            );
            signals.push(ActionSignal::TravelStarted { path: full_path });
            signals.push(ActionSignal::Moved { to: next_hop });
            success_with(actor, action, signals, Some("travelling".to_owned()))
        }
        MoveOutcome::Failed { reason, suppressed } => {
            // A reroute that failed still rerouted; keep its signal.
            if !suppressed {
                signals.push(ActionSignal::MovementFailed {
                    target: target.clone(),
                    reason: reason.clone(),
                });
            }
            failure_with(actor, action, &reason, signals)
        }
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

fn execute_take(
    actor: &mut AgentInstance,
    action: &AgentAction,
    ctx: &mut ActionContext<'_>,
) -> ActionEffects {
    let Some(target) = required_target(action) else {
        return failure(actor, action, "missing_target");
    };
    let item = ItemId::from(target);

    match ctx.graph.take_item(&actor.location, &item) {
        Ok(()) => {
            actor.inventory.push(item.clone());
            actor.memory.record(
                ctx.step,
                emotionsim_types::memory_kinds::ACTION,
                format!("picked up {item}"),
            );
            success(actor, action)
        }
        Err(_) => failure(actor, action, "item_absent"),
    }
}

fn execute_drop(
    actor: &mut AgentInstance,
    action: &AgentAction,
    ctx: &mut ActionContext<'_>,
) -> ActionEffects {
    let Some(target) = required_target(action) else {
        return failure(actor, action, "missing_target");
    };
    let item = ItemId::from(target);

    if !actor.remove_item(&item) {
        return failure(actor, action, "item_absent");
    }
    match ctx.graph.place_item(&actor.location, item.clone()) {
        Ok(()) => {
            actor.memory.record(
                ctx.step,
                emotionsim_types::memory_kinds::ACTION,
                format!("dropped {item}"),
            );
            success(actor, action)
        }
        Err(_) => {
            // The location vanished from under the agent; put the item back
            // so it stays in exactly one container.
            actor.inventory.push(item);
            failure(actor, action, "location_missing")
        }
    }
}

fn execute_use(
    actor: &mut AgentInstance,
    action: &AgentAction,
    ctx: &mut ActionContext<'_>,
) -> ActionEffects {
    let Some(target) = required_target(action) else {
        return failure(actor, action, "missing_target");
    };
    let item = ItemId::from(target);

    if !actor.has_item(&item) {
        return failure(actor, action, "item_absent");
    }

    let properties = ctx
        .items
        .get(&item)
        .map(|definition| definition.properties.clone())
        .unwrap_or_default();

    let heal = property_delta(&properties, "heal");
    let calm = property_delta(&properties, "calm");

    if heal == 0 && calm == 0 {
        // Usable but inert; still a successful action.
        return success_with(actor, action, Vec::new(), Some("no_effect".to_owned()));
    }

    let health = actor.apply_health_delta(heal);
    let stress = actor.apply_stress_delta(calm.saturating_neg());
    actor.memory.record(
        ctx.step,
        emotionsim_types::memory_kinds::ACTION,
        format!("used {item}"),
    );
    success_with(
        actor,
        action,
        vec![ActionSignal::StateChanged { health, stress }],
        None,
    )
}

/// Read a signed integer property, clamped into the vital delta range.
fn property_delta(properties: &BTreeMap<String, Value>, key: &str) -> i16 {
    properties
        .get(key)
        .and_then(Value::as_i64)
        .map(|v| i16::try_from(v.clamp(-10, 10)).unwrap_or(0))
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Interaction
// ---------------------------------------------------------------------------

fn execute_interact(
    actor: &mut AgentInstance,
    action: &AgentAction,
    ctx: &mut ActionContext<'_>,
) -> ActionEffects {
    let Some(target) = required_target(action) else {
        return failure(actor, action, "target_absent");
    };

    // Interacting with a named agent requires co-location.
    if let Some(&target_id) = ctx.agent_names.get(target) {
        let here = ctx.agents_here.iter().any(|(id, _)| *id == target_id);
        if !here {
            return failure(actor, action, "target_absent");
        }
        actor
            .memory
            .note_interaction(target_id, None, chrono::Utc::now());
    }

    success_with(
        actor,
        action,
        vec![ActionSignal::Interacted {
            target: target.to_owned(),
        }],
        None,
    )
}

fn execute_search(
    actor: &mut AgentInstance,
    action: &AgentAction,
    ctx: &mut ActionContext<'_>,
) -> ActionEffects {
    match ctx.graph.reveal_hidden(&actor.location) {
        Ok(items) if items.is_empty() => {
            success_with(actor, action, Vec::new(), Some("nothing_found".to_owned()))
        }
        Ok(items) => {
            actor.memory.record(
                ctx.step,
                emotionsim_types::memory_kinds::OBSERVATION,
                format!(
                    "found {}",
                    items
                        .iter()
                        .map(ItemId::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            );
            success_with(
                actor,
                action,
                vec![ActionSignal::ItemsRevealed { items }],
                None,
            )
        }
        Err(_) => failure(actor, action, "location_missing"),
    }
}

fn execute_idle(
    actor: &mut AgentInstance,
    action: &AgentAction,
    ctx: &mut ActionContext<'_>,
) -> ActionEffects {
    if action.action_type == ActionType::Reflect {
        actor.memory.record(
            ctx.step,
            emotionsim_types::memory_kinds::ACTION,
            "paused to reflect",
        );
    }
    success(actor, action)
}

fn execute_help(
    actor: &mut AgentInstance,
    action: &AgentAction,
    ctx: &mut ActionContext<'_>,
) -> ActionEffects {
    let Some(target) = required_target(action) else {
        return failure(actor, action, "target_absent");
    };
    let Some(&target_id) = ctx.agent_names.get(target) else {
        return failure(actor, action, "target_absent");
    };
    let here = ctx.agents_here.iter().any(|(id, _)| *id == target_id);
    if !here {
        return failure(actor, action, "target_not_co_located");
    }

    actor.memory.note_interaction(
        target_id,
        Some(format!("helped {target}")),
        chrono::Utc::now(),
    );
    actor.memory.adjust_trust(target_id, 1);

    success_with(
        actor,
        action,
        vec![ActionSignal::VitalsAdjusted {
            target: target_id,
            health_delta: 1,
            stress_delta: -1,
        }],
        None,
    )
}

// ---------------------------------------------------------------------------
// Environment-role actions
// ---------------------------------------------------------------------------

fn execute_environment_update(
    actor: &mut AgentInstance,
    action: &AgentAction,
    ctx: &mut ActionContext<'_>,
) -> ActionEffects {
    if actor.role != emotionsim_types::AgentRole::Environment {
        return failure(actor, action, "insufficient_permission");
    }
    let Some(updates) = action.parameters.as_object() else {
        return failure(actor, action, "missing_parameters");
    };

    // All-or-nothing: validate against a scratch copy, then commit.
    let mut staged = ctx.world.clone();
    for (key, value) in updates {
        if let Err(error) = staged.apply_update(key, value, ctx.dynamics) {
            return failure(actor, action, &error.to_string());
        }
    }
    *ctx.world = staged;

    let signals = updates
        .iter()
        .map(|(key, value)| ActionSignal::WorldUpdated {
            key: key.clone(),
            value: value.clone(),
        })
        .collect();
    success_with(actor, action, signals, None)
}

fn execute_affect_agent(
    actor: &mut AgentInstance,
    action: &AgentAction,
    ctx: &mut ActionContext<'_>,
) -> ActionEffects {
    if actor.role != emotionsim_types::AgentRole::Environment {
        return failure(actor, action, "insufficient_permission");
    }
    let Some(target) = required_target(action) else {
        return failure(actor, action, "target_absent");
    };
    let Some(&target_id) = ctx.agent_names.get(target) else {
        return failure(actor, action, "target_absent");
    };

    let health_delta = bounded_param(&action.parameters, "health");
    let stress_delta = bounded_param(&action.parameters, "stress");
    if health_delta == 0 && stress_delta == 0 {
        return failure(actor, action, "missing_parameters");
    }

    success_with(
        actor,
        action,
        vec![ActionSignal::VitalsAdjusted {
            target: target_id,
            health_delta,
            stress_delta,
        }],
        None,
    )
}

/// Read a signed delta parameter, clamped to [`MAX_AFFECT_DELTA`].
fn bounded_param(parameters: &Value, key: &str) -> i16 {
    parameters
        .get(key)
        .and_then(Value::as_i64)
        .map(|v| {
            i16::try_from(v.clamp(i64::from(-MAX_AFFECT_DELTA), i64::from(MAX_AFFECT_DELTA)))
                .unwrap_or(0)
        })
        .unwrap_or(0)
}
