//! Per-tick context assembly for agents.
//!
//! Produces the JSON object the prompt templates render: role and persona
//! preamble, goals, world summary, the agent's own state, inbox tail,
//! step events, cooperation context, loop-detector advisory, and the
//! active conversation transcript, in that order.

use serde_json::{Value, json};

use emotionsim_types::{AgentId, AgentRole};

use crate::scenario::SimulationState;

/// Inbox messages included per context.
const INBOX_TAIL: usize = 10;

/// Conversation transcript lines included per context.
const TRANSCRIPT_TAIL: usize = 10;

/// Action types available to a role, rendered into the system prompt.
fn allowed_actions(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Human | AgentRole::Designer => {
            "move, take, drop, use, interact, search, speak, wait, reflect, help, \
             join_conversation, leave_conversation, propose_task, accept_task, \
             report_progress, call_for_vote, cast_vote"
        }
        AgentRole::Environment => {
            "environment_update, affect_agent, interact, wait"
        }
        AgentRole::Evaluator => "wait, reflect",
    }
}

/// Resolve an agent id to its display name, falling back to the raw id.
fn agent_name(state: &SimulationState, id: AgentId) -> String {
    state
        .agents
        .get(&id)
        .map_or_else(|| id.to_string(), |agent| agent.name.clone())
}

/// Build the context object for one agent's turn.
///
/// `step_events` are human-readable summaries of what already happened
/// this tick (earlier agents' visible actions).
pub fn build_agent_context(
    state: &SimulationState,
    agent_id: AgentId,
    step: u64,
    step_events: &[String],
) -> Value {
    let Some(agent) = state.agents.get(&agent_id) else {
        return Value::Null;
    };

    let location = state.graph.get(&agent.location);
    let location_description = location.map_or(String::new(), |l| l.description.clone());
    let visible_items = location.map_or_else(String::new, |l| {
        l.items
            .iter()
            .map(|item| item.as_str().to_owned())
            .collect::<Vec<_>>()
            .join(", ")
    });

    let agents_here = state
        .agents
        .values()
        .filter(|other| other.id != agent_id && other.is_active && other.location == agent.location)
        .map(|other| other.name.clone())
        .collect::<Vec<_>>()
        .join(", ");

    let inbox: Vec<Value> = state
        .bus
        .inbox_tail(agent_id, INBOX_TAIL)
        .into_iter()
        .map(|message| {
            json!({
                "from": agent_name(state, message.from_agent),
                "message_type": message.message_type,
                "content": message.content,
            })
        })
        .collect();

    let tasks: Vec<Value> = state
        .cooperation
        .visible_tasks(step)
        .into_iter()
        .map(|task| {
            json!({
                "id": task.id,
                "description": task.description,
                "priority": task.priority,
                "status": task.status,
                "progress": task.progress,
            })
        })
        .collect();

    let votes: Vec<Value> = state
        .cooperation
        .open_votes(step)
        .into_iter()
        .map(|vote| {
            json!({
                "id": vote.id,
                "proposal": vote.proposal,
                "options": vote.options.join(", "),
            })
        })
        .collect();

    // The active transcript when the agent is in a conversation; otherwise
    // fall back to remembered excerpts.
    let conversation: Option<Vec<String>> = state
        .conversations
        .conversation_for(agent_id)
        .map(|conversation| {
            let skip = conversation.transcript.len().saturating_sub(TRANSCRIPT_TAIL);
            conversation
                .transcript
                .iter()
                .skip(skip)
                .filter_map(|message_id| state.bus.message_by_id(*message_id))
                .map(|message| {
                    format!("{}: {}", agent_name(state, message.from_agent), message.content)
                })
                .collect()
        })
        .or_else(|| {
            let excerpts: Vec<String> = agent.memory.excerpts().cloned().collect();
            if excerpts.is_empty() { None } else { Some(excerpts) }
        });

    let shared_goals = if state.cooperation.shared_goals().is_empty() {
        None
    } else {
        Some(state.cooperation.shared_goals().join("; "))
    };

    json!({
        "agent_name": agent.name,
        "role": agent.role,
        "persona": agent.persona,
        "allowed_actions": allowed_actions(agent.role),
        "goals": agent.goals,
        "world_summary": state.world.summary(),
        "location": agent.location,
        "location_description": location_description,
        "visible_items": if visible_items.is_empty() { Value::Null } else { Value::from(visible_items) },
        "agents_here": if agents_here.is_empty() { Value::Null } else { Value::from(agents_here) },
        "health": agent.health,
        "stress": agent.stress,
        "inventory": if agent.inventory.is_empty() {
            Value::Null
        } else {
            Value::from(
                agent
                    .inventory
                    .iter()
                    .map(|item| item.as_str().to_owned())
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        },
        "arrival_context": agent.memory.arrival_context,
        "inbox": inbox,
        "step_events": step_events,
        "shared_goals": shared_goals,
        "tasks": tasks,
        "votes": votes,
        "suggestion": agent.loops.suggestion(),
        "conversation": conversation,
        "step": step,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use emotionsim_social::MessageTarget;
    use emotionsim_types::{
        AgentTemplate, BehaviorModifiers, BigFive, InitialAgentState, Location, LocationId,
        Persona, Scenario, ScenarioId, WorldConfig, WorldInit,
    };
    use rust_decimal::Decimal;

    use super::*;
    use crate::scenario::instantiate;

    fn build_state() -> SimulationState {
        let half = Decimal::new(5, 1);
        let persona = Persona {
            age: 28,
            sex: "male".to_owned(),
            occupation: "teacher".to_owned(),
            backstory: String::new(),
            traits: BigFive::new(half, half, half, half, half),
            modifiers: BehaviorModifiers::new(half, half, half, half, half),
        };
        let mut locations = BTreeMap::new();
        locations.insert(
            LocationId::from("room1"),
            Location {
                id: LocationId::from("room1"),
                description: "Dusty but warm.".to_owned(),
                nearby: Vec::new(),
                distance: 1,
                items: vec![emotionsim_types::ItemId::from("lamp")],
                hidden_items: Vec::new(),
                hazard_affected: false,
            },
        );
        let scenario = Scenario {
            id: ScenarioId::new(),
            name: "ctx".to_owned(),
            description: "Context test.".to_owned(),
            world: WorldConfig {
                initial_state: WorldInit {
                    hazard_level: 2,
                    weather: "rain".to_owned(),
                    locations,
                    ..WorldInit::default()
                },
                dynamics: BTreeMap::new(),
                max_steps: 3,
                tick_delay_seconds: 0.0,
            },
            agents: vec![
                AgentTemplate {
                    name: "Ada".to_owned(),
                    role: AgentRole::Human,
                    model_id: "test".to_owned(),
                    provider: "scripted".to_owned(),
                    persona: Some(persona.clone()),
                    goals: vec!["keep everyone calm".to_owned()],
                    initial_state: InitialAgentState {
                        location: LocationId::from("room1"),
                        health: 10,
                        stress: 1,
                        inventory: Vec::new(),
                    },
                },
                AgentTemplate {
                    name: "Ben".to_owned(),
                    role: AgentRole::Human,
                    model_id: "test".to_owned(),
                    provider: "scripted".to_owned(),
                    persona: Some(persona),
                    goals: Vec::new(),
                    initial_state: InitialAgentState {
                        location: LocationId::from("room1"),
                        health: 10,
                        stress: 0,
                        inventory: Vec::new(),
                    },
                },
            ],
        };
        instantiate(&scenario, Some(7), None).unwrap()
    }

    #[test]
    fn context_contains_ordered_sections() {
        let state = build_state();
        let ada = *state.names.get("Ada").unwrap();
        let context = build_agent_context(&state, ada, 1, &[]);
        assert_eq!(context.get("agent_name"), Some(&json!("Ada")));
        assert_eq!(context.get("location"), Some(&json!("room1")));
        assert_eq!(context.get("agents_here"), Some(&json!("Ben")));
        assert_eq!(context.get("visible_items"), Some(&json!("lamp")));
        let summary = context
            .get("world_summary")
            .and_then(Value::as_str)
            .unwrap();
        assert!(summary.contains("hazard level 2"));
        assert!(summary.contains("rain"));
    }

    #[test]
    fn inbox_appears_in_context() {
        let mut state = build_state();
        let ada = *state.names.get("Ada").unwrap();
        let ben = *state.names.get("Ben").unwrap();
        let _ = state.bus.publish(
            ben,
            &MessageTarget::Agent(ada),
            "hold the door",
            Value::Null,
            1,
            vec![ada],
        );
        let context = build_agent_context(&state, ada, 2, &[]);
        let inbox = context.get("inbox").and_then(Value::as_array).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(
            inbox.first().and_then(|m| m.get("content")),
            Some(&json!("hold the door"))
        );
        assert_eq!(
            inbox.first().and_then(|m| m.get("from")),
            Some(&json!("Ben"))
        );
    }

    #[test]
    fn tasks_become_visible_next_step() {
        let mut state = build_state();
        let ada = *state.names.get("Ada").unwrap();
        let _ = state
            .cooperation
            .propose_task(ada, 1, "board the windows", 6, Vec::new());
        let same_step = build_agent_context(&state, ada, 1, &[]);
        assert!(
            same_step
                .get("tasks")
                .and_then(Value::as_array)
                .unwrap()
                .is_empty()
        );
        let next_step = build_agent_context(&state, ada, 2, &[]);
        assert_eq!(
            next_step
                .get("tasks")
                .and_then(Value::as_array)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn environment_role_gets_mutation_actions() {
        let state = build_state();
        assert!(allowed_actions(AgentRole::Environment).contains("environment_update"));
        assert!(!allowed_actions(AgentRole::Human).contains("environment_update"));
        drop(state);
    }

    #[test]
    fn step_events_are_passed_through() {
        let state = build_state();
        let ada = *state.names.get("Ada").unwrap();
        let events = vec!["Ben moved to room1".to_owned()];
        let context = build_agent_context(&state, ada, 1, &events);
        assert_eq!(
            context.get("step_events"),
            Some(&json!(["Ben moved to room1"]))
        );
    }
}
