//! Core entity structs: scenarios, personas, runs, and persisted records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use validator::Validate;

use crate::enums::{AgentRole, MessageType, RunStatus, Sentiment};
use crate::ids::{AgentId, ItemId, LocationId, MessageId, RunId, ScenarioId, VoteId};

/// Clamp a decimal trait value into the unit interval.
fn clamp_unit(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, Decimal::ONE)
}

// ---------------------------------------------------------------------------
// Persona
// ---------------------------------------------------------------------------

/// Big-Five personality traits, each in 0.0 to 1.0.
///
/// Traits are immutable for the lifetime of an agent and feed the
/// response-probability function and prompt assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BigFive {
    /// Openness to experience.
    #[ts(as = "String")]
    pub openness: Decimal,
    /// Conscientiousness.
    #[ts(as = "String")]
    pub conscientiousness: Decimal,
    /// Extraversion; raises the per-tick response probability.
    #[ts(as = "String")]
    pub extraversion: Decimal,
    /// Agreeableness.
    #[ts(as = "String")]
    pub agreeableness: Decimal,
    /// Neuroticism; lowers the response probability under high stress.
    #[ts(as = "String")]
    pub neuroticism: Decimal,
}

impl BigFive {
    /// Build a trait vector, clamping every value into 0.0..=1.0.
    pub fn new(
        openness: Decimal,
        conscientiousness: Decimal,
        extraversion: Decimal,
        agreeableness: Decimal,
        neuroticism: Decimal,
    ) -> Self {
        Self {
            openness: clamp_unit(openness),
            conscientiousness: clamp_unit(conscientiousness),
            extraversion: clamp_unit(extraversion),
            agreeableness: clamp_unit(agreeableness),
            neuroticism: clamp_unit(neuroticism),
        }
    }
}

/// Behavioral modifiers layered on top of the Big-Five traits, each 0.0..=1.0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BehaviorModifiers {
    /// Willingness to take uncertain actions.
    #[ts(as = "String")]
    pub risk_tolerance: Decimal,
    /// Inclination to help other agents.
    #[ts(as = "String")]
    pub empathy: Decimal,
    /// Inclination to propose tasks and call votes.
    #[ts(as = "String")]
    pub leadership: Decimal,
    /// Tolerance for changing circumstances.
    #[ts(as = "String")]
    pub adaptability: Decimal,
    /// Dampens stress accumulation.
    #[ts(as = "String")]
    pub stress_resilience: Decimal,
}

impl BehaviorModifiers {
    /// Build a modifier vector, clamping every value into 0.0..=1.0.
    pub fn new(
        risk_tolerance: Decimal,
        empathy: Decimal,
        leadership: Decimal,
        adaptability: Decimal,
        stress_resilience: Decimal,
    ) -> Self {
        Self {
            risk_tolerance: clamp_unit(risk_tolerance),
            empathy: clamp_unit(empathy),
            leadership: clamp_unit(leadership),
            adaptability: clamp_unit(adaptability),
            stress_resilience: clamp_unit(stress_resilience),
        }
    }
}

/// The identity and disposition of a human-role agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Persona {
    /// Age in years.
    pub age: u32,
    /// Self-described sex.
    pub sex: String,
    /// Occupation, used in the prompt preamble.
    pub occupation: String,
    /// Free-form backstory.
    pub backstory: String,
    /// Big-Five trait vector.
    pub traits: BigFive,
    /// Behavioral modifiers.
    pub modifiers: BehaviorModifiers,
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Initial dynamic state for an agent template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct InitialAgentState {
    /// Starting location; must name a key in the scenario's location map.
    pub location: LocationId,
    /// Starting health, 0..=10.
    #[serde(default = "default_vital")]
    pub health: u8,
    /// Starting stress, 0..=10.
    #[serde(default)]
    pub stress: u8,
    /// Item ids carried at run start.
    #[serde(default)]
    pub inventory: Vec<ItemId>,
}

/// Default starting health when a scenario omits it.
fn default_vital() -> u8 {
    10
}

/// Template for one agent slot in a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentTemplate {
    /// Display name, unique within the scenario.
    #[validate(length(min = 1))]
    pub name: String,
    /// The role this agent plays.
    pub role: AgentRole,
    /// Model identifier passed to the oracle.
    pub model_id: String,
    /// Provider tag selecting the oracle backend.
    #[serde(default)]
    pub provider: String,
    /// Persona; required for human agents, ignored for the rest.
    #[serde(default)]
    pub persona: Option<Persona>,
    /// Goals injected into the agent's context and the shared-goal pool.
    #[serde(default)]
    pub goals: Vec<String>,
    /// Initial dynamic state.
    pub initial_state: InitialAgentState,
}

/// An item that lives in exactly one container at a time: a location's
/// item list or an agent's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Item {
    /// Identifier (also the catalog key).
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Behavior-bearing properties; `heal`/`calm` integers adjust vitals
    /// when the item is used.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// A node in the world graph.
///
/// `nearby` preserves scenario declaration order so pathfinding tie-breaks
/// are stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Location {
    /// Identifier (also the graph key).
    pub id: LocationId,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Adjacent location ids, in declaration order.
    #[serde(default)]
    pub nearby: Vec<LocationId>,
    /// Semantic travel cost, 1..=3 (not a graph weight).
    #[serde(default = "default_distance")]
    pub distance: u8,
    /// Item ids currently at this location.
    #[serde(default)]
    pub items: Vec<ItemId>,
    /// Item ids hidden until revealed by a `search` action.
    #[serde(default)]
    pub hidden_items: Vec<ItemId>,
    /// Whether hazard-level changes affect agents here.
    #[serde(default)]
    pub hazard_affected: bool,
}

/// Default semantic distance for locations that omit it.
fn default_distance() -> u8 {
    1
}

/// Declared bounds for a scenario dynamic, enforced on `environment_update`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DynamicBound {
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
}

/// The reserved portion of a scenario's initial world state, plus an open
/// bag for scenario-defined dynamics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WorldInit {
    /// Hazard level, 0..=10.
    #[serde(default)]
    #[validate(range(min = 0, max = 10))]
    pub hazard_level: u8,
    /// Time of day label (e.g. "dawn").
    #[serde(default)]
    pub time_of_day: String,
    /// Weather label.
    #[serde(default)]
    pub weather: String,
    /// The location graph, keyed by location id.
    #[serde(default)]
    pub locations: BTreeMap<LocationId, Location>,
    /// The item catalog, keyed by item id.
    #[serde(default)]
    pub items: BTreeMap<ItemId, Item>,
    /// Scenario-defined dynamics (top-level keys beside the reserved ones).
    #[serde(default, flatten)]
    #[ts(skip)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// World-level configuration of a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WorldConfig {
    /// Initial world state.
    #[validate(nested)]
    pub initial_state: WorldInit,
    /// Bounds for keys the environment role may mutate.
    #[serde(default)]
    pub dynamics: BTreeMap<String, DynamicBound>,
    /// Maximum number of ticks before the run completes.
    pub max_steps: u64,
    /// Seconds to sleep between ticks (cancellable).
    #[serde(default)]
    pub tick_delay_seconds: f64,
}

/// An immutable scenario template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Scenario {
    /// Identifier.
    #[serde(default)]
    pub id: ScenarioId,
    /// Display name.
    #[validate(length(min = 1))]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// World configuration.
    #[validate(nested)]
    pub world: WorldConfig,
    /// Agent templates, in declaration order.
    #[validate(nested)]
    pub agents: Vec<AgentTemplate>,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// The recorded outcome of a closed vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct VoteOutcome {
    /// The vote.
    pub vote_id: VoteId,
    /// The proposal text.
    pub proposal: String,
    /// The winning option (ties resolved by option order).
    pub winning_option: String,
    /// Ballot counts per option.
    pub counts: BTreeMap<String, u32>,
    /// The step at which the vote closed.
    pub decided_at_step: u64,
}

/// Aggregate metrics accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RunMetrics {
    /// Mean health over active agents at the latest step boundary.
    pub avg_health: f64,
    /// Mean stress over active agents at the latest step boundary.
    pub avg_stress: f64,
    /// Messages published since run start.
    pub total_messages: u64,
    /// Actions executed since run start (including failures).
    pub total_actions: u64,
    /// Closed-vote outcomes in decision order.
    pub vote_outcomes: Vec<VoteOutcome>,
}

/// A single execution instance of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Run {
    /// Identifier.
    pub id: RunId,
    /// The scenario this run instantiates.
    pub scenario_id: ScenarioId,
    /// Lifecycle status.
    pub status: RunStatus,
    /// The latest executed tick (0 before the first tick).
    pub current_step: u64,
    /// Tick budget.
    pub max_steps: u64,
    /// Seed for the run's RNG; `None` means a seed was drawn at creation.
    pub seed: Option<u64>,
    /// Mutable copy of the world state (JSON snapshot).
    pub world_state: serde_json::Value,
    /// Aggregate metrics.
    pub metrics: RunMetrics,
    /// Evaluator output; opaque JSON.
    pub evaluation: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// Per-step metrics averaged over active agents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StepMetrics {
    /// Mean health of active agents.
    pub avg_health: f64,
    /// Mean stress of active agents.
    pub avg_stress: f64,
}

/// One executed (or rejected) action inside a step record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActionRecord {
    /// The acting agent.
    pub agent_id: AgentId,
    /// The action type, as its snake_case name.
    pub action_type: String,
    /// The action target, if any.
    pub target: Option<String>,
    /// Raw parameters as emitted by the agent.
    pub parameters: serde_json::Value,
    /// Whether the action succeeded.
    pub success: bool,
    /// Failure reason or outcome note.
    pub detail: Option<String>,
}

/// Durable snapshot of one tick. Persisted exactly once per tick, atomically
/// with the tick's messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StepRecord {
    /// The tick number.
    pub step_index: u64,
    /// World-state snapshot at the end of the tick.
    pub world_state: serde_json::Value,
    /// Actions executed during the tick, in execution order.
    pub actions: Vec<ActionRecord>,
    /// Averages over active agents.
    pub metrics: StepMetrics,
    /// Wall-clock time the record was produced.
    pub recorded_at: DateTime<Utc>,
}

/// A message as persisted and replayed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MessageRecord {
    /// Identifier.
    pub id: MessageId,
    /// The sender.
    pub from_agent: AgentId,
    /// Agent id, room id, or the token `broadcast`.
    pub to_target: String,
    /// Routing class.
    pub message_type: MessageType,
    /// Message body.
    pub content: String,
    /// Free-form metadata supplied by the sender.
    pub metadata: serde_json::Value,
    /// The tick during which the message was published.
    pub step_index: u64,
    /// Publication order within the run (insertion order key).
    pub seq: u64,
    /// Wall-clock publication time.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Agent views
// ---------------------------------------------------------------------------

/// What one agent believes about another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Relationship {
    /// Trust, 0..=10.
    pub trust_level: u8,
    /// Overall disposition.
    pub sentiment: Sentiment,
    /// Number of recorded interactions.
    pub interaction_count: u32,
    /// Free-form notes, most recent last.
    pub notes: Vec<String>,
    /// When the agents last interacted.
    pub last_interaction: Option<DateTime<Utc>>,
}

impl Default for Relationship {
    fn default() -> Self {
        Self {
            trust_level: 5,
            sentiment: Sentiment::Neutral,
            interaction_count: 0,
            notes: Vec::new(),
            last_interaction: None,
        }
    }
}

/// One entry in an agent's episodic memory window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MemoryEvent {
    /// The tick when the memory was formed.
    pub step: u64,
    /// Category (see [`memory_kinds`]).
    pub kind: String,
    /// Human-readable summary.
    pub summary: String,
}

/// Well-known `kind` values for [`MemoryEvent`].
pub mod memory_kinds {
    /// An action the agent performed.
    pub const ACTION: &str = "action";
    /// Something the agent observed.
    pub const OBSERVATION: &str = "observation";
    /// A message sent or received.
    pub const MESSAGE: &str = "message";
    /// A movement or arrival.
    pub const MOVEMENT: &str = "movement";
}

/// Live view of an agent instance, served by the control API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentSnapshot {
    /// Identifier.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Role.
    pub role: AgentRole,
    /// Current location.
    pub location: LocationId,
    /// Health, 0..=10.
    pub health: u8,
    /// Stress, 0..=10.
    pub stress: u8,
    /// Inventory item ids.
    pub inventory: Vec<ItemId>,
    /// Whether the agent still acts (health above zero, not deactivated).
    pub is_active: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use validator::Validate;

    use super::*;

    fn unit(n: i64) -> Decimal {
        Decimal::new(n, 1)
    }

    #[test]
    fn big_five_clamps_out_of_range() {
        let traits = BigFive::new(
            Decimal::new(15, 1),  // 1.5 -> 1.0
            Decimal::new(-5, 1),  // -0.5 -> 0.0
            unit(5),
            unit(5),
            unit(5),
        );
        assert_eq!(traits.openness, Decimal::ONE);
        assert_eq!(traits.conscientiousness, Decimal::ZERO);
        assert_eq!(traits.extraversion, unit(5));
    }

    #[test]
    fn modifiers_clamp_out_of_range() {
        let m = BehaviorModifiers::new(Decimal::new(20, 1), unit(5), unit(5), unit(5), unit(5));
        assert_eq!(m.risk_tolerance, Decimal::ONE);
    }

    #[test]
    fn relationship_defaults_neutral() {
        let rel = Relationship::default();
        assert_eq!(rel.trust_level, 5);
        assert_eq!(rel.sentiment, Sentiment::Neutral);
        assert_eq!(rel.interaction_count, 0);
    }

    #[test]
    fn location_deserializes_with_defaults() {
        let loc: Location = serde_json::from_str(r#"{"id": "shelter"}"#).unwrap();
        assert_eq!(loc.id.as_str(), "shelter");
        assert_eq!(loc.distance, 1);
        assert!(loc.nearby.is_empty());
        assert!(loc.hidden_items.is_empty());
        assert!(!loc.hazard_affected);
    }

    #[test]
    fn world_init_captures_extra_dynamics() {
        let init: WorldInit = serde_json::from_str(
            r#"{"hazard_level": 3, "time_of_day": "dawn", "flood_level": 2}"#,
        )
        .unwrap();
        assert_eq!(init.hazard_level, 3);
        assert_eq!(
            init.extra.get("flood_level"),
            Some(&serde_json::json!(2))
        );
    }

    #[test]
    fn scenario_validation_rejects_empty_name() {
        let scenario = Scenario {
            id: ScenarioId::new(),
            name: String::new(),
            description: String::new(),
            world: WorldConfig::default(),
            agents: Vec::new(),
        };
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn world_init_validation_rejects_out_of_range_hazard() {
        let init = WorldInit {
            hazard_level: 11,
            ..WorldInit::default()
        };
        assert!(init.validate().is_err());
    }

    #[test]
    fn step_record_roundtrip() {
        let record = StepRecord {
            step_index: 3,
            world_state: serde_json::json!({"hazard_level": 2}),
            actions: vec![ActionRecord {
                agent_id: AgentId::new(),
                action_type: "move".to_owned(),
                target: Some("shelter".to_owned()),
                parameters: serde_json::Value::Null,
                success: true,
                detail: None,
            }],
            metrics: StepMetrics {
                avg_health: 9.5,
                avg_stress: 2.0,
            },
            recorded_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: StepRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.step_index, 3);
        assert_eq!(back.actions.len(), 1);
    }
}
