//! Scenario instantiation: building the mutable simulation state for a run.
//!
//! Validation happens here, before the run exists: every agent's starting
//! location must be a location key, human agents must carry personas, and
//! no item may start in two containers. The run's RNG is seeded from the
//! supplied seed (or a fresh draw recorded on the run) so permutations,
//! probability checks, and dynamic-location distances replay identically.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use validator::Validate;

use emotionsim_agents::AgentInstance;
use emotionsim_social::{ConversationManager, CooperationCoordinator, MessageBus};
use emotionsim_types::{
    AgentId, AgentRole, Item, ItemId, Run, RunId, RunMetrics, RunStatus, Scenario,
};
use emotionsim_world::{MovementResolver, WorldGraph, WorldState};

use crate::error::EngineError;

/// The engine-owned mutable state of one run.
///
/// The engine is the sole writer; external observers hold read-only views
/// through the event stream and persisted records.
#[derive(Debug)]
pub struct SimulationState {
    /// The run row mirrored to persistence.
    pub run: Run,
    /// The immutable scenario the run instantiates.
    pub scenario: Scenario,
    /// The world graph.
    pub graph: WorldGraph,
    /// The typed world state.
    pub world: WorldState,
    /// The item catalog.
    pub items: BTreeMap<ItemId, Item>,
    /// Live agents keyed by id.
    pub agents: BTreeMap<AgentId, AgentInstance>,
    /// Agent ids in template declaration order.
    pub agent_order: Vec<AgentId>,
    /// Display-name index (names are unique per scenario).
    pub names: BTreeMap<String, AgentId>,
    /// The message bus.
    pub bus: MessageBus,
    /// The conversation manager.
    pub conversations: ConversationManager,
    /// The cooperation coordinator.
    pub cooperation: CooperationCoordinator,
    /// The movement resolver with its per-tick failed cache.
    pub resolver: MovementResolver,
    /// The run's seeded RNG.
    pub rng: SmallRng,
}

impl SimulationState {
    /// Agents of a role, in declaration order.
    pub fn agents_with_role(&self, role: AgentRole) -> Vec<AgentId> {
        self.agent_order
            .iter()
            .filter(|id| {
                self.agents
                    .get(id)
                    .is_some_and(|agent| agent.role == role)
            })
            .copied()
            .collect()
    }

    /// Active agents per location (the co-location scan input).
    pub fn occupancy(&self) -> BTreeMap<emotionsim_types::LocationId, Vec<AgentId>> {
        let mut map: BTreeMap<emotionsim_types::LocationId, Vec<AgentId>> = BTreeMap::new();
        for id in &self.agent_order {
            if let Some(agent) = self.agents.get(id)
                && agent.is_active
            {
                map.entry(agent.location.clone()).or_default().push(*id);
            }
        }
        map
    }

    /// Refresh the run row's mutable mirror fields before persistence.
    pub fn sync_run(&mut self, status: RunStatus) {
        self.run.status = status;
        self.run.world_state = self.world.snapshot();
        self.run.updated_at = Utc::now();
    }
}

/// Instantiate a run from a scenario.
///
/// # Errors
///
/// Returns [`EngineError::Scenario`] for validation failures: empty
/// names, out-of-range hazard, unknown starting locations, humans
/// without personas, or items declared in two containers.
pub fn instantiate(
    scenario: &Scenario,
    seed: Option<u64>,
    max_steps_override: Option<u64>,
) -> Result<SimulationState, EngineError> {
    scenario
        .validate()
        .map_err(|e| EngineError::Scenario(e.to_string()))?;

    let init = &scenario.world.initial_state;
    let graph = WorldGraph::from_locations(&init.locations);
    let world = WorldState::from_init(init);

    // Container uniqueness: an item may start in exactly one place.
    let mut seen: BTreeSet<ItemId> = BTreeSet::new();
    for location in init.locations.values() {
        for item in location.items.iter().chain(location.hidden_items.iter()) {
            if !seen.insert(item.clone()) {
                return Err(EngineError::Scenario(format!(
                    "item {item} appears in more than one container"
                )));
            }
        }
    }

    let mut agents = BTreeMap::new();
    let mut agent_order = Vec::new();
    let mut names = BTreeMap::new();

    for template in &scenario.agents {
        if template.role == AgentRole::Human && template.persona.is_none() {
            return Err(EngineError::Scenario(format!(
                "human agent {} has no persona",
                template.name
            )));
        }
        if !init.locations.contains_key(&template.initial_state.location) {
            return Err(EngineError::Scenario(format!(
                "agent {} starts at unknown location {}",
                template.name, template.initial_state.location
            )));
        }
        for item in &template.initial_state.inventory {
            if !seen.insert(item.clone()) {
                return Err(EngineError::Scenario(format!(
                    "item {item} appears in more than one container"
                )));
            }
        }
        if names.contains_key(&template.name) {
            return Err(EngineError::Scenario(format!(
                "duplicate agent name {}",
                template.name
            )));
        }

        let mut agent = AgentInstance::from_template(template);
        agent.memory = emotionsim_agents::AgentMemory::new(format!(
            "You find yourself at {}. {}",
            template.initial_state.location, scenario.description
        ));
        names.insert(agent.name.clone(), agent.id);
        agent_order.push(agent.id);
        agents.insert(agent.id, agent);
    }

    let mut cooperation = CooperationCoordinator::new();
    cooperation.derive_goals(scenario.agents.iter().flat_map(|t| t.goals.iter()));

    let seed = seed.unwrap_or_else(|| rand::rng().random());
    let rng = SmallRng::seed_from_u64(seed);

    let max_steps = max_steps_override.unwrap_or(scenario.world.max_steps);
    let now = Utc::now();
    let run = Run {
        id: RunId::new(),
        scenario_id: scenario.id,
        status: RunStatus::Pending,
        current_step: 0,
        max_steps,
        seed: Some(seed),
        world_state: world.snapshot(),
        metrics: RunMetrics::default(),
        evaluation: None,
        created_at: now,
        updated_at: now,
    };

    Ok(SimulationState {
        run,
        scenario: scenario.clone(),
        graph,
        world,
        items: init.items.clone(),
        agents,
        agent_order,
        names,
        bus: MessageBus::new(),
        conversations: ConversationManager::new(),
        cooperation,
        resolver: MovementResolver::new(),
        rng,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use emotionsim_types::{
        AgentTemplate, BehaviorModifiers, BigFive, InitialAgentState, Location, LocationId,
        Persona, WorldConfig, WorldInit,
    };
    use rust_decimal::Decimal;

    use super::*;

    fn persona() -> Persona {
        let half = Decimal::new(5, 1);
        Persona {
            age: 30,
            sex: "female".to_owned(),
            occupation: "medic".to_owned(),
            backstory: "Worked the night shift for years.".to_owned(),
            traits: BigFive::new(half, half, half, half, half),
            modifiers: BehaviorModifiers::new(half, half, half, half, half),
        }
    }

    fn human(name: &str, location: &str) -> AgentTemplate {
        AgentTemplate {
            name: name.to_owned(),
            role: AgentRole::Human,
            model_id: "test".to_owned(),
            provider: "scripted".to_owned(),
            persona: Some(persona()),
            goals: vec![format!("{name} goal")],
            initial_state: InitialAgentState {
                location: LocationId::from(location),
                health: 10,
                stress: 0,
                inventory: Vec::new(),
            },
        }
    }

    fn scenario() -> Scenario {
        let mut locations = BTreeMap::new();
        locations.insert(
            LocationId::from("room1"),
            Location {
                id: LocationId::from("room1"),
                description: "A plain room.".to_owned(),
                nearby: Vec::new(),
                distance: 1,
                items: Vec::new(),
                hidden_items: Vec::new(),
                hazard_affected: false,
            },
        );
        Scenario {
            id: emotionsim_types::ScenarioId::new(),
            name: "test".to_owned(),
            description: "A quiet evening.".to_owned(),
            world: WorldConfig {
                initial_state: WorldInit {
                    hazard_level: 1,
                    locations,
                    ..WorldInit::default()
                },
                dynamics: BTreeMap::new(),
                max_steps: 5,
                tick_delay_seconds: 0.0,
            },
            agents: vec![human("Ada", "room1"), human("Ben", "room1")],
        }
    }

    #[test]
    fn instantiates_agents_and_goals() {
        let state = instantiate(&scenario(), Some(42), None).unwrap();
        assert_eq!(state.agents.len(), 2);
        assert_eq!(state.agent_order.len(), 2);
        assert_eq!(state.cooperation.shared_goals().len(), 2);
        assert_eq!(state.run.status, RunStatus::Pending);
        assert_eq!(state.run.seed, Some(42));
        assert_eq!(state.run.max_steps, 5);
    }

    #[test]
    fn human_without_persona_rejected() {
        let mut bad = scenario();
        if let Some(agent) = bad.agents.first_mut() {
            agent.persona = None;
        }
        assert!(matches!(
            instantiate(&bad, None, None),
            Err(EngineError::Scenario(_))
        ));
    }

    #[test]
    fn unknown_start_location_rejected() {
        let mut bad = scenario();
        if let Some(agent) = bad.agents.first_mut() {
            agent.initial_state.location = LocationId::from("nowhere");
        }
        assert!(instantiate(&bad, None, None).is_err());
    }

    #[test]
    fn duplicate_item_containers_rejected() {
        let mut bad = scenario();
        if let Some(location) = bad
            .world
            .initial_state
            .locations
            .get_mut(&LocationId::from("room1"))
        {
            location.items.push(ItemId::from("rope"));
        }
        if let Some(agent) = bad.agents.first_mut() {
            agent.initial_state.inventory.push(ItemId::from("rope"));
        }
        assert!(instantiate(&bad, None, None).is_err());
    }

    #[test]
    fn duplicate_agent_names_rejected() {
        let mut bad = scenario();
        if let Some(agent) = bad.agents.last_mut() {
            agent.name = "Ada".to_owned();
        }
        assert!(instantiate(&bad, None, None).is_err());
    }

    #[test]
    fn max_steps_override_applies() {
        let state = instantiate(&scenario(), Some(1), Some(9)).unwrap();
        assert_eq!(state.run.max_steps, 9);
    }

    #[test]
    fn missing_seed_draws_one() {
        let state = instantiate(&scenario(), None, None).unwrap();
        assert!(state.run.seed.is_some());
    }

    #[test]
    fn occupancy_groups_by_location() {
        let state = instantiate(&scenario(), Some(1), None).unwrap();
        let occupancy = state.occupancy();
        assert_eq!(
            occupancy
                .get(&LocationId::from("room1"))
                .map(Vec::len),
            Some(2)
        );
    }
}
