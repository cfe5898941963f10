//! A live agent bound to a run: template configuration plus dynamic state.

use std::collections::VecDeque;

use emotionsim_types::{
    AgentId, AgentRole, AgentSnapshot, AgentTemplate, ItemId, LocationId, Persona,
};

use crate::loopdetect::LoopTracker;
use crate::memory::AgentMemory;

/// Upper bound for health and stress.
pub const VITAL_MAX: u8 = 10;

/// A live agent instance.
///
/// The engine owns all instances and mutates them only from within the
/// active agent's turn (or from environment-role effects).
#[derive(Debug, Clone)]
pub struct AgentInstance {
    /// Identifier, minted when the run is created.
    pub id: AgentId,
    /// Display name from the template.
    pub name: String,
    /// Role.
    pub role: AgentRole,
    /// Model identifier passed to the oracle.
    pub model_id: String,
    /// Provider tag selecting the oracle backend.
    pub provider: String,
    /// Persona (present for human agents).
    pub persona: Option<Persona>,
    /// Goals from the template.
    pub goals: Vec<String>,
    /// Current location.
    pub location: LocationId,
    /// Health, 0..=10. Zero deactivates the agent.
    pub health: u8,
    /// Stress, 0..=10.
    pub stress: u8,
    /// Inventory item ids.
    pub inventory: Vec<ItemId>,
    /// Whether the agent still takes turns.
    pub is_active: bool,
    /// Remaining hops of an in-flight multi-step journey.
    pub travel_path: VecDeque<LocationId>,
    /// Acted/skipped flags for the recent-activity window.
    pub recent_activity: VecDeque<bool>,
    /// Private memory.
    pub memory: AgentMemory,
    /// Loop-detection window.
    pub loops: LoopTracker,
}

impl AgentInstance {
    /// Instantiate an agent from its scenario template.
    pub fn from_template(template: &AgentTemplate) -> Self {
        Self {
            id: AgentId::new(),
            name: template.name.clone(),
            role: template.role,
            model_id: template.model_id.clone(),
            provider: template.provider.clone(),
            persona: template.persona.clone(),
            goals: template.goals.clone(),
            location: template.initial_state.location.clone(),
            health: template.initial_state.health.min(VITAL_MAX),
            stress: template.initial_state.stress.min(VITAL_MAX),
            inventory: template.initial_state.inventory.clone(),
            is_active: true,
            travel_path: VecDeque::new(),
            recent_activity: VecDeque::new(),
            memory: AgentMemory::default(),
            loops: LoopTracker::new(),
        }
    }

    /// Apply a signed health delta, clamped to 0..=10. Reaching zero marks
    /// the agent inactive. Returns the new health.
    pub fn apply_health_delta(&mut self, delta: i16) -> u8 {
        let next = i16::from(self.health)
            .saturating_add(delta)
            .clamp(0, i16::from(VITAL_MAX));
        self.health = u8::try_from(next).unwrap_or(0);
        if self.health == 0 {
            self.is_active = false;
        }
        self.health
    }

    /// Apply a signed stress delta, clamped to 0..=10. Returns the new
    /// stress.
    pub fn apply_stress_delta(&mut self, delta: i16) -> u8 {
        let next = i16::from(self.stress)
            .saturating_add(delta)
            .clamp(0, i16::from(VITAL_MAX));
        self.stress = u8::try_from(next).unwrap_or(0);
        self.stress
    }

    /// Whether the agent holds the item.
    pub fn has_item(&self, item: &ItemId) -> bool {
        self.inventory.contains(item)
    }

    /// Remove an item from the inventory, returning whether it was held.
    pub fn remove_item(&mut self, item: &ItemId) -> bool {
        match self.inventory.iter().position(|held| held == item) {
            Some(index) => {
                self.inventory.remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether the agent is mid-journey.
    pub fn is_travelling(&self) -> bool {
        !self.travel_path.is_empty()
    }

    /// Produce the API-facing snapshot of this agent.
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
            location: self.location.clone(),
            health: self.health,
            stress: self.stress,
            inventory: self.inventory.clone(),
            is_active: self.is_active,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use emotionsim_types::InitialAgentState;

    use super::*;

    fn template() -> AgentTemplate {
        AgentTemplate {
            name: "Ada".to_owned(),
            role: AgentRole::Human,
            model_id: "test-model".to_owned(),
            provider: String::new(),
            persona: None,
            goals: vec!["stay safe".to_owned()],
            initial_state: InitialAgentState {
                location: LocationId::from("shelter"),
                health: 10,
                stress: 2,
                inventory: vec![ItemId::from("rope")],
            },
        }
    }

    #[test]
    fn from_template_copies_state() {
        let agent = AgentInstance::from_template(&template());
        assert_eq!(agent.name, "Ada");
        assert_eq!(agent.location, LocationId::from("shelter"));
        assert_eq!(agent.health, 10);
        assert_eq!(agent.stress, 2);
        assert!(agent.is_active);
        assert!(agent.has_item(&ItemId::from("rope")));
    }

    #[test]
    fn health_clamps_high_and_low() {
        let mut agent = AgentInstance::from_template(&template());
        assert_eq!(agent.apply_health_delta(5), 10);
        assert_eq!(agent.apply_health_delta(-25), 0);
    }

    #[test]
    fn zero_health_deactivates() {
        let mut agent = AgentInstance::from_template(&template());
        let _ = agent.apply_health_delta(-10);
        assert!(!agent.is_active);
    }

    #[test]
    fn stress_clamps_into_range() {
        let mut agent = AgentInstance::from_template(&template());
        assert_eq!(agent.apply_stress_delta(20), 10);
        assert_eq!(agent.apply_stress_delta(-20), 0);
    }

    #[test]
    fn remove_item_reports_presence() {
        let mut agent = AgentInstance::from_template(&template());
        assert!(agent.remove_item(&ItemId::from("rope")));
        assert!(!agent.remove_item(&ItemId::from("rope")));
    }

    #[test]
    fn snapshot_reflects_state() {
        let agent = AgentInstance::from_template(&template());
        let snap = agent.snapshot();
        assert_eq!(snap.name, "Ada");
        assert_eq!(snap.role, AgentRole::Human);
        assert!(snap.is_active);
    }
}
