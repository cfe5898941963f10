//! Shared type definitions for the EmotionSim simulation core.
//!
//! This crate is the single source of truth for all types used across the
//! EmotionSim workspace. Types defined here flow downstream to `TypeScript`
//! via `ts-rs` for the web dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier wrappers (UUID v7 and name-keyed)
//! - [`enums`] -- Enumeration types (roles, statuses, actions, events)
//! - [`structs`] -- Core entity structs (scenarios, personas, runs, records)
//! - [`actions`] -- The agent response schema

pub mod actions;
pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use actions::{AgentAction, AgentResponse, OutgoingMessage, StateChanges};
pub use enums::{
    ActionType, AgentRole, ControlAction, ConversationStatus, EventKind, MessageType, RunStatus,
    Sentiment, TaskStatus,
};
pub use ids::{
    AgentId, ConversationId, ItemId, LocationId, MessageId, RunId, ScenarioId, TaskId, VoteId,
};
pub use structs::{
    ActionRecord, AgentSnapshot, AgentTemplate, BehaviorModifiers, BigFive, DynamicBound,
    InitialAgentState, Item, Location, MemoryEvent, MessageRecord, Persona, Relationship, Run,
    RunMetrics, Scenario, StepMetrics, StepRecord, VoteOutcome, WorldConfig, WorldInit,
    memory_kinds,
};

#[cfg(test)]
mod tests {
    //! Integration tests for type exports and `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs generates TypeScript bindings when types with
        // #[ts(export)] are used. Importing them here triggers generation.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::ScenarioId::export_all();
        let _ = crate::ids::RunId::export_all();
        let _ = crate::ids::AgentId::export_all();
        let _ = crate::ids::ConversationId::export_all();
        let _ = crate::ids::TaskId::export_all();
        let _ = crate::ids::VoteId::export_all();
        let _ = crate::ids::MessageId::export_all();
        let _ = crate::ids::LocationId::export_all();
        let _ = crate::ids::ItemId::export_all();

        // Enums
        let _ = crate::enums::AgentRole::export_all();
        let _ = crate::enums::RunStatus::export_all();
        let _ = crate::enums::ControlAction::export_all();
        let _ = crate::enums::MessageType::export_all();
        let _ = crate::enums::Sentiment::export_all();
        let _ = crate::enums::ConversationStatus::export_all();
        let _ = crate::enums::TaskStatus::export_all();
        let _ = crate::enums::ActionType::export_all();
        let _ = crate::enums::EventKind::export_all();

        // Structs
        let _ = crate::structs::BigFive::export_all();
        let _ = crate::structs::BehaviorModifiers::export_all();
        let _ = crate::structs::Persona::export_all();
        let _ = crate::structs::InitialAgentState::export_all();
        let _ = crate::structs::AgentTemplate::export_all();
        let _ = crate::structs::Item::export_all();
        let _ = crate::structs::Location::export_all();
        let _ = crate::structs::DynamicBound::export_all();
        let _ = crate::structs::WorldInit::export_all();
        let _ = crate::structs::WorldConfig::export_all();
        let _ = crate::structs::Scenario::export_all();
        let _ = crate::structs::VoteOutcome::export_all();
        let _ = crate::structs::RunMetrics::export_all();
        let _ = crate::structs::Run::export_all();
        let _ = crate::structs::StepMetrics::export_all();
        let _ = crate::structs::ActionRecord::export_all();
        let _ = crate::structs::StepRecord::export_all();
        let _ = crate::structs::MessageRecord::export_all();
        let _ = crate::structs::Relationship::export_all();
        let _ = crate::structs::MemoryEvent::export_all();
        let _ = crate::structs::AgentSnapshot::export_all();

        // Actions
        let _ = crate::actions::AgentAction::export_all();
        let _ = crate::actions::OutgoingMessage::export_all();
        let _ = crate::actions::StateChanges::export_all();
        let _ = crate::actions::AgentResponse::export_all();
    }
}
