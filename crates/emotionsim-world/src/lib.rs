//! Geography and world state for the EmotionSim simulation.
//!
//! This crate models the physical world: locations as a graph with
//! declaration-ordered adjacency, depth-capped breadth-first pathfinding,
//! dynamic location creation, item containers, and the engine-owned typed
//! world state.
//!
//! # Modules
//!
//! - [`error`] -- Error types for world operations.
//! - [`graph`] -- The world graph with pathfinding and item containers.
//! - [`movement`] -- The `move` action resolver and failed-movement cache.
//! - [`state`] -- Typed world state with reserved keys and dynamics bounds.

pub mod error;
pub mod graph;
pub mod movement;
pub mod state;

// Re-export primary types at crate root.
pub use error::WorldError;
pub use graph::{MAX_SEARCH_DEPTH, WorldGraph};
pub use movement::{MoveOutcome, MovementResolver};
pub use state::WorldState;
