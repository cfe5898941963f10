//! Data layer (`PostgreSQL`) for the EmotionSim simulation.
//!
//! Five entities are persisted: scenarios, runs, agent snapshots, step
//! records, and messages. Step N's record and all of step N's messages
//! commit in one transaction. The store also implements the engine's
//! [`StepSink`] so the run loop writes through it directly.
//!
//! [`StepSink`]: emotionsim_core::StepSink

pub mod error;
pub mod store;

// Re-export primary types at crate root.
pub use error::DbError;
pub use store::{PostgresConfig, SimStore};
