//! The EmotionSim simulation engine.
//!
//! One cooperative scheduler per run: a deterministic tick loop that
//! drives environment, human, and designer agents in order, routes their
//! messages, mutates the shared world, streams every event, and persists
//! one atomic step record per tick.
//!
//! # Modules
//!
//! - [`control`] -- Run control state machine (start/pause/resume/stop/step).
//! - [`context`] -- Per-tick context assembly for agent prompts.
//! - [`engine`] -- The bounded run loop around the tick procedure.
//! - [`error`] -- Error types for engine operations.
//! - [`scenario`] -- Scenario validation and run instantiation.
//! - [`sink`] -- The persistence boundary (trait + in-memory sink).
//! - [`tick`] -- The single-tick procedure.

pub mod context;
pub mod control;
pub mod engine;
pub mod error;
pub mod scenario;
pub mod sink;
pub mod tick;

// Re-export primary types at crate root.
pub use context::build_agent_context;
pub use control::RunControl;
pub use engine::{EngineConfig, SimulationResult, run_simulation};
pub use error::EngineError;
pub use scenario::{SimulationState, instantiate};
pub use sink::{MemorySink, SinkError, StepSink};
pub use tick::{TickContext, TickOutcome, run_tick};
