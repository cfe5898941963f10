//! Error types for the `emotionsim-core` crate.

use emotionsim_types::{AgentId, ControlAction, RunStatus};

/// Errors that can occur in the engine and its control surface.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A control command was issued in a status that does not accept it.
    #[error("control action {action:?} is not valid from status {from}")]
    InvalidTransition {
        /// The status the run was in.
        from: RunStatus,
        /// The rejected command.
        action: ControlAction,
    },

    /// The scenario failed validation at instantiation time.
    #[error("invalid scenario: {0}")]
    Scenario(String),

    /// An agent referenced by the tick loop is missing from the run.
    #[error("agent not found: {0}")]
    AgentMissing(AgentId),

    /// A world operation failed fatally (invariant violation).
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: emotionsim_world::WorldError,
    },

    /// Persistence failed after the retry; the run transitions to `error`.
    #[error("persistence error: {0}")]
    Persistence(String),
}
