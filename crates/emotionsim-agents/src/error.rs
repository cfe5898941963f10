//! Error types for the `emotionsim-agents` crate.

use emotionsim_types::AgentId;

/// Errors that can occur during agent-level operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent was not found in the run.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// A named agent could not be resolved to an id.
    #[error("unknown agent name: {0}")]
    UnknownAgentName(String),

    /// The action requires a target and none was supplied.
    #[error("action {action} requires a target")]
    MissingTarget {
        /// The action type name.
        action: String,
    },

    /// The agent lacks the role required by the action.
    #[error("action {action} requires the environment role")]
    InsufficientPermission {
        /// The action type name.
        action: String,
    },

    /// A world operation failed.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: emotionsim_world::WorldError,
    },
}
