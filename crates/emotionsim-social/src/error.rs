//! Error types for the `emotionsim-social` crate.

use emotionsim_types::{AgentId, ConversationId, TaskId, VoteId};

/// Errors that can occur in the bus, conversation, or cooperation layers.
#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The agent is not assigned to the task it reported progress on.
    #[error("agent {agent} is not assigned to task {task}")]
    NotAssigned {
        /// The reporting agent.
        agent: AgentId,
        /// The task.
        task: TaskId,
    },

    /// The vote does not exist.
    #[error("vote not found: {0}")]
    VoteNotFound(VoteId),

    /// The vote has already closed.
    #[error("vote {0} is closed")]
    VoteClosed(VoteId),

    /// The ballot named an option the vote does not offer.
    #[error("vote {vote} has no option {option:?}")]
    InvalidOption {
        /// The vote.
        vote: VoteId,
        /// The rejected option.
        option: String,
    },

    /// A vote was opened without options.
    #[error("a vote requires at least one option")]
    NoOptions,

    /// The conversation does not exist.
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// The agent has no live conversation at its location to join or leave.
    #[error("agent {0} has no conversation at its location")]
    NoConversationHere(AgentId),
}
