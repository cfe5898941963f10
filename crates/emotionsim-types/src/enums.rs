//! Enumeration types for the EmotionSim simulation core.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Agent roles
// ---------------------------------------------------------------------------

/// The role an agent plays in a run.
///
/// Roles form a closed set; role-specific capabilities (world mutations,
/// evaluation) are guarded by role checks in the action executor rather
/// than by separate type hierarchies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum AgentRole {
    /// A persona-driven participant scheduled in randomized order each tick.
    Human,
    /// A world-mutating agent that runs before humans every tick.
    Environment,
    /// A scenario-steering agent that runs after humans every tick.
    Designer,
    /// A scoring agent invoked once when the run reaches a terminal step.
    Evaluator,
}

// ---------------------------------------------------------------------------
// Run lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RunStatus {
    /// Allocated but not started.
    Pending,
    /// The tick loop is executing.
    Running,
    /// The tick loop is suspended; `resume` or `step` re-enters it.
    Paused,
    /// Reached `max_steps` or a scenario terminal condition.
    Completed,
    /// An operator issued a stop command.
    Stopped,
    /// Abandoned before start.
    Cancelled,
    /// A fatal error (persistence, invariant violation) halted the run.
    Error,
}

impl RunStatus {
    /// Whether this status is terminal (no further ticks are run).
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Stopped | Self::Cancelled | Self::Error
        )
    }

    /// Whether a transition from `self` to `to` is legal.
    ///
    /// Legal transitions: pending -> running or cancelled; running ->
    /// paused, completed, stopped, or error; paused -> running or stopped.
    /// Terminal statuses admit no transitions.
    pub const fn can_transition(self, to: Self) -> bool {
        match self {
            Self::Pending => matches!(to, Self::Running | Self::Cancelled),
            Self::Running => matches!(
                to,
                Self::Paused | Self::Completed | Self::Stopped | Self::Error
            ),
            Self::Paused => matches!(to, Self::Running | Self::Stopped),
            Self::Completed | Self::Stopped | Self::Cancelled | Self::Error => false,
        }
    }
}

impl core::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A control command accepted by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ControlAction {
    /// Transition pending -> running and begin the tick loop.
    Start,
    /// Transition running -> paused at the next suspension point.
    Pause,
    /// Transition paused -> running.
    Resume,
    /// Transition to stopped; the in-flight agent turn completes first.
    Stop,
    /// From paused: execute exactly one tick, then return to paused.
    Step,
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// How a message is routed by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MessageType {
    /// Delivered to a single agent's inbox.
    Direct,
    /// Delivered to all agents at the target location.
    Room,
    /// Delivered to all active agents in the run.
    Broadcast,
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// Sentiment an agent holds toward another agent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Sentiment {
    /// Warm or trusting disposition.
    Positive,
    /// No strong disposition either way.
    #[default]
    Neutral,
    /// Distrustful or hostile disposition.
    Negative,
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

/// Lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ConversationStatus {
    /// Participants are exchanging messages.
    Active,
    /// No participant has spoken for two consecutive ticks.
    Paused,
    /// Fewer than two participants remain, or the turn cap was reached.
    Ended,
}

// ---------------------------------------------------------------------------
// Cooperation
// ---------------------------------------------------------------------------

/// Lifecycle status of a shared cooperation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum TaskStatus {
    /// Created but not yet accepted by any agent.
    Proposed,
    /// Has at least one assignee.
    InProgress,
    /// Progress reached 100 or an assignee reported completion.
    Completed,
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// The closed set of actions an agent can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ActionType {
    /// Invoke the movement resolver toward a target location.
    Move,
    /// Move an item from the current location into inventory.
    Take,
    /// Move an item from inventory to the current location.
    Drop,
    /// Apply an inventory item's properties (e.g. healing).
    Use,
    /// Free-form interaction with a named target.
    Interact,
    /// Reveal hidden items at the current location.
    Search,
    /// Publish a message (shorthand for the response-level message).
    Speak,
    /// Deliberate no-op.
    Wait,
    /// Deliberate no-op, recorded as introspection.
    Reflect,
    /// Targeted assist: lowers the target's stress and restores health.
    Help,
    /// Join the conversation at the current location.
    JoinConversation,
    /// Leave the conversation at the current location.
    LeaveConversation,
    /// Propose a shared task to the cooperation coordinator.
    ProposeTask,
    /// Accept an existing shared task.
    AcceptTask,
    /// Report progress on an assigned task.
    ReportProgress,
    /// Open a vote visible to all agents for the next tick.
    CallForVote,
    /// Cast a ballot in an open vote.
    CastVote,
    /// Mutate named world-state keys (environment role only).
    EnvironmentUpdate,
    /// Adjust another agent's health or stress (environment role only).
    AffectAgent,
}

impl ActionType {
    /// Whether this action requires the environment role.
    pub const fn requires_environment_role(self) -> bool {
        matches!(self, Self::EnvironmentUpdate | Self::AffectAgent)
    }

    /// The snake_case name of the action, matching its serde encoding.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Take => "take",
            Self::Drop => "drop",
            Self::Use => "use",
            Self::Interact => "interact",
            Self::Search => "search",
            Self::Speak => "speak",
            Self::Wait => "wait",
            Self::Reflect => "reflect",
            Self::Help => "help",
            Self::JoinConversation => "join_conversation",
            Self::LeaveConversation => "leave_conversation",
            Self::ProposeTask => "propose_task",
            Self::AcceptTask => "accept_task",
            Self::ReportProgress => "report_progress",
            Self::CallForVote => "call_for_vote",
            Self::CastVote => "cast_vote",
            Self::EnvironmentUpdate => "environment_update",
            Self::AffectAgent => "affect_agent",
        }
    }
}

impl core::fmt::Display for ActionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The type tag carried by every event envelope on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EventKind {
    /// Sent once to a subscriber immediately after it attaches.
    Connected,
    /// A tick began.
    StepStarted,
    /// A tick finished; carries actions, messages, and metrics.
    StepCompleted,
    /// A message entered the bus.
    Message,
    /// An agent executed (or failed) an action.
    AgentAction,
    /// An agent arrived at a location.
    AgentMoved,
    /// A movement attempt found no path (at most once per pair per tick).
    MovementFailed,
    /// An in-flight journey was replaced by a new destination.
    AgentRerouted,
    /// A multi-hop journey began; carries the full planned path.
    TravelStarted,
    /// An agent advanced one hop of a multi-hop journey.
    AgentTravelling,
    /// A location was created dynamically by naming it.
    LocationCreated,
    /// A free-form interaction occurred.
    AgentInteracted,
    /// An agent's dynamic state changed outside of movement.
    StateChange,
    /// A single LLM output token, forwarded as it arrives.
    StreamToken,
    /// An agent's oracle call failed or timed out; the agent skipped a tick.
    AgentError,
    /// The run's lifecycle status changed (also the `get_status` reply).
    RunStatus,
    /// The run reached a terminal completed state.
    RunCompleted,
    /// The run was stopped by an operator.
    RunStopped,
    /// A fatal engine error.
    Error,
    /// Keep-alive probe.
    Ping,
    /// Keep-alive reply.
    Pong,
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Connected => "connected",
            Self::StepStarted => "step_started",
            Self::StepCompleted => "step_completed",
            Self::Message => "message",
            Self::AgentAction => "agent_action",
            Self::AgentMoved => "agent_moved",
            Self::MovementFailed => "movement_failed",
            Self::AgentRerouted => "agent_rerouted",
            Self::TravelStarted => "travel_started",
            Self::AgentTravelling => "agent_travelling",
            Self::LocationCreated => "location_created",
            Self::AgentInteracted => "agent_interacted",
            Self::StateChange => "state_change",
            Self::StreamToken => "stream_token",
            Self::AgentError => "agent_error",
            Self::RunStatus => "run_status",
            Self::RunCompleted => "run_completed",
            Self::RunStopped => "run_stopped",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Stopped.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Error.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
    }

    #[test]
    fn legal_transitions() {
        assert!(RunStatus::Pending.can_transition(RunStatus::Running));
        assert!(RunStatus::Pending.can_transition(RunStatus::Cancelled));
        assert!(RunStatus::Running.can_transition(RunStatus::Paused));
        assert!(RunStatus::Running.can_transition(RunStatus::Completed));
        assert!(RunStatus::Running.can_transition(RunStatus::Stopped));
        assert!(RunStatus::Running.can_transition(RunStatus::Error));
        assert!(RunStatus::Paused.can_transition(RunStatus::Running));
        assert!(RunStatus::Paused.can_transition(RunStatus::Stopped));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!RunStatus::Pending.can_transition(RunStatus::Paused));
        assert!(!RunStatus::Paused.can_transition(RunStatus::Completed));
        assert!(!RunStatus::Completed.can_transition(RunStatus::Running));
        assert!(!RunStatus::Stopped.can_transition(RunStatus::Running));
        assert!(!RunStatus::Error.can_transition(RunStatus::Paused));
    }

    #[test]
    fn action_type_snake_case_serde() {
        let json = serde_json::to_string(&ActionType::JoinConversation).unwrap_or_default();
        assert_eq!(json, "\"join_conversation\"");
        let back: Result<ActionType, _> = serde_json::from_str("\"environment_update\"");
        assert_eq!(back.ok(), Some(ActionType::EnvironmentUpdate));
    }

    #[test]
    fn environment_gated_actions() {
        assert!(ActionType::EnvironmentUpdate.requires_environment_role());
        assert!(ActionType::AffectAgent.requires_environment_role());
        assert!(!ActionType::Move.requires_environment_role());
        assert!(!ActionType::Help.requires_environment_role());
    }

    #[test]
    fn event_kind_display_matches_serde() {
        let kinds = [
            EventKind::StepStarted,
            EventKind::StreamToken,
            EventKind::MovementFailed,
            EventKind::RunCompleted,
        ];
        for kind in kinds {
            let display = kind.to_string();
            let json = serde_json::to_string(&kind).unwrap_or_default();
            assert_eq!(json, format!("\"{display}\""));
        }
    }
}
