//! The agent response schema: actions, outgoing message, state deltas.
//!
//! This is the authoritative shape the oracle must produce. The engine
//! treats the oracle as untrusted, so every field is validated on the way
//! in (unknown action types are rejected at parse time; targets and deltas
//! are re-checked at execution time).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ActionType, MessageType};

/// One action emitted by an agent. Applied in emission order; a failure
/// does not abort subsequent actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentAction {
    /// What to do.
    pub action_type: ActionType,
    /// The target: a location id for `move`, an item id for `take`/`drop`/
    /// `use`, an agent name for `help`/`affect_agent`, a task id for the
    /// cooperation actions.
    #[serde(default)]
    pub target: Option<String>,
    /// Action-specific parameters (e.g. `environment_update` key deltas,
    /// `propose_task` priority and skills).
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl AgentAction {
    /// Convenience constructor for a targeted action without parameters.
    pub fn targeted(action_type: ActionType, target: impl Into<String>) -> Self {
        Self {
            action_type,
            target: Some(target.into()),
            parameters: serde_json::Value::Null,
        }
    }

    /// Convenience constructor for an untargeted action.
    pub const fn bare(action_type: ActionType) -> Self {
        Self {
            action_type,
            target: None,
            parameters: serde_json::Value::Null,
        }
    }
}

/// The message an agent chose to send this tick, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct OutgoingMessage {
    /// Message body. An empty body counts as "chose not to speak" for
    /// conversation turn accounting.
    pub content: String,
    /// Agent name, location id, or the token `broadcast`.
    pub to_target: String,
    /// Routing class.
    pub message_type: MessageType,
    /// Free-form metadata forwarded to the bus.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Bounded self-reported deltas applied after actions.
///
/// Deltas are clamped so that health and stress stay in 0..=10; anything
/// else the oracle reports here is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StateChanges {
    /// Signed health delta.
    #[serde(default)]
    pub health: Option<i8>,
    /// Signed stress delta.
    #[serde(default)]
    pub stress: Option<i8>,
}

impl StateChanges {
    /// Whether the delta set is empty.
    pub const fn is_empty(&self) -> bool {
        self.health.is_none() && self.stress.is_none()
    }
}

/// The full parsed response for one agent turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentResponse {
    /// Actions, applied in order.
    #[serde(default)]
    pub actions: Vec<AgentAction>,
    /// Message to publish after actions and state changes, if any.
    #[serde(default)]
    pub message: Option<OutgoingMessage>,
    /// Self-reported state deltas.
    #[serde(default)]
    pub state_changes: StateChanges,
    /// Free-form reasoning; logged, never interpreted.
    #[serde(default)]
    pub reasoning: String,
}

impl AgentResponse {
    /// A response representing a skipped turn: no actions, no message.
    pub fn skip() -> Self {
        Self::default()
    }

    /// Whether this response does anything at all.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.message.is_none() && self.state_changes.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn response_deserializes_with_all_defaults() {
        let response: AgentResponse = serde_json::from_str("{}").unwrap();
        assert!(response.is_empty());
        assert!(response.reasoning.is_empty());
    }

    #[test]
    fn response_with_actions_and_message() {
        let json = r#"{
            "actions": [
                {"action_type": "move", "target": "shelter"},
                {"action_type": "take", "target": "medkit"}
            ],
            "message": {
                "content": "heading to the shelter",
                "to_target": "broadcast",
                "message_type": "broadcast"
            },
            "state_changes": {"stress": -1},
            "reasoning": "the hazard level is rising"
        }"#;
        let response: AgentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.actions.len(), 2);
        assert_eq!(
            response.actions.first().map(|a| a.action_type),
            Some(ActionType::Move)
        );
        assert_eq!(response.state_changes.stress, Some(-1));
        assert_eq!(
            response.message.as_ref().map(|m| m.message_type),
            Some(MessageType::Broadcast)
        );
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        let json = r#"{"actions": [{"action_type": "teleport"}]}"#;
        let response: Result<AgentResponse, _> = serde_json::from_str(json);
        assert!(response.is_err());
    }

    #[test]
    fn skip_is_empty() {
        assert!(AgentResponse::skip().is_empty());
    }
}
