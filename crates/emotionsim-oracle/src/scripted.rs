//! Deterministic scripted oracle for tests and offline runs.
//!
//! Canned responses are queued per agent name and replayed in order; when
//! an agent's queue is empty the default response (a skip, unless
//! overridden) is returned. Tokens are emitted by splitting the serialized
//! response on whitespace, so token-stream plumbing is exercised end to
//! end without a network.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use emotionsim_types::AgentResponse;

use crate::error::OracleError;

/// A scripted oracle with per-agent response queues.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    scripts: Mutex<BTreeMap<String, VecDeque<AgentResponse>>>,
    default: AgentResponse,
    /// When `true`, an exhausted queue is an error instead of the default.
    strict: bool,
}

impl ScriptedOracle {
    /// Create a scripted oracle whose default is a skipped turn.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scripted oracle that errors when a queue runs dry.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// Replace the default response returned when a queue is empty.
    #[must_use]
    pub fn with_default(mut self, response: AgentResponse) -> Self {
        self.default = response;
        self
    }

    /// Queue a response for an agent (FIFO per agent).
    pub fn push_response(&self, agent: &str, response: AgentResponse) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts
                .entry(agent.to_owned())
                .or_default()
                .push_back(response);
        }
    }

    /// Produce the next response for an agent, forwarding synthetic tokens.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::ScriptExhausted`] in strict mode when the
    /// agent's queue is empty.
    pub fn generate(
        &self,
        agent: &str,
        on_token: &(dyn Fn(&str) + Send + Sync),
    ) -> Result<AgentResponse, OracleError> {
        let next = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.get_mut(agent).and_then(VecDeque::pop_front));

        let response = match next {
            Some(response) => response,
            None if self.strict => return Err(OracleError::ScriptExhausted(agent.to_owned())),
            None => self.default.clone(),
        };

        let serialized = serde_json::to_string(&response).unwrap_or_default();
        for token in serialized.split_whitespace() {
            on_token(token);
        }

        Ok(response)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use emotionsim_types::{ActionType, AgentAction};

    use super::*;

    fn move_response(target: &str) -> AgentResponse {
        AgentResponse {
            actions: vec![AgentAction::targeted(ActionType::Move, target)],
            ..AgentResponse::default()
        }
    }

    #[test]
    fn responses_replay_in_order() {
        let oracle = ScriptedOracle::new();
        oracle.push_response("Ada", move_response("a"));
        oracle.push_response("Ada", move_response("b"));

        let sink = |_: &str| {};
        let first = oracle.generate("Ada", &sink).unwrap();
        let second = oracle.generate("Ada", &sink).unwrap();
        assert_eq!(first.actions.first().and_then(|a| a.target.as_deref()), Some("a"));
        assert_eq!(second.actions.first().and_then(|a| a.target.as_deref()), Some("b"));
    }

    #[test]
    fn empty_queue_yields_default_skip() {
        let oracle = ScriptedOracle::new();
        let sink = |_: &str| {};
        let response = oracle.generate("Nobody", &sink).unwrap();
        assert!(response.is_empty());
    }

    #[test]
    fn strict_mode_errors_when_exhausted() {
        let oracle = ScriptedOracle::strict();
        let sink = |_: &str| {};
        assert!(matches!(
            oracle.generate("Ada", &sink),
            Err(OracleError::ScriptExhausted(_))
        ));
    }

    #[test]
    fn tokens_are_forwarded() {
        let oracle = ScriptedOracle::new();
        oracle.push_response("Ada", move_response("shelter"));
        let tokens = StdMutex::new(Vec::new());
        let sink = |token: &str| {
            if let Ok(mut guard) = tokens.lock() {
                guard.push(token.to_owned());
            }
        };
        let _ = oracle.generate("Ada", &sink).unwrap();
        let collected = tokens.lock().unwrap();
        assert!(!collected.is_empty());
        assert!(collected.join(" ").contains("shelter"));
    }

    #[test]
    fn queues_are_per_agent() {
        let oracle = ScriptedOracle::new();
        oracle.push_response("Ada", move_response("a"));
        let sink = |_: &str| {};
        let other = oracle.generate("Ben", &sink).unwrap();
        assert!(other.is_empty());
        let ada = oracle.generate("Ada", &sink).unwrap();
        assert!(!ada.is_empty());
    }
}
