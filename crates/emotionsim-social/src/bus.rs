//! The message bus: an ordered log with per-agent inbox views.
//!
//! Routing by type: `direct` delivers to one agent, `room` to every agent
//! the caller found at the target location, `broadcast` to every active
//! agent. The bus itself does not know where agents are; the engine
//! computes the recipient set at publish time, which is also what makes
//! same-tick delivery visible to agents processed later in the tick.
//!
//! History is insertion-ordered by `(step_index, seq)` where `seq` is a
//! per-run monotonically increasing publish counter. No message is ever
//! dropped; the log is unbounded per run.

use chrono::Utc;
use serde_json::Value;

use emotionsim_types::{AgentId, LocationId, MessageId, MessageRecord, MessageType};

/// Routing target resolved by the engine before publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTarget {
    /// A single agent.
    Agent(AgentId),
    /// Every agent currently at a location.
    Room(LocationId),
    /// Every active agent in the run.
    Broadcast,
}

impl MessageTarget {
    /// The `to_target` label stored on the persisted record.
    pub fn label(&self) -> String {
        match self {
            Self::Agent(id) => id.to_string(),
            Self::Room(id) => id.to_string(),
            Self::Broadcast => "broadcast".to_owned(),
        }
    }

    /// The message type implied by the target.
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Agent(_) => MessageType::Direct,
            Self::Room(_) => MessageType::Room,
            Self::Broadcast => MessageType::Broadcast,
        }
    }
}

/// Filter for history queries. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Only messages sent by or delivered to this agent.
    pub agent: Option<AgentId>,
    /// Only room messages addressed to this location.
    pub room: Option<LocationId>,
    /// Only messages from steps at or after this index.
    pub from_step: Option<u64>,
    /// Only messages from steps at or before this index.
    pub to_step: Option<u64>,
}

/// The per-run message bus.
#[derive(Debug, Default)]
pub struct MessageBus {
    /// The ordered log.
    log: Vec<MessageRecord>,
    /// Recipient sets parallel to `log`.
    recipients: Vec<Vec<AgentId>>,
    /// Next publish sequence number.
    seq: u64,
}

impl MessageBus {
    /// Create an empty bus.
    pub const fn new() -> Self {
        Self {
            log: Vec::new(),
            recipients: Vec::new(),
            seq: 0,
        }
    }

    /// Publish a message to the resolved recipient set.
    ///
    /// Returns a clone of the stored record for event emission and
    /// persistence.
    pub fn publish(
        &mut self,
        from: AgentId,
        target: &MessageTarget,
        content: impl Into<String>,
        metadata: Value,
        step: u64,
        recipients: Vec<AgentId>,
    ) -> MessageRecord {
        let record = MessageRecord {
            id: MessageId::new(),
            from_agent: from,
            to_target: target.label(),
            message_type: target.message_type(),
            content: content.into(),
            metadata,
            step_index: step,
            seq: self.seq,
            timestamp: Utc::now(),
        };
        self.seq = self.seq.saturating_add(1);
        self.log.push(record.clone());
        self.recipients.push(recipients);
        record
    }

    /// Total number of messages in the log.
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// All messages delivered to an agent, insertion-ordered.
    pub fn inbox(&self, agent: AgentId) -> Vec<&MessageRecord> {
        self.log
            .iter()
            .zip(self.recipients.iter())
            .filter(|(_, recipients)| recipients.contains(&agent))
            .map(|(record, _)| record)
            .collect()
    }

    /// The last `n` inbox messages for an agent, insertion-ordered.
    pub fn inbox_tail(&self, agent: AgentId, n: usize) -> Vec<&MessageRecord> {
        let inbox = self.inbox(agent);
        let skip = inbox.len().saturating_sub(n);
        inbox.into_iter().skip(skip).collect()
    }

    /// Look up one message by id.
    pub fn message_by_id(&self, id: MessageId) -> Option<&MessageRecord> {
        self.log.iter().find(|record| record.id == id)
    }

    /// Messages published during a specific step, insertion-ordered.
    pub fn messages_for_step(&self, step: u64) -> Vec<&MessageRecord> {
        self.log
            .iter()
            .filter(|record| record.step_index == step)
            .collect()
    }

    /// Query the log with a filter. Results are insertion-ordered by
    /// `(step_index, seq)`, which is also physical log order.
    pub fn history(&self, filter: &HistoryFilter) -> Vec<&MessageRecord> {
        self.log
            .iter()
            .zip(self.recipients.iter())
            .filter(|(record, recipients)| {
                if let Some(agent) = filter.agent
                    && record.from_agent != agent
                    && !recipients.contains(&agent)
                {
                    return false;
                }
                if let Some(room) = &filter.room
                    && (record.message_type != MessageType::Room
                        || record.to_target != room.as_str())
                {
                    return false;
                }
                if let Some(from_step) = filter.from_step
                    && record.step_index < from_step
                {
                    return false;
                }
                if let Some(to_step) = filter.to_step
                    && record.step_index > to_step
                {
                    return false;
                }
                true
            })
            .map(|(record, _)| record)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn publish_simple(
        bus: &mut MessageBus,
        from: AgentId,
        target: &MessageTarget,
        content: &str,
        step: u64,
        recipients: Vec<AgentId>,
    ) -> MessageRecord {
        bus.publish(from, target, content, Value::Null, step, recipients)
    }

    #[test]
    fn direct_message_reaches_only_target_inbox() {
        let mut bus = MessageBus::new();
        let sender = AgentId::new();
        let receiver = AgentId::new();
        let bystander = AgentId::new();

        let _ = publish_simple(
            &mut bus,
            sender,
            &MessageTarget::Agent(receiver),
            "hi",
            1,
            vec![receiver],
        );

        assert_eq!(bus.inbox(receiver).len(), 1);
        assert!(bus.inbox(bystander).is_empty());
    }

    #[test]
    fn room_message_reaches_all_occupants() {
        let mut bus = MessageBus::new();
        let sender = AgentId::new();
        let a = AgentId::new();
        let b = AgentId::new();

        let record = publish_simple(
            &mut bus,
            sender,
            &MessageTarget::Room(LocationId::from("room1")),
            "hello room",
            1,
            vec![a, b],
        );

        assert_eq!(record.message_type, MessageType::Room);
        assert_eq!(record.to_target, "room1");
        assert_eq!(bus.inbox(a).len(), 1);
        assert_eq!(bus.inbox(b).len(), 1);
    }

    #[test]
    fn broadcast_label_is_the_token() {
        let mut bus = MessageBus::new();
        let sender = AgentId::new();
        let record = publish_simple(&mut bus, sender, &MessageTarget::Broadcast, "all", 1, vec![]);
        assert_eq!(record.to_target, "broadcast");
        assert_eq!(record.message_type, MessageType::Broadcast);
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let mut bus = MessageBus::new();
        let sender = AgentId::new();
        for step in 1..=3u64 {
            let _ = publish_simple(&mut bus, sender, &MessageTarget::Broadcast, "m", step, vec![]);
        }
        let seqs: Vec<u64> = bus
            .history(&HistoryFilter::default())
            .iter()
            .map(|record| record.seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn inbox_tail_returns_most_recent() {
        let mut bus = MessageBus::new();
        let sender = AgentId::new();
        let receiver = AgentId::new();
        for i in 0..5 {
            let _ = publish_simple(
                &mut bus,
                sender,
                &MessageTarget::Agent(receiver),
                &format!("m{i}"),
                1,
                vec![receiver],
            );
        }
        let tail = bus.inbox_tail(receiver, 2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.first().map(|m| m.content.as_str()), Some("m3"));
        assert_eq!(tail.last().map(|m| m.content.as_str()), Some("m4"));
    }

    #[test]
    fn history_filters_by_agent() {
        let mut bus = MessageBus::new();
        let a = AgentId::new();
        let b = AgentId::new();
        let c = AgentId::new();
        let _ = publish_simple(&mut bus, a, &MessageTarget::Agent(b), "a->b", 1, vec![b]);
        let _ = publish_simple(&mut bus, c, &MessageTarget::Agent(b), "c->b", 1, vec![b]);
        let _ = publish_simple(&mut bus, c, &MessageTarget::Agent(a), "c->a", 2, vec![a]);

        // Agent a: one sent, one received.
        let for_a = bus.history(&HistoryFilter {
            agent: Some(a),
            ..HistoryFilter::default()
        });
        assert_eq!(for_a.len(), 2);
    }

    #[test]
    fn history_filters_by_room_and_step_range() {
        let mut bus = MessageBus::new();
        let sender = AgentId::new();
        let room = MessageTarget::Room(LocationId::from("hall"));
        let _ = publish_simple(&mut bus, sender, &room, "early", 1, vec![]);
        let _ = publish_simple(&mut bus, sender, &room, "late", 5, vec![]);
        let _ = publish_simple(&mut bus, sender, &MessageTarget::Broadcast, "noise", 3, vec![]);

        let filtered = bus.history(&HistoryFilter {
            room: Some(LocationId::from("hall")),
            from_step: Some(2),
            to_step: Some(9),
            ..HistoryFilter::default()
        });
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.first().map(|m| m.content.as_str()), Some("late"));
    }

    #[test]
    fn messages_for_step_selects_tick() {
        let mut bus = MessageBus::new();
        let sender = AgentId::new();
        let _ = publish_simple(&mut bus, sender, &MessageTarget::Broadcast, "one", 1, vec![]);
        let _ = publish_simple(&mut bus, sender, &MessageTarget::Broadcast, "two", 2, vec![]);
        assert_eq!(bus.messages_for_step(2).len(), 1);
    }
}
