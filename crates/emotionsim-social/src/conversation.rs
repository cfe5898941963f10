//! Conversation lifecycle and round-robin turn allocation.
//!
//! At the start of each tick the engine scans co-locations: two or more
//! active agents sharing a location with no live conversation there get a
//! new one containing exactly those agents. Participants who move away are
//! pruned; below two participants the conversation ends. Two consecutive
//! silent ticks pause it; a participant message resumes it.
//!
//! Conversations are context, not gates: an agent may always speak even
//! out of turn. The manager records turns but never vetoes.

use std::collections::{BTreeMap, BTreeSet};

use emotionsim_types::{AgentId, ConversationId, ConversationStatus, LocationId, MessageId};

use crate::error::SocialError;

/// Ticks of participant silence before a conversation pauses.
const IDLE_TICKS_TO_PAUSE: u64 = 2;

/// Default per-participant turn cap.
pub const DEFAULT_MAX_TURNS_PER_AGENT: u32 = 20;

/// A conversation between co-located agents.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Identifier.
    pub id: ConversationId,
    /// Participants in join order; the round-robin order.
    pub participants: Vec<AgentId>,
    /// Index into `participants` of the agent whose turn it is.
    pub current_speaker_index: usize,
    /// Turns consumed per participant.
    pub turn_counts: BTreeMap<AgentId, u32>,
    /// Per-participant turn cap; exceeding it ends the conversation.
    pub max_turns_per_agent: u32,
    /// Lifecycle status.
    pub status: ConversationStatus,
    /// Where the conversation takes place.
    pub location: LocationId,
    /// The step the conversation was created.
    pub started_at_step: u64,
    /// The step a participant last spoke.
    pub last_message_step: u64,
    /// Message ids forming the transcript.
    pub transcript: Vec<MessageId>,
}

impl Conversation {
    /// The agent whose turn it currently is, if the conversation is live.
    pub fn current_speaker(&self) -> Option<AgentId> {
        if self.participants.is_empty() {
            return None;
        }
        let index = self
            .current_speaker_index
            .checked_rem(self.participants.len())?;
        self.participants.get(index).copied()
    }

    /// Whether the conversation is still live (active or paused).
    pub const fn is_live(&self) -> bool {
        matches!(
            self.status,
            ConversationStatus::Active | ConversationStatus::Paused
        )
    }
}

/// Manages every conversation in a run.
#[derive(Debug, Default)]
pub struct ConversationManager {
    conversations: BTreeMap<ConversationId, Conversation>,
    /// Per-participant turn cap applied to new conversations.
    max_turns_per_agent: u32,
}

impl ConversationManager {
    /// Create a manager with the default turn cap.
    pub const fn new() -> Self {
        Self {
            conversations: BTreeMap::new(),
            max_turns_per_agent: DEFAULT_MAX_TURNS_PER_AGENT,
        }
    }

    /// Create a manager with a custom per-participant turn cap.
    pub const fn with_turn_cap(max_turns_per_agent: u32) -> Self {
        Self {
            conversations: BTreeMap::new(),
            max_turns_per_agent,
        }
    }

    /// All conversations, live and ended.
    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    /// The live conversation an agent participates in, if any.
    pub fn conversation_for(&self, agent: AgentId) -> Option<&Conversation> {
        self.conversations
            .values()
            .find(|conversation| conversation.is_live() && conversation.participants.contains(&agent))
    }

    /// The live conversation at a location, if any.
    pub fn conversation_at(&self, location: &LocationId) -> Option<&Conversation> {
        self.conversations
            .values()
            .find(|conversation| conversation.is_live() && &conversation.location == location)
    }

    /// Tick-start scan: prune departed participants, end undersized
    /// conversations, and create new ones where two or more active agents
    /// share a location without a live conversation.
    ///
    /// `occupancy` maps locations to the active agents there.
    pub fn scan(&mut self, step: u64, occupancy: &BTreeMap<LocationId, Vec<AgentId>>) {
        // Prune participants who left the conversation's location.
        for conversation in self.conversations.values_mut() {
            if !conversation.is_live() {
                continue;
            }
            let here: &[AgentId] = occupancy
                .get(&conversation.location)
                .map_or(&[], Vec::as_slice);
            let speaker = conversation.current_speaker();
            conversation
                .participants
                .retain(|participant| here.contains(participant));
            // Keep the index pointing at the same agent when possible.
            if let Some(speaker) = speaker
                && let Some(index) = conversation
                    .participants
                    .iter()
                    .position(|p| *p == speaker)
            {
                conversation.current_speaker_index = index;
            } else if !conversation.participants.is_empty() {
                conversation.current_speaker_index = conversation
                    .current_speaker_index
                    .checked_rem(conversation.participants.len())
                    .unwrap_or(0);
            }
            if conversation.participants.len() < 2 {
                conversation.status = ConversationStatus::Ended;
                tracing::debug!(conversation = %conversation.id, "conversation ended: participants departed");
            }
        }

        // Create conversations at newly social locations.
        for (location, agents) in occupancy {
            if agents.len() < 2 || self.conversation_at(location).is_some() {
                continue;
            }
            let id = ConversationId::new();
            let conversation = Conversation {
                id,
                participants: agents.clone(),
                current_speaker_index: 0,
                turn_counts: BTreeMap::new(),
                max_turns_per_agent: self.max_turns_per_agent,
                status: ConversationStatus::Active,
                location: location.clone(),
                started_at_step: step,
                last_message_step: step,
                transcript: Vec::new(),
            };
            tracing::debug!(conversation = %id, location = %location, participants = agents.len(), "conversation created");
            self.conversations.insert(id, conversation);
        }
    }

    /// Record that a participant spoke; appends to the transcript and
    /// resumes a paused conversation.
    pub fn note_message(&mut self, agent: AgentId, step: u64, message: MessageId) {
        for conversation in self.conversations.values_mut() {
            if !conversation.is_live() || !conversation.participants.contains(&agent) {
                continue;
            }
            conversation.last_message_step = step;
            conversation.transcript.push(message);
            if conversation.status == ConversationStatus::Paused {
                conversation.status = ConversationStatus::Active;
                tracing::debug!(conversation = %conversation.id, "conversation resumed");
            }
        }
    }

    /// Explicitly join the live conversation at a location.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::NoConversationHere`] when the location has no
    /// live conversation.
    pub fn join(&mut self, agent: AgentId, location: &LocationId) -> Result<(), SocialError> {
        let conversation = self
            .conversations
            .values_mut()
            .find(|conversation| conversation.is_live() && &conversation.location == location)
            .ok_or(SocialError::NoConversationHere(agent))?;
        if !conversation.participants.contains(&agent) {
            conversation.participants.push(agent);
        }
        Ok(())
    }

    /// Explicitly leave the live conversation the agent participates in.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::NoConversationHere`] when the agent has no
    /// live conversation.
    pub fn leave(&mut self, agent: AgentId) -> Result<(), SocialError> {
        let conversation = self
            .conversations
            .values_mut()
            .find(|conversation| conversation.is_live() && conversation.participants.contains(&agent))
            .ok_or(SocialError::NoConversationHere(agent))?;
        let speaker = conversation.current_speaker();
        conversation.participants.retain(|p| *p != agent);
        if let Some(speaker) = speaker
            && speaker != agent
            && let Some(index) = conversation.participants.iter().position(|p| *p == speaker)
        {
            conversation.current_speaker_index = index;
        }
        if conversation.participants.len() < 2 {
            conversation.status = ConversationStatus::Ended;
        }
        Ok(())
    }

    /// End-of-tick advancement: count turns for current speakers who spoke,
    /// advance every live conversation's speaker index (speaking or not, so
    /// nobody starves), pause idle conversations, and end ones whose
    /// participants exhausted their turn caps.
    ///
    /// `spoke` is the set of agents that emitted a non-empty message this
    /// tick.
    pub fn advance(&mut self, step: u64, spoke: &BTreeSet<AgentId>) {
        for conversation in self.conversations.values_mut() {
            if conversation.status != ConversationStatus::Active {
                continue;
            }

            if let Some(speaker) = conversation.current_speaker() {
                if spoke.contains(&speaker) {
                    let count = conversation.turn_counts.entry(speaker).or_insert(0);
                    *count = count.saturating_add(1);
                }
                // Advance regardless of whether the speaker chose to talk.
                let len = conversation.participants.len().max(1);
                conversation.current_speaker_index = conversation
                    .current_speaker_index
                    .saturating_add(1)
                    .checked_rem(len)
                    .unwrap_or(0);
            }

            if conversation
                .turn_counts
                .values()
                .any(|count| *count >= conversation.max_turns_per_agent)
            {
                conversation.status = ConversationStatus::Ended;
                tracing::debug!(conversation = %conversation.id, "conversation ended: turn cap reached");
                continue;
            }

            if step.saturating_sub(conversation.last_message_step) >= IDLE_TICKS_TO_PAUSE {
                conversation.status = ConversationStatus::Paused;
                tracing::debug!(conversation = %conversation.id, "conversation paused: idle");
            }
        }
    }

    /// Drop ended conversations, returning how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let before = self.conversations.len();
        self.conversations
            .retain(|_, conversation| conversation.is_live());
        before.saturating_sub(self.conversations.len())
    }
}
