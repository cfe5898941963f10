//! Per-agent memory: episodic window, relationship ledger, arrival context.
//!
//! The episodic log is a bounded sliding window (default 50 entries). The
//! relationship map tracks trust, sentiment, and interaction counts per
//! other agent. Both feed context assembly; neither is consulted by the
//! engine for control decisions.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};

use emotionsim_types::{AgentId, MemoryEvent, Relationship, Sentiment};

/// Maximum number of episodic entries retained per agent.
pub const EPISODE_WINDOW: usize = 50;

/// Maximum number of conversation excerpts retained per agent.
const EXCERPT_WINDOW: usize = 10;

/// Maximum number of notes retained per relationship.
const NOTE_WINDOW: usize = 8;

/// An agent's private memory.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AgentMemory {
    /// Episodic log, oldest first, capped at [`EPISODE_WINDOW`].
    episodes: VecDeque<MemoryEvent>,
    /// What this agent believes about every other agent it interacted with.
    relationships: BTreeMap<AgentId, Relationship>,
    /// Why/how the agent arrived in the scenario; set once at run start.
    pub arrival_context: String,
    /// Recent conversation excerpts, oldest first.
    excerpts: VecDeque<String>,
}

impl AgentMemory {
    /// Create an empty memory with the given arrival context.
    pub fn new(arrival_context: impl Into<String>) -> Self {
        Self {
            arrival_context: arrival_context.into(),
            ..Self::default()
        }
    }

    // -----------------------------------------------------------------------
    // Episodic log
    // -----------------------------------------------------------------------

    /// Record an episodic event, evicting the oldest entry past the window.
    pub fn record(&mut self, step: u64, kind: &str, summary: impl Into<String>) {
        if self.episodes.len() >= EPISODE_WINDOW {
            self.episodes.pop_front();
        }
        self.episodes.push_back(MemoryEvent {
            step,
            kind: kind.to_owned(),
            summary: summary.into(),
        });
    }

    /// All retained episodes, oldest first.
    pub fn episodes(&self) -> impl Iterator<Item = &MemoryEvent> {
        self.episodes.iter()
    }

    /// The most recent `n` episodes, oldest first.
    pub fn recent_episodes(&self, n: usize) -> Vec<&MemoryEvent> {
        let skip = self.episodes.len().saturating_sub(n);
        self.episodes.iter().skip(skip).collect()
    }

    /// Number of retained episodes.
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    /// Whether the episodic log is empty.
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    // -----------------------------------------------------------------------
    // Relationships
    // -----------------------------------------------------------------------

    /// Record an interaction with another agent, bumping the counter and
    /// timestamp and appending an optional note.
    pub fn note_interaction(
        &mut self,
        other: AgentId,
        note: Option<String>,
        at: DateTime<Utc>,
    ) {
        let rel = self.relationships.entry(other).or_default();
        rel.interaction_count = rel.interaction_count.saturating_add(1);
        rel.last_interaction = Some(at);
        if let Some(note) = note {
            if rel.notes.len() >= NOTE_WINDOW {
                rel.notes.remove(0);
            }
            rel.notes.push(note);
        }
    }

    /// Adjust trust toward another agent, clamped to 0..=10, and refresh
    /// the sentiment from the new trust level (0..=3 negative, 4..=6
    /// neutral, 7..=10 positive).
    pub fn adjust_trust(&mut self, other: AgentId, delta: i8) {
        let rel = self.relationships.entry(other).or_default();
        let trust = i16::from(rel.trust_level)
            .saturating_add(i16::from(delta))
            .clamp(0, 10);
        rel.trust_level = u8::try_from(trust).unwrap_or(0);
        rel.sentiment = match rel.trust_level {
            0..=3 => Sentiment::Negative,
            4..=6 => Sentiment::Neutral,
            _ => Sentiment::Positive,
        };
    }

    /// The relationship toward another agent, if any interaction happened.
    pub fn relationship(&self, other: &AgentId) -> Option<&Relationship> {
        self.relationships.get(other)
    }

    /// Iterate over all relationships.
    pub fn relationships(&self) -> impl Iterator<Item = (&AgentId, &Relationship)> {
        self.relationships.iter()
    }

    // -----------------------------------------------------------------------
    // Conversation excerpts
    // -----------------------------------------------------------------------

    /// Keep a conversation excerpt for context assembly.
    pub fn add_excerpt(&mut self, excerpt: impl Into<String>) {
        if self.excerpts.len() >= EXCERPT_WINDOW {
            self.excerpts.pop_front();
        }
        self.excerpts.push_back(excerpt.into());
    }

    /// Retained excerpts, oldest first.
    pub fn excerpts(&self) -> impl Iterator<Item = &String> {
        self.excerpts.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn episodes_evict_past_window() {
        let mut memory = AgentMemory::default();
        for step in 0..60u64 {
            memory.record(step, "action", format!("did thing {step}"));
        }
        assert_eq!(memory.len(), EPISODE_WINDOW);
        // The oldest retained entry is step 10 (0..=9 were evicted).
        assert_eq!(memory.episodes().next().map(|e| e.step), Some(10));
    }

    #[test]
    fn recent_episodes_returns_tail() {
        let mut memory = AgentMemory::default();
        for step in 0..5u64 {
            memory.record(step, "action", format!("step {step}"));
        }
        let recent = memory.recent_episodes(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent.first().map(|e| e.step), Some(3));
        assert_eq!(recent.last().map(|e| e.step), Some(4));
    }

    #[test]
    fn interaction_bumps_counter_and_timestamp() {
        let mut memory = AgentMemory::default();
        let other = AgentId::new();
        let now = Utc::now();
        memory.note_interaction(other, Some("shared supplies".to_owned()), now);
        memory.note_interaction(other, None, now);
        let rel = memory.relationship(&other).unwrap();
        assert_eq!(rel.interaction_count, 2);
        assert_eq!(rel.last_interaction, Some(now));
        assert_eq!(rel.notes.len(), 1);
    }

    #[test]
    fn trust_clamps_and_updates_sentiment() {
        let mut memory = AgentMemory::default();
        let other = AgentId::new();
        memory.adjust_trust(other, 30);
        assert_eq!(memory.relationship(&other).unwrap().trust_level, 10);
        assert_eq!(
            memory.relationship(&other).unwrap().sentiment,
            Sentiment::Positive
        );
        memory.adjust_trust(other, -30);
        assert_eq!(memory.relationship(&other).unwrap().trust_level, 0);
        assert_eq!(
            memory.relationship(&other).unwrap().sentiment,
            Sentiment::Negative
        );
    }

    #[test]
    fn excerpts_bounded() {
        let mut memory = AgentMemory::default();
        for i in 0..20 {
            memory.add_excerpt(format!("line {i}"));
        }
        assert_eq!(memory.excerpts().count(), 10);
    }

    #[test]
    fn arrival_context_set_at_construction() {
        let memory = AgentMemory::new("woke up in the shelter");
        assert_eq!(memory.arrival_context, "woke up in the shelter");
    }
}
