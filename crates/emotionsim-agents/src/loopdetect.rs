//! Behavioral loop detection.
//!
//! Keeps a short window of the agent's recent `(action, target)` pairs and
//! conversation topics. When the same pair fills three of the last five
//! slots (or the same topic recurs three times), an advisory suggestion is
//! produced for the agent's next context. The detector never filters or
//! rewrites the agent's output.

use std::collections::VecDeque;

/// Window length for both action pairs and topics.
pub const LOOP_WINDOW: usize = 5;

/// Occurrences within the window that count as a loop.
pub const LOOP_THRESHOLD: usize = 3;

/// Number of leading words kept when summarizing a topic.
const TOPIC_WORDS: usize = 5;

/// Per-agent loop tracking state.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct LoopTracker {
    /// Recent `(action, target)` pairs, oldest first.
    actions: VecDeque<(String, String)>,
    /// Recent summarized topics, oldest first.
    topics: VecDeque<String>,
}

impl LoopTracker {
    /// Create an empty tracker.
    pub const fn new() -> Self {
        Self {
            actions: VecDeque::new(),
            topics: VecDeque::new(),
        }
    }

    /// Record an executed action and its target.
    pub fn record_action(&mut self, action: &str, target: Option<&str>) {
        if self.actions.len() >= LOOP_WINDOW {
            self.actions.pop_front();
        }
        self.actions
            .push_back((action.to_owned(), target.unwrap_or_default().to_owned()));
    }

    /// Record a message's topic (summarized to its leading words).
    pub fn record_topic(&mut self, content: &str) {
        let topic = summarize_topic(content);
        if topic.is_empty() {
            return;
        }
        if self.topics.len() >= LOOP_WINDOW {
            self.topics.pop_front();
        }
        self.topics.push_back(topic);
    }

    /// The advisory suggestion for the next context, if a loop is present.
    pub fn suggestion(&self) -> Option<String> {
        if let Some((action, target)) = most_frequent(self.actions.iter()) {
            let label = if target.is_empty() {
                action.clone()
            } else {
                format!("{action} {target}")
            };
            return Some(format!(
                "you appear to be repeating {label}; consider a different approach"
            ));
        }
        if let Some(topic) = most_frequent(self.topics.iter()) {
            return Some(format!(
                "you appear to be repeating the topic \"{topic}\"; consider moving the conversation forward"
            ));
        }
        None
    }
}

/// Return the first element that occurs at least [`LOOP_THRESHOLD`] times.
fn most_frequent<'a, T: PartialEq + 'a>(items: impl Iterator<Item = &'a T> + Clone) -> Option<&'a T> {
    let mut seen: Vec<(&T, usize)> = Vec::new();
    for item in items {
        match seen.iter_mut().find(|(candidate, _)| *candidate == item) {
            Some((_, count)) => *count = count.saturating_add(1),
            None => seen.push((item, 1)),
        }
    }
    seen.into_iter()
        .find(|(_, count)| *count >= LOOP_THRESHOLD)
        .map(|(item, _)| item)
}

/// Reduce free-form message content to a comparable topic key.
fn summarize_topic(content: &str) -> String {
    content
        .split_whitespace()
        .take(TOPIC_WORDS)
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
