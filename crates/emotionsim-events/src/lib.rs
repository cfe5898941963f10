//! Event stream plumbing for the EmotionSim simulation.
//!
//! Every observable occurrence is wrapped in an [`EventEnvelope`] --
//! `{event, data, timestamp}` -- and fanned out to subscribers by the
//! [`EventEmitter`]. Each subscriber owns a bounded buffer; delivery is
//! awaited by the engine, so a full buffer applies backpressure (the
//! engine blocks, never drops). A subscriber whose receiving end is gone
//! is logged and removed; its failure never reaches the engine loop.
//!
//! Per-step ordering is the engine's contract: `step_started` precedes all
//! step-scoped events, which precede `step_completed`. The emitter
//! preserves that order per subscriber because delivery is sequential.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use ts_rs::TS;

use emotionsim_types::EventKind;

/// Default per-subscriber buffer capacity.
pub const DEFAULT_BUFFER: usize = 256;

/// The wire envelope delivered to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventEnvelope {
    /// The event type tag.
    pub event: EventKind,
    /// Event-specific payload.
    pub data: serde_json::Value,
    /// Wall-clock emission time (ISO-8601 on the wire).
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Build an envelope stamped with the current time.
    pub fn now(event: EventKind, data: serde_json::Value) -> Self {
        Self {
            event,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// One subscriber's registration.
#[derive(Debug)]
struct Subscriber {
    id: u64,
    sender: mpsc::Sender<EventEnvelope>,
}

/// A subscriber's receiving end.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next envelope, or `None` when the emitter is gone.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.receiver.recv().await
    }

    /// Non-blocking receive for drain loops.
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.receiver.try_recv().ok()
    }
}

/// Fan-out registry of event subscribers.
#[derive(Debug)]
pub struct EventEmitter {
    subscribers: Vec<Subscriber>,
    buffer: usize,
    next_id: u64,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl EventEmitter {
    /// Create an emitter with the given per-subscriber buffer capacity.
    pub const fn new(buffer: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            buffer: if buffer == 0 { 1 } else { buffer },
            next_id: 0,
        }
    }

    /// Register a subscriber. A `connected` envelope is queued immediately
    /// so the subscriber can confirm the attachment.
    pub fn subscribe(&mut self) -> EventStream {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let hello = EventEnvelope::now(
            EventKind::Connected,
            serde_json::json!({ "subscriber": id }),
        );
        // The buffer is fresh; this cannot fail.
        let _ = sender.try_send(hello);

        self.subscribers.push(Subscriber { id, sender });
        tracing::debug!(subscriber = id, "event subscriber attached");
        EventStream { receiver }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver an envelope to every subscriber.
    ///
    /// Awaits each delivery, so a slow subscriber with a full buffer blocks
    /// the engine rather than losing events. Subscribers whose receiver was
    /// dropped are removed.
    pub async fn emit(&mut self, event: EventKind, data: serde_json::Value) {
        let envelope = EventEnvelope::now(event, data);
        let mut dead: Vec<u64> = Vec::new();

        for subscriber in &self.subscribers {
            if subscriber.sender.send(envelope.clone()).await.is_err() {
                tracing::warn!(subscriber = subscriber.id, "event subscriber dropped");
                dead.push(subscriber.id);
            }
        }

        if !dead.is_empty() {
            self.subscribers
                .retain(|subscriber| !dead.contains(&subscriber.id));
        }
    }
}

/// The emitter handle shared between the engine loop and the subscription
/// surface (`WebSocket` handlers attach mid-run).
pub type SharedEmitter = Arc<Mutex<EventEmitter>>;

/// Build a shared emitter with the default buffer.
pub fn shared_emitter() -> SharedEmitter {
    Arc::new(Mutex::new(EventEmitter::default()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_connected_first() {
        let mut emitter = EventEmitter::default();
        let mut stream = emitter.subscribe();
        let first = stream.recv().await.unwrap();
        assert_eq!(first.event, EventKind::Connected);
    }

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let mut emitter = EventEmitter::default();
        let mut stream = emitter.subscribe();
        let _ = stream.recv().await; // connected

        emitter
            .emit(EventKind::StepStarted, serde_json::json!({"step": 1}))
            .await;
        emitter
            .emit(EventKind::StreamToken, serde_json::json!({"token": "hi"}))
            .await;
        emitter
            .emit(EventKind::StepCompleted, serde_json::json!({"step": 1}))
            .await;

        assert_eq!(stream.recv().await.unwrap().event, EventKind::StepStarted);
        assert_eq!(stream.recv().await.unwrap().event, EventKind::StreamToken);
        assert_eq!(stream.recv().await.unwrap().event, EventKind::StepCompleted);
    }

    #[tokio::test]
    async fn all_subscribers_see_every_event() {
        let mut emitter = EventEmitter::default();
        let mut first = emitter.subscribe();
        let mut second = emitter.subscribe();
        let _ = first.recv().await;
        let _ = second.recv().await;

        emitter.emit(EventKind::Ping, serde_json::Value::Null).await;

        assert_eq!(first.recv().await.unwrap().event, EventKind::Ping);
        assert_eq!(second.recv().await.unwrap().event, EventKind::Ping);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_removed() {
        let mut emitter = EventEmitter::default();
        let stream = emitter.subscribe();
        assert_eq!(emitter.subscriber_count(), 1);
        drop(stream);
        emitter.emit(EventKind::Ping, serde_json::Value::Null).await;
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn full_buffer_blocks_until_drained() {
        // Buffer of 1: the connected envelope fills it. The next emit must
        // wait until the subscriber drains, and nothing may be dropped.
        let mut emitter = EventEmitter::new(1);
        let mut stream = emitter.subscribe();

        let emit_task = async {
            emitter
                .emit(EventKind::StepStarted, serde_json::json!({"step": 1}))
                .await;
            emitter
        };
        let drain_task = async {
            // Give the emitter a chance to block on the full buffer first.
            tokio::task::yield_now().await;
            let connected = stream.recv().await.unwrap();
            let started = stream.recv().await.unwrap();
            (connected, started)
        };

        let (_, (connected, started)) = tokio::join!(emit_task, drain_task);
        assert_eq!(connected.event, EventKind::Connected);
        assert_eq!(started.event, EventKind::StepStarted);
    }

    #[test]
    fn envelope_serializes_with_iso_timestamp() {
        let envelope = EventEnvelope::now(EventKind::RunStatus, serde_json::json!({"s": 1}));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json.get("event"), Some(&serde_json::json!("run_status")));
        let ts = json.get("timestamp").and_then(|t| t.as_str()).unwrap();
        assert!(ts.contains('T'));
    }
}
