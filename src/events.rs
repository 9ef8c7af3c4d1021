//! `state:sync` notifications.
//!
//! Every persisted roadmap change is published once on an [`EventBus`].
//! Subscribers get a `tokio::sync::broadcast` receiver; slow subscribers
//! lag rather than block the writer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{MilestoneChange, RoadmapState};

/// Event name carried in serialized payloads.
pub const STATE_SYNC_EVENT: &str = "state:sync";

const CHANNEL_CAPACITY: usize = 64;

/// Payload emitted after a roadmap write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSyncEvent {
    pub reason: String,
    pub summary: String,
    pub state: RoadmapState,
    pub changes: Vec<MilestoneChange>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl StateSyncEvent {
    /// Wrap the payload as `{"event": "state:sync", "payload": {...}}`.
    pub fn to_envelope(&self) -> serde_json::Value {
        serde_json::json!({
            "event": STATE_SYNC_EVENT,
            "payload": self,
        })
    }
}

/// Fan-out channel for [`StateSyncEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StateSyncEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateSyncEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: StateSyncEvent) -> usize {
        match self.tx.send(event) {
            Ok(count) => count,
            Err(_) => {
                tracing::trace!("state:sync published with no subscribers");
                0
            }
        }
    }
}
