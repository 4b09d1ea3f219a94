//! Change notifications from the chat client to whatever renders it.
//!
//! Every state change the client makes is published as a [`ChatEvent`]: a
//! topic from [`topics`] plus a JSON payload. A terminal UI, a GUI shell or a
//! test subscribes and redraws from the events. Events carry a sequence
//! number so a subscriber that lagged can tell how much it missed.
//!
//! ```rust
//! use net4grad_core::event_bus::{topics, EventBus};
//!
//! let bus = EventBus::new();
//! let _rx = bus.subscribe();
//! bus.publish(topics::ERROR, &serde_json::json!({"message": "Failed to load groups"}));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Subscribers further behind than this start losing events.
const CHANNEL_CAPACITY: usize = 1024;

/// Topics published by the chat client.
pub mod topics {
    /// Group or user list replaced. Payload: `{"groups": n, "users": n}`.
    pub const TARGETS: &str = "chat:targets";
    /// History applied for the current selection. Payload: `{"target", "count"}`.
    pub const HISTORY: &str = "chat:history";
    /// A live message was appended. Payload: the message.
    pub const MESSAGE: &str = "chat:message";
    /// A user's presence changed. Payload: `{"userId", "presence"}`.
    pub const PRESENCE: &str = "chat:presence";
    /// Socket state. Payload: `{"state": "open"|"closed"|"reconnecting"|"failed"}`.
    pub const CONNECTION: &str = "chat:connection";
    /// A group was created or its members changed. Payload: the group.
    pub const GROUP: &str = "chat:group";
    /// An operation failed. Payload: `{"message"}`.
    pub const ERROR: &str = "chat:error";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Position in the bus's publication order, starting at 1.
    pub seq: u64,
    pub topic: String,
    pub payload: serde_json::Value,
}

impl ChatEvent {
    pub fn is(&self, topic: &str) -> bool {
        self.topic == topic
    }
}

/// Fan-out of [`ChatEvent`]s over a tokio broadcast channel.
pub struct EventBus {
    sender: broadcast::Sender<ChatEvent>,
    seq: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            seq: AtomicU64::new(0),
        }
    }

    /// Publish `payload` under `topic`.
    ///
    /// Returns how many subscribers will see it. Events published with no
    /// subscriber are lost, and so are payloads that fail to serialize.
    pub fn publish<T: Serialize>(&self, topic: &str, payload: &T) -> usize {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Dropping {} event, payload not serializable: {}", topic, e);
                return 0;
            }
        };

        let event = ChatEvent {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            topic: topic.to_string(),
            payload,
        };
        self.sender.send(event).unwrap_or(0)
    }

    /// Receive events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    pub fn listeners(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
