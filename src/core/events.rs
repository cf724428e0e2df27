//! Internal event system for real-time notifications
//!
//! The EventBus decouples the REST handlers that persist messages from the
//! event channel hub that pushes them to connected clients.
//!
//! # Architecture
//!
//! ```text
//! POST /messages/... ──▶ MessageStore::post_message()
//!                               │
//!                     EventBus::publish(ChatEvent::MessageCreated)
//!                               │
//!                    broadcast channel ──▶ ChannelHub::run_dispatch_loop()
//! ```

use crate::core::model::{Conversation, Message};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events published by the server side after a successful mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message was persisted in a conversation
    MessageCreated {
        /// The owning conversation, after its preview was updated
        conversation: Conversation,
        message: Message,
    },
    /// A reader marked messages of a conversation as read
    MessagesRead {
        conversation_id: Uuid,
        reader_id: Uuid,
        count: usize,
    },
}

impl ChatEvent {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            ChatEvent::MessageCreated { conversation, .. } => conversation.id,
            ChatEvent::MessagesRead {
                conversation_id, ..
            } => *conversation_id,
        }
    }
}

/// Envelope wrapping an event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: ChatEvent,
}

impl EventEnvelope {
    pub fn new(event: ChatEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Broadcast-based event bus
///
/// Cheap to clone, shared between the REST handlers and the hub.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    ///
    /// The capacity determines how many events can be buffered before
    /// slow receivers start losing events (lagged).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all subscribers
    ///
    /// Never fails. Returns the number of receivers that will see the event.
    pub fn publish(&self, event: ChatEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        // send() returns Err only if there are no receivers, which is fine
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
