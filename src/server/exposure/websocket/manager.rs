//! Channel hub for event channel clients
//!
//! The `ChannelHub` tracks every authenticated connection and the set of
//! conversation rooms it has joined. Events from the `EventBus` and typing
//! frames from clients are fanned out per room.
//!
//! # Architecture
//!
//! ```text
//! EventBus ──recv──▶ ChannelHub::run_dispatch_loop()
//!                          │
//!                    for each connection
//!                          │
//!              joined the conversation room?
//!                 │                    │
//!               yes                    no, but participant/admin
//!                 │                    │
//!            new_message      message_notification
//! ```

use super::protocol::{ClientMessage, ServerMessage};
use crate::core::error::{MessagingError, MessagingResult};
use crate::core::events::{ChatEvent, EventEnvelope};
use crate::core::model::{Actor, Conversation, Message};
use crate::server::host::ServerHost;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

/// A handle to a single connection
struct ConnectionHandle {
    /// The authenticated actor behind the connection
    actor: Actor,
    /// Sender to push ServerMessage to the client's write loop
    tx: mpsc::UnboundedSender<ServerMessage>,
    /// Conversation rooms this connection has joined
    rooms: HashSet<Uuid>,
}

/// Manages all active connections and their room memberships
///
/// Thread-safe via `RwLock`: reads (dispatch, typing relay) are frequent,
/// writes (connect/disconnect/join/leave) are infrequent.
pub struct ChannelHub {
    host: Arc<ServerHost>,
    /// All active connections indexed by connection ID
    connections: RwLock<HashMap<String, ConnectionHandle>>,
}

impl ChannelHub {
    pub fn new(host: Arc<ServerHost>) -> Self {
        Self {
            host,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &Arc<ServerHost> {
        &self.host
    }

    /// Register a new connection for an authenticated actor
    ///
    /// Returns the connection id and the receiver of frames destined to the
    /// client.
    pub async fn connect(&self, actor: Actor) -> (String, mpsc::UnboundedReceiver<ServerMessage>) {
        let connection_id = format!("conn_{}", Uuid::new_v4().simple());
        let (tx, rx) = mpsc::unbounded_channel();

        tracing::debug!(
            connection_id = %connection_id,
            actor_id = %actor.id,
            "Client connected"
        );

        self.connections.write().await.insert(
            connection_id.clone(),
            ConnectionHandle {
                actor,
                tx,
                rooms: HashSet::new(),
            },
        );

        (connection_id, rx)
    }

    /// Remove a connection; its room memberships go with it
    pub async fn disconnect(&self, connection_id: &str) {
        if let Some(handle) = self.connections.write().await.remove(connection_id) {
            tracing::debug!(
                connection_id = %connection_id,
                rooms = handle.rooms.len(),
                "Client disconnected"
            );
        }
    }

    /// Add a connection to a conversation room
    ///
    /// The actor must be a participant of the conversation or an admin.
    pub async fn join(&self, connection_id: &str, conversation_id: Uuid) -> MessagingResult<()> {
        let actor = self.actor_of(connection_id).await?;

        // Authorization goes through the store so unknown ids are rejected too
        self.host.store.conversation(&actor, conversation_id).await?;

        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(connection_id)
            .ok_or_else(|| MessagingError::Transport("Connection closed".into()))?;
        handle.rooms.insert(conversation_id);

        tracing::debug!(
            connection_id = %connection_id,
            conversation_id = %conversation_id,
            "Joined conversation room"
        );
        Ok(())
    }

    /// Remove a connection from a conversation room
    ///
    /// Returns `true` if the connection was in the room.
    pub async fn leave(&self, connection_id: &str, conversation_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        let removed = connections
            .get_mut(connection_id)
            .map(|handle| handle.rooms.remove(&conversation_id))
            .unwrap_or(false);

        if removed {
            tracing::debug!(
                connection_id = %connection_id,
                conversation_id = %conversation_id,
                "Left conversation room"
            );
        }
        removed
    }

    /// Send a message to a specific connection
    pub async fn send_to(&self, connection_id: &str, message: ServerMessage) {
        let connections = self.connections.read().await;
        if let Some(conn) = connections.get(connection_id) {
            // If send fails, the receiver is dropped (client disconnected)
            let _ = conn.tx.send(message);
        }
    }

    /// Process one decoded client frame
    pub async fn handle_message(&self, connection_id: &str, message: ClientMessage) {
        match message {
            ClientMessage::JoinConversation { conversation_id } => {
                let reply = match self.join(connection_id, conversation_id).await {
                    Ok(()) => ServerMessage::Joined { conversation_id },
                    Err(e) => ServerMessage::Error {
                        message: e.to_string(),
                    },
                };
                self.send_to(connection_id, reply).await;
            }
            ClientMessage::LeaveConversation { conversation_id } => {
                self.leave(connection_id, conversation_id).await;
                self.send_to(connection_id, ServerMessage::Left { conversation_id })
                    .await;
            }
            ClientMessage::Typing { conversation_id } => {
                self.relay_typing(connection_id, conversation_id, true)
                    .await;
            }
            ClientMessage::StopTyping { conversation_id } => {
                self.relay_typing(connection_id, conversation_id, false)
                    .await;
            }
            ClientMessage::Ping => {
                self.send_to(connection_id, ServerMessage::Pong).await;
            }
        }
    }

    /// Forward a typing signal to the other members of the room
    ///
    /// Only connections that joined the room may signal in it. Connections of
    /// the same actor never see their own indicator.
    async fn relay_typing(&self, connection_id: &str, conversation_id: Uuid, typing: bool) {
        let connections = self.connections.read().await;
        let Some(sender) = connections.get(connection_id) else {
            return;
        };

        if !sender.rooms.contains(&conversation_id) {
            let _ = sender.tx.send(ServerMessage::Error {
                message: format!("Join conversation {} before typing", conversation_id),
            });
            return;
        }

        let frame = if typing {
            ServerMessage::UserTyping {
                conversation_id,
                user_id: sender.actor.id,
                user_name: sender.actor.display_name.clone(),
            }
        } else {
            ServerMessage::UserStopTyping {
                conversation_id,
                user_id: sender.actor.id,
            }
        };

        for handle in connections.values() {
            if handle.actor.id != sender.actor.id && handle.rooms.contains(&conversation_id) {
                let _ = handle.tx.send(frame.clone());
            }
        }
    }

    /// Dispatch a persisted event to the connections that should see it
    async fn dispatch_event(&self, envelope: &EventEnvelope) {
        match &envelope.event {
            ChatEvent::MessageCreated {
                conversation,
                message,
            } => self.dispatch_message(conversation, message).await,
            ChatEvent::MessagesRead {
                conversation_id,
                reader_id,
                ..
            } => {
                let connections = self.connections.read().await;
                for handle in connections.values() {
                    if handle.actor.id != *reader_id && handle.rooms.contains(conversation_id) {
                        let _ = handle.tx.send(ServerMessage::MessagesRead {
                            conversation_id: *conversation_id,
                            reader_id: *reader_id,
                        });
                    }
                }
            }
        }
    }

    async fn dispatch_message(&self, conversation: &Conversation, message: &Message) {
        let connections = self.connections.read().await;

        for (connection_id, handle) in connections.iter() {
            let frame = if handle.rooms.contains(&conversation.id) {
                ServerMessage::NewMessage {
                    conversation_id: conversation.id,
                    message: message.clone(),
                }
            } else if handle.actor.id != message.sender_id && handle.actor.can_access(conversation)
            {
                ServerMessage::MessageNotification {
                    conversation_id: conversation.id,
                    message: message.clone(),
                }
            } else {
                continue;
            };

            if handle.tx.send(frame).is_err() {
                tracing::debug!(
                    connection_id = %connection_id,
                    "Failed to send event to connection (likely disconnected)"
                );
            }
        }
    }

    /// Run the event dispatch loop
    ///
    /// Receives events from the `EventBus` broadcast channel until every
    /// sender is dropped. Should be spawned as a background task.
    pub async fn run_dispatch_loop(&self, mut rx: broadcast::Receiver<EventEnvelope>) {
        tracing::info!("Event channel dispatch loop started");

        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    self.dispatch_event(&envelope).await;
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    tracing::warn!(count, "Dispatch loop lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("EventBus closed, stopping dispatch loop");
                    break;
                }
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn connection_ids(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    /// Number of connections currently joined to a conversation room
    pub async fn room_member_count(&self, conversation_id: Uuid) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|h| h.rooms.contains(&conversation_id))
            .count()
    }

    async fn actor_of(&self, connection_id: &str) -> MessagingResult<Actor> {
        self.connections
            .read()
            .await
            .get(connection_id)
            .map(|h| h.actor.clone())
            .ok_or_else(|| MessagingError::Transport("Connection closed".into()))
    }
}
