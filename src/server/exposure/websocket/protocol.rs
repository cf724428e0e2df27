//! Event channel message protocol definitions
//!
//! Defines the JSON frames exchanged between clients and the server over
//! `/ws`. Frames are objects tagged by `"type"` in snake_case.
//!
//! ## Client → Server Messages
//!
//! ```json
//! {"type": "join_conversation", "conversation_id": "..."}
//! {"type": "leave_conversation", "conversation_id": "..."}
//! {"type": "typing", "conversation_id": "..."}
//! {"type": "stop_typing", "conversation_id": "..."}
//! {"type": "ping"}
//! ```
//!
//! ## Server → Client Messages
//!
//! ```json
//! {"type": "welcome", "connection_id": "conn_...", "actor_id": "..."}
//! {"type": "joined", "conversation_id": "..."}
//! {"type": "left", "conversation_id": "..."}
//! {"type": "new_message", "conversation_id": "...", "message": {...}}
//! {"type": "message_notification", "conversation_id": "...", "message": {...}}
//! {"type": "user_typing", "conversation_id": "...", "user_id": "...", "user_name": "Tina"}
//! {"type": "user_stop_typing", "conversation_id": "...", "user_id": "..."}
//! {"type": "messages_read", "conversation_id": "...", "reader_id": "..."}
//! {"type": "pong"}
//! {"type": "error", "message": "..."}
//! ```

use crate::core::model::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving room-scoped frames for a conversation
    JoinConversation { conversation_id: Uuid },
    /// Stop receiving room-scoped frames for a conversation
    LeaveConversation { conversation_id: Uuid },
    /// The sender started a typing burst
    Typing { conversation_id: Uuid },
    /// The sender's typing burst ended
    StopTyping { conversation_id: Uuid },
    /// Keepalive ping
    Ping,
}

impl ClientMessage {
    /// Conversation the frame targets, if any
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            ClientMessage::JoinConversation { conversation_id }
            | ClientMessage::LeaveConversation { conversation_id }
            | ClientMessage::Typing { conversation_id }
            | ClientMessage::StopTyping { conversation_id } => Some(*conversation_id),
            ClientMessage::Ping => None,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after the upgrade
    Welcome {
        connection_id: String,
        actor_id: Uuid,
    },
    /// Join confirmation
    Joined { conversation_id: Uuid },
    /// Leave confirmation
    Left { conversation_id: Uuid },
    /// A message persisted in a joined conversation
    NewMessage {
        conversation_id: Uuid,
        message: Message,
    },
    /// A message persisted in a conversation this connection has not joined
    MessageNotification {
        conversation_id: Uuid,
        message: Message,
    },
    /// Another member of the room is typing
    UserTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        user_name: String,
    },
    /// Another member of the room stopped typing
    UserStopTyping {
        conversation_id: Uuid,
        user_id: Uuid,
    },
    /// A participant read the conversation
    MessagesRead {
        conversation_id: Uuid,
        reader_id: Uuid,
    },
    /// Keepalive response
    Pong,
    /// Error message
    Error { message: String },
}
