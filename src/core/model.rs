//! Domain types shared by the store, the event channel and the client core
//!
//! Identifiers are plain `Uuid`s. Timestamps are assigned by the store and are
//! the only source of ordering inside a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Role of an authenticated actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Looks for rooms and contacts landlords
    Tenant,
    /// Owns one or more rooms
    Landlord,
    /// Sees every conversation (admin inbox)
    Admin,
}

/// An authenticated identity participating in conversations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub display_name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this actor may read and write the given conversation
    pub fn can_access(&self, conversation: &Conversation) -> bool {
        self.is_admin() || conversation.has_participant(self.id)
    }
}

/// Public profile of a participant, for display only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub id: Uuid,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl ActorProfile {
    pub fn named(id: Uuid, full_name: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            ..Default::default()
        }
    }
}

/// Hosting statistics of the landlord behind a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostStats {
    pub total_reviews: u32,
    pub avg_rating: f32,
    pub years_hosting: u32,
}

impl Default for HostStats {
    fn default() -> Self {
        Self {
            total_reviews: 0,
            avg_rating: 0.0,
            years_hosting: 1,
        }
    }
}

/// Read-only summary of the listing that anchors a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub location: String,
    pub landlord: ActorProfile,
    #[serde(default)]
    pub host_stats: HostStats,
}

/// The durable (tenant, room) pairing that anchors a message thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub landlord_id: Uuid,
    pub room_id: Uuid,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, actor_id: Uuid) -> bool {
        self.tenant_id == actor_id || self.landlord_id == actor_id
    }

    /// Timestamp used to order conversation lists
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.created_at)
    }

    /// Whether `actor` is on the receiving side of `message`
    ///
    /// Tenant messages are received by the landlord side (landlord and
    /// admins); everything else is received by the tenant.
    pub fn is_recipient(&self, message: &Message, actor: &Actor) -> bool {
        if message.sender_id == actor.id {
            return false;
        }
        if message.sender_id == self.tenant_id {
            actor.id == self.landlord_id || actor.is_admin()
        } else {
            actor.id == self.tenant_id
        }
    }
}

/// A conversation as seen by one viewer, with everything a list row needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub tenant: ActorProfile,
    pub landlord: ActorProfile,
    pub room: RoomSummary,
    /// Unread messages for the viewer this summary was built for
    pub unread_count: u32,
}

impl ConversationSummary {
    pub fn id(&self) -> Uuid {
        self.conversation.id
    }
}

/// Response of the get-or-create lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetails {
    pub conversation: Conversation,
    pub room: RoomSummary,
    pub landlord: ActorProfile,
    pub landlord_stats: HostStats,
}

/// A single message, immutable except for `is_read`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl Message {
    /// Total order inside a conversation: `created_at`, then `id`
    pub fn timeline_cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}
