//! Store trait for conversations and messages
//!
//! This is the server-side message store interface. Every call names the
//! acting [`Actor`] so the store can enforce participation rules and keep
//! per-viewer unread counts.

use crate::core::error::MessagingResult;
use crate::core::model::{Actor, Conversation, ConversationDetails, ConversationSummary, Message};
use crate::core::query::HistoryQuery;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence for conversations and messages
///
/// Implementations must guarantee:
/// - at most one conversation per `(tenant, room)`, even under concurrent
///   `get_or_create_conversation` calls
/// - strictly increasing `created_at` inside a conversation
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Return the tenant's conversation about a room, creating it on first call
    async fn get_or_create_conversation(
        &self,
        actor: &Actor,
        room_id: Uuid,
    ) -> MessagingResult<ConversationDetails>;

    /// Look up a conversation the actor may access
    async fn conversation(&self, actor: &Actor, conversation_id: Uuid)
    -> MessagingResult<Conversation>;

    /// All conversations visible to the actor, most recent activity first
    async fn list_conversations(&self, actor: &Actor) -> MessagingResult<Vec<ConversationSummary>>;

    /// Messages of a conversation in timeline order
    async fn list_messages(
        &self,
        actor: &Actor,
        conversation_id: Uuid,
        query: &HistoryQuery,
    ) -> MessagingResult<Vec<Message>>;

    /// Persist a new message and update the conversation preview
    ///
    /// Returns the stored message and the updated conversation.
    async fn post_message(
        &self,
        actor: &Actor,
        conversation_id: Uuid,
        content: &str,
    ) -> MessagingResult<(Message, Conversation)>;

    /// Mark every message not authored by the actor as read
    ///
    /// Returns how many messages changed.
    async fn mark_read(&self, actor: &Actor, conversation_id: Uuid) -> MessagingResult<usize>;
}
