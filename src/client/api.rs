//! Request/response access to the message store
//!
//! Client components talk to the store through [`MessageApi`], which is bound
//! to one credential. [`ActorScopedApi`] serves it in process from a
//! [`ServerHost`]; `HttpMessageApi` (feature `http-client`) serves it over the
//! REST surface.

use crate::core::error::MessagingResult;
use crate::core::model::{Actor, ConversationDetails, ConversationSummary, Message};
use crate::core::query::HistoryQuery;
use crate::server::host::ServerHost;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Credential-bound access to conversations and messages
#[async_trait]
pub trait MessageApi: Send + Sync {
    /// Idempotent: one conversation per (tenant, room)
    async fn get_or_create_conversation(&self, room_id: Uuid)
    -> MessagingResult<ConversationDetails>;

    /// Conversations visible to the caller, most recent activity first
    async fn list_conversations(&self) -> MessagingResult<Vec<ConversationSummary>>;

    /// A page of history in timeline order
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        query: &HistoryQuery,
    ) -> MessagingResult<Vec<Message>>;

    /// Persist a message and return the authoritative record
    async fn send_message(&self, conversation_id: Uuid, content: &str)
    -> MessagingResult<Message>;

    /// Mark messages addressed to the caller as read; returns how many changed
    async fn mark_read(&self, conversation_id: Uuid) -> MessagingResult<usize>;
}

/// In-process API acting as one actor against a host
///
/// Sends go through the host, so connected clients receive the broadcast
/// exactly as they would for a REST call.
#[derive(Clone)]
pub struct ActorScopedApi {
    host: Arc<ServerHost>,
    actor: Actor,
}

impl ActorScopedApi {
    pub fn new(host: Arc<ServerHost>, actor: Actor) -> Self {
        Self { host, actor }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }
}

#[async_trait]
impl MessageApi for ActorScopedApi {
    async fn get_or_create_conversation(
        &self,
        room_id: Uuid,
    ) -> MessagingResult<ConversationDetails> {
        self.host
            .store
            .get_or_create_conversation(&self.actor, room_id)
            .await
    }

    async fn list_conversations(&self) -> MessagingResult<Vec<ConversationSummary>> {
        self.host.store.list_conversations(&self.actor).await
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        query: &HistoryQuery,
    ) -> MessagingResult<Vec<Message>> {
        self.host
            .store
            .list_messages(&self.actor, conversation_id, query)
            .await
    }

    async fn send_message(&self, conversation_id: Uuid, content: &str) -> MessagingResult<Message> {
        self.host
            .send_message(&self.actor, conversation_id, content)
            .await
    }

    async fn mark_read(&self, conversation_id: Uuid) -> MessagingResult<usize> {
        self.host.mark_read(&self.actor, conversation_id).await
    }
}
