//! In-memory implementation of MessageStore for testing and development

use crate::config::LimitsConfig;
use crate::core::error::{MessagingError, MessagingResult};
use crate::core::model::{
    Actor, ActorProfile, Conversation, ConversationDetails, ConversationSummary, Message, Role,
    RoomSummary,
};
use crate::core::query::HistoryQuery;
use crate::core::store::MessageStore;
use crate::core::validation::validate_content;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct StoreState {
    rooms: HashMap<Uuid, RoomSummary>,
    profiles: HashMap<Uuid, ActorProfile>,
    conversations: HashMap<Uuid, Conversation>,
    /// (tenant_id, room_id) -> conversation_id
    by_pair: HashMap<(Uuid, Uuid), Uuid>,
    /// conversation_id -> messages in timeline order
    messages: HashMap<Uuid, Vec<Message>>,
}

impl StoreState {
    fn accessible(&self, actor: &Actor, conversation_id: Uuid) -> MessagingResult<&Conversation> {
        let conversation = self
            .conversations
            .get(&conversation_id)
            .ok_or(MessagingError::ConversationNotFound {
                id: conversation_id,
            })?;

        if !actor.can_access(conversation) {
            return Err(MessagingError::Forbidden { conversation_id });
        }
        Ok(conversation)
    }

    fn profile(&self, id: Uuid) -> ActorProfile {
        self.profiles
            .get(&id)
            .cloned()
            .unwrap_or_else(|| ActorProfile::named(id, "Unknown User"))
    }

    fn summary(&self, conversation: &Conversation, viewer: &Actor) -> Option<ConversationSummary> {
        let room = self.rooms.get(&conversation.room_id)?.clone();
        let unread = self
            .messages
            .get(&conversation.id)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| !m.is_read && conversation.is_recipient(m, viewer))
                    .count()
            })
            .unwrap_or(0);

        Some(ConversationSummary {
            conversation: conversation.clone(),
            tenant: self.profile(conversation.tenant_id),
            landlord: room.landlord.clone(),
            room,
            unread_count: u32::try_from(unread).unwrap_or(u32::MAX),
        })
    }
}

/// In-memory message store
///
/// Uses a single RwLock so that get-or-create and message ordering are
/// decided atomically.
#[derive(Clone)]
pub struct InMemoryMessageStore {
    state: Arc<RwLock<StoreState>>,
    limits: LimitsConfig,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::with_limits(LimitsConfig::default())
    }

    pub fn with_limits(limits: LimitsConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            limits,
        }
    }

    /// Make a room known to the store (the room catalog is external)
    pub fn register_room(&self, room: RoomSummary) -> MessagingResult<()> {
        let mut state = self.write()?;
        state.profiles.insert(room.landlord.id, room.landlord.clone());
        state.rooms.insert(room.id, room);
        Ok(())
    }

    /// Attach a display profile to an actor id
    pub fn register_profile(&self, profile: ActorProfile) -> MessagingResult<()> {
        self.write()?.profiles.insert(profile.id, profile);
        Ok(())
    }

    pub fn conversation_count(&self) -> usize {
        self.state
            .read()
            .map(|s| s.conversations.len())
            .unwrap_or(0)
    }

    fn read(&self) -> MessagingResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|e| MessagingError::Storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> MessagingResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|e| MessagingError::Storage(format!("Failed to acquire write lock: {}", e)))
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn get_or_create_conversation(
        &self,
        actor: &Actor,
        room_id: Uuid,
    ) -> MessagingResult<ConversationDetails> {
        let mut state = self.write()?;

        let room = state
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or(MessagingError::RoomNotFound { id: room_id })?;

        if actor.role != Role::Tenant || actor.id == room.landlord.id {
            return Err(MessagingError::NotATenant);
        }

        state
            .profiles
            .entry(actor.id)
            .or_insert_with(|| ActorProfile::named(actor.id, actor.display_name.clone()));

        let conversation = match state.by_pair.get(&(actor.id, room_id)).copied() {
            Some(id) => state.conversations[&id].clone(),
            None => {
                let conversation = Conversation {
                    id: Uuid::new_v4(),
                    tenant_id: actor.id,
                    landlord_id: room.landlord.id,
                    room_id,
                    last_message: None,
                    last_message_at: None,
                    created_at: Utc::now(),
                };
                state.by_pair.insert((actor.id, room_id), conversation.id);
                state
                    .conversations
                    .insert(conversation.id, conversation.clone());
                tracing::debug!(
                    conversation_id = %conversation.id,
                    tenant_id = %actor.id,
                    room_id = %room_id,
                    "Conversation created"
                );
                conversation
            }
        };

        Ok(ConversationDetails {
            conversation,
            landlord: room.landlord.clone(),
            landlord_stats: room.host_stats.clone(),
            room,
        })
    }

    async fn conversation(
        &self,
        actor: &Actor,
        conversation_id: Uuid,
    ) -> MessagingResult<Conversation> {
        let state = self.read()?;
        state.accessible(actor, conversation_id).cloned()
    }

    async fn list_conversations(&self, actor: &Actor) -> MessagingResult<Vec<ConversationSummary>> {
        let state = self.read()?;

        let mut summaries: Vec<ConversationSummary> = state
            .conversations
            .values()
            .filter(|c| actor.can_access(c))
            .filter_map(|c| state.summary(c, actor))
            .collect();

        summaries.sort_by(|a, b| {
            b.conversation
                .activity_at()
                .cmp(&a.conversation.activity_at())
                .then_with(|| a.id().cmp(&b.id()))
        });

        Ok(summaries)
    }

    async fn list_messages(
        &self,
        actor: &Actor,
        conversation_id: Uuid,
        query: &HistoryQuery,
    ) -> MessagingResult<Vec<Message>> {
        let state = self.read()?;
        state.accessible(actor, conversation_id)?;

        let limit = query.limit(
            self.limits.history_page_size,
            self.limits.max_history_page_size,
        );
        let all = state
            .messages
            .get(&conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let eligible: Vec<&Message> = all
            .iter()
            .filter(|m| query.before.is_none_or(|before| m.created_at < before))
            .collect();
        let skip = eligible.len().saturating_sub(limit);

        Ok(eligible.into_iter().skip(skip).cloned().collect())
    }

    async fn post_message(
        &self,
        actor: &Actor,
        conversation_id: Uuid,
        content: &str,
    ) -> MessagingResult<(Message, Conversation)> {
        let content = validate_content(content, self.limits.max_message_length)?;

        let mut state = self.write()?;
        state.accessible(actor, conversation_id)?;

        // created_at must strictly increase inside a conversation
        let now = Utc::now();
        let created_at = match state
            .messages
            .get(&conversation_id)
            .and_then(|msgs| msgs.last())
        {
            Some(last) if last.created_at >= now => last.created_at + Duration::microseconds(1),
            _ => now,
        };

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: actor.id,
            sender_name: actor.display_name.clone(),
            content: content.to_string(),
            created_at,
            is_read: false,
        };

        state
            .messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());

        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or(MessagingError::ConversationNotFound {
                id: conversation_id,
            })?;
        conversation.last_message = Some(message.content.clone());
        conversation.last_message_at = Some(message.created_at);

        Ok((message, conversation.clone()))
    }

    async fn mark_read(&self, actor: &Actor, conversation_id: Uuid) -> MessagingResult<usize> {
        let mut state = self.write()?;
        let conversation = state.accessible(actor, conversation_id)?.clone();

        let count = state
            .messages
            .get_mut(&conversation_id)
            .map(|msgs| {
                msgs.iter_mut()
                    .filter(|m| !m.is_read && conversation.is_recipient(m, actor))
                    .map(|m| m.is_read = true)
                    .count()
            })
            .unwrap_or(0);

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::HostStats;

    struct Fixture {
        store: InMemoryMessageStore,
        room: RoomSummary,
        tenant: Actor,
        landlord: Actor,
        admin: Actor,
    }

    fn fixture() -> Fixture {
        let landlord = Actor::new(Uuid::new_v4(), "Lars", Role::Landlord);
        let room = RoomSummary {
            id: Uuid::new_v4(),
            title: "Sunny loft".into(),
            location: "Lalitpur".into(),
            landlord: ActorProfile::named(landlord.id, "Lars"),
            host_stats: HostStats {
                total_reviews: 12,
                avg_rating: 4.8,
                years_hosting: 3,
            },
        };
        let store = InMemoryMessageStore::new();
        store.register_room(room.clone()).unwrap();

        Fixture {
            store,
            room,
            tenant: Actor::new(Uuid::new_v4(), "Tina", Role::Tenant),
            landlord,
            admin: Actor::new(Uuid::new_v4(), "Ada", Role::Admin),
        }
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let f = fixture();
        let first = f
            .store
            .get_or_create_conversation(&f.tenant, f.room.id)
            .await
            .unwrap();
        let second = f
            .store
            .get_or_create_conversation(&f.tenant, f.room.id)
            .await
            .unwrap();

        assert_eq!(first.conversation.id, second.conversation.id);
        assert_eq!(first.landlord_stats.total_reviews, 12);
        assert_eq!(f.store.conversation_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_one_conversation() {
        let f = fixture();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = f.store.clone();
            let tenant = f.tenant.clone();
            let room_id = f.room.id;
            handles.push(tokio::spawn(async move {
                store
                    .get_or_create_conversation(&tenant, room_id)
                    .await
                    .unwrap()
                    .conversation
                    .id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(f.store.conversation_count(), 1);
    }

    #[tokio::test]
    async fn test_only_tenants_start_conversations() {
        let f = fixture();
        let err = f
            .store
            .get_or_create_conversation(&f.admin, f.room.id)
            .await
            .unwrap_err();
        assert_eq!(err, MessagingError::NotATenant);

        let err = f
            .store
            .get_or_create_conversation(&f.tenant, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::RoomNotFound { .. }));
    }

    #[tokio::test]
    async fn test_post_updates_preview_and_unread() {
        let f = fixture();
        let conv = f
            .store
            .get_or_create_conversation(&f.tenant, f.room.id)
            .await
            .unwrap()
            .conversation;

        let (msg, updated) = f
            .store
            .post_message(&f.tenant, conv.id, "  Is this available?  ")
            .await
            .unwrap();
        assert_eq!(msg.content, "Is this available?");
        assert_eq!(updated.last_message.as_deref(), Some("Is this available?"));
        assert_eq!(updated.last_message_at, Some(msg.created_at));

        let for_admin = f.store.list_conversations(&f.admin).await.unwrap();
        assert_eq!(for_admin.len(), 1);
        assert_eq!(for_admin[0].unread_count, 1);
        assert_eq!(for_admin[0].tenant.full_name, "Tina");

        let for_tenant = f.store.list_conversations(&f.tenant).await.unwrap();
        assert_eq!(for_tenant[0].unread_count, 0);

        assert_eq!(f.store.mark_read(&f.admin, conv.id).await.unwrap(), 1);
        assert_eq!(f.store.mark_read(&f.admin, conv.id).await.unwrap(), 0);
        let for_landlord = f.store.list_conversations(&f.landlord).await.unwrap();
        assert_eq!(for_landlord[0].unread_count, 0);
    }

    #[tokio::test]
    async fn test_created_at_strictly_increases() {
        let f = fixture();
        let conv = f
            .store
            .get_or_create_conversation(&f.tenant, f.room.id)
            .await
            .unwrap()
            .conversation;

        for i in 0..20 {
            f.store
                .post_message(&f.tenant, conv.id, &format!("m{}", i))
                .await
                .unwrap();
        }

        let msgs = f
            .store
            .list_messages(&f.tenant, conv.id, &HistoryQuery::latest(100))
            .await
            .unwrap();
        assert_eq!(msgs.len(), 20);
        assert!(msgs.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[tokio::test]
    async fn test_history_page_returns_newest_last() {
        let f = fixture();
        let conv = f
            .store
            .get_or_create_conversation(&f.tenant, f.room.id)
            .await
            .unwrap()
            .conversation;
        for i in 0..5 {
            f.store
                .post_message(&f.tenant, conv.id, &format!("m{}", i))
                .await
                .unwrap();
        }

        let page = f
            .store
            .list_messages(&f.tenant, conv.id, &HistoryQuery::latest(2))
            .await
            .unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);

        let older = HistoryQuery {
            before: Some(page[0].created_at),
            limit: Some(10),
        };
        let page = f
            .store
            .list_messages(&f.tenant, conv.id, &older)
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
    }

    #[tokio::test]
    async fn test_strangers_are_forbidden() {
        let f = fixture();
        let conv = f
            .store
            .get_or_create_conversation(&f.tenant, f.room.id)
            .await
            .unwrap()
            .conversation;
        let stranger = Actor::new(Uuid::new_v4(), "Sam", Role::Tenant);

        let err = f
            .store
            .post_message(&stranger, conv.id, "hello")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MessagingError::Forbidden {
                conversation_id: conv.id
            }
        );
        assert!(f.store.list_conversations(&stranger).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_content_rejected() {
        let f = fixture();
        let conv = f
            .store
            .get_or_create_conversation(&f.tenant, f.room.id)
            .await
            .unwrap()
            .conversation;
        let err = f.store.post_message(&f.tenant, conv.id, "   ").await;
        assert_eq!(err.unwrap_err(), MessagingError::EmptyContent);
    }
}
