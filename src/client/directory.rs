//! Conversation list of the current viewer
//!
//! Rows come from the store and are kept fresh from inbound events: a new
//! message moves its row to the top, updates the preview and bumps the unread
//! badge unless the conversation is open or the viewer wrote it.

use super::api::MessageApi;
use super::connection::InboundEvent;
use super::membership::EventHandler;
use crate::core::error::MessagingResult;
use crate::core::model::{Actor, ActorProfile, ConversationDetails, ConversationSummary, Message};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ConversationDirectory {
    viewer: Actor,
    entries: HashMap<Uuid, ConversationSummary>,
    open: Option<Uuid>,
    needs_refresh: bool,
}

impl ConversationDirectory {
    pub fn new(viewer: Actor) -> Self {
        Self {
            viewer,
            entries: HashMap::new(),
            open: None,
            needs_refresh: false,
        }
    }

    pub fn viewer(&self) -> &Actor {
        &self.viewer
    }

    /// Replace every row with the store's view
    pub async fn refresh(&mut self, api: &dyn MessageApi) -> MessagingResult<usize> {
        let rows = api.list_conversations().await?;
        self.entries = rows
            .into_iter()
            .map(|mut row| {
                if self.open == Some(row.id()) {
                    row.unread_count = 0;
                }
                (row.id(), row)
            })
            .collect();
        self.needs_refresh = false;

        tracing::debug!(
            viewer_id = %self.viewer.id,
            conversations = self.entries.len(),
            "Conversation directory refreshed"
        );
        Ok(self.entries.len())
    }

    /// Rows by most recent activity first
    pub fn list(&self) -> Vec<&ConversationSummary> {
        let mut rows: Vec<&ConversationSummary> = self.entries.values().collect();
        rows.sort_by(|a, b| {
            b.conversation
                .activity_at()
                .cmp(&a.conversation.activity_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        rows
    }

    pub fn get(&self, conversation_id: Uuid) -> Option<&ConversationSummary> {
        self.entries.get(&conversation_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find or start the viewer's conversation about a room
    ///
    /// The row the store answers with replaces any local one; its unread
    /// count is kept.
    pub async fn get_or_create(
        &mut self,
        api: &dyn MessageApi,
        room_id: Uuid,
    ) -> MessagingResult<ConversationDetails> {
        let details = api.get_or_create_conversation(room_id).await?;
        let id = details.conversation.id;
        let unread_count = self.entries.get(&id).map_or(0, |row| row.unread_count);

        self.entries.insert(
            id,
            ConversationSummary {
                conversation: details.conversation.clone(),
                tenant: ActorProfile::named(
                    details.conversation.tenant_id,
                    self.viewer.display_name.clone(),
                ),
                landlord: details.landlord.clone(),
                room: details.room.clone(),
                unread_count,
            },
        );
        Ok(details)
    }

    /// Fold a broadcast message into its row
    ///
    /// Returns `false` when the conversation is unknown; the directory then
    /// asks for a refresh (see [`take_needs_refresh`](Self::take_needs_refresh)).
    pub fn apply_new_message(&mut self, message: &Message) -> bool {
        let Some(row) = self.entries.get_mut(&message.conversation_id) else {
            self.needs_refresh = true;
            return false;
        };

        // A copy of a message the row already reflects changes nothing
        let newer = row
            .conversation
            .last_message_at
            .is_none_or(|at| message.created_at > at);
        if newer {
            row.conversation.last_message = Some(message.content.clone());
            row.conversation.last_message_at = Some(message.created_at);
            if self.open != Some(message.conversation_id) && message.sender_id != self.viewer.id {
                row.unread_count = row.unread_count.saturating_add(1);
            }
        }
        true
    }

    /// Record which conversation is on screen; opening one clears its badge
    pub fn set_open(&mut self, conversation_id: Option<Uuid>) {
        self.open = conversation_id;
        if let Some(row) = conversation_id.and_then(|id| self.entries.get_mut(&id)) {
            row.unread_count = 0;
        }
    }

    pub fn open(&self) -> Option<Uuid> {
        self.open
    }

    /// Case-insensitive match over participant names and room title
    pub fn search(&self, query: &str) -> Vec<&ConversationSummary> {
        let needle = query.trim().to_lowercase();
        self.list()
            .into_iter()
            .filter(|row| {
                needle.is_empty()
                    || row.tenant.full_name.to_lowercase().contains(&needle)
                    || row.landlord.full_name.to_lowercase().contains(&needle)
                    || row.room.title.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn total_unread(&self) -> u32 {
        self.entries
            .values()
            .fold(0u32, |sum, row| sum.saturating_add(row.unread_count))
    }

    /// Whether an unknown conversation showed up since the last call
    pub fn take_needs_refresh(&mut self) -> bool {
        std::mem::take(&mut self.needs_refresh)
    }
}

impl EventHandler for ConversationDirectory {
    fn handle(&mut self, event: &InboundEvent) {
        match event {
            InboundEvent::NewMessage(message) | InboundEvent::MessageNotification(message) => {
                self.apply_new_message(message);
            }
            // Read on another device of the same viewer
            InboundEvent::MessagesRead {
                conversation_id,
                reader_id,
            } if *reader_id == self.viewer.id => {
                if let Some(row) = self.entries.get_mut(conversation_id) {
                    row.unread_count = 0;
                }
            }
            _ => {}
        }
    }
}
