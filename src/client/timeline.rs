//! Ordered, deduplicated message list of one open conversation
//!
//! History pages and broadcast messages race each other; both are merged by
//! id at insertion, so whichever copy arrives second is absorbed. The list is
//! always sorted by `(created_at, id)` regardless of arrival order.

use super::api::MessageApi;
use super::connection::InboundEvent;
use super::membership::EventHandler;
use crate::core::error::MessagingResult;
use crate::core::model::Message;
use crate::core::query::HistoryQuery;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct MessageTimeline {
    conversation_id: Uuid,
    messages: Vec<Message>,
    ids: HashSet<Uuid>,
}

impl MessageTimeline {
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            ids: HashSet::new(),
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, message_id: Uuid) -> bool {
        self.ids.contains(&message_id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Insert a message unless it is already present
    ///
    /// Messages of other conversations are refused. Returns whether the
    /// message was inserted.
    pub fn append_incoming(&mut self, message: Message) -> bool {
        if message.conversation_id != self.conversation_id || self.ids.contains(&message.id) {
            return false;
        }

        let at = self
            .messages
            .partition_point(|m| m.timeline_cmp(&message).is_lt());
        self.ids.insert(message.id);
        self.messages.insert(at, message);
        true
    }

    /// Merge a batch (usually a history page); returns how many were new
    ///
    /// For messages already present only the read flag is taken over, and
    /// only from unread to read.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = Message>) -> usize {
        let mut inserted = 0;
        for message in batch {
            if self.ids.contains(&message.id) {
                if message.is_read
                    && let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id)
                {
                    existing.is_read = true;
                }
                continue;
            }
            if self.append_incoming(message) {
                inserted += 1;
            }
        }
        inserted
    }

    /// Fetch a history page and merge it
    pub async fn load(
        &mut self,
        api: &dyn MessageApi,
        query: &HistoryQuery,
    ) -> MessagingResult<usize> {
        let page = api.list_messages(self.conversation_id, query).await?;
        Ok(self.merge(page))
    }

    /// Fetch the page of messages older than the oldest one held
    pub async fn load_older(&mut self, api: &dyn MessageApi, limit: usize) -> MessagingResult<usize> {
        let query = HistoryQuery {
            before: self.messages.first().map(|m| m.created_at),
            limit: Some(limit),
        };
        self.load(api, &query).await
    }

    /// Mark one message read on behalf of `viewer_id`
    ///
    /// Only messages sent by someone else flip; returns whether one did.
    pub fn mark_read(&mut self, message_id: Uuid, viewer_id: Uuid) -> bool {
        match self
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.sender_id != viewer_id)
        {
            Some(message) if !message.is_read => {
                message.is_read = true;
                true
            }
            _ => false,
        }
    }

    /// Mark everything addressed to `viewer_id` read; returns how many changed
    pub fn mark_all_read(&mut self, viewer_id: Uuid) -> usize {
        let mut changed = 0;
        for message in self
            .messages
            .iter_mut()
            .filter(|m| m.sender_id != viewer_id && !m.is_read)
        {
            message.is_read = true;
            changed += 1;
        }
        changed
    }

    /// Apply a receipt: `reader_id` read everything the others sent
    pub fn apply_read_receipt(&mut self, reader_id: Uuid) -> usize {
        self.mark_all_read(reader_id)
    }

    pub fn unread_count(&self, viewer_id: Uuid) -> usize {
        self.messages
            .iter()
            .filter(|m| m.sender_id != viewer_id && !m.is_read)
            .count()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}

impl EventHandler for MessageTimeline {
    fn handle(&mut self, event: &InboundEvent) {
        match event {
            InboundEvent::NewMessage(message) => {
                self.append_incoming(message.clone());
            }
            InboundEvent::MessagesRead {
                conversation_id,
                reader_id,
            } if *conversation_id == self.conversation_id => {
                self.apply_read_receipt(*reader_id);
            }
            _ => {}
        }
    }
}
