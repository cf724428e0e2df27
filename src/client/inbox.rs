//! Conversation list plus the open conversation, driven by one event loop
//!
//! The inbox keeps the directory and the view consistent with each other:
//! opening a conversation clears its badge and stops counting, a sent message
//! updates its row, and a reconnect refreshes the list and reloads the open
//! history so nothing missed while offline stays missing.

use super::api::MessageApi;
use super::connection::{ChannelHandle, ConnectionState, InboundEvent};
use super::directory::ConversationDirectory;
use super::membership::EventHandler;
use super::view::{ConversationView, ViewUpdate};
use crate::config::MessagingConfig;
use crate::core::error::MessagingError;
use crate::core::model::{Actor, Message};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum InboxUpdate {
    /// The directory applied an event
    Directory(InboundEvent),
    /// The open conversation changed
    View(ViewUpdate),
    /// The event channel changed state
    Connection(ConnectionState),
    /// Events were lost and the directory was refreshed
    Resynced,
}

pub struct Inbox {
    api: Arc<dyn MessageApi>,
    directory: ConversationDirectory,
    events: broadcast::Receiver<InboundEvent>,
    state: watch::Receiver<ConnectionState>,
    view: ConversationView,
    error: Option<MessagingError>,
}

impl Inbox {
    pub fn new(
        viewer: Actor,
        channel: ChannelHandle,
        api: Arc<dyn MessageApi>,
        config: Arc<MessagingConfig>,
    ) -> Self {
        let events = channel.subscribe();
        let state = channel.watch_state();
        Self {
            directory: ConversationDirectory::new(viewer.clone()),
            view: ConversationView::new(viewer, channel, api.clone(), config),
            api,
            events,
            state,
            error: None,
        }
    }

    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    pub fn view(&self) -> &ConversationView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ConversationView {
        &mut self.view
    }

    /// Last directory-level failure
    pub fn error(&self) -> Option<&MessagingError> {
        self.error.as_ref()
    }

    /// Reload the conversation list; returns whether it succeeded
    pub async fn refresh(&mut self) -> bool {
        match self.directory.refresh(self.api.as_ref()).await {
            Ok(_) => {
                self.error = None;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Conversation list refresh failed");
                self.error = Some(e);
                false
            }
        }
    }

    pub async fn open(&mut self, conversation_id: Uuid) {
        self.directory.set_open(Some(conversation_id));
        self.view.open(conversation_id).await;
    }

    /// Tenant entry point: start or resume the conversation about a room
    pub async fn open_room(&mut self, room_id: Uuid) -> Option<Uuid> {
        match self.directory.get_or_create(self.api.as_ref(), room_id).await {
            Ok(details) => {
                let conversation_id = details.conversation.id;
                self.open(conversation_id).await;
                Some(conversation_id)
            }
            Err(e) => {
                tracing::warn!(room_id = %room_id, error = %e, "Could not open room conversation");
                self.error = Some(e);
                None
            }
        }
    }

    pub fn close(&mut self) {
        self.view.close();
        self.directory.set_open(None);
    }

    /// Send the draft of the open conversation
    pub async fn submit(&mut self) -> Option<Message> {
        let sent = self.view.submit().await?;
        self.directory.apply_new_message(&sent);
        Some(sent)
    }

    /// Send a quick reply in the open conversation
    pub async fn submit_text(&mut self, text: &str) -> Option<Message> {
        let sent = self.view.submit_text(text).await?;
        self.directory.apply_new_message(&sent);
        Some(sent)
    }

    /// Wait for and apply the next change
    ///
    /// Returns `None` once the event channel is gone for good.
    pub async fn next_update(&mut self) -> Option<InboxUpdate> {
        let update = self.recv_update().await;
        self.view.settle().await;
        update
    }

    async fn recv_update(&mut self) -> Option<InboxUpdate> {
        let view_open = self.view.conversation_id().is_some();

        tokio::select! {
            received = self.events.recv() => match received {
                Ok(event) => {
                    self.directory.handle(&event);
                    if self.directory.take_needs_refresh() {
                        self.refresh().await;
                    }
                    Some(InboxUpdate::Directory(event))
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Inbox lagged behind inbound events, refreshing");
                    self.refresh().await;
                    Some(InboxUpdate::Resynced)
                }
                Err(RecvError::Closed) => None,
            },
            Some(update) = self.view.recv_update(), if view_open => Some(InboxUpdate::View(update)),
            changed = self.state.changed() => {
                changed.ok()?;
                let state = *self.state.borrow_and_update();
                if state == ConnectionState::Connected {
                    tracing::debug!("Event channel back online, resynchronizing");
                    self.refresh().await;
                    self.view.reload().await;
                }
                Some(InboxUpdate::Connection(state))
            }
        }
    }
}
