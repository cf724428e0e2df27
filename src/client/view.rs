//! Conversation view state machine
//!
//! ```text
//! Closed ──begin_open──▶ Opening ──apply_history──▶ Open ──close──▶ Closing ──▶ Closed
//!                           ▲                         │
//!                           └──────── begin_open ─────┘   (leave old room, then join new)
//! ```
//!
//! The view subscribes to inbound events before it joins the room, so
//! anything broadcast while history is loading waits in its receiver and is
//! merged by id once history lands. Every history request carries a
//! [`HistoryTicket`]; an answer for a conversation that is no longer the
//! current one is dropped.
//!
//! Waiting for an update and acting on it are split: [`ConversationView::recv_update`]
//! only applies what arrived and is safe to race in a `select!`, while
//! [`ConversationView::settle`] runs the follow-up requests (marking live
//! messages read, reloading after lost events).
//!
//! Failures never escape: they end up in [`ConversationView::error`].

use super::api::MessageApi;
use super::connection::{ChannelHandle, InboundEvent};
use super::membership::{EventHandler, RoomGuard};
use super::send::SendPipeline;
use super::timeline::MessageTimeline;
use super::typing::{TypingSignal, TypingTracker};
use crate::config::MessagingConfig;
use crate::core::error::{MessagingError, MessagingResult};
use crate::core::model::{Actor, Message};
use crate::core::query::HistoryQuery;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Identifies one history request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryTicket {
    conversation_id: Uuid,
    generation: u64,
}

impl HistoryTicket {
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }
}

/// What [`ConversationView::next_update`] observed
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    /// An inbound event was applied
    Event(InboundEvent),
    /// A typing deadline passed (local stop sent or remote indicator expired)
    TypingTimeout,
    /// Events were lost and history was reloaded
    Resynced,
}

struct OpenState {
    conversation_id: Uuid,
    timeline: MessageTimeline,
    typing: TypingTracker,
    events: broadcast::Receiver<InboundEvent>,
    /// Messages from others arrived since the last mark-read
    unread_live: bool,
    /// Events were lost; history must be fetched again
    needs_reload: bool,
    _room: RoomGuard,
}

pub struct ConversationView {
    viewer: Actor,
    channel: ChannelHandle,
    pipeline: SendPipeline,
    config: Arc<MessagingConfig>,
    phase: ViewPhase,
    generation: u64,
    open: Option<OpenState>,
    draft: String,
    error: Option<MessagingError>,
}

impl ConversationView {
    pub fn new(
        viewer: Actor,
        channel: ChannelHandle,
        api: Arc<dyn MessageApi>,
        config: Arc<MessagingConfig>,
    ) -> Self {
        let pipeline = SendPipeline::with_max_len(api, config.limits.max_message_length);
        Self {
            viewer,
            channel,
            pipeline,
            config,
            phase: ViewPhase::Closed,
            generation: 0,
            open: None,
            draft: String::new(),
            error: None,
        }
    }

    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    pub fn viewer(&self) -> &Actor {
        &self.viewer
    }

    pub fn conversation_id(&self) -> Option<Uuid> {
        self.open.as_ref().map(|o| o.conversation_id)
    }

    pub fn timeline(&self) -> Option<&MessageTimeline> {
        self.open.as_ref().map(|o| &o.timeline)
    }

    pub fn messages(&self) -> &[Message] {
        self.timeline().map_or(&[], |t| t.messages())
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn error(&self) -> Option<&MessagingError> {
        self.error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Name of the other participant shown as typing
    pub fn remote_typing(&self, now: Instant) -> Option<&str> {
        self.open.as_ref()?.typing.remote_typing(now)
    }

    pub fn is_typing(&self) -> bool {
        self.open.as_ref().is_some_and(|o| o.typing.is_typing())
    }

    /// Indicator text of the event channel
    pub fn connection_label(&self) -> &'static str {
        self.channel.state().label()
    }

    /// Switch to a conversation and return the ticket for its history
    ///
    /// The previous conversation is closed first, so its leave goes out
    /// before the new join.
    pub fn begin_open(&mut self, conversation_id: Uuid) -> HistoryTicket {
        self.close();

        self.phase = ViewPhase::Opening;
        self.generation += 1;
        self.error = None;

        // Subscribe before joining so nothing broadcast after the join is missed
        let events = self.channel.subscribe();
        let room = self.channel.join(conversation_id);
        self.open = Some(OpenState {
            conversation_id,
            timeline: MessageTimeline::new(conversation_id),
            typing: TypingTracker::new(conversation_id, &self.config.typing),
            events,
            unread_live: false,
            needs_reload: false,
            _room: room,
        });

        tracing::debug!(
            conversation_id = %conversation_id,
            generation = self.generation,
            "Opening conversation"
        );
        HistoryTicket {
            conversation_id,
            generation: self.generation,
        }
    }

    /// Apply a history result; stale tickets are ignored
    pub fn apply_history(
        &mut self,
        ticket: HistoryTicket,
        result: MessagingResult<Vec<Message>>,
    ) -> bool {
        if ticket.generation != self.generation || self.conversation_id() != Some(ticket.conversation_id)
        {
            tracing::debug!(
                conversation_id = %ticket.conversation_id,
                "Ignoring stale history result"
            );
            return false;
        }
        let Some(open) = self.open.as_mut() else {
            return false;
        };

        match result {
            Ok(page) => {
                open.timeline.merge(page);
            }
            Err(e) => {
                tracing::warn!(
                    conversation_id = %ticket.conversation_id,
                    error = %e,
                    "History fetch failed"
                );
                self.error = Some(e);
            }
        }
        self.phase = ViewPhase::Open;
        self.drain_events();
        true
    }

    /// Open a conversation: join, load history, mark it read
    pub async fn open(&mut self, conversation_id: Uuid) {
        let ticket = self.begin_open(conversation_id);
        let query = HistoryQuery::latest(self.config.limits.history_page_size);
        let result = self
            .pipeline
            .api()
            .list_messages(conversation_id, &query)
            .await;

        if self.apply_history(ticket, result) {
            self.mark_read().await;
        }
    }

    /// Fetch history again for the open conversation
    pub async fn reload(&mut self) {
        let Some(conversation_id) = self.conversation_id() else {
            return;
        };
        self.generation += 1;
        let ticket = HistoryTicket {
            conversation_id,
            generation: self.generation,
        };
        if let Some(open) = self.open.as_mut() {
            open.typing.reset();
        }

        let query = HistoryQuery::latest(self.config.limits.history_page_size);
        let result = self
            .pipeline
            .api()
            .list_messages(conversation_id, &query)
            .await;
        if self.apply_history(ticket, result)
            && let Some(open) = self.open.as_mut()
        {
            open.needs_reload = false;
        }
    }

    /// Page in older history
    pub async fn load_older(&mut self) {
        let limit = self.config.limits.history_page_size;
        let api = self.pipeline.api().clone();
        let Some(open) = self.open.as_mut() else {
            return;
        };
        let result = open.timeline.load_older(api.as_ref(), limit).await;
        if let Err(e) = result {
            self.error = Some(e);
        }
    }

    /// Leave the room and drop per-conversation state
    pub fn close(&mut self) {
        let Some(mut open) = self.open.take() else {
            self.phase = ViewPhase::Closed;
            return;
        };
        self.phase = ViewPhase::Closing;

        if let Some(signal) = open.typing.on_send() {
            self.channel.emit(signal.frame(open.conversation_id));
        }
        tracing::debug!(conversation_id = %open.conversation_id, "Closing conversation");
        // Dropping the state drops the room guard, which sends the leave
        drop(open);

        self.draft.clear();
        self.phase = ViewPhase::Closed;
    }

    /// The composer text changed
    pub fn on_input(&mut self, text: impl Into<String>) {
        self.draft = text.into();
        if self.draft.trim().is_empty() {
            return;
        }
        if let Some(open) = self.open.as_mut()
            && let Some(signal) = open.typing.on_local_input(Instant::now())
        {
            self.channel.emit(signal.frame(open.conversation_id));
        }
    }

    /// Send the draft; it is cleared only when the send succeeds
    pub async fn submit(&mut self) -> Option<Message> {
        let content = self.draft.clone();
        let sent = self.submit_text(&content).await;
        if sent.is_some() {
            self.draft.clear();
        }
        sent
    }

    /// Send a given text (quick replies) without touching the draft
    pub async fn submit_text(&mut self, text: &str) -> Option<Message> {
        let Some(conversation_id) = self.conversation_id() else {
            self.error = Some(MessagingError::NoOpenConversation);
            return None;
        };
        self.stop_typing();

        match self.pipeline.send(conversation_id, text).await {
            Ok(message) => {
                self.error = None;
                if let Some(open) = self.open.as_mut()
                    && open.conversation_id == message.conversation_id
                {
                    open.timeline.append_incoming(message.clone());
                }
                Some(message)
            }
            Err(e) => {
                self.error = Some(e);
                None
            }
        }
    }

    /// Apply one inbound event; returns whether it concerned the open conversation
    pub fn handle_event(&mut self, event: &InboundEvent) -> bool {
        let Some(open) = self.open.as_mut() else {
            return false;
        };
        if event.conversation_id() != open.conversation_id {
            return false;
        }
        open.timeline.handle(event);
        open.typing.handle(event);
        if matches!(event, InboundEvent::NewMessage(_))
            && open.timeline.unread_count(self.viewer.id) > 0
        {
            open.unread_live = true;
        }
        true
    }

    /// Whether [`settle`](Self::settle) has requests to make
    pub fn has_pending_work(&self) -> bool {
        self.open
            .as_ref()
            .is_some_and(|o| o.needs_reload || (o.unread_live && self.phase == ViewPhase::Open))
    }

    /// Apply every event already waiting; returns how many were applied
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let Some(open) = self.open.as_mut() else {
                return applied;
            };
            match open.events.try_recv() {
                Ok(event) => {
                    if self.handle_event(&event) {
                        applied += 1;
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "View lagged behind inbound events");
                    open.needs_reload = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return applied,
            }
        }
    }

    /// Wait for the next event or typing deadline, apply it and settle
    ///
    /// Returns `None` when no conversation is open.
    pub async fn next_update(&mut self) -> Option<ViewUpdate> {
        let update = self.recv_update().await?;
        self.settle().await;
        Some(update)
    }

    /// Wait for the next event or typing deadline and apply it locally
    ///
    /// Cancel safe: nothing is awaited after an event is taken off the
    /// receiver. Follow-up requests are left for [`settle`](Self::settle).
    pub async fn recv_update(&mut self) -> Option<ViewUpdate> {
        let open = self.open.as_mut()?;
        let deadline = open.typing.next_deadline();

        let received = tokio::select! {
            received = open.events.recv() => Some(received),
            _ = sleep_until(deadline) => None,
        };

        match received {
            Some(Ok(event)) => {
                self.handle_event(&event);
                Some(ViewUpdate::Event(event))
            }
            Some(Err(RecvError::Lagged(skipped))) => {
                tracing::warn!(skipped, "View lagged behind inbound events, reloading");
                open.needs_reload = true;
                Some(ViewUpdate::Resynced)
            }
            Some(Err(RecvError::Closed)) => None,
            None => {
                self.on_typing_deadline(Instant::now());
                Some(ViewUpdate::TypingTimeout)
            }
        }
    }

    /// Run the requests left by received updates
    ///
    /// Reloads history after lost events and marks messages that arrived
    /// live as read. Flags are cleared once their request completes, so an
    /// interrupted settle is picked up by the next one.
    pub async fn settle(&mut self) {
        if self.open.as_ref().is_some_and(|o| o.needs_reload) {
            self.reload().await;
        }
        if self.has_pending_work() {
            self.mark_read().await;
        }
    }

    fn on_typing_deadline(&mut self, now: Instant) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if let Some(signal) = open.typing.poll(now) {
            self.channel.emit(signal.frame(open.conversation_id));
        }
        open.typing.expire_remote(now);
    }

    fn stop_typing(&mut self) {
        if let Some(open) = self.open.as_mut()
            && let Some(signal @ TypingSignal::Stop) = open.typing.on_send()
        {
            self.channel.emit(signal.frame(open.conversation_id));
        }
    }

    async fn mark_read(&mut self) {
        let Some(conversation_id) = self.conversation_id() else {
            return;
        };
        let result = self.pipeline.api().mark_read(conversation_id).await;
        let viewer_id = self.viewer.id;
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if open.conversation_id != conversation_id {
            return;
        }
        // Best effort: a failure is not retried until the next live message
        open.unread_live = false;
        match result {
            Ok(_) => {
                open.timeline.mark_all_read(viewer_id);
            }
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Mark read failed"
                );
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
