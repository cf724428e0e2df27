//! Connection manager for the client event channel
//!
//! The [`ConnectionManager`] is the only owner of the event channel. It runs
//! one background task that opens the channel through a [`Transport`],
//! replays room joins, pumps inbound frames into a broadcast of
//! [`InboundEvent`]s and reconnects with capped exponential backoff.
//!
//! Everything else talks to the channel through a cheap, cloneable
//! [`ChannelHandle`]:
//!
//! ```text
//! view / directory ──emit──▶ ChannelHandle ──outbound──▶ Transport
//!        ▲                                                 │
//!        └──────── broadcast<InboundEvent> ◀── pump ◀──────┘
//! ```
//!
//! Frames emitted while disconnected are dropped; there is no offline queue.

use super::transport::Transport;
use crate::config::ReconnectConfig;
use crate::core::auth::Credential;
use crate::core::error::MessagingError;
use crate::core::model::Message;
use crate::server::exposure::websocket::protocol::{ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

const EVENT_BUFFER: usize = 256;

/// Connectivity of the event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Indicator text for the connection badge
    pub fn label(self) -> &'static str {
        if self.is_connected() {
            "Online"
        } else {
            "Offline"
        }
    }
}

/// Events delivered to client components
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A message in a conversation this client joined
    NewMessage(Message),
    /// A message in a conversation this client did not join
    MessageNotification(Message),
    UserTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        user_name: String,
    },
    UserStopTyping {
        conversation_id: Uuid,
        user_id: Uuid,
    },
    MessagesRead {
        conversation_id: Uuid,
        reader_id: Uuid,
    },
}

impl InboundEvent {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            InboundEvent::NewMessage(message) | InboundEvent::MessageNotification(message) => {
                message.conversation_id
            }
            InboundEvent::UserTyping {
                conversation_id, ..
            }
            | InboundEvent::UserStopTyping {
                conversation_id, ..
            }
            | InboundEvent::MessagesRead {
                conversation_id, ..
            } => *conversation_id,
        }
    }

    /// Map a server frame to a component event
    ///
    /// Control frames (welcome, acknowledgements, pong, errors) have no
    /// component-level meaning and map to `None`.
    pub fn from_frame(frame: ServerMessage) -> Option<Self> {
        match frame {
            ServerMessage::NewMessage { message, .. } => Some(InboundEvent::NewMessage(message)),
            ServerMessage::MessageNotification { message, .. } => {
                Some(InboundEvent::MessageNotification(message))
            }
            ServerMessage::UserTyping {
                conversation_id,
                user_id,
                user_name,
            } => Some(InboundEvent::UserTyping {
                conversation_id,
                user_id,
                user_name,
            }),
            ServerMessage::UserStopTyping {
                conversation_id,
                user_id,
            } => Some(InboundEvent::UserStopTyping {
                conversation_id,
                user_id,
            }),
            ServerMessage::MessagesRead {
                conversation_id,
                reader_id,
            } => Some(InboundEvent::MessagesRead {
                conversation_id,
                reader_id,
            }),
            ServerMessage::Error { message } => {
                tracing::warn!(error = %message, "Event channel reported an error");
                None
            }
            ServerMessage::Welcome { .. }
            | ServerMessage::Joined { .. }
            | ServerMessage::Left { .. }
            | ServerMessage::Pong => None,
        }
    }
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<InboundEvent>,
    outbound: Mutex<Outbound>,
    /// conversation_id -> number of live room guards
    rooms: Mutex<HashMap<Uuid, usize>>,
}

/// Outbound sender of the current session
///
/// Every `connect` and `teardown` starts a new session; a channel task only
/// touches the shared state while its session is still the current one.
#[derive(Default)]
struct Outbound {
    session: u64,
    tx: Option<mpsc::UnboundedSender<ClientMessage>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn send(&self, frame: ClientMessage) -> bool {
        match lock(&self.outbound).tx.as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => {
                tracing::debug!(?frame, "Dropping frame while offline");
                false
            }
        }
    }

    /// Start a new session, dropping the sender of the previous one
    fn begin_session(&self, state: ConnectionState) -> u64 {
        let mut outbound = lock(&self.outbound);
        outbound.session += 1;
        outbound.tx = None;
        self.state.send_replace(state);
        outbound.session
    }

    /// Set the state on behalf of a session; false once it is superseded
    fn set_state(&self, session: u64, state: ConnectionState) -> bool {
        let outbound = lock(&self.outbound);
        if outbound.session != session {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    /// Install a fresh outbound sender and replay the joins of live guards
    fn attach(&self, session: u64, tx: mpsc::UnboundedSender<ClientMessage>) -> bool {
        let rooms = lock(&self.rooms);
        let mut outbound = lock(&self.outbound);
        if outbound.session != session {
            return false;
        }
        for conversation_id in rooms.keys() {
            let _ = tx.send(ClientMessage::JoinConversation {
                conversation_id: *conversation_id,
            });
        }
        outbound.tx = Some(tx);
        self.state.send_replace(ConnectionState::Connected);
        true
    }

    /// Drop the sender after the channel closed; false once superseded
    fn detach(&self, session: u64) -> bool {
        let mut outbound = lock(&self.outbound);
        if outbound.session != session {
            return false;
        }
        outbound.tx = None;
        self.state.send_replace(ConnectionState::Disconnected);
        true
    }

    fn publish(&self, session: u64, event: InboundEvent) -> bool {
        let outbound = lock(&self.outbound);
        if outbound.session != session {
            return false;
        }
        // No receivers is fine: nothing is open
        let _ = self.events.send(event);
        true
    }
}

/// Cloneable access to the event channel
///
/// Handles stay valid across reconnects; they never own the connection.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<Shared>,
}

impl ChannelHandle {
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Receive inbound events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.shared.events.subscribe()
    }

    /// Send a frame if connected; returns whether it was handed to the channel
    pub fn emit(&self, frame: ClientMessage) -> bool {
        self.shared.send(frame)
    }

    /// Conversations with at least one live room guard
    pub fn joined_rooms(&self) -> Vec<Uuid> {
        lock(&self.shared.rooms).keys().copied().collect()
    }

    /// Take a reference on a room; the first one sends the join
    pub(crate) fn acquire_room(&self, conversation_id: Uuid) {
        let mut rooms = lock(&self.shared.rooms);
        let count = rooms.entry(conversation_id).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.shared
                .send(ClientMessage::JoinConversation { conversation_id });
        }
    }

    /// Drop a reference on a room; the last one sends the leave
    pub(crate) fn release_room(&self, conversation_id: Uuid) {
        let mut rooms = lock(&self.shared.rooms);
        let Some(count) = rooms.get_mut(&conversation_id) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            rooms.remove(&conversation_id);
            self.shared
                .send(ClientMessage::LeaveConversation { conversation_id });
        }
    }
}

/// Owns the event channel task
pub struct ConnectionManager {
    handle: ChannelHandle,
    transport: Arc<dyn Transport>,
    reconnect: ReconnectConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, reconnect: ReconnectConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            handle: ChannelHandle {
                shared: Arc::new(Shared {
                    state,
                    events,
                    outbound: Mutex::new(Outbound::default()),
                    rooms: Mutex::new(HashMap::new()),
                }),
            },
            transport,
            reconnect,
            task: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    /// Start the channel task for a credential
    ///
    /// Without a credential nothing is opened and the state stays
    /// `Disconnected`. Calling it again replaces the running task.
    pub fn connect(&self, credential: Option<Credential>) {
        let Some(credential) = credential else {
            tracing::info!("No credential available, event channel stays offline");
            return;
        };

        self.stop_task();
        let session = self.handle.shared.begin_session(ConnectionState::Connecting);
        let task = tokio::spawn(run_channel(
            session,
            self.handle.shared.clone(),
            self.transport.clone(),
            self.reconnect.clone(),
            credential,
        ));
        *lock(&self.task) = Some(task);
    }

    /// Close the channel for good (logout)
    ///
    /// No further inbound events are delivered after this returns.
    pub fn teardown(&self) {
        self.stop_task();
        self.handle
            .shared
            .begin_session(ConnectionState::Disconnected);
        tracing::debug!("Event channel torn down");
    }

    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.handle.watch_state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.handle.subscribe()
    }

    fn stop_task(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run_channel(
    session: u64,
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    reconnect: ReconnectConfig,
    credential: Credential,
) {
    let mut attempt: u32 = 0;

    loop {
        if !shared.set_state(session, ConnectionState::Connecting) {
            return;
        }

        match transport.open(&credential).await {
            Ok(link) => {
                attempt = 0;
                if !shared.attach(session, link.outbound) {
                    return;
                }
                tracing::info!("Event channel connected");

                pump(session, &shared, link.inbound).await;

                if !shared.detach(session) {
                    return;
                }
                tracing::warn!("Event channel closed, reconnecting");
            }
            Err(MessagingError::Unauthorized) => {
                shared.set_state(session, ConnectionState::Disconnected);
                tracing::warn!("Event channel credential refused, giving up");
                return;
            }
            Err(e) => {
                if !shared.set_state(session, ConnectionState::Disconnected) {
                    return;
                }
                tracing::warn!(attempt, error = %e, "Event channel connect failed");
            }
        }

        let delay = reconnect.backoff(attempt);
        attempt = attempt.saturating_add(1);
        tokio::time::sleep(delay).await;
    }
}

async fn pump(session: u64, shared: &Shared, mut inbound: mpsc::UnboundedReceiver<ServerMessage>) {
    while let Some(frame) = inbound.recv().await {
        if let Some(event) = InboundEvent::from_frame(frame)
            && !shared.publish(session, event)
        {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::mock::MockTransport;
    use chrono::Utc;
    use std::time::Duration;

    fn manager(transport: &MockTransport) -> ConnectionManager {
        ConnectionManager::new(Arc::new(transport.clone()), ReconnectConfig::default())
    }

    async fn wait_for(manager: &ConnectionManager, state: ConnectionState) {
        let mut rx = manager.watch_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
            .await
            .expect("state not reached")
            .unwrap();
    }

    fn message(conversation_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: Uuid::new_v4(),
            sender_name: "Lars".into(),
            content: "Welcome!".into(),
            created_at: Utc::now(),
            is_read: false,
        }
    }

    #[tokio::test]
    async fn test_no_credential_stays_offline() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect(None);
        tokio::task::yield_now().await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.state().label(), "Offline");
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_and_receive_events() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        let mut events = manager.subscribe();

        manager.connect(Some(Credential::new("t")));
        wait_for(&manager, ConnectionState::Connected).await;
        assert_eq!(manager.state().label(), "Online");

        let peer = transport.take_peer().unwrap();
        let conversation_id = Uuid::new_v4();
        let msg = message(conversation_id);
        peer.to_client.send(ServerMessage::Pong).unwrap();
        peer.to_client
            .send(ServerMessage::NewMessage {
                conversation_id,
                message: msg.clone(),
            })
            .unwrap();

        // Control frames are filtered out
        assert_eq!(events.recv().await.unwrap(), InboundEvent::NewMessage(msg));
    }

    #[tokio::test]
    async fn test_room_joins_are_reference_counted() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        manager.connect(Some(Credential::new("t")));
        wait_for(&manager, ConnectionState::Connected).await;
        let mut peer = transport.take_peer().unwrap();

        let handle = manager.handle();
        let room = Uuid::new_v4();
        handle.acquire_room(room);
        handle.acquire_room(room);
        handle.release_room(room);
        assert_eq!(handle.joined_rooms(), vec![room]);
        handle.release_room(room);
        assert!(handle.joined_rooms().is_empty());

        assert_eq!(
            peer.drain(),
            vec![
                ClientMessage::JoinConversation {
                    conversation_id: room
                },
                ClientMessage::LeaveConversation {
                    conversation_id: room
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_emit_while_offline_is_dropped() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        assert!(!manager.handle().emit(ClientMessage::Ping));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replays_joins() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        manager.connect(Some(Credential::new("t")));
        wait_for(&manager, ConnectionState::Connected).await;

        let room = Uuid::new_v4();
        manager.handle().acquire_room(room);

        // Server drops the channel
        drop(transport.take_peer().unwrap());
        wait_for(&manager, ConnectionState::Disconnected).await;
        wait_for(&manager, ConnectionState::Connected).await;
        assert_eq!(transport.open_count(), 2);

        let mut peer = transport.take_peer().unwrap();
        assert_eq!(
            peer.drain(),
            vec![ClientMessage::JoinConversation {
                conversation_id: room
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_credential_stops_retrying() {
        let transport = MockTransport::rejecting();
        let manager = manager(&transport);
        manager.connect(Some(Credential::new("expired")));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_teardown_stops_delivery() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        let mut events = manager.subscribe();
        manager.connect(Some(Credential::new("t")));
        wait_for(&manager, ConnectionState::Connected).await;
        let peer = transport.take_peer().unwrap();

        manager.teardown();
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let conversation_id = Uuid::new_v4();
        let _ = peer.to_client.send(ServerMessage::NewMessage {
            conversation_id,
            message: message(conversation_id),
        });
        tokio::task::yield_now().await;
        assert!(events.try_recv().is_err());
        assert!(!manager.handle().emit(ClientMessage::Ping));
    }

    #[tokio::test]
    async fn test_dropping_manager_disconnects_handles() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        manager.connect(Some(Credential::new("t")));
        wait_for(&manager, ConnectionState::Connected).await;
        let mut peer = transport.take_peer().unwrap();
        let handle = manager.handle();

        drop(manager);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert_eq!(handle.state().label(), "Offline");
        assert!(!handle.emit(ClientMessage::Ping));
        // The outbound side is gone, so the server sees the channel close
        assert!(peer.from_client.recv().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_teardown_wins_over_a_concurrent_connect() {
        for _ in 0..50 {
            let transport = MockTransport::new();
            let manager = manager(&transport);
            manager.connect(Some(Credential::new("t")));
            tokio::task::yield_now().await;
            manager.teardown();

            tokio::time::sleep(Duration::from_millis(5)).await;
            assert_eq!(manager.state(), ConnectionState::Disconnected);
            assert!(!manager.handle().emit(ClientMessage::Ping));
        }
    }

    #[tokio::test]
    async fn test_superseded_session_cannot_attach() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        let shared = manager.handle.shared.clone();

        let stale = shared.begin_session(ConnectionState::Connecting);
        manager.teardown();

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(!shared.attach(stale, tx));
        assert!(!shared.set_state(stale, ConnectionState::Connected));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.handle().emit(ClientMessage::Ping));
    }
}
