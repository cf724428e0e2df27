//! Integration tests for the event channel
//!
//! These tests spin up a real HTTP+WebSocket server and verify the full
//! flow: authenticate → join a room → persist a message → receive it over
//! the socket, plus the client stack (`WsTransport` + `HttpMessageApi`)
//! against the same server.

#![cfg(all(feature = "ws-client", feature = "http-client"))]

use futures::{SinkExt, StreamExt};
use roomtalk::config::TokenEntry;
use roomtalk::prelude::*;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    host: Arc<ServerHost>,
    hub: Arc<ChannelHub>,
    config: MessagingConfig,
    room_id: Uuid,
    tenant: Actor,
    landlord: Actor,
}

fn entry(token: &str, actor: &Actor) -> TokenEntry {
    TokenEntry {
        token: token.to_string(),
        actor_id: actor.id,
        display_name: actor.display_name.clone(),
        role: actor.role,
    }
}

/// Helper: start a server on an ephemeral port
async fn start_test_server() -> TestServer {
    let tenant = Actor::new(Uuid::new_v4(), "Tina Tenant", Role::Tenant);
    let landlord = Actor::new(Uuid::new_v4(), "Lars Landlord", Role::Landlord);
    let stranger = Actor::new(Uuid::new_v4(), "Otto Other", Role::Tenant);

    let mut config = MessagingConfig::default();
    config.tokens = vec![
        entry("tenant-token", &tenant),
        entry("landlord-token", &landlord),
        entry("other-tenant", &stranger),
    ];

    let store = InMemoryMessageStore::new();
    let room_id = Uuid::new_v4();
    store
        .register_room(RoomSummary {
            id: room_id,
            title: "Sunny loft near the lake".into(),
            location: "Pokhara".into(),
            landlord: ActorProfile::named(landlord.id, landlord.display_name.clone()),
            host_stats: HostStats::default(),
        })
        .unwrap();
    store
        .register_profile(ActorProfile::named(tenant.id, tenant.display_name.clone()))
        .unwrap();

    let (app, host, hub) = ServerBuilder::new()
        .with_config(config.clone())
        .with_store(store)
        .build_parts()
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        host,
        hub,
        config,
        room_id,
        tenant,
        landlord,
    }
}

impl TestServer {
    async fn conversation_id(&self) -> Uuid {
        self.host
            .store
            .get_or_create_conversation(&self.tenant, self.room_id)
            .await
            .unwrap()
            .conversation
            .id
    }

    async fn wait_members(&self, conversation_id: Uuid, members: usize) {
        timeout(Duration::from_secs(5), async {
            while self.hub.room_member_count(conversation_id).await != members {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("room membership not reached");
    }

    async fn wait_connections(&self, count: usize) {
        timeout(Duration::from_secs(5), async {
            while self.hub.connection_count().await != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection count not reached");
    }
}

/// Helper: connect with a `?token=` and return the welcome frame + stream
async fn ws_connect(addr: SocketAddr, token: &str) -> (Value, WsStream) {
    let url = format!("ws://{}/ws?token={}", addr, token);
    let (mut stream, _) = connect_async(&url).await.expect("Failed to connect");
    let welcome = ws_recv(&mut stream).await;
    assert_eq!(welcome["type"], "welcome");
    (welcome, stream)
}

/// Helper: send a JSON frame
async fn ws_send(stream: &mut WsStream, frame: &Value) {
    let text = serde_json::to_string(frame).unwrap();
    stream.send(WsMessage::Text(text.into())).await.unwrap();
}

/// Helper: receive the next JSON frame (with timeout)
async fn ws_recv(stream: &mut WsStream) -> Value {
    let msg = timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("Timeout waiting for WS message")
        .expect("Stream ended")
        .expect("WS error");

    match msg {
        WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("Expected text message, got {:?}", other),
    }
}

async fn ws_join(stream: &mut WsStream, conversation_id: Uuid) {
    ws_send(
        stream,
        &json!({"type": "join_conversation", "conversation_id": conversation_id}),
    )
    .await;
    let joined = ws_recv(stream).await;
    assert_eq!(joined["type"], "joined");
    assert_eq!(joined["conversation_id"], conversation_id.to_string());
}

// === Raw protocol ===

#[tokio::test]
async fn test_ws_rejects_missing_or_unknown_token() {
    let server = start_test_server().await;

    for url in [
        format!("ws://{}/ws", server.addr),
        format!("ws://{}/ws?token=bogus", server.addr),
    ] {
        match connect_async(&url).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 401)
            }
            other => panic!("Expected 401, got {:?}", other.map(|_| ())),
        }
    }
    assert_eq!(server.hub.connection_count().await, 0);
}

#[tokio::test]
async fn test_ws_welcome_and_ping_pong() {
    let server = start_test_server().await;
    let (welcome, mut stream) = ws_connect(server.addr, "tenant-token").await;

    assert!(
        welcome["connection_id"]
            .as_str()
            .unwrap()
            .starts_with("conn_")
    );
    assert_eq!(welcome["actor_id"], server.tenant.id.to_string());

    ws_send(&mut stream, &json!({"type": "ping"})).await;
    let pong = ws_recv(&mut stream).await;
    assert_eq!(pong["type"], "pong");
}

#[tokio::test]
async fn test_ws_join_refused_for_outsider() {
    let server = start_test_server().await;
    let conv = server.conversation_id().await;
    let (_welcome, mut stream) = ws_connect(server.addr, "other-tenant").await;

    ws_send(
        &mut stream,
        &json!({"type": "join_conversation", "conversation_id": conv}),
    )
    .await;
    let reply = ws_recv(&mut stream).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(server.hub.room_member_count(conv).await, 0);
}

#[tokio::test]
async fn test_ws_room_member_receives_new_message() {
    let server = start_test_server().await;
    let conv = server.conversation_id().await;
    let (_welcome, mut stream) = ws_connect(server.addr, "landlord-token").await;
    ws_join(&mut stream, conv).await;

    let sent = server
        .host
        .send_message(&server.tenant, conv, "Is the loft free in May?")
        .await
        .unwrap();

    let frame = ws_recv(&mut stream).await;
    assert_eq!(frame["type"], "new_message");
    assert_eq!(frame["conversation_id"], conv.to_string());
    assert_eq!(frame["message"]["id"], sent.id.to_string());
    assert_eq!(frame["message"]["content"], "Is the loft free in May?");
    assert_eq!(frame["message"]["sender_name"], "Tina Tenant");
}

#[tokio::test]
async fn test_ws_participant_outside_room_gets_notification() {
    let server = start_test_server().await;
    let conv = server.conversation_id().await;
    let (_welcome, mut landlord) = ws_connect(server.addr, "landlord-token").await;

    server
        .host
        .send_message(&server.tenant, conv, "Hello?")
        .await
        .unwrap();

    let frame = ws_recv(&mut landlord).await;
    assert_eq!(frame["type"], "message_notification");
    assert_eq!(frame["message"]["content"], "Hello?");
}

#[tokio::test]
async fn test_ws_typing_relayed_to_other_member_only() {
    let server = start_test_server().await;
    let conv = server.conversation_id().await;
    let (_w1, mut tenant) = ws_connect(server.addr, "tenant-token").await;
    let (_w2, mut landlord) = ws_connect(server.addr, "landlord-token").await;

    // Typing before joining is refused
    ws_send(
        &mut tenant,
        &json!({"type": "typing", "conversation_id": conv}),
    )
    .await;
    assert_eq!(ws_recv(&mut tenant).await["type"], "error");

    ws_join(&mut tenant, conv).await;
    ws_join(&mut landlord, conv).await;

    ws_send(
        &mut tenant,
        &json!({"type": "typing", "conversation_id": conv}),
    )
    .await;
    let frame = ws_recv(&mut landlord).await;
    assert_eq!(frame["type"], "user_typing");
    assert_eq!(frame["user_id"], server.tenant.id.to_string());
    assert_eq!(frame["user_name"], "Tina Tenant");

    ws_send(
        &mut tenant,
        &json!({"type": "stop_typing", "conversation_id": conv}),
    )
    .await;
    let frame = ws_recv(&mut landlord).await;
    assert_eq!(frame["type"], "user_stop_typing");

    // The tenant never sees its own indicator; the next frame it gets is a pong
    ws_send(&mut tenant, &json!({"type": "ping"})).await;
    assert_eq!(ws_recv(&mut tenant).await["type"], "pong");
}

#[tokio::test]
async fn test_ws_leave_stops_room_delivery() {
    let server = start_test_server().await;
    let conv = server.conversation_id().await;
    let (_welcome, mut landlord) = ws_connect(server.addr, "landlord-token").await;
    ws_join(&mut landlord, conv).await;

    ws_send(
        &mut landlord,
        &json!({"type": "leave_conversation", "conversation_id": conv}),
    )
    .await;
    assert_eq!(ws_recv(&mut landlord).await["type"], "left");

    server
        .host
        .send_message(&server.tenant, conv, "Still there?")
        .await
        .unwrap();
    // Outside the room again: a notification, not a room message
    assert_eq!(
        ws_recv(&mut landlord).await["type"],
        "message_notification"
    );
}

#[tokio::test]
async fn test_ws_disconnect_cleans_up() {
    let server = start_test_server().await;
    let conv = server.conversation_id().await;
    let (_welcome, mut stream) = ws_connect(server.addr, "tenant-token").await;
    ws_join(&mut stream, conv).await;
    assert_eq!(server.hub.connection_count().await, 1);

    stream.close(None).await.unwrap();
    drop(stream);

    server.wait_connections(0).await;
    assert_eq!(server.hub.room_member_count(conv).await, 0);
}

// === Client stack over the network ===

#[tokio::test]
async fn test_client_stack_over_websocket_and_rest() {
    let server = start_test_server().await;
    let config = Arc::new(server.config.clone());

    let landlord_channel = ConnectionManager::new(
        Arc::new(WsTransport::new(format!("ws://{}/ws", server.addr))),
        server.config.reconnect.clone(),
    );
    landlord_channel.connect(Some(Credential::new("landlord-token")));
    let mut state = landlord_channel.watch_state();
    timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();
    server.wait_connections(1).await;

    let base_url = format!("http://{}", server.addr);
    let tenant_api = HttpMessageApi::new(&base_url, Credential::new("tenant-token"));
    let landlord_api = Arc::new(HttpMessageApi::new(
        &base_url,
        Credential::new("landlord-token"),
    ));
    let mut landlord = Inbox::new(
        server.landlord.clone(),
        landlord_channel.handle(),
        landlord_api,
        config,
    );

    // Tenant opens the conversation over REST and writes
    let details = tenant_api
        .get_or_create_conversation(server.room_id)
        .await
        .unwrap();
    let conv = details.conversation.id;
    tenant_api
        .send_message(conv, "Is the loft free in May?")
        .await
        .unwrap();

    // Landlord hears about it without having joined
    let update = timeout(Duration::from_secs(5), landlord.next_update())
        .await
        .unwrap();
    assert!(matches!(
        update,
        Some(InboxUpdate::Directory(InboundEvent::MessageNotification(_)))
    ));
    assert_eq!(landlord.directory().total_unread(), 1);
    assert_eq!(landlord.directory().len(), 1);

    // Opening joins the room and loads history
    landlord.open(conv).await;
    server.wait_members(conv, 1).await;
    assert_eq!(landlord.view().phase(), ViewPhase::Open);
    assert_eq!(landlord.view().messages().len(), 1);
    assert_eq!(landlord.directory().total_unread(), 0);

    // A reply from the landlord is persisted and visible to the tenant
    landlord.view_mut().on_input("Yes, from the 3rd");
    let reply = landlord.submit().await.unwrap();
    let history = tenant_api
        .list_messages(conv, &HistoryQuery::default())
        .await
        .unwrap();
    assert_eq!(history.last().map(|m| m.id), Some(reply.id));

    // Live delivery into the open view
    tenant_api.send_message(conv, "Perfect").await.unwrap();
    timeout(Duration::from_secs(5), async {
        while landlord.view().messages().len() < 3 {
            landlord.next_update().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(
        landlord.view().messages().last().map(|m| m.content.as_str()),
        Some("Perfect")
    );

    landlord.close();
    server.wait_members(conv, 0).await;
    landlord_channel.teardown();
    server.wait_connections(0).await;
}

#[tokio::test]
async fn test_ws_transport_refused_credential_stops_retrying() {
    let server = start_test_server().await;
    let channel = ConnectionManager::new(
        Arc::new(WsTransport::new(format!("ws://{}/ws", server.addr))),
        ReconnectConfig::default(),
    );

    channel.connect(Some(Credential::new("bogus")));
    // The refused handshake ends the task instead of scheduling a retry
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert!(!channel.is_connected());
    assert_eq!(server.hub.connection_count().await, 0);
}
