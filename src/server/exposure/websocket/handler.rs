//! WebSocket upgrade handler and message loop
//!
//! The HTTP request is authenticated before the upgrade (bearer header, or a
//! `?token=` query parameter for clients that cannot set headers). Each
//! accepted connection gets:
//!
//! 1. A welcome message with its connection ID and actor ID
//! 2. A read loop that decodes client frames and hands them to the hub
//! 3. A write loop that forwards server frames to the WebSocket

use super::manager::ChannelHub;
use super::protocol::{ClientMessage, ServerMessage};
use crate::core::auth::Credential;
use crate::core::error::MessagingError;
use crate::core::model::Actor;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use futures::stream::StreamExt;
use serde::Deserialize;
use std::sync::Arc;

/// Query parameters accepted on the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// WebSocket upgrade handler for GET /ws
///
/// Anonymous or unknown credentials are refused with 401 before upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<ChannelHub>>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
) -> Response {
    let credential = Credential::from_headers(&headers)
        .or_else(|| params.token.filter(|t| !t.is_empty()).map(Credential::new));

    match hub.host().auth.authenticate(credential.as_ref()).await {
        Ok(actor) => ws
            .on_upgrade(move |socket| handle_socket(socket, hub, actor))
            .into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "Rejected event channel upgrade");
            MessagingError::Unauthorized.into_response()
        }
    }
}

/// Handle a single WebSocket connection
///
/// This function:
/// 1. Registers the connection with the hub
/// 2. Sends a Welcome message
/// 3. Spawns a write loop that forwards ServerMessages to the WebSocket
/// 4. Runs the read loop that processes client frames
/// 5. Cleans up on disconnect (room memberships go with the connection)
async fn handle_socket(socket: WebSocket, hub: Arc<ChannelHub>, actor: Actor) {
    let actor_id = actor.id;
    let (conn_id, mut server_rx) = hub.connect(actor).await;

    let (mut ws_write, mut ws_read) = socket.split();

    let welcome = ServerMessage::Welcome {
        connection_id: conn_id.clone(),
        actor_id,
    };
    if let Ok(json) = serde_json::to_string(&welcome)
        && ws_write.send(Message::Text(json.into())).await.is_err()
    {
        hub.disconnect(&conn_id).await;
        return;
    }

    let conn_id_write = conn_id.clone();

    let write_handle = tokio::spawn(async move {
        while let Some(msg) = server_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_write.send(Message::Text(json.into())).await.is_err() {
                        tracing::debug!(
                            connection_id = %conn_id_write,
                            "WebSocket write failed, closing"
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        connection_id = %conn_id_write,
                        error = %e,
                        "Failed to serialize ServerMessage"
                    );
                }
            }
        }
    });

    while let Some(result) = ws_read.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => hub.handle_message(&conn_id, msg).await,
                Err(e) => {
                    hub.send_to(
                        &conn_id,
                        ServerMessage::Error {
                            message: format!("Invalid message: {}", e),
                        },
                    )
                    .await;
                }
            },
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %conn_id, "Client sent close frame");
                break;
            }
            Ok(_) => {
                // axum answers pings itself; binary frames are ignored
            }
            Err(e) => {
                tracing::debug!(
                    connection_id = %conn_id,
                    error = %e,
                    "WebSocket read error"
                );
                break;
            }
        }
    }

    write_handle.abort();
    hub.disconnect(&conn_id).await;
}
