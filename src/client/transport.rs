//! Event channel transports
//!
//! A [`Transport`] opens one authenticated event channel and hands back a
//! [`ChannelLink`]: an outbound frame sender and an inbound frame receiver.
//! The link is closed when the inbound side ends; dropping the outbound
//! sender closes the channel from the client side.

use crate::core::auth::Credential;
use crate::core::error::MessagingResult;
use crate::server::exposure::ChannelHub;
use crate::server::exposure::websocket::protocol::{ClientMessage, ServerMessage};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Both directions of an open event channel
pub struct ChannelLink {
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    pub inbound: mpsc::UnboundedReceiver<ServerMessage>,
}

/// Opens event channels
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a channel authenticated with `credential`
    ///
    /// Fails with `Unauthorized` when the credential is refused, which stops
    /// reconnect attempts.
    async fn open(&self, credential: &Credential) -> MessagingResult<ChannelLink>;
}

/// Attaches directly to a [`ChannelHub`] in the same process
#[derive(Clone)]
pub struct InProcessTransport {
    hub: Arc<ChannelHub>,
}

impl InProcessTransport {
    pub fn new(hub: Arc<ChannelHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn open(&self, credential: &Credential) -> MessagingResult<ChannelLink> {
        let actor = self.hub.host().auth.authenticate(Some(credential)).await?;
        let actor_id = actor.id;
        let (conn_id, inbound) = self.hub.connect(actor).await;
        self.hub
            .send_to(
                &conn_id,
                ServerMessage::Welcome {
                    connection_id: conn_id.clone(),
                    actor_id,
                },
            )
            .await;

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let hub = self.hub.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                hub.handle_message(&conn_id, frame).await;
            }
            hub.disconnect(&conn_id).await;
        });

        Ok(ChannelLink { outbound, inbound })
    }
}

#[cfg(feature = "ws-client")]
pub use ws::WsTransport;

#[cfg(feature = "ws-client")]
mod ws {
    use super::{ChannelLink, Transport};
    use crate::core::auth::Credential;
    use crate::core::error::{MessagingError, MessagingResult};
    use crate::server::exposure::websocket::protocol::{ClientMessage, ServerMessage};
    use async_trait::async_trait;
    use futures::{SinkExt, StreamExt};
    use tokio::sync::mpsc;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;
    use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
    use tokio_tungstenite::tungstenite::{self, Message};

    /// Connects to the `/ws` endpoint of a server
    #[derive(Debug, Clone)]
    pub struct WsTransport {
        url: String,
    }

    impl WsTransport {
        /// `url` is the full endpoint, e.g. `ws://127.0.0.1:5000/ws`
        pub fn new(url: impl Into<String>) -> Self {
            Self { url: url.into() }
        }
    }

    #[async_trait]
    impl Transport for WsTransport {
        async fn open(&self, credential: &Credential) -> MessagingResult<ChannelLink> {
            let mut request = self
                .url
                .as_str()
                .into_client_request()
                .map_err(|e| MessagingError::Transport(e.to_string()))?;
            let header = HeaderValue::from_str(&credential.bearer_header())
                .map_err(|e| MessagingError::Transport(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, header);

            let (stream, _) = connect_async(request).await.map_err(|e| match e {
                tungstenite::Error::Http(response) if response.status().as_u16() == 401 => {
                    MessagingError::Unauthorized
                }
                other => MessagingError::Transport(other.to_string()),
            })?;
            let (mut ws_write, mut ws_read) = stream.split();

            let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
            let (inbound_tx, inbound) = mpsc::unbounded_channel::<ServerMessage>();

            tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize ClientMessage");
                            continue;
                        }
                    };
                    if ws_write.send(Message::Text(json.into())).await.is_err() {
                        return;
                    }
                }
                let _ = ws_write.send(Message::Close(None)).await;
            });

            tokio::spawn(async move {
                while let Some(result) = ws_read.next().await {
                    match result {
                        Ok(Message::Text(text)) => {
                            match serde_json::from_str::<ServerMessage>(&text) {
                                Ok(frame) => {
                                    if inbound_tx.send(frame).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "Ignoring undecodable server frame");
                                }
                            }
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            tracing::debug!(error = %e, "Event channel read error");
                            break;
                        }
                    }
                }
            });

            Ok(ChannelLink { outbound, inbound })
        }
    }
}
