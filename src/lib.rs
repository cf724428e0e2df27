//! # roomtalk
//!
//! Real-time messaging between tenants and landlords about a listed room.
//!
//! ## Features
//!
//! - **Conversations**: one per (tenant, room), created on first contact
//! - **Event Channel**: authenticated WebSocket with per-conversation rooms
//! - **Notifications**: participants outside the room still hear about new messages
//! - **Typing Presence**: debounced start/stop with remote expiry
//! - **Client Core**: reconnecting channel, ordered timelines, unread badges
//! - **Configuration-Based**: limits, timings and tokens from YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use roomtalk::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     roomtalk::init_tracing();
//!
//!     let config = MessagingConfig::from_yaml_file("config/roomtalk.yaml")?;
//!     ServerBuilder::new()
//!         .with_config(config)
//!         .with_store(InMemoryMessageStore::new())
//!         .serve()
//!         .await
//! }
//! ```
//!
//! A client screen combines a [`ConnectionManager`](client::ConnectionManager)
//! with an [`Inbox`](client::Inbox):
//!
//! ```rust,ignore
//! let channel = ConnectionManager::new(
//!     Arc::new(WsTransport::new("ws://localhost:5000/ws")),
//!     config.reconnect.clone(),
//! );
//! channel.connect(Some(Credential::new(token)));
//!
//! let api = Arc::new(HttpMessageApi::new("http://localhost:5000", Credential::new(token)));
//! let mut inbox = Inbox::new(me, channel.handle(), api, Arc::new(config));
//! inbox.refresh().await;
//! while let Some(update) = inbox.next_update().await {
//!     render(&inbox, update);
//! }
//! ```

pub mod client;
pub mod config;
pub mod core;
pub mod server;
pub mod storage;

/// Wire frames of the event channel
pub use server::exposure::websocket::protocol;

/// Install a `tracing` subscriber filtered by `RUST_LOG`
///
/// Defaults to `info` for this crate and `warn` elsewhere. Calling it twice
/// is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,roomtalk=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        Actor, ActorProfile, AuthProvider, ChatEvent, Conversation, ConversationDetails,
        ConversationSummary, Credential, EventBus, HistoryQuery, HostStats, Message, MessageStore,
        MessagingError, MessagingResult, Role, RoomSummary, StaticTokenAuth,
    };

    // === Config ===
    pub use crate::config::{LimitsConfig, MessagingConfig, ReconnectConfig, TypingConfig};

    // === Storage ===
    pub use crate::storage::InMemoryMessageStore;

    // === Server ===
    pub use crate::server::{ChannelHub, ServerBuilder, ServerHost};

    // === Protocol ===
    pub use crate::protocol::{ClientMessage, ServerMessage};

    // === Client ===
    #[cfg(feature = "http-client")]
    pub use crate::client::HttpMessageApi;
    #[cfg(feature = "ws-client")]
    pub use crate::client::WsTransport;
    pub use crate::client::{
        ActorScopedApi, ChannelHandle, ConnectionManager, ConnectionState, ConversationDirectory,
        ConversationView, EventHandler, InProcessTransport, Inbox, InboxUpdate, InboundEvent,
        MessageApi, MessageTimeline, RoomGuard, SendPipeline, Transport, TypingTracker,
        ViewPhase,
    };

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
    pub use uuid::Uuid;

    // === Axum ===
    pub use axum::Router;
}
