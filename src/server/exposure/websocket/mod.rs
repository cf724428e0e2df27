//! Event channel exposure over WebSocket
//!
//! Authenticated clients connect to `/ws`, join conversation rooms and
//! receive persisted messages, typing signals and read receipts for the
//! rooms they joined.
//!
//! # Architecture
//!
//! ```text
//! Client ──ws──▶ /ws ──▶ ws_handler() ──auth──▶ ChannelHub
//!                                                  │
//!                                         join/leave rooms
//!                                                  │
//!                  EventBus ──broadcast──▶ room fan-out ──▶ Client
//! ```
//!
//! The frame format is documented in [`protocol`].

mod handler;
mod manager;
pub mod protocol;

pub use manager::ChannelHub;

use crate::server::host::ServerHost;
use anyhow::Result;
use axum::{Router, routing::get};
use std::sync::Arc;

/// WebSocket exposure implementation
///
/// Consumes a `ServerHost` and produces an Axum router with a `/ws`
/// endpoint backed by a [`ChannelHub`].
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(ServerBuilder::new().with_store(store).build_host()?);
///
/// let rest_router = RestExposure::build_router(host.clone(), vec![])?;
/// let ws_router = WebSocketExposure::build_router(host)?;
///
/// let app = rest_router.merge(ws_router);
/// ```
pub struct WebSocketExposure;

impl WebSocketExposure {
    /// Build the WebSocket router from a host
    ///
    /// Spawns the dispatch loop of a fresh hub.
    pub fn build_router(host: Arc<ServerHost>) -> Result<Router> {
        let (router, _hub) = Self::build_router_with_hub(host)?;
        Ok(router)
    }

    /// Same as [`build_router`](Self::build_router), also returning the hub
    ///
    /// In-process clients attach to the returned hub directly.
    pub fn build_router_with_hub(host: Arc<ServerHost>) -> Result<(Router, Arc<ChannelHub>)> {
        let hub = Self::spawn_hub(host);

        let router = Router::new()
            .route("/ws", get(handler::ws_handler))
            .with_state(hub.clone());

        Ok((router, hub))
    }

    /// Create a hub and spawn its dispatch loop on the host's event bus
    pub fn spawn_hub(host: Arc<ServerHost>) -> Arc<ChannelHub> {
        let rx = host.event_bus().subscribe();
        let hub = Arc::new(ChannelHub::new(host));

        let dispatcher = hub.clone();
        tokio::spawn(async move {
            dispatcher.run_dispatch_loop(rx).await;
        });

        hub
    }
}
