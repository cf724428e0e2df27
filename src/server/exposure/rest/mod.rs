//! REST API exposure
//!
//! Consumes a `ServerHost` and produces an Axum `Router` with the
//! conversation and message endpoints plus health checks.

pub mod handlers;

use super::super::host::ServerHost;
use anyhow::Result;
use axum::{
    Json, Router,
    routing::{get, put},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use handlers::{
    ConversationsResponse, MarkReadResponse, MessageResponse, MessagesResponse,
    SendMessageRequest,
};

/// REST API exposure implementation
pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    ///
    /// Returns a router with:
    /// - Health check routes
    /// - `/messages/...` conversation and message routes
    /// - Custom routes merged in as given
    pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Result<Router> {
        let mut app = Self::health_routes().merge(Self::message_routes(host));

        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }

        Ok(app.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        ))
    }

    fn message_routes(host: Arc<ServerHost>) -> Router {
        Router::new()
            .route(
                "/messages/room/{room_id}/conversation",
                get(handlers::get_or_create_conversation),
            )
            .route("/messages/conversations", get(handlers::list_conversations))
            .route(
                "/messages/conversations/{id}/messages",
                get(handlers::list_messages).post(handlers::send_message),
            )
            .route(
                "/messages/conversations/{id}/read",
                put(handlers::mark_read),
            )
            .with_state(host)
    }

    /// Build health check routes
    fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    /// Health check endpoint handler
    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": "roomtalk"
        }))
    }
}
