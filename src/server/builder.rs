//! ServerBuilder for fluent API to build the messaging server

use super::exposure::{ChannelHub, RestExposure, WebSocketExposure};
use super::host::ServerHost;
use crate::config::MessagingConfig;
use crate::core::auth::AuthProvider;
use crate::core::store::MessageStore;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for the REST + event channel server
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config(MessagingConfig::from_yaml_file("roomtalk.yaml")?)
///     .with_store(InMemoryMessageStore::new())
///     .build()?;
/// ```
pub struct ServerBuilder {
    config: MessagingConfig,
    store: Option<Arc<dyn MessageStore>>,
    auth: Option<Arc<dyn AuthProvider>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: MessagingConfig::default(),
            store: None,
            auth: None,
            custom_routes: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: MessagingConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the message store (required)
    pub fn with_store(mut self, store: impl MessageStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set the auth provider
    ///
    /// Defaults to the static token table of the configuration.
    pub fn with_auth(mut self, auth: impl AuthProvider + 'static) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Add custom routes to the server (login, webhooks, ...)
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    pub fn build_host(self) -> Result<ServerHost> {
        self.config.validate()?;

        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("MessageStore is required. Call .with_store()"))?;

        let auth = match self.auth {
            Some(auth) => auth,
            None => {
                if self.config.tokens.is_empty() {
                    tracing::warn!("No auth provider and no configured tokens, every request will be rejected");
                }
                Arc::new(self.config.static_auth())
            }
        };

        Ok(ServerHost::new(store, auth, self.config))
    }

    /// Build the REST router merged with the `/ws` event channel
    ///
    /// Must be called inside a tokio runtime: the hub's dispatch loop is
    /// spawned here.
    pub fn build(self) -> Result<Router> {
        let (router, _host, _hub) = self.build_parts()?;
        Ok(router)
    }

    /// Build the router and also return the host and the hub
    ///
    /// In-process clients use the host for requests and the hub for events.
    pub fn build_parts(mut self) -> Result<(Router, Arc<ServerHost>, Arc<ChannelHub>)> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);

        let rest_router = RestExposure::build_router(host.clone(), custom_routes)?;
        let (ws_router, hub) = WebSocketExposure::build_router_with_hub(host.clone())?;

        Ok((rest_router.merge(ws_router), host, hub))
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the configured address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.bind_addr.clone();
        let app = self.build()?;
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!(addr = %addr, "Server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenEntry;
    use crate::core::auth::Credential;
    use crate::core::model::Role;
    use crate::storage::InMemoryMessageStore;
    use uuid::Uuid;

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = ServerBuilder::new();
        assert!(builder.store.is_none());
        assert!(builder.auth.is_none());
        assert!(builder.custom_routes.is_empty());
        assert_eq!(builder.config, MessagingConfig::default());
    }

    #[test]
    fn test_build_host_without_store_fails() {
        let err = ServerBuilder::new().build_host().err().unwrap();
        assert!(err.to_string().contains("MessageStore is required"));
    }

    #[test]
    fn test_build_host_rejects_invalid_config() {
        let mut config = MessagingConfig::default();
        config.limits.max_message_length = 0;
        let result = ServerBuilder::new()
            .with_config(config)
            .with_store(InMemoryMessageStore::new())
            .build_host();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_build_host_uses_configured_tokens() {
        let actor_id = Uuid::new_v4();
        let config = MessagingConfig {
            tokens: vec![TokenEntry {
                token: "tina".into(),
                actor_id,
                display_name: "Tina".into(),
                role: Role::Tenant,
            }],
            ..Default::default()
        };

        let host = ServerBuilder::new()
            .with_config(config)
            .with_store(InMemoryMessageStore::new())
            .build_host()
            .unwrap();

        let actor = host.auth.resolve(&Credential::new("tina")).await.unwrap();
        assert_eq!(actor.id, actor_id);
        assert!(host.auth.resolve(&Credential::new("nope")).await.is_none());
    }

    #[tokio::test]
    async fn test_build_parts_shares_host() {
        let (_router, host, hub) = ServerBuilder::new()
            .with_store(InMemoryMessageStore::new())
            .build_parts()
            .unwrap();

        assert!(Arc::ptr_eq(&host, hub.host()));
        // The hub's dispatch loop is subscribed to the bus
        assert_eq!(host.event_bus().receiver_count(), 1);
    }

    #[tokio::test]
    async fn test_build_with_custom_routes() {
        use axum::routing::get;

        let custom = Router::new().route("/custom", get(|| async { "ok" }));
        let result = ServerBuilder::new()
            .with_store(InMemoryMessageStore::new())
            .with_custom_routes(custom)
            .build();
        assert!(result.is_ok());
    }
}
