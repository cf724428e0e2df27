//! Server host for transport-agnostic API exposure
//!
//! `ServerHost` holds everything the REST surface and the event channel hub
//! share: the message store, the auth provider, the event bus and the
//! configuration. Mutations that other clients must hear about go through
//! the host so that persisting and publishing always happen together.

use crate::config::MessagingConfig;
use crate::core::auth::AuthProvider;
use crate::core::error::MessagingResult;
use crate::core::events::{ChatEvent, EventBus};
use crate::core::model::{Actor, Message};
use crate::core::store::MessageStore;
use std::sync::Arc;
use uuid::Uuid;

/// Host context containing all server state
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(ServerHost::new(
///     Arc::new(InMemoryMessageStore::new()),
///     Arc::new(config.static_auth()),
///     MessagingConfig::default(),
/// ));
///
/// let rest_app = RestExposure::build_router(host.clone(), vec![])?;
/// let ws_app = WebSocketExposure::build_router(host)?;
/// ```
pub struct ServerHost {
    pub config: Arc<MessagingConfig>,
    pub store: Arc<dyn MessageStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub event_bus: Arc<EventBus>,
}

impl ServerHost {
    pub fn new(
        store: Arc<dyn MessageStore>,
        auth: Arc<dyn AuthProvider>,
        config: MessagingConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));
        Self {
            config: Arc::new(config),
            store,
            auth,
            event_bus,
        }
    }

    /// Replace the event bus (to share one between hosts)
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Persist a message, then publish it to the event channel
    ///
    /// Persistence does not depend on anyone listening: with no connected
    /// clients the event is simply dropped.
    pub async fn send_message(
        &self,
        actor: &Actor,
        conversation_id: Uuid,
        content: &str,
    ) -> MessagingResult<Message> {
        let (message, conversation) = self
            .store
            .post_message(actor, conversation_id, content)
            .await?;

        let receivers = self.event_bus.publish(ChatEvent::MessageCreated {
            conversation,
            message: message.clone(),
        });
        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            receivers,
            "Message persisted and published"
        );

        Ok(message)
    }

    /// Mark a conversation read for the actor and publish a receipt
    pub async fn mark_read(&self, actor: &Actor, conversation_id: Uuid) -> MessagingResult<usize> {
        let count = self.store.mark_read(actor, conversation_id).await?;
        if count > 0 {
            self.event_bus.publish(ChatEvent::MessagesRead {
                conversation_id,
                reader_id: actor.id,
                count,
            });
        }
        Ok(count)
    }
}
