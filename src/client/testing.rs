//! Shared fixture for client tests: one room, a tenant, its landlord and an
//! admin, all served in process.

use super::api::ActorScopedApi;
use super::transport::InProcessTransport;
use crate::config::MessagingConfig;
use crate::core::auth::StaticTokenAuth;
use crate::core::model::{Actor, ActorProfile, HostStats, Message, Role, RoomSummary};
use crate::server::exposure::{ChannelHub, WebSocketExposure};
use crate::server::host::ServerHost;
use crate::storage::InMemoryMessageStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct Fixture {
    pub host: Arc<ServerHost>,
    pub hub: Arc<ChannelHub>,
    pub room_id: Uuid,
    pub tenant: Actor,
    pub landlord: Actor,
    pub admin: Actor,
}

impl Fixture {
    pub async fn new() -> Self {
        let tenant = Actor::new(Uuid::new_v4(), "Tina Tenant", Role::Tenant);
        let landlord = Actor::new(Uuid::new_v4(), "Lars Landlord", Role::Landlord);
        let admin = Actor::new(Uuid::new_v4(), "Ada Admin", Role::Admin);
        let room_id = Uuid::new_v4();

        let store = InMemoryMessageStore::new();
        store
            .register_room(RoomSummary {
                id: room_id,
                title: "Sunny loft near the lake".into(),
                location: "Pokhara".into(),
                landlord: ActorProfile::named(landlord.id, landlord.display_name.clone()),
                host_stats: HostStats {
                    total_reviews: 12,
                    avg_rating: 4.5,
                    years_hosting: 3,
                },
            })
            .unwrap();
        store
            .register_profile(ActorProfile::named(tenant.id, tenant.display_name.clone()))
            .unwrap();

        let auth = StaticTokenAuth::new()
            .with_token("tenant", tenant.clone())
            .with_token("landlord", landlord.clone())
            .with_token("admin", admin.clone());

        let host = Arc::new(ServerHost::new(
            Arc::new(store),
            Arc::new(auth),
            MessagingConfig::default(),
        ));
        let hub = WebSocketExposure::spawn_hub(host.clone());

        Self {
            host,
            hub,
            room_id,
            tenant,
            landlord,
            admin,
        }
    }

    pub fn api(&self, actor: &Actor) -> Arc<ActorScopedApi> {
        Arc::new(ActorScopedApi::new(self.host.clone(), actor.clone()))
    }

    pub fn transport(&self) -> Arc<InProcessTransport> {
        Arc::new(InProcessTransport::new(self.hub.clone()))
    }

    /// Conversation of the fixture tenant about the fixture room
    pub async fn conversation_id(&self) -> Uuid {
        self.host
            .store
            .get_or_create_conversation(&self.tenant, self.room_id)
            .await
            .unwrap()
            .conversation
            .id
    }
}

/// A detached message for pure timeline tests
pub fn message_at(conversation_id: Uuid, sender_id: Uuid, at: DateTime<Utc>) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        sender_name: "someone".into(),
        content: "hello".into(),
        created_at: at,
        is_read: false,
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc::now() - Duration::hours(1)
}
