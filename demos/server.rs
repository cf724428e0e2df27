//! Demo messaging server
//!
//! Seeds one room and three development tokens, then serves the REST routes
//! and the `/ws` event channel.
//!
//! ```text
//! cargo run --example server -- [config.yaml]
//! ```

use anyhow::Result;
use roomtalk::config::TokenEntry;
use roomtalk::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    roomtalk::init_tracing();

    let mut config = match std::env::args().nth(1) {
        Some(path) => MessagingConfig::from_yaml_file(&path)?,
        None => MessagingConfig::default(),
    };
    if config.tokens.is_empty() {
        config.tokens = demo_tokens();
    }

    let landlord = config
        .tokens
        .iter()
        .find(|entry| entry.role == Role::Landlord)
        .ok_or_else(|| anyhow::anyhow!("config needs at least one landlord token"))?;

    let store = InMemoryMessageStore::with_limits(config.limits.clone());
    let room_id = Uuid::new_v4();
    store.register_room(RoomSummary {
        id: room_id,
        title: "Sunny loft near the lake".into(),
        location: "Pokhara".into(),
        landlord: ActorProfile::named(landlord.actor_id, landlord.display_name.clone()),
        host_stats: HostStats {
            total_reviews: 12,
            avg_rating: 4.5,
            years_hosting: 3,
        },
    })?;
    for entry in &config.tokens {
        store.register_profile(ActorProfile::named(
            entry.actor_id,
            entry.display_name.clone(),
        ))?;
    }

    let addr = config.bind_addr.clone();
    println!("🚀 Starting roomtalk on http://{}", addr);
    println!("🏠 Room: {}", room_id);
    println!("🔑 Tokens:");
    for entry in &config.tokens {
        println!("    {:<10} {} ({:?})", entry.token, entry.display_name, entry.role);
    }
    println!("\n📚 Routes:");
    println!("    GET    /messages/room/{{room_id}}/conversation      - Find or start a conversation");
    println!("    GET    /messages/conversations                    - List conversations");
    println!("    GET    /messages/conversations/{{id}}/messages      - Message history");
    println!("    POST   /messages/conversations/{{id}}/messages      - Send a message");
    println!("    PUT    /messages/conversations/{{id}}/read          - Mark read");
    println!("    GET    /ws?token=...                              - Event channel");

    ServerBuilder::new()
        .with_config(config)
        .with_store(store)
        .serve()
        .await
}

fn demo_tokens() -> Vec<TokenEntry> {
    vec![
        TokenEntry {
            token: "tenant".into(),
            actor_id: Uuid::new_v4(),
            display_name: "Tina Tenant".into(),
            role: Role::Tenant,
        },
        TokenEntry {
            token: "landlord".into(),
            actor_id: Uuid::new_v4(),
            display_name: "Lars Landlord".into(),
            role: Role::Landlord,
        },
        TokenEntry {
            token: "admin".into(),
            actor_id: Uuid::new_v4(),
            display_name: "Ada Admin".into(),
            role: Role::Admin,
        },
    ]
}
