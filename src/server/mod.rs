//! Server half: message store host, REST surface and event channel hub
//!
//! `ServerBuilder` assembles a `ServerHost` and exposes it over:
//! - REST routes for conversations and messages
//! - a `/ws` event channel with per-conversation rooms

pub mod builder;
pub mod exposure;
pub mod host;

pub use builder::ServerBuilder;
pub use exposure::{ChannelHub, RestExposure, WebSocketExposure};
pub use host::ServerHost;
