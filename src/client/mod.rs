//! Client core: the components a messaging screen is built from
//!
//! - [`ConnectionManager`] owns the authenticated event channel and reconnects
//! - [`ChannelHandle::join`] hands out room guards that leave on drop
//! - [`MessageTimeline`] keeps one conversation ordered and deduplicated
//! - [`TypingTracker`] debounces local typing and expires remote indicators
//! - [`ConversationDirectory`] keeps the conversation list and unread badges
//! - [`SendPipeline`] validates and sends, refusing duplicates in flight
//! - [`ConversationView`] and [`Inbox`] tie them together
//!
//! Request/response calls go through a [`MessageApi`]; events arrive through
//! a [`Transport`].

pub mod api;
pub mod connection;
pub mod directory;
#[cfg(feature = "http-client")]
pub mod http;
pub mod inbox;
pub mod membership;
pub mod send;
pub mod timeline;
pub mod transport;
pub mod typing;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ActorScopedApi, MessageApi};
pub use connection::{ChannelHandle, ConnectionManager, ConnectionState, InboundEvent};
pub use directory::ConversationDirectory;
#[cfg(feature = "http-client")]
pub use http::HttpMessageApi;
pub use inbox::{Inbox, InboxUpdate};
pub use membership::{EventHandler, RoomGuard};
pub use send::SendPipeline;
pub use timeline::MessageTimeline;
#[cfg(feature = "ws-client")]
pub use transport::WsTransport;
pub use transport::{ChannelLink, InProcessTransport, Transport};
pub use typing::{TypingSignal, TypingTracker};
pub use view::{ConversationView, HistoryTicket, ViewPhase, ViewUpdate};
