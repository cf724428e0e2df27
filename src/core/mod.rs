//! Core module containing the domain types, traits and errors shared by the
//! server and the client halves

pub mod auth;
pub mod error;
pub mod events;
pub mod extractors;
pub mod model;
pub mod query;
pub mod store;
pub mod validation;

pub use auth::{AuthProvider, Credential, StaticTokenAuth};
pub use error::{ErrorResponse, MessagingError, MessagingResult};
pub use events::{ChatEvent, EventBus, EventEnvelope};
pub use extractors::AuthenticatedActor;
pub use model::{
    Actor, ActorProfile, Conversation, ConversationDetails, ConversationSummary, HostStats,
    Message, Role, RoomSummary,
};
pub use query::HistoryQuery;
pub use store::MessageStore;
pub use validation::{DEFAULT_MAX_MESSAGE_LENGTH, validate_content};
