//! Typed error handling for roomtalk
//!
//! A single error enum travels through the store, the HTTP surface and the
//! client core. At the HTTP boundary it renders as a JSON [`ErrorResponse`];
//! in the client it is converted into view-local state and never escalates.
//!
//! # Error Categories
//!
//! - Validation: content rejected before any network call
//! - Access: unauthenticated or not a participant
//! - Lookup: unknown conversation or room
//! - Storage, transport and protocol failures (retryable)

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result alias used across the crate
pub type MessagingResult<T> = Result<T, MessagingError>;

/// The main error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MessagingError {
    /// Message content is empty or whitespace only
    #[error("Message content must not be empty")]
    EmptyContent,

    /// Message content exceeds the configured bound
    #[error("Message content is {len} characters, limit is {max}")]
    ContentTooLong { len: usize, max: usize },

    /// The same content is already being sent to this conversation
    #[error("An identical message is already being sent to conversation {conversation_id}")]
    DuplicateSubmission { conversation_id: Uuid },

    /// A view operation needs an open conversation
    #[error("No conversation is open")]
    NoOpenConversation,

    /// No credential, or the credential does not resolve to an actor
    #[error("Authentication required")]
    Unauthorized,

    /// The actor is not allowed to touch this conversation
    #[error("Access to conversation {conversation_id} denied")]
    Forbidden { conversation_id: Uuid },

    /// Only tenants can open a conversation about a room
    #[error("Only tenants can start a conversation about a room")]
    NotATenant,

    #[error("Conversation {id} not found")]
    ConversationNotFound { id: Uuid },

    #[error("Room {id} not found")]
    RoomNotFound { id: Uuid },

    /// The message store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// The request/response or event channel transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// A frame or payload could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote store answered with an error payload
    #[error("Remote error {status}: {message}")]
    Remote { status: u16, message: String },
}

/// Error response structure for HTTP responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl MessagingError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            MessagingError::EmptyContent | MessagingError::ContentTooLong { .. } => {
                StatusCode::BAD_REQUEST
            }
            MessagingError::DuplicateSubmission { .. } | MessagingError::NoOpenConversation => {
                StatusCode::CONFLICT
            }
            MessagingError::Unauthorized => StatusCode::UNAUTHORIZED,
            MessagingError::Forbidden { .. } | MessagingError::NotATenant => StatusCode::FORBIDDEN,
            MessagingError::ConversationNotFound { .. } | MessagingError::RoomNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            MessagingError::Protocol(_) => StatusCode::BAD_REQUEST,
            MessagingError::Storage(_) | MessagingError::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            MessagingError::Remote { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            MessagingError::EmptyContent => "EMPTY_CONTENT",
            MessagingError::ContentTooLong { .. } => "CONTENT_TOO_LONG",
            MessagingError::DuplicateSubmission { .. } => "DUPLICATE_SUBMISSION",
            MessagingError::NoOpenConversation => "NO_OPEN_CONVERSATION",
            MessagingError::Unauthorized => "UNAUTHORIZED",
            MessagingError::Forbidden { .. } => "FORBIDDEN",
            MessagingError::NotATenant => "NOT_A_TENANT",
            MessagingError::ConversationNotFound { .. } => "CONVERSATION_NOT_FOUND",
            MessagingError::RoomNotFound { .. } => "ROOM_NOT_FOUND",
            MessagingError::Storage(_) => "STORAGE_ERROR",
            MessagingError::Transport(_) => "TRANSPORT_ERROR",
            MessagingError::Protocol(_) => "PROTOCOL_ERROR",
            MessagingError::Remote { .. } => "REMOTE_ERROR",
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            MessagingError::Storage(_) | MessagingError::Transport(_) => true,
            MessagingError::Remote { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for MessagingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(self.to_response())).into_response()
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(e: serde_json::Error) -> Self {
        MessagingError::Protocol(e.to_string())
    }
}
