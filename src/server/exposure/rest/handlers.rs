//! HTTP handlers for conversation and message operations
//!
//! Every handler takes an [`AuthenticatedActor`]; access checks happen in the
//! store, errors render through `MessagingError`'s `IntoResponse`.

use crate::core::error::MessagingError;
use crate::core::extractors::AuthenticatedActor;
use crate::core::model::{ConversationDetails, ConversationSummary, Message};
use crate::core::query::HistoryQuery;
use crate::server::host::ServerHost;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Response for the conversation list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

/// Response for the history endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

/// Response for the send endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: Message,
}

/// Response for the mark-read endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

/// Request body for sending a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// GET /messages/room/{room_id}/conversation
pub async fn get_or_create_conversation(
    State(host): State<Arc<ServerHost>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(room_id): Path<Uuid>,
) -> Result<Json<ConversationDetails>, MessagingError> {
    let details = host
        .store
        .get_or_create_conversation(&actor, room_id)
        .await?;
    Ok(Json(details))
}

/// GET /messages/conversations
pub async fn list_conversations(
    State(host): State<Arc<ServerHost>>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> Result<Json<ConversationsResponse>, MessagingError> {
    let conversations = host.store.list_conversations(&actor).await?;
    Ok(Json(ConversationsResponse { conversations }))
}

/// GET /messages/conversations/{id}/messages?before=&limit=
pub async fn list_messages(
    State(host): State<Arc<ServerHost>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MessagesResponse>, MessagingError> {
    let messages = host
        .store
        .list_messages(&actor, conversation_id, &query)
        .await?;
    Ok(Json(MessagesResponse { messages }))
}

/// POST /messages/conversations/{id}/messages
pub async fn send_message(
    State(host): State<Arc<ServerHost>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), MessagingError> {
    let message = host
        .send_message(&actor, conversation_id, &payload.content)
        .await?;
    Ok((StatusCode::CREATED, Json(MessageResponse { message })))
}

/// PUT /messages/conversations/{id}/read
pub async fn mark_read(
    State(host): State<Arc<ServerHost>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, MessagingError> {
    let updated = host.mark_read(&actor, conversation_id).await?;
    Ok(Json(MarkReadResponse { updated }))
}
