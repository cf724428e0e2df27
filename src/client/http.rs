//! REST implementation of [`MessageApi`]

use super::api::MessageApi;
use crate::core::auth::Credential;
use crate::core::error::{ErrorResponse, MessagingError, MessagingResult};
use crate::core::model::{ConversationDetails, ConversationSummary, Message};
use crate::core::query::HistoryQuery;
use crate::server::exposure::rest::{
    ConversationsResponse, MarkReadResponse, MessageResponse, MessagesResponse,
    SendMessageRequest,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Talks to the REST surface with one bearer credential
#[derive(Debug, Clone)]
pub struct HttpMessageApi {
    client: reqwest::Client,
    base_url: String,
    credential: Credential,
}

impl HttpMessageApi {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:5000`
    pub fn new(base_url: impl Into<String>, credential: Credential) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, credential)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credential: Credential,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            credential,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode either the payload or the error body
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> MessagingResult<T> {
        let response = request
            .bearer_auth(self.credential.token())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                MessagingError::Protocol(format!("Invalid response body: {}", e))
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MessagingError::Unauthorized);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.message,
            Err(_) => status.canonical_reason().unwrap_or("Unknown error").to_string(),
        };
        Err(MessagingError::Remote {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport_error(e: reqwest::Error) -> MessagingError {
    MessagingError::Transport(e.to_string())
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn get_or_create_conversation(
        &self,
        room_id: Uuid,
    ) -> MessagingResult<ConversationDetails> {
        let url = self.url(&format!("/messages/room/{}/conversation", room_id));
        self.execute(self.client.get(url)).await
    }

    async fn list_conversations(&self) -> MessagingResult<Vec<ConversationSummary>> {
        let url = self.url("/messages/conversations");
        let body: ConversationsResponse = self.execute(self.client.get(url)).await?;
        Ok(body.conversations)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        query: &HistoryQuery,
    ) -> MessagingResult<Vec<Message>> {
        let url = self.url(&format!(
            "/messages/conversations/{}/messages",
            conversation_id
        ));
        let body: MessagesResponse = self.execute(self.client.get(url).query(query)).await?;
        Ok(body.messages)
    }

    async fn send_message(&self, conversation_id: Uuid, content: &str) -> MessagingResult<Message> {
        let url = self.url(&format!(
            "/messages/conversations/{}/messages",
            conversation_id
        ));
        let payload = SendMessageRequest {
            content: content.to_string(),
        };
        let body: MessageResponse = self.execute(self.client.post(url).json(&payload)).await?;
        Ok(body.message)
    }

    async fn mark_read(&self, conversation_id: Uuid) -> MessagingResult<usize> {
        let url = self.url(&format!("/messages/conversations/{}/read", conversation_id));
        let body: MarkReadResponse = self.execute(self.client.put(url)).await?;
        Ok(body.updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let api = HttpMessageApi::new("http://localhost:5000/", Credential::new("t"));
        assert_eq!(
            api.url("/messages/conversations"),
            "http://localhost:5000/messages/conversations"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Port 9 (discard) is not expected to run an HTTP server
        let api = HttpMessageApi::new("http://127.0.0.1:9", Credential::new("t"));
        let err = api.list_conversations().await.unwrap_err();
        assert!(matches!(err, MessagingError::Transport(_)));
        assert!(err.is_retryable());
    }
}
