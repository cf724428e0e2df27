//! Outbound send pipeline
//!
//! Content is validated before any network call, and a second submission of
//! the same content to the same conversation is refused while the first one
//! is still in flight. The store's answer is the authoritative message.

use super::api::MessageApi;
use crate::core::error::{MessagingError, MessagingResult};
use crate::core::model::Message;
use crate::core::validation::{DEFAULT_MAX_MESSAGE_LENGTH, validate_content};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

type InFlight = Arc<Mutex<HashSet<(Uuid, String)>>>;

#[derive(Clone)]
pub struct SendPipeline {
    api: Arc<dyn MessageApi>,
    max_len: usize,
    in_flight: InFlight,
}

/// Removes its key from the in-flight set when the send finishes either way
struct InFlightGuard {
    set: InFlight,
    key: (Uuid, String),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl SendPipeline {
    pub fn new(api: Arc<dyn MessageApi>) -> Self {
        Self::with_max_len(api, DEFAULT_MAX_MESSAGE_LENGTH)
    }

    pub fn with_max_len(api: Arc<dyn MessageApi>, max_len: usize) -> Self {
        Self {
            api,
            max_len,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn api(&self) -> &Arc<dyn MessageApi> {
        &self.api
    }

    /// Validate, guard against duplicates and persist
    pub async fn send(&self, conversation_id: Uuid, content: &str) -> MessagingResult<Message> {
        let content = validate_content(content, self.max_len)?;
        let _guard = self.begin(conversation_id, content)?;

        let result = self.api.send_message(conversation_id, content).await;
        if let Err(e) = &result {
            tracing::warn!(
                conversation_id = %conversation_id,
                error = %e,
                retryable = e.is_retryable(),
                "Send failed"
            );
        }
        result
    }

    fn begin(&self, conversation_id: Uuid, content: &str) -> MessagingResult<InFlightGuard> {
        let key = (conversation_id, content.to_string());
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        if !inserted {
            return Err(MessagingError::DuplicateSubmission { conversation_id });
        }
        Ok(InFlightGuard {
            set: self.in_flight.clone(),
            key,
        })
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
