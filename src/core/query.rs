//! Query parameters for message history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Query parameters for the history endpoint
///
/// # Example
/// ```text
/// GET /messages/conversations/{id}/messages
/// GET /messages/conversations/{id}/messages?limit=20
/// GET /messages/conversations/{id}/messages?before=2024-05-01T10:00:00Z&limit=50
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryQuery {
    /// Only messages strictly older than this instant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,

    /// Maximum number of messages, newest last
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn latest(limit: usize) -> Self {
        Self {
            before: None,
            limit: Some(limit),
        }
    }

    /// Effective page size, falling back to `default` and capped at `max`
    pub fn limit(&self, default: usize, max: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, max.max(1))
    }
}
