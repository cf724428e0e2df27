//! Configuration loading and management

use crate::core::auth::StaticTokenAuth;
use crate::core::model::{Actor, Role};
use crate::core::validation::DEFAULT_MAX_MESSAGE_LENGTH;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Bounds applied to messages and history pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum message length in characters
    pub max_message_length: usize,
    /// History page size when the client does not ask for one
    pub history_page_size: usize,
    /// Largest history page a client may ask for
    pub max_history_page_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            history_page_size: 50,
            max_history_page_size: 200,
        }
    }
}

/// Typing indicator timings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingConfig {
    /// Silence after the last keystroke before `stop_typing` is sent
    pub stop_after_ms: u64,
    /// How long a remote indicator survives without a `stop_typing`
    pub remote_timeout_ms: u64,
}

impl TypingConfig {
    pub fn stop_after(&self) -> Duration {
        Duration::from_millis(self.stop_after_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            stop_after_ms: 2000,
            remote_timeout_ms: 5000,
        }
    }
}

/// Reconnect backoff of the client event channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl ReconnectConfig {
    /// Delay before reconnect attempt number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

/// A development token mapped to an actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub actor_id: Uuid,
    pub display_name: String,
    pub role: Role,
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Address the demo server binds to
    pub bind_addr: String,
    /// Capacity of the server event bus
    pub event_bus_capacity: usize,
    pub limits: LimitsConfig,
    pub typing: TypingConfig,
    pub reconnect: ReconnectConfig,
    /// Static tokens for the development auth provider
    pub tokens: Vec<TokenEntry>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            event_bus_capacity: 1024,
            limits: LimitsConfig::default(),
            typing: TypingConfig::default(),
            reconnect: ReconnectConfig::default(),
            tokens: Vec::new(),
        }
    }
}

impl MessagingConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the system unusable
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_message_length == 0 {
            anyhow::bail!("limits.max_message_length must be positive");
        }
        if self.limits.history_page_size > self.limits.max_history_page_size {
            anyhow::bail!("limits.history_page_size exceeds limits.max_history_page_size");
        }
        if self.typing.stop_after_ms == 0 {
            anyhow::bail!("typing.stop_after_ms must be positive");
        }
        Ok(())
    }

    /// Build the development auth provider from the token table
    pub fn static_auth(&self) -> StaticTokenAuth {
        self.tokens
            .iter()
            .fold(StaticTokenAuth::new(), |auth, entry| {
                auth.with_token(
                    entry.token.clone(),
                    Actor::new(entry.actor_id, entry.display_name.clone(), entry.role),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MessagingConfig::default();
        assert_eq!(config.limits.max_message_length, 2000);
        assert_eq!(config.typing.stop_after(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
bind_addr: "0.0.0.0:8080"
typing:
  stop_after_ms: 1500
tokens:
  - token: tenant-token
    actor_id: 6f1c1a52-8d6e-4b8e-9a57-3d0b3a9b1f10
    display_name: Tina
    role: tenant
"#;
        let config = MessagingConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.typing.stop_after_ms, 1500);
        assert_eq!(config.typing.remote_timeout_ms, 5000);
        assert_eq!(config.limits, LimitsConfig::default());
        assert_eq!(config.static_auth().len(), 1);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let yaml = r#"
limits:
  history_page_size: 500
  max_history_page_size: 100
"#;
        assert!(MessagingConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_backoff_is_capped() {
        let reconnect = ReconnectConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
        };
        assert_eq!(reconnect.backoff(0), Duration::from_millis(100));
        assert_eq!(reconnect.backoff(2), Duration::from_millis(400));
        assert_eq!(reconnect.backoff(10), Duration::from_millis(1000));
        assert_eq!(reconnect.backoff(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = MessagingConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = MessagingConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
