//! Credential handling
//!
//! Authentication itself lives outside this crate. The REST surface and the
//! event channel only need to turn a bearer credential into an [`Actor`],
//! which is what [`AuthProvider`] does.

use crate::core::error::MessagingError;
use crate::core::model::Actor;
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use std::collections::HashMap;
use std::fmt;

/// A bearer credential
///
/// The token is never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Parse `Authorization: Bearer <token>` from request headers
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))?
            .trim();
        (!token.is_empty()).then(|| Self::new(token))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Resolves credentials to actors
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Return the actor behind a credential, or `None` if it is not valid
    async fn resolve(&self, credential: &Credential) -> Option<Actor>;

    /// Resolve or fail with [`MessagingError::Unauthorized`]
    async fn authenticate(&self, credential: Option<&Credential>) -> Result<Actor, MessagingError> {
        let credential = credential.ok_or(MessagingError::Unauthorized)?;
        self.resolve(credential)
            .await
            .ok_or(MessagingError::Unauthorized)
    }
}

/// Fixed token table, for development and tests
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuth {
    actors: HashMap<String, Actor>,
}

impl StaticTokenAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for an actor
    pub fn with_token(mut self, token: impl Into<String>, actor: Actor) -> Self {
        self.actors.insert(token.into(), actor);
        self
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn resolve(&self, credential: &Credential) -> Option<Actor> {
        self.actors.get(credential.token()).cloned()
    }
}
