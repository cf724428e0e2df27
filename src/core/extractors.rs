//! Axum extractors
//!
//! [`AuthenticatedActor`] resolves the bearer credential of a request into an
//! [`Actor`] through the host's [`AuthProvider`](crate::core::auth::AuthProvider).
//! Handlers that take it never run for anonymous callers.

use crate::core::auth::Credential;
use crate::core::error::MessagingError;
use crate::core::model::Actor;
use crate::server::host::ServerHost;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

/// The actor behind the request's `Authorization: Bearer` header
#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub Actor);

impl FromRequestParts<Arc<ServerHost>> for AuthenticatedActor {
    type Rejection = MessagingError;

    async fn from_request_parts(
        parts: &mut Parts,
        host: &Arc<ServerHost>,
    ) -> Result<Self, Self::Rejection> {
        let credential = Credential::from_headers(&parts.headers);
        let actor = host.auth.authenticate(credential.as_ref()).await?;
        Ok(Self(actor))
    }
}
