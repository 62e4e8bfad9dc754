//! Per-request identity context.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::api::ApiError;

/// The authenticated user behind a request, attached by the authentication
/// gate and consumed by downstream handlers. Absent on anonymous requests.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
}

/// Extractor for handlers that require an authenticated user.
///
/// The gate deliberately passes credential-less requests through without an
/// identity; this extractor is the downstream per-resource check that
/// rejects them.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))
    }
}
