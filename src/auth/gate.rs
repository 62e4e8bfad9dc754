//! The authentication gate middleware.
//!
//! Runs after admission control on every request. Public auth paths are
//! skipped entirely so a client with a stale or garbage credential can still
//! reach login and refresh to recover its session.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use super::identity::Identity;
use crate::api::ApiError;
use crate::jwt::JwtConfig;

/// Auth endpoints that must stay reachable without a valid credential.
/// Rejecting these on a stale token would make session recovery impossible.
pub const PUBLIC_AUTH_PATHS: &[&str] = &[
    "/api/auth/register",
    "/api/auth/login",
    "/api/auth/refresh",
    "/api/auth/logout",
    "/api/auth/password-reset",
    "/api/auth/check-username",
];

/// Extract a bearer token from the Authorization header.
fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that verifies the access token and attaches an `Identity`.
///
/// A request with no credential at all passes through anonymous; per-resource
/// authorization (the `Identity` extractor) rejects it downstream. A request
/// carrying an invalid or expired credential is rejected here with 401.
pub async fn authentication_gate(
    State(jwt): State<Arc<JwtConfig>>,
    mut request: Request,
    next: Next,
) -> Response {
    if PUBLIC_AUTH_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    // Prefer the Authorization header, fall back to the access token cookie.
    let credential = bearer_token(request.headers())
        .or_else(|| get_cookie(request.headers(), ACCESS_COOKIE_NAME))
        .map(str::to_string);

    let Some(token) = credential else {
        return next.run(request).await;
    };

    match jwt.verify(&token) {
        Ok(claims) => {
            request.extensions_mut().insert(Identity {
                user_id: claims.uid,
                username: claims.sub,
            });
            next.run(request).await
        }
        // No distinction exposed between tampered and expired tokens.
        Err(_) => ApiError::unauthorized("Invalid or expired session").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_present() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );

        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn test_bearer_token_missing_or_malformed() {
        let headers = axum::http::HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);

        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_public_paths_cover_session_recovery() {
        assert!(PUBLIC_AUTH_PATHS.contains(&"/api/auth/login"));
        assert!(PUBLIC_AUTH_PATHS.contains(&"/api/auth/refresh"));
        assert!(!PUBLIC_AUTH_PATHS.contains(&"/api/me"));
    }
}
