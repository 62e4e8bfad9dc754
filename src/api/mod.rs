mod auth;
mod error;
mod me;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;

pub use error::{ApiError, ResultExt};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    refresh_ttl_secs: i64,
    secure_cookies: bool,
) -> Router {
    let auth_state = auth::AuthState {
        db,
        jwt,
        refresh_ttl_secs,
        secure_cookies,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .merge(me::router())
}
