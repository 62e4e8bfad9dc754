//! Current-user probe endpoint.

use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;

use crate::auth::Identity;

pub fn router() -> Router {
    Router::new().route("/me", get(me))
}

#[derive(Serialize)]
struct MeResponse {
    user_id: i64,
    username: String,
}

/// Return the identity context attached by the authentication gate.
/// Anonymous requests are rejected by the `Identity` extractor, not the gate.
async fn me(identity: Identity) -> impl IntoResponse {
    Json(MeResponse {
        user_id: identity.user_id,
        username: identity.username,
    })
}
