//! Authentication API endpoints.
//!
//! - POST `/register` - Create an account and start a session
//! - POST `/login` - Verify credentials, rotate the refresh token
//! - POST `/refresh` - Exchange the refresh token for a new access token
//! - POST `/logout` - Revoke the refresh token and clear cookies
//! - GET `/check-username` - Username availability probe
//! - POST `/password-reset` - Request a password reset (delivery is external)

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::error::{ApiError, ResultExt};
use crate::auth::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, auth_cookie, clear_cookie, get_cookie,
};
use crate::db::{Database, RefreshLookup, User, unix_now};
use crate::jwt::JwtConfig;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub refresh_ttl_secs: i64,
    pub secure_cookies: bool,
}

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/check-username", get(check_username))
        .route("/password-reset", post(password_reset))
        .with_state(state)
}

#[derive(Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct SessionResponse {
    user_id: i64,
    username: String,
    token: String,
    expires_in: u64,
}

impl AuthState {
    /// Issue an access token and a rotated refresh token for a user,
    /// returning the response body and the two Set-Cookie values.
    async fn start_session(
        &self,
        user: &User,
    ) -> Result<(SessionResponse, [(axum::http::HeaderName, String); 2]), ApiError> {
        let access = self.jwt.issue(&user.username, user.id).map_err(|e| {
            error!("Failed to issue access token: {}", e);
            ApiError::internal("Failed to issue token")
        })?;

        let refresh = self
            .db
            .refresh_tokens()
            .create(user.id, self.refresh_ttl_secs)
            .await
            .db_err("Failed to create refresh token")?;

        let cookies = [
            (
                SET_COOKIE,
                auth_cookie(
                    ACCESS_COOKIE_NAME,
                    &access.token,
                    access.expires_in as i64,
                    self.secure_cookies,
                ),
            ),
            (
                SET_COOKIE,
                auth_cookie(
                    REFRESH_COOKIE_NAME,
                    &refresh.token,
                    self.refresh_ttl_secs,
                    self.secure_cookies,
                ),
            ),
        ];

        Ok((
            SessionResponse {
                user_id: user.id,
                username: user.username.clone(),
                token: access.token,
                expires_in: access.expires_in,
            },
            cookies,
        ))
    }
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::bad_request("Username cannot be empty"));
    }
    if username.len() > 32 {
        return Err(ApiError::bad_request(
            "Username cannot be longer than 32 characters",
        ));
    }
    // Only allow alphanumeric and underscores
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ApiError::bad_request(
            "Username can only contain letters, numbers, and underscores",
        ));
    }
    Ok(())
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = payload.username.trim();
    validate_username(username)?;

    if payload.password.len() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters",
        ));
    }

    let available = state
        .db
        .users()
        .is_username_available(username)
        .await
        .db_err("Failed to check username availability")?;

    if !available {
        return Err(ApiError::conflict("Username is already taken"));
    }

    let password_hash = bcrypt::hash(&payload.password, BCRYPT_COST).map_err(|e| {
        error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to create account")
    })?;

    let uuid = uuid::Uuid::new_v4().to_string();
    let id = state
        .db
        .users()
        .create(&uuid, username, &password_hash)
        .await
        .db_err("Failed to create user")?;

    let user = User {
        id,
        uuid,
        username: username.to_string(),
        password_hash,
    };

    let (body, cookies) = state.start_session(&user).await?;
    info!(username = %user.username, "User registered");

    Ok((StatusCode::CREATED, AppendHeaders(cookies), Json(body)))
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Uniform rejection: no hint whether the username or password was wrong.
    let invalid = || ApiError::unauthorized("Invalid username or password");

    let user = state
        .db
        .users()
        .get_by_username(payload.username.trim())
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(invalid)?;

    let verified = bcrypt::verify(&payload.password, &user.password_hash).map_err(|e| {
        error!("Failed to verify password: {}", e);
        ApiError::internal("Failed to verify credentials")
    })?;

    if !verified {
        return Err(invalid());
    }

    let (body, cookies) = state.start_session(&user).await?;
    info!(username = %user.username, "User logged in");

    Ok((StatusCode::OK, AppendHeaders(cookies), Json(body)))
}

/// Exchange a valid refresh token for a new access token, rotating the
/// refresh token itself. The refresh cookie is the only accepted carrier.
async fn refresh(
    State(state): State<AuthState>,
    request: axum::extract::Request,
) -> Result<impl IntoResponse, ApiError> {
    let refresh_token = get_cookie(request.headers(), REFRESH_COOKIE_NAME)
        .ok_or_else(|| ApiError::unauthorized("No refresh token"))?
        .to_string();

    let row = match state
        .db
        .refresh_tokens()
        .find_and_verify(&refresh_token, unix_now())
        .await
        .db_err("Failed to look up refresh token")?
    {
        RefreshLookup::Valid(row) => row,
        RefreshLookup::Expired | RefreshLookup::NotFound => {
            return Err(ApiError::unauthorized("Invalid or expired refresh token"));
        }
    };

    let user = state
        .db
        .users()
        .get_by_id(row.user_id)
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    let (body, cookies) = state.start_session(&user).await?;

    Ok((StatusCode::OK, AppendHeaders(cookies), Json(body)))
}

/// Revoke the session's refresh token and clear both auth cookies.
/// Falls back to revoking by user when only an access credential is present.
async fn logout(
    State(state): State<AuthState>,
    request: axum::extract::Request,
) -> Result<impl IntoResponse, ApiError> {
    let headers = request.headers();

    if let Some(token) = get_cookie(headers, REFRESH_COOKIE_NAME) {
        state
            .db
            .refresh_tokens()
            .delete_by_token(token)
            .await
            .db_err("Failed to revoke refresh token")?;
    } else if let Some(claims) = get_cookie(headers, ACCESS_COOKIE_NAME)
        .and_then(|token| state.jwt.verify(token).ok())
    {
        state
            .db
            .refresh_tokens()
            .delete_by_user(claims.uid)
            .await
            .db_err("Failed to revoke refresh token")?;
    }

    let cookies = [
        (
            SET_COOKIE,
            clear_cookie(ACCESS_COOKIE_NAME, state.secure_cookies),
        ),
        (
            SET_COOKIE,
            clear_cookie(REFRESH_COOKIE_NAME, state.secure_cookies),
        ),
    ];

    Ok((
        StatusCode::OK,
        AppendHeaders(cookies),
        Json(serde_json::json!({ "success": true })),
    ))
}

#[derive(Deserialize)]
struct CheckUsernameParams {
    username: String,
}

#[derive(Serialize)]
struct CheckUsernameResponse {
    available: bool,
}

async fn check_username(
    State(state): State<AuthState>,
    Query(params): Query<CheckUsernameParams>,
) -> Result<impl IntoResponse, ApiError> {
    let username = params.username.trim();
    validate_username(username)?;

    let available = state
        .db
        .users()
        .is_username_available(username)
        .await
        .db_err("Failed to check username availability")?;

    Ok(Json(CheckUsernameResponse { available }))
}

#[derive(Deserialize)]
struct PasswordResetRequest {
    username: String,
}

/// Accept a password reset request. Delivery of the reset link is an
/// external collaborator; the response never reveals whether the account
/// exists.
async fn password_reset(
    State(state): State<AuthState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_username(payload.username.trim())
        .await
        .db_err("Failed to look up user")?;

    if let Some(user) = user {
        info!(username = %user.username, "Password reset requested");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "If the account exists, a reset link has been sent"
        })),
    ))
}
