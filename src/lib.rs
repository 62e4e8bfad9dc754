pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod ratelimit;
pub mod sweep;

use api::create_api_router;
use auth::authentication_gate;
use axum::{Json, Router, middleware, routing::get};
use db::Database;
use jwt::{JwtConfig, JwtError};
use ratelimit::{AdmissionControl, RateLimitSettings, admission_gate};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// HMAC secret for signing access tokens (at least 64 bytes)
    pub jwt_secret: Vec<u8>,
    /// Access token lifetime in seconds
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: i64,
    /// Whether to set Secure flag on cookies (true in production with HTTPS)
    pub secure_cookies: bool,
    /// Admission control rule table
    pub rate_limits: RateLimitSettings,
}

/// Create the application router with the given configuration.
/// Fails if the JWT secret is too short; a weak secret must never serve traffic.
pub fn create_app(config: &ServerConfig) -> Result<Router, JwtError> {
    let admission = Arc::new(AdmissionControl::new(&config.rate_limits));
    create_app_with_admission(config, admission)
}

/// Create the application router around an externally owned admission
/// controller (so the caller can also hand it to the eviction sweeper).
pub fn create_app_with_admission(
    config: &ServerConfig,
    admission: Arc<AdmissionControl>,
) -> Result<Router, JwtError> {
    let jwt = Arc::new(JwtConfig::new(&config.jwt_secret, config.access_ttl_secs)?);

    let api_router = create_api_router(
        config.db.clone(),
        jwt.clone(),
        config.refresh_ttl_secs,
        config.secure_cookies,
    );

    // Fixed pipeline order: admission -> authentication -> handlers.
    // Layers run outermost-last, so admission is added after the gate.
    Ok(Router::new()
        .route("/health", get(health))
        .nest("/api", api_router)
        .layer(middleware::from_fn_with_state(jwt, authentication_gate))
        .layer(middleware::from_fn_with_state(admission, admission_gate)))
}

/// Liveness probe; exempt from admission control.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Spawn the background sweeps: refresh token expiry and bucket eviction.
/// Call this before starting the server.
pub async fn init_sweeps(config: &ServerConfig, admission: Arc<AdmissionControl>) {
    sweep::run_sweep(&config.db).await;
    sweep::spawn_sweep_scheduler(config.db.clone());
    ratelimit::spawn_eviction_sweeper(admission, config.rate_limits.eviction_interval);
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let admission = Arc::new(AdmissionControl::new(&config.rate_limits));

    let app = create_app_with_admission(&config, admission.clone())
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    init_sweeps(&config, admission).await;

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
