#![allow(dead_code)]

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::http::header::SET_COOKIE;
use corkboard::{ServerConfig, create_app, db::Database, ratelimit::RateLimitSettings};
use std::net::SocketAddr;

/// 66-character secret; the minimum accepted length is 64.
pub const TEST_JWT_SECRET: &[u8] =
    b"integration-test-secret-that-is-definitely-longer-than-64-chars!!";

pub async fn test_config() -> ServerConfig {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    ServerConfig {
        db,
        jwt_secret: TEST_JWT_SECRET.to_vec(),
        access_ttl_secs: 900,
        refresh_ttl_secs: 7 * 24 * 60 * 60,
        secure_cookies: false,
        rate_limits: RateLimitSettings::default(),
    }
}

pub async fn create_test_app() -> axum::Router {
    create_app(&test_config().await).expect("Failed to create app")
}

/// Build a request carrying connect info for the given client IP, as the
/// server would attach for a real connection.
pub fn request_from(ip: &str, method: &str, uri: &str) -> axum::http::request::Builder {
    let addr: SocketAddr = format!("{}:51234", ip).parse().expect("Invalid test IP");
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(addr))
}

/// Request from the default test client IP.
pub fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    request_from("127.0.0.1", method, uri)
}

pub fn json_body(json: &str) -> (&'static str, Body) {
    ("application/json", Body::from(json.to_string()))
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not valid JSON")
}

/// Extract a cookie value from the response's Set-Cookie headers.
pub fn response_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    for value in response.headers().get_all(SET_COOKIE) {
        let value = value.to_str().ok()?;
        let (pair, _) = value.split_once(';').unwrap_or((value, ""));
        if let Some((key, token)) = pair.split_once('=') {
            if key.trim() == name {
                return Some(token.trim().to_string());
            }
        }
    }
    None
}

pub fn header_str<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name)?.to_str().ok()
}
