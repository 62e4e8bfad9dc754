//! Admission control tests over the full router.

mod common;

use axum::body::Body;
use axum::http::StatusCode;
use common::*;
use tower::ServiceExt;

async fn attempt_login(app: &axum::Router, ip: &str) -> axum::http::Response<Body> {
    app.clone()
        .oneshot(
            request_from(ip, "POST", "/api/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"username": "nobody", "password": "irrelevant"}"#))
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_login_rule_admits_five_then_rejects() {
    let app = create_test_app().await;

    // Login rule: capacity 5 per 5 minutes. Remaining counts down 4..0.
    for expected_remaining in ["4", "3", "2", "1", "0"] {
        let response = attempt_login(&app, "1.2.3.4").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(header_str(&response, "ratelimit-limit"), Some("5"));
        assert_eq!(
            header_str(&response, "ratelimit-remaining"),
            Some(expected_remaining)
        );
    }

    // The 6th request within the window is rejected before the handler runs.
    let response = attempt_login(&app, "1.2.3.4").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(&response, "ratelimit-remaining"), Some("0"));

    let retry_after: u64 = header_str(&response, "retry-after").unwrap().parse().unwrap();
    assert!(retry_after > 0);

    let json = body_json(response).await;
    assert_eq!(json["status"], 429);
    assert_eq!(json["error"], "Too Many Requests");
}

#[tokio::test]
async fn test_clients_are_isolated() {
    let app = create_test_app().await;

    for _ in 0..5 {
        attempt_login(&app, "1.2.3.4").await;
    }
    let response = attempt_login(&app, "1.2.3.4").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Another client is unaffected by the exhausted bucket.
    let response = attempt_login(&app, "5.6.7.8").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(header_str(&response, "ratelimit-remaining"), Some("4"));
}

#[tokio::test]
async fn test_rules_are_isolated() {
    let app = create_test_app().await;

    for _ in 0..5 {
        attempt_login(&app, "1.2.3.4").await;
    }
    assert_eq!(
        attempt_login(&app, "1.2.3.4").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    // The same client still has full capacity on other rules.
    let response = app
        .clone()
        .oneshot(
            request_from("1.2.3.4", "GET", "/api/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(header_str(&response, "ratelimit-limit"), Some("100"));
    assert_eq!(header_str(&response, "ratelimit-remaining"), Some("99"));
}

#[tokio::test]
async fn test_unmatched_auth_path_uses_default_auth_rule() {
    let app = create_test_app().await;

    let response = app
        .clone()
        .oneshot(
            request_from("1.2.3.4", "GET", "/api/auth/check-username?username=alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "ratelimit-limit"), Some("10"));
}

#[tokio::test]
async fn test_rejection_short_circuits_the_pipeline() {
    let app = create_test_app().await;

    for _ in 0..5 {
        attempt_login(&app, "1.2.3.4").await;
    }

    // Even a structurally invalid body never reaches the handler once the
    // bucket is empty; admission rejects first.
    let response = app
        .clone()
        .oneshot(
            request_from("1.2.3.4", "POST", "/api/auth/login")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
