//! Authentication integration tests.
//!
//! Tests verify:
//! - Missing, malformed, forged and expired tokens are rejected with 401
//! - A valid token for a deleted user is rejected
//! - Public routes need no token

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};

use pixhost::TokenAuth;

use super::test_utils::TestApp;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[tokio::test]
async fn test_valid_token_succeeds() {
    let app = TestApp::new();
    let (_, token) = app.user("alice@example.com", Some("Basic"));

    let response = app.get("/images", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), serde_json::json!([]));
}

#[tokio::test]
async fn test_missing_token_rejected() {
    let app = TestApp::new();

    let response = app.get("/images", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "missing_token");
}

#[tokio::test]
async fn test_non_bearer_scheme_rejected() {
    let app = TestApp::new();
    let (_, token) = app.user("alice@example.com", Some("Basic"));

    let request = Request::builder()
        .uri("/images")
        .header(header::AUTHORIZATION, format!("Basic {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "malformed_token");
}

#[tokio::test]
async fn test_malformed_token_rejected() {
    let app = TestApp::new();

    let response = app.get("/images", Some("not-a-token")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "malformed_token");
}

#[tokio::test]
async fn test_token_from_different_key_rejected() {
    let app = TestApp::new();
    let (user, _) = app.user("alice@example.com", Some("Basic"));

    let forged = TokenAuth::new("some-other-secret").issue(user.id, Duration::from_secs(600));
    let response = app.get("/images", Some(&forged)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "invalid_signature");
}

#[tokio::test]
async fn test_token_for_other_user_id_rejected() {
    let app = TestApp::new();
    let (alice, token) = app.user("alice@example.com", Some("Basic"));
    let (bob, _) = app.user("bob@example.com", Some("Basic"));

    // Reuse Alice's signature with Bob's id
    let signature = token.rsplit('.').next().unwrap();
    let expiry = token.split('.').nth(1).unwrap();
    assert_ne!(alice.id, bob.id);
    let tampered = format!("{}.{}.{}", bob.id, expiry, signature);

    let response = app.get("/images", Some(&tampered)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let app = TestApp::new();
    let (user, _) = app.user("alice@example.com", Some("Basic"));

    let expired = app.auth.issue_with_expiry(user.id, unix_now() - 60);
    let response = app.get("/images", Some(&expired)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "token_expired");
}

#[tokio::test]
async fn test_token_for_deleted_user_rejected() {
    let app = TestApp::new();
    let (user, token) = app.user("alice@example.com", Some("Enterprise"));
    app.upload_png(&token, 100, 100).await;

    app.state.images.delete_user(user.id).await.unwrap();
    assert_eq!(app.blobs.len(), 0);

    let response = app.get("/images", Some(&token)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "unknown_user");
}

#[tokio::test]
async fn test_every_image_route_requires_auth() {
    let app = TestApp::new();

    for (method, uri) in [
        ("GET", "/images"),
        ("POST", "/images"),
        ("GET", "/images/1"),
        ("DELETE", "/images/1"),
        ("POST", "/images/1/get-link"),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(
            response.status,
            StatusCode::UNAUTHORIZED,
            "{} {} should need a token",
            method,
            uri
        );
    }
}

#[tokio::test]
async fn test_public_routes_need_no_token() {
    let app = TestApp::new();
    let (_, token) = app.user("alice@example.com", Some("Enterprise"));
    let data = super::test_utils::png_image(64, 64);
    let body = app
        .upload(&token, Some("Public"), Some(("p.png", &data)))
        .await
        .json();

    let response = app.get("/health", None).await;
    assert_eq!(response.status, StatusCode::OK);

    let media = app
        .fetch_media(body["thumbnail_size1"].as_str().unwrap())
        .await;
    assert_eq!(media.status, StatusCode::OK);
}
