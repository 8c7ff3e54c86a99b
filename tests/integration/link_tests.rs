//! Expiring binary link integration tests.
//!
//! Tests verify:
//! - Link creation for tiers that allow it, and the binary variant it serves
//! - TTL bounds and step
//! - Check order: ownership, then tier permission, then TTL
//! - Expired links stop serving before any sweep runs

use axum::http::StatusCode;
use chrono::DateTime;

use super::test_utils::{dimensions, TestApp};

#[tokio::test]
async fn test_enterprise_link_serves_binary_variant() {
    let app = TestApp::new();
    let (_, token) = app.user("ent@example.com", Some("Enterprise"));
    let id = app.upload_png(&token, 320, 240).await;

    let response = app.create_link(&token, id, 300).await;
    assert_eq!(response.status, StatusCode::OK);

    let body = response.json();
    assert_eq!(body["expiring_time"], 300);
    let created = DateTime::parse_from_rfc3339(body["created_at"].as_str().unwrap()).unwrap();
    let expiration =
        DateTime::parse_from_rfc3339(body["expiration_date"].as_str().unwrap()).unwrap();
    assert_eq!((expiration - created).num_seconds(), 300);
    assert_eq!(created, super::test_utils::t0());

    let url = body["binary_image"].as_str().unwrap();
    assert!(url.starts_with("http://localhost:3000/media/binary/"));
    assert!(url.ends_with("_binary.png"));

    let media = app.fetch_media(url).await;
    assert_eq!(media.status, StatusCode::OK);
    assert_eq!(media.header("content-type"), "image/png");
    assert_eq!(media.header("cache-control"), "no-store");
    assert_eq!(dimensions(&media.body), (320, 240));

    let gray = image::load_from_memory(&media.body).unwrap().to_luma8();
    assert!(gray.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    assert!(gray.pixels().any(|p| p.0[0] == 0));
    assert!(gray.pixels().any(|p| p.0[0] == 255));
}

#[tokio::test]
async fn test_ttl_bounds() {
    let app = TestApp::new();
    let (_, token) = app.user("ent@example.com", Some("Enterprise"));
    let id = app.upload_png(&token, 64, 64).await;

    for ttl in [300, 600, 30000] {
        let response = app.create_link(&token, id, ttl).await;
        assert_eq!(response.status, StatusCode::OK, "ttl {} should be accepted", ttl);
    }

    for ttl in [299, 301, 30001, 0, -300] {
        let response = app.create_link(&token, id, ttl).await;
        assert_eq!(
            response.status,
            StatusCode::BAD_REQUEST,
            "ttl {} should be rejected",
            ttl
        );
        let body = response.json();
        assert_eq!(body["error"], "invalid_ttl");
        assert!(body["message"].as_str().unwrap().contains("300"));
    }

    // Three accepted links, no blobs left behind by the rejected ones
    assert_eq!(app.store.list_link_ids().unwrap().len(), 3);
}

#[tokio::test]
async fn test_tier_without_binary_links_is_denied() {
    let app = TestApp::new();
    let (_, token) = app.user("prem@example.com", Some("Premium"));
    let id = app.upload_png(&token, 64, 64).await;
    let blobs_before = app.blobs.len();

    let response = app.create_link(&token, id, 300).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["error"], "permission_denied");
    assert!(body["message"].as_str().unwrap().contains("Premium"));

    assert_eq!(app.blobs.len(), blobs_before);
    assert!(app.store.list_link_ids().unwrap().is_empty());
}

#[tokio::test]
async fn test_permission_checked_before_ttl() {
    let app = TestApp::new();
    let (_, token) = app.user("basic@example.com", Some("Basic"));
    let id = app.upload_png(&token, 64, 64).await;

    let response = app.create_link(&token, id, 299).await;
    assert_eq!(response.json()["error"], "permission_denied");
}

#[tokio::test]
async fn test_cross_tenant_link_is_not_found() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice@example.com", Some("Enterprise"));
    let (_, mallory) = app.user("mallory@example.com", Some("Basic"));
    let id = app.upload_png(&alice, 64, 64).await;

    // Ownership is checked before permission and TTL
    let response = app.create_link(&mallory, id, 299).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.create_link(&alice, 424242, 300).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_link_body() {
    let app = TestApp::new();
    let (_, token) = app.user("ent@example.com", Some("Enterprise"));
    let id = app.upload_png(&token, 64, 64).await;

    for body in ["", "{}", "{\"expiring_time\": \"soon\"}", "not json"] {
        let response = app.request_link(&token, id, body).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert_eq!(response.json()["error"], "invalid_request");
    }
}

#[tokio::test]
async fn test_expired_link_is_not_served_before_sweep() {
    let app = TestApp::new();
    let (_, token) = app.user("ent@example.com", Some("Enterprise"));
    let id = app.upload_png(&token, 64, 64).await;

    let body = app.create_link(&token, id, 300).await.json();
    let url = body["binary_image"].as_str().unwrap().to_string();

    app.clock.advance(299);
    assert_eq!(app.fetch_media(&url).await.status, StatusCode::OK);

    // Exactly at the expiration instant the link is still active
    app.clock.advance(1);
    assert_eq!(app.fetch_media(&url).await.status, StatusCode::OK);

    app.clock.advance(1);
    assert_eq!(app.fetch_media(&url).await.status, StatusCode::NOT_FOUND);

    // Blob is still stored until the sweep runs
    assert_eq!(app.store.list_link_ids().unwrap().len(), 1);
}

#[tokio::test]
async fn test_link_outlives_its_image() {
    let app = TestApp::new();
    let (user, token) = app.user("ent@example.com", Some("Enterprise"));
    let id = app.upload_png(&token, 64, 64).await;

    let body = app.create_link(&token, id, 600).await.json();
    let url = body["binary_image"].as_str().unwrap().to_string();

    let response = app.delete(&format!("/images/{}", id), &token).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    assert_eq!(app.fetch_media(&url).await.status, StatusCode::OK);

    let links = app.store.list_links(user.id).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].image_id, None);
}
