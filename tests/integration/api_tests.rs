//! API integration tests for uploads, listing, detail and deletion.
//!
//! Tests verify:
//! - Thumbnail sizes per tier, and which fields each tier sees
//! - Rejection of unsupported uploads with nothing persisted
//! - Owner scoping of every image route
//! - Media serving headers

use axum::http::StatusCode;
use bytes::Bytes;

use pixhost::error::{ImageError, StorageError};
use pixhost::{AccountTier, User};

use super::test_utils::{dimensions, gif_image, jpeg_image, png_image, TestApp};

// =============================================================================
// Uploads per Tier
// =============================================================================

#[tokio::test]
async fn test_enterprise_upload_gets_both_thumbnails_and_original() {
    let app = TestApp::new();
    let (_, token) = app.user("ent@example.com", Some("Enterprise"));

    let data = png_image(800, 800);
    let response = app
        .upload(&token, Some("Mountains"), Some(("mountains.png", &data)))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let body = response.json();
    assert_eq!(body["title"], "Mountains");
    let original = body["image"].as_str().expect("original visible");
    let thumb1 = body["thumbnail_size1"].as_str().expect("primary thumbnail");
    let thumb2 = body["thumbnail_size2"].as_str().expect("secondary thumbnail");

    let thumb1 = app.fetch_media(thumb1).await;
    assert_eq!(thumb1.status, StatusCode::OK);
    assert_eq!(thumb1.header("content-type"), "image/png");
    assert_eq!(dimensions(&thumb1.body), (400, 400));

    let thumb2 = app.fetch_media(thumb2).await;
    assert_eq!(dimensions(&thumb2.body), (200, 200));

    let original = app.fetch_media(original).await;
    assert_eq!(original.status, StatusCode::OK);
    assert_eq!(original.body.as_ref(), data.as_slice());
    assert!(original.header("cache-control").starts_with("public"));

    // original + two thumbnails
    assert_eq!(app.blobs.len(), 3);
}

#[tokio::test]
async fn test_basic_upload_hides_original_and_has_no_secondary() {
    let app = TestApp::new();
    let (user, token) = app.user("basic@example.com", Some("Basic"));

    let data = png_image(1000, 500);
    let response = app
        .upload(&token, Some("Wide"), Some(("wide.png", &data)))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let body = response.json();
    assert!(body.get("image").is_none());
    assert!(body.get("thumbnail_size2").is_none());

    let thumb = app
        .fetch_media(body["thumbnail_size1"].as_str().unwrap())
        .await;
    assert_eq!(dimensions(&thumb.body), (200, 100));

    let records = app.store.list_images(user.id).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].thumbnail2.is_none());
    assert_eq!(app.blobs.len(), 2);
}

#[tokio::test]
async fn test_small_images_are_not_upscaled() {
    let app = TestApp::new();
    let (_, token) = app.user("ent@example.com", Some("Enterprise"));

    let data = png_image(120, 80);
    let body = app
        .upload(&token, Some("Tiny"), Some(("tiny.png", &data)))
        .await
        .json();

    let thumb1 = app
        .fetch_media(body["thumbnail_size1"].as_str().unwrap())
        .await;
    assert_eq!(dimensions(&thumb1.body), (120, 80));
}

#[tokio::test]
async fn test_jpeg_upload_produces_jpeg_thumbnails() {
    let app = TestApp::new();
    let (_, token) = app.user("prem@example.com", Some("Premium"));

    let data = jpeg_image(640, 480);
    let response = app
        .upload(&token, Some("Street"), Some(("street.JPG", &data)))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let body = response.json();
    let thumb1 = app
        .fetch_media(body["thumbnail_size1"].as_str().unwrap())
        .await;
    assert_eq!(thumb1.header("content-type"), "image/jpeg");
    assert_eq!(dimensions(&thumb1.body), (400, 300));

    let thumb2 = app
        .fetch_media(body["thumbnail_size2"].as_str().unwrap())
        .await;
    assert_eq!(dimensions(&thumb2.body), (200, 150));
}

#[tokio::test]
async fn test_tier_without_secondary_size_never_gets_one() {
    let app = TestApp::new();
    app.add_tier(AccountTier {
        title: "Studio".to_string(),
        is_basic: false,
        is_premium: false,
        is_enterprise: false,
        is_custom: true,
        thumb_size1: 150,
        thumb_size2: None,
        allow_original_access: true,
        allow_binary_link: false,
    });
    let (user, token) = app.user("studio@example.com", Some("Studio"));

    let data = png_image(600, 300);
    let body = app
        .upload(&token, Some("Studio shot"), Some(("shot.png", &data)))
        .await
        .json();

    assert!(body.get("image").is_some());
    assert!(body.get("thumbnail_size2").is_none());
    let thumb1 = app
        .fetch_media(body["thumbnail_size1"].as_str().unwrap())
        .await;
    assert_eq!(dimensions(&thumb1.body), (150, 75));

    assert!(app.store.list_images(user.id).unwrap()[0]
        .thumbnail2
        .is_none());
}

#[tokio::test]
async fn test_user_without_tier_fails_closed() {
    let app = TestApp::new();
    let (_, token) = app.user("none@example.com", None);

    let data = png_image(800, 800);
    let response = app
        .upload(&token, Some("Untiered"), Some(("u.png", &data)))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let body = response.json();
    assert!(body.get("image").is_none());
    assert!(body.get("thumbnail_size2").is_none());
    let thumb1 = app
        .fetch_media(body["thumbnail_size1"].as_str().unwrap())
        .await;
    assert_eq!(dimensions(&thumb1.body), (200, 200));
}

#[tokio::test]
async fn test_deleted_tier_fails_closed_on_read() {
    let app = TestApp::new();
    let (_, token) = app.user("prem@example.com", Some("Premium"));
    let id = app.upload_png(&token, 800, 600).await;

    let before = app.get(&format!("/images/{}", id), Some(&token)).await.json();
    assert!(before.get("image").is_some());
    assert!(before.get("thumbnail_size2").is_some());

    assert!(app.state.images.tiers().delete_tier("Premium").unwrap());

    let after = app.get(&format!("/images/{}", id), Some(&token)).await;
    assert_eq!(after.status, StatusCode::OK);
    let after = after.json();
    assert!(after.get("image").is_none());
    assert!(after.get("thumbnail_size2").is_none());
    assert!(after.get("thumbnail_size1").is_some());
}

#[tokio::test]
async fn test_visibility_follows_current_tier() {
    let app = TestApp::new();
    let (user, token) = app.user("ent@example.com", Some("Enterprise"));
    let id = app.upload_png(&token, 800, 800).await;

    app.store.set_user_tier(user.id, Some("Basic")).unwrap();

    let body = app.get(&format!("/images/{}", id), Some(&token)).await.json();
    assert!(body.get("image").is_none());
    assert!(body.get("thumbnail_size2").is_none());
}

// =============================================================================
// Rejected Uploads
// =============================================================================

#[tokio::test]
async fn test_gif_upload_rejected_with_nothing_persisted() {
    let app = TestApp::new();
    let (user, token) = app.user("ent@example.com", Some("Enterprise"));

    let response = app
        .upload(&token, Some("Animated"), Some(("anim.gif", &gif_image())))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "unsupported_format");

    assert_eq!(app.blobs.len(), 0);
    assert!(app.store.list_images(user.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_insert_removes_stored_blobs() {
    let app = TestApp::new();
    let (owner, _) = app.user("ent@example.com", Some("Enterprise"));

    // No row with this id, so the foreign key rejects the image record
    let ghost = User {
        id: 9999,
        email: "ghost@example.com".to_string(),
        ..owner
    };

    let result = app
        .state
        .images
        .create_image(&ghost, "Haunted", "haunted.png", Bytes::from(png_image(800, 800)))
        .await;
    assert!(matches!(
        result,
        Err(ImageError::Storage(StorageError::Database(_)))
    ));

    assert_eq!(app.blobs.len(), 0, "left behind: {:?}", app.blobs.references());
    assert!(app.store.list_images(ghost.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_mislabelled_upload_rejected_with_nothing_persisted() {
    let app = TestApp::new();
    let (user, token) = app.user("ent@example.com", Some("Enterprise"));

    let response = app
        .upload(&token, Some("Fake"), Some(("fake.png", &gif_image())))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "unsupported_format");

    let response = app
        .upload(&token, Some("Garbage"), Some(("garbage.jpg", b"not an image")))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    assert_eq!(app.blobs.len(), 0);
    assert!(app.store.list_images(user.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_missing_fields() {
    let app = TestApp::new();
    let (_, token) = app.user("ent@example.com", Some("Enterprise"));
    let data = png_image(10, 10);

    let response = app.upload(&token, None, Some(("a.png", &data))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "invalid_request");

    let response = app.upload(&token, Some("No file"), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app.upload(&token, Some("   "), Some(("a.png", &data))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "invalid_title");

    assert_eq!(app.blobs.len(), 0);
}

// =============================================================================
// Listing and Owner Scoping
// =============================================================================

#[tokio::test]
async fn test_list_is_owner_scoped_newest_first() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice@example.com", Some("Premium"));
    let (_, bob) = app.user("bob@example.com", Some("Basic"));

    let first = app.upload_png(&alice, 50, 50).await;
    let second = app.upload_png(&alice, 60, 60).await;
    app.upload_png(&bob, 70, 70).await;

    let response = app.get("/images", Some(&alice)).await;
    assert_eq!(response.status, StatusCode::OK);
    let list = response.json();
    let ids: Vec<i64> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![second, first]);

    let bob_list = app.get("/images", Some(&bob)).await.json();
    assert_eq!(bob_list.as_array().unwrap().len(), 1);
    assert!(bob_list[0].get("image").is_none());
}

#[tokio::test]
async fn test_cross_tenant_detail_and_delete_are_not_found() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice@example.com", Some("Enterprise"));
    let (_, mallory) = app.user("mallory@example.com", Some("Enterprise"));
    let id = app.upload_png(&alice, 100, 100).await;

    let response = app.get(&format!("/images/{}", id), Some(&mallory)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["error"], "not_found");

    let response = app.delete(&format!("/images/{}", id), &mallory).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    // Still there for the owner
    let response = app.get(&format!("/images/{}", id), Some(&alice)).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_delete_removes_record_and_blobs() {
    let app = TestApp::new();
    let (_, token) = app.user("ent@example.com", Some("Enterprise"));
    let id = app.upload_png(&token, 300, 300).await;
    assert_eq!(app.blobs.len(), 3);

    let response = app.delete(&format!("/images/{}", id), &token).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(app.blobs.len(), 0);

    let response = app.get(&format!("/images/{}", id), Some(&token)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.delete(&format!("/images/{}", id), &token).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_image_is_not_found() {
    let app = TestApp::new();
    let (_, token) = app.user("ent@example.com", Some("Enterprise"));

    let response = app.get("/images/9999", Some(&token)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Media and Health
// =============================================================================

#[tokio::test]
async fn test_unknown_media_is_not_found() {
    let app = TestApp::new();

    let response = app.get("/media/images/deadbeef-missing.png", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.get("/media/../etc/passwd", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new();

    let response = app.get("/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}
