//! Test utilities for integration tests.
//!
//! This module provides an in-memory blob store, image generators, a multipart
//! body builder and a [`TestApp`] that wires the router over an in-memory
//! database and a manual clock.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use http_body_util::BodyExt;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use tower::ServiceExt;

use pixhost::error::StorageError;
use pixhost::storage::{BlobRef, BlobStore};
use pixhost::{
    clock::utc_offset, create_router, AccountTier, AppState, DerivativeGenerator, ManualClock,
    RecordStore, RouterConfig, TokenAuth, User,
};

pub const TEST_SECRET: &str = "integration-test-secret";
pub const PUBLIC_URL: &str = "http://localhost:3000";

/// 2026-01-15T10:00:00Z, the instant every [`TestApp`] clock starts at.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

// =============================================================================
// In-Memory Blob Store
// =============================================================================

/// Blob store keeping everything in a map. Deletes can be made to fail for
/// chosen references.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn contains(&self, reference: &BlobRef) -> bool {
        self.blobs.lock().unwrap().contains_key(reference.as_str())
    }

    pub fn references(&self) -> Vec<String> {
        let mut refs: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        refs.sort();
        refs
    }

    /// Make `delete` fail for `reference` until [`Self::heal`] is called.
    pub fn fail_deletes_of(&self, reference: &BlobRef) {
        self.failing_deletes
            .lock()
            .unwrap()
            .insert(reference.as_str().to_string());
    }

    pub fn heal(&self) {
        self.failing_deletes.lock().unwrap().clear();
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(
        &self,
        namespace: &str,
        suggested_name: &str,
        data: Bytes,
    ) -> Result<BlobRef, StorageError> {
        let reference = BlobRef::generate(namespace, suggested_name);
        self.blobs
            .lock()
            .unwrap()
            .insert(reference.as_str().to_string(), data);
        Ok(reference)
    }

    async fn retrieve(&self, reference: &BlobRef) -> Result<Bytes, StorageError> {
        self.blobs
            .lock()
            .unwrap()
            .get(reference.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(reference.to_string()))
    }

    async fn delete(&self, reference: &BlobRef) -> Result<(), StorageError> {
        if self
            .failing_deletes
            .lock()
            .unwrap()
            .contains(reference.as_str())
        {
            return Err(StorageError::Io(format!("injected failure for {}", reference)));
        }
        self.blobs.lock().unwrap().remove(reference.as_str());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// =============================================================================
// Test Images
// =============================================================================

/// A gradient so the binary variant has both black and white pixels.
fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = ((x + y) * 255 / (width + height).max(1)) as u8;
        Rgb([v, v.wrapping_add(40), 255 - v])
    })
}

pub fn png_image(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn jpeg_image(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, 90);
    gradient(width, height).write_with_encoder(encoder).unwrap();
    out
}

/// A 1x1 GIF89a.
pub fn gif_image() -> Vec<u8> {
    vec![
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xFF, 0xFF,
        0xFF, 0x00, 0x00, 0x00, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
        0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
    ]
}

/// Decode image bytes and return their dimensions.
pub fn dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(data).expect("decodable image");
    (img.width(), img.height())
}

// =============================================================================
// Multipart
// =============================================================================

const BOUNDARY: &str = "pixhost-test-boundary";

/// Build a multipart/form-data body. Returns (content type, body).
pub fn multipart_body(title: Option<&str>, file: Option<(&str, &[u8])>) -> (String, Vec<u8>) {
    let mut body = Vec::new();

    if let Some(title) = title {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{}\r\n",
                BOUNDARY, title
            )
            .as_bytes(),
        );
    }

    if let Some((file_name, data)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    (
        format!("multipart/form-data; boundary={}", BOUNDARY),
        body,
    )
}

// =============================================================================
// Test Application
// =============================================================================

/// A response with its body collected.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("JSON body")
    }

    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

/// The router wired over an in-memory database, an in-memory blob store and
/// a manual clock, with the reference tiers seeded.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<RecordStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub clock: Arc<ManualClock>,
    pub auth: TokenAuth,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_zone(utc_offset())
    }

    pub fn with_zone(zone: FixedOffset) -> Self {
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let blobs = Arc::new(MemoryBlobStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let auth = TokenAuth::new(TEST_SECRET);

        let state = AppState::new(
            store.clone(),
            blobs.clone(),
            DerivativeGenerator::new(),
            clock.clone(),
            zone,
            auth.clone(),
        )
        .with_public_url(PUBLIC_URL);
        state.images.tiers().seed_defaults().unwrap();

        let router = create_router(state.clone(), RouterConfig::new().with_tracing(false));

        Self {
            router,
            state,
            store,
            blobs,
            clock,
            auth,
        }
    }

    /// Create a user on `tier` and return it with a valid token.
    pub fn user(&self, email: &str, tier: Option<&str>) -> (User, String) {
        let user = self
            .store
            .create_user(email, "Test User", tier, t0().fixed_offset())
            .unwrap();
        let token = self.auth.issue(user.id, Duration::from_secs(3600));
        (user, token)
    }

    pub fn add_tier(&self, tier: AccountTier) {
        self.state.images.tiers().upsert_tier(&tier).unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        let request = Request::builder()
            .method("DELETE")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn upload(
        &self,
        token: &str,
        title: Option<&str>,
        file: Option<(&str, &[u8])>,
    ) -> TestResponse {
        let (content_type, body) = multipart_body(title, file);
        let request = Request::builder()
            .method("POST")
            .uri("/images")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Upload a PNG and return the new image id.
    pub async fn upload_png(&self, token: &str, width: u32, height: u32) -> i64 {
        let data = png_image(width, height);
        let response = self
            .upload(token, Some("holiday"), Some(("photo.png", &data)))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.json()["id"].as_i64().unwrap()
    }

    pub async fn request_link(&self, token: &str, image_id: i64, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/images/{}/get-link", image_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn create_link(&self, token: &str, image_id: i64, ttl: i64) -> TestResponse {
        self.request_link(token, image_id, &format!("{{\"expiring_time\": {}}}", ttl))
            .await
    }

    /// Fetch a media URL returned by the API.
    pub async fn fetch_media(&self, url: &str) -> TestResponse {
        let path = url
            .strip_prefix(PUBLIC_URL)
            .unwrap_or_else(|| panic!("{} is not under {}", url, PUBLIC_URL));
        self.get(path, None).await
    }
}
