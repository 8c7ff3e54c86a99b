//! HTTP request handlers for the image API.
//!
//! # Endpoints
//!
//! - `POST /images` - Upload an image (multipart `title` + `image`)
//! - `GET /images` - List the caller's images
//! - `GET /images/{id}` - One of the caller's images
//! - `DELETE /images/{id}` - Delete one of the caller's images
//! - `POST /images/{id}/get-link` - Create an expiring link to the binary variant
//! - `GET /media/{*reference}` - Serve a stored blob
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use chrono::{FixedOffset, SecondsFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::auth::{CurrentUser, TokenAuth};
use crate::clock::Clock;
use crate::derive::{DerivativeGenerator, SourceFormat};
use crate::error::{DerivationError, ImageError, LinkError, StorageError};
use crate::images::{ImageRepresentation, ImageService};
use crate::links::LinkManager;
use crate::storage::{BlobRef, BlobStore, NAMESPACE_BINARIES};
use crate::store::{BinaryImageLink, RecordStore};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub images: ImageService,
    pub links: LinkManager,

    /// Verifies bearer tokens
    pub auth: TokenAuth,

    /// Base URL media links are built from, without a trailing slash
    pub public_url: String,

    /// Cache-Control max-age for thumbnails and originals, in seconds
    pub cache_max_age: u32,
}

impl AppState {
    /// Wire the services together over one record store and blob store.
    pub fn new(
        store: Arc<RecordStore>,
        blobs: Arc<dyn BlobStore>,
        generator: DerivativeGenerator,
        clock: Arc<dyn Clock>,
        zone: FixedOffset,
        auth: TokenAuth,
    ) -> Self {
        let images = ImageService::new(
            store.clone(),
            blobs.clone(),
            generator.clone(),
            clock.clone(),
            zone,
        );
        let links = LinkManager::new(store.clone(), blobs.clone(), generator, clock, zone);

        Self {
            store,
            blobs,
            images,
            links,
            auth,
            public_url: "http://localhost:3000".to_string(),
            cache_max_age: 3600,
        }
    }

    /// Set the base URL used for media links.
    pub fn with_public_url(mut self, public_url: impl Into<String>) -> Self {
        self.public_url = public_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the Cache-Control max-age for non-expiring media.
    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    /// Absolute URL serving `reference`.
    pub fn media_url(&self, reference: &BlobRef) -> String {
        let path = reference
            .as_str()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/media/{}", self.public_url, path)
    }
}

// =============================================================================
// Request and Response Types
// =============================================================================

/// Body of `POST /images/{id}/get-link`.
#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    /// Requested lifetime in seconds
    pub expiring_time: i64,
}

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_ttl")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// An image as seen by its owner. Fields hidden by the tier are omitted.
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: i64,
    pub title: String,

    /// Original image URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Primary thumbnail URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_size1: Option<String>,

    /// Secondary thumbnail URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_size2: Option<String>,
}

impl ImageResponse {
    pub fn from_representation(view: &ImageRepresentation, state: &AppState) -> Self {
        Self {
            id: view.id,
            title: view.title.clone(),
            image: view.original.as_ref().map(|r| state.media_url(r)),
            thumbnail_size1: view.thumbnail1.as_ref().map(|r| state.media_url(r)),
            thumbnail_size2: view.thumbnail2.as_ref().map(|r| state.media_url(r)),
        }
    }
}

/// A created binary link.
#[derive(Debug, Serialize)]
pub struct LinkResponse {
    /// Absolute URL of the binary image
    pub binary_image: String,

    /// Requested lifetime in seconds
    pub expiring_time: i64,

    /// RFC 3339, in the configured time zone
    pub created_at: String,

    /// RFC 3339, in the configured time zone
    pub expiration_date: String,
}

impl LinkResponse {
    pub fn from_link(link: &BinaryImageLink, state: &AppState) -> Self {
        Self {
            binary_image: state.media_url(&link.binary),
            expiring_time: link.ttl_seconds,
            created_at: link.created_at.to_rfc3339_opts(SecondsFormat::Secs, false),
            expiration_date: link.expiration.to_rfc3339_opts(SecondsFormat::Secs, false),
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Build a JSON error response and log it by severity:
/// - 5xx at ERROR
/// - 404 at DEBUG (common and expected)
/// - other 4xx at WARN
fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else if status.is_client_error() {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let error_response = ErrorResponse::with_status(error_type, message, status);
    (status, Json(error_response)).into_response()
}

fn derivation_status(err: &DerivationError) -> (StatusCode, &'static str) {
    match err {
        DerivationError::UnsupportedFormat { .. } => {
            (StatusCode::BAD_REQUEST, "unsupported_format")
        }
        DerivationError::Timeout { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "derivation_timeout")
        }
    }
}

fn storage_status(err: &StorageError) -> (StatusCode, &'static str) {
    match err {
        StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StorageError::Io(_) | StorageError::S3(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
        }
        StorageError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
    }
}

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let (status, error_type) = storage_status(&self);
        error_response(status, error_type, self.to_string())
    }
}

impl IntoResponse for ImageError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ImageError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ImageError::InvalidTitle { .. } => (StatusCode::BAD_REQUEST, "invalid_title"),
            ImageError::IncompleteDerivation(err) => derivation_status(err),
            // A missing blob while saving is a server fault, not a 404
            ImageError::Storage(StorageError::NotFound(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            ImageError::Storage(err) => storage_status(err),
        };
        error_response(status, error_type, self.to_string())
    }
}

impl IntoResponse for LinkError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            LinkError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            LinkError::PermissionDenied { .. } => (StatusCode::BAD_REQUEST, "permission_denied"),
            LinkError::InvalidTtl { .. } => (StatusCode::BAD_REQUEST, "invalid_ttl"),
            LinkError::Derivation(err) => derivation_status(err),
            // The original's blob has gone missing
            LinkError::Storage(StorageError::NotFound(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            LinkError::Storage(err) => storage_status(err),
        };
        error_response(status, error_type, self.to_string())
    }
}

/// Malformed request: missing multipart fields, bad JSON body.
#[derive(Debug)]
pub struct BadRequest(pub String);

impl IntoResponse for BadRequest {
    fn into_response(self) -> Response {
        error_response(StatusCode::BAD_REQUEST, "invalid_request", self.0)
    }
}

/// Errors from the upload handler.
pub enum UploadError {
    Request(BadRequest),
    Image(ImageError),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self {
            UploadError::Request(err) => err.into_response(),
            UploadError::Image(err) => err.into_response(),
        }
    }
}

impl From<ImageError> for UploadError {
    fn from(err: ImageError) -> Self {
        UploadError::Image(err)
    }
}

impl From<BadRequest> for UploadError {
    fn from(err: BadRequest) -> Self {
        UploadError::Request(err)
    }
}

/// Errors from the link handler.
pub enum LinkRequestError {
    Request(BadRequest),
    Link(LinkError),
}

impl IntoResponse for LinkRequestError {
    fn into_response(self) -> Response {
        match self {
            LinkRequestError::Request(err) => err.into_response(),
            LinkRequestError::Link(err) => err.into_response(),
        }
    }
}

impl From<LinkError> for LinkRequestError {
    fn from(err: LinkError) -> Self {
        LinkRequestError::Link(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle image uploads.
///
/// # Endpoint
///
/// `POST /images` (multipart/form-data)
///
/// # Fields
///
/// - `title`: text, 1-255 characters
/// - `image`: file, `.png`, `.jpg` or `.jpeg`
///
/// # Response
///
/// - `201 Created`: the new image, filtered through the caller's tier
/// - `400 Bad Request`: missing field, bad title, unsupported or corrupt image
/// - `401 Unauthorized`: missing or invalid token
pub async fn create_image_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ImageResponse>), UploadError> {
    let mut title: Option<String> = None;
    let mut file: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("title") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| BadRequest(format!("Invalid title field: {}", e)))?;
                title = Some(text);
            }
            Some("image") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| BadRequest("The image field must be a file".to_string()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| BadRequest(format!("Invalid image field: {}", e)))?;
                file = Some((file_name, data));
            }
            _ => {}
        }
    }

    let title = title.ok_or_else(|| BadRequest("Missing field: title".to_string()))?;
    let (file_name, data) = file.ok_or_else(|| BadRequest("Missing field: image".to_string()))?;

    let record = state
        .images
        .create_image(&user, &title, &file_name, data)
        .await?;
    let view = state.images.represent(&user, &record)?;

    Ok((
        StatusCode::CREATED,
        Json(ImageResponse::from_representation(&view, &state)),
    ))
}

/// Handle image list requests.
///
/// # Endpoint
///
/// `GET /images`
///
/// # Response
///
/// `200 OK` with the caller's images, newest first.
pub async fn list_images_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<ImageResponse>>, ImageError> {
    let views = state.images.list_representations(&user)?;
    Ok(Json(
        views
            .iter()
            .map(|view| ImageResponse::from_representation(view, &state))
            .collect(),
    ))
}

/// Handle image detail requests.
///
/// # Endpoint
///
/// `GET /images/{id}`
///
/// # Response
///
/// - `200 OK`: the image
/// - `404 Not Found`: no such image, or it belongs to someone else
pub async fn get_image_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ImageResponse>, ImageError> {
    let view = state.images.get_representation(&user, id)?;
    Ok(Json(ImageResponse::from_representation(&view, &state)))
}

/// Handle image deletion.
///
/// # Endpoint
///
/// `DELETE /images/{id}`
///
/// # Response
///
/// - `204 No Content`: deleted
/// - `404 Not Found`: no such image, or it belongs to someone else
pub async fn delete_image_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ImageError> {
    state.images.delete_image(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handle binary link creation.
///
/// # Endpoint
///
/// `POST /images/{id}/get-link` with body `{"expiring_time": 300}`
///
/// # Response
///
/// - `200 OK`: `{"binary_image": <url>, "expiring_time", "created_at", "expiration_date"}`
/// - `400 Bad Request`: tier does not allow links (`permission_denied`), lifetime
///   not a multiple of 300 in [300, 30000] (`invalid_ttl`), malformed body
/// - `404 Not Found`: no such image, or it belongs to someone else
pub async fn create_link_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    body: Result<Json<CreateLinkRequest>, JsonRejection>,
) -> Result<Json<LinkResponse>, LinkRequestError> {
    let Json(request) = body.map_err(|e| LinkRequestError::Request(BadRequest(e.body_text())))?;

    let link = state
        .links
        .create_link(&user, id, request.expiring_time)
        .await?;

    Ok(Json(LinkResponse::from_link(&link, &state)))
}

/// Serve a stored blob.
///
/// # Endpoint
///
/// `GET /media/{*reference}`
///
/// Binary variants are only served while their link is active; expired links
/// answer 404 even before the sweep removes them.
///
/// # Headers
///
/// - `Content-Type: image/png` or `image/jpeg`
/// - `Cache-Control: public, max-age={cache_max_age}`, or `no-store` for
///   binary variants
pub async fn media_handler(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Response, StorageError> {
    let reference = BlobRef::new(reference);
    if !reference.is_valid() {
        return Err(StorageError::NotFound(reference.to_string()));
    }

    let is_binary = reference.namespace() == NAMESPACE_BINARIES;
    if is_binary && state.links.active_link_for(&reference)?.is_none() {
        return Err(StorageError::NotFound(reference.to_string()));
    }

    let data = state.blobs.retrieve(&reference).await?;

    let content_type = SourceFormat::from_file_name(reference.file_name())
        .map(|format| format.content_type())
        .unwrap_or("application/octet-stream");
    let cache_control = if is_binary {
        "no-store".to_string()
    } else {
        format!("public, max-age={}", state.cache_max_age)
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CACHE_CONTROL, cache_control),
        ],
        Body::from(data),
    )
        .into_response())
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
