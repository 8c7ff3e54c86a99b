//! # pixhost
//!
//! A multi-tenant image hosting backend.
//!
//! Users upload PNG or JPEG images. Each upload gets thumbnails sized by the
//! owner's account tier, and every read is filtered by that tier. Tiers that
//! allow it can mint time-limited links to a black-and-white copy of an image.
//! A periodic sweep deletes expired links together with their files.
//!
//! ## Features
//!
//! - **Tiered thumbnails**: one or two aspect-preserving thumbnails per upload
//! - **Visibility filtering**: originals and secondary thumbnails only for tiers that allow them
//! - **Expiring binary links**: dithered 1-bit variants with a TTL in 5-minute steps
//! - **Pluggable blob storage**: local directory or S3-compatible object storage
//! - **Authentication**: HMAC-SHA256 signed bearer tokens
//!
//! ## Architecture
//!
//! - [`tier`] - Account tiers and policy resolution
//! - [`derive`] - Thumbnail and binary variant generation
//! - [`images`] - Upload pipeline, listing and visibility filtering
//! - [`links`] - Expiring binary links and the expiry sweep
//! - [`store`] - SQLite record store
//! - [`storage`] - Blob stores (local filesystem, S3)
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pixhost::{
//!     clock::{utc_offset, SystemClock},
//!     create_router, AppState, DerivativeGenerator, LocalBlobStore, RecordStore,
//!     RouterConfig, TokenAuth,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(RecordStore::open("pixhost.db".as_ref())?);
//!     let blobs = Arc::new(LocalBlobStore::new("./media").await?);
//!     let state = AppState::new(
//!         store,
//!         blobs,
//!         DerivativeGenerator::new(),
//!         Arc::new(SystemClock),
//!         utc_offset(),
//!         TokenAuth::new("secret"),
//!     );
//!
//!     let router = create_router(state, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod derive;
pub mod error;
pub mod images;
pub mod links;
pub mod server;
pub mod storage;
pub mod store;
pub mod tier;

// Re-export commonly used types
pub use clock::{parse_time_zone, Clock, ManualClock, SystemClock};
pub use config::{
    BlobArgs, BlobBackend, Cli, Command, ServeConfig, SweepConfig, TiersConfig, UserAction,
    UserConfig,
};
pub use derive::{DerivativeGenerator, DerivedThumbnails, SourceFormat};
pub use error::{
    ConfigError, DerivationError, ImageError, LinkError, StorageError, TierAuthoringError,
};
pub use images::{filter_representation, ImageRepresentation, ImageService};
pub use links::{link_state, validate_ttl, LinkManager, LinkState};
pub use server::{
    auth_middleware, create_router, AppState, AuthError, CurrentUser, ErrorResponse,
    ImageResponse, LinkResponse, RouterConfig, TokenAuth,
};
pub use storage::{create_s3_client, BlobRef, BlobStore, LocalBlobStore, S3BlobStore};
pub use store::{BinaryImageLink, ImageRecord, RecordStore, User};
pub use tier::{AccountTier, ThumbnailSizes, TierPolicy, TierRegistry};
