//! HTTP server layer for pixhost.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        /images, /images/{id}, /images/{id}/get-link, /media     │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │  (bearer)   │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └──────────────────────────────┬──────────────────────────────────┘
//!                                │
//!                ImageService / LinkManager / RecordStore
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{auth_middleware, bearer_token, AuthError, CurrentUser, TokenAuth};
pub use handlers::{
    create_image_handler, create_link_handler, delete_image_handler, get_image_handler,
    health_handler, list_images_handler, media_handler, AppState, CreateLinkRequest,
    ErrorResponse, HealthResponse, ImageResponse, LinkResponse,
};
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_UPLOAD_BYTES};
