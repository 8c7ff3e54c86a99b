//! Derivative generation: thumbnails and binary (black/white) variants.
//!
//! ```text
//! upload bytes ──► SourceFormat (by extension) ──► decode
//!                                                    │
//!                          ┌─────────────────────────┼──────────────────┐
//!                          ▼                         ▼                  ▼
//!                 fit within primary     fit within secondary    luma + dither
//!                          │                         │                  │
//!                          └──────── encode in source format ◄──────────┘
//! ```
//!
//! All decode/encode work happens on tokio's blocking pool under a timeout.

mod format;
mod generator;

pub use format::{derivative_name, SourceFormat};
pub use generator::{
    clamp_quality, is_valid_quality, DerivativeGenerator, DerivedThumbnails,
    DEFAULT_DERIVATION_TIMEOUT, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
