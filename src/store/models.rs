//! Record types. These map directly to SQLite rows.

use chrono::{DateTime, FixedOffset};

use crate::derive::SourceFormat;
use crate::storage::BlobRef;

/// An account holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    /// Title of the assigned tier, if any
    pub tier: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}

/// A stored image with its derivative references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub format: SourceFormat,
    pub original: BlobRef,
    pub thumbnail1: Option<BlobRef>,
    pub thumbnail2: Option<BlobRef>,
    pub created_at: DateTime<FixedOffset>,
}

impl ImageRecord {
    /// Every blob this record points at.
    pub fn blob_refs(&self) -> Vec<BlobRef> {
        let mut refs = vec![self.original.clone()];
        refs.extend(self.thumbnail1.iter().cloned());
        refs.extend(self.thumbnail2.iter().cloned());
        refs
    }
}

/// Fields of an image about to be inserted. The primary thumbnail is
/// mandatory here: a record without one is never saved.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub owner_id: i64,
    pub title: String,
    pub format: SourceFormat,
    pub original: BlobRef,
    pub thumbnail1: BlobRef,
    pub thumbnail2: Option<BlobRef>,
    pub created_at: DateTime<FixedOffset>,
}

/// A time-bounded reference to a binary derivative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryImageLink {
    pub id: i64,
    pub owner_id: i64,
    /// Source image; cleared if the image is deleted
    pub image_id: Option<i64>,
    pub binary: BlobRef,
    pub ttl_seconds: i64,
    pub created_at: DateTime<FixedOffset>,
    pub expiration: DateTime<FixedOffset>,
}

/// Fields of a link about to be inserted.
#[derive(Debug, Clone)]
pub struct NewBinaryLink {
    pub owner_id: i64,
    pub image_id: i64,
    pub binary: BlobRef,
    pub ttl_seconds: i64,
    pub created_at: DateTime<FixedOffset>,
    pub expiration: DateTime<FixedOffset>,
}

/// Trim surrounding whitespace and lower-case the domain part.
///
/// Returns `None` unless the result looks like `local@domain`.
pub fn normalize_email(email: &str) -> Option<String> {
    let trimmed = email.trim();
    let (local, domain) = trimmed.rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains(char::is_whitespace) {
        return None;
    }
    Some(format!("{}@{}", local, domain.to_lowercase()))
}
