//! Blob storage for originals and derivatives.
//!
//! The rest of the crate treats storage as an opaque "save bytes, get back a
//! reference" service. References are stable strings of the form
//! `{namespace}/{uuid}-{name}` and can be turned into URLs by the HTTP layer.
//!
//! Two backends are provided:
//!
//! - [`LocalBlobStore`]: files under a directory on local disk
//! - [`S3BlobStore`]: objects in an S3 or S3-compatible bucket

mod local;
mod s3;

pub use local::LocalBlobStore;
pub use s3::{create_s3_client, S3BlobStore};

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

/// Longest file name kept in a blob reference.
const MAX_NAME_LEN: usize = 100;

/// Namespace for uploaded originals.
pub const NAMESPACE_ORIGINALS: &str = "images";

/// Namespace for thumbnails.
pub const NAMESPACE_THUMBNAILS: &str = "thumbnails";

/// Namespace for binary derivatives behind expiring links.
pub const NAMESPACE_BINARIES: &str = "binary";

/// Opaque reference to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobRef(String);

impl BlobRef {
    /// Wrap an existing reference string (e.g. read back from the database).
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Build a fresh reference for a blob in `namespace`.
    pub fn generate(namespace: &str, suggested_name: &str) -> Self {
        Self(format!(
            "{}/{}-{}",
            namespace,
            uuid::Uuid::new_v4().simple(),
            sanitize_name(suggested_name)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace segment (`images`, `thumbnails`, `binary`, ...).
    pub fn namespace(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    /// The file name segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// The client-supplied part of the file name, without the uuid prefix.
    pub fn display_name(&self) -> &str {
        let file_name = self.file_name();
        file_name
            .split_once('-')
            .map(|(_, name)| name)
            .unwrap_or(file_name)
    }

    /// Whether this reference is well-formed: `namespace/name`, no traversal.
    pub fn is_valid(&self) -> bool {
        let mut parts = self.0.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(ns), Some(name), None) => {
                !ns.is_empty()
                    && !name.is_empty()
                    && ns != ".."
                    && name != ".."
                    && ns != "."
                    && name != "."
                    && !self.0.contains('\\')
            }
            _ => false,
        }
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce a client-supplied file name to a safe last path segment.
pub fn sanitize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return "blob".to_string();
    }

    // Keep the extension when truncating
    if cleaned.len() > MAX_NAME_LEN {
        let ext = cleaned.rsplit_once('.').map(|(_, e)| e).unwrap_or_default();
        let keep = MAX_NAME_LEN.saturating_sub(ext.len() + 1);
        if ext.is_empty() || keep == 0 {
            return cleaned[..MAX_NAME_LEN].to_string();
        }
        return format!("{}.{}", &cleaned[..keep], ext);
    }

    cleaned.to_string()
}

/// Trait for storing and retrieving blobs.
///
/// Implementations must be thread-safe. `delete` on a missing blob succeeds so
/// cleanup paths can run more than once.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store `data` and return a new reference. `suggested_name` is the
    /// client's file name; `namespace` groups related blobs.
    async fn store(
        &self,
        namespace: &str,
        suggested_name: &str,
        data: Bytes,
    ) -> Result<BlobRef, StorageError>;

    /// Read a blob back in full.
    async fn retrieve(&self, reference: &BlobRef) -> Result<Bytes, StorageError>;

    /// Delete a blob. Missing blobs are not an error.
    async fn delete(&self, reference: &BlobRef) -> Result<(), StorageError>;

    /// Short backend description for logs.
    fn describe(&self) -> String;
}
