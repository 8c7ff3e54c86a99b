use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info};

use super::{BlobRef, BlobStore};
use crate::error::StorageError;

/// Blob store backed by a directory on local disk.
///
/// Each blob lives at `{root}/{namespace}/{uuid}-{name}`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create the store, making sure the root directory exists.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!("Blob storage directory: {}", root.display());
        Ok(Self { root })
    }

    /// Path on disk for a reference.
    pub fn path_for(&self, reference: &BlobRef) -> Result<PathBuf, StorageError> {
        if !reference.is_valid() {
            return Err(StorageError::NotFound(reference.to_string()));
        }
        Ok(self
            .root
            .join(reference.namespace())
            .join(reference.file_name()))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(
        &self,
        namespace: &str,
        suggested_name: &str,
        data: Bytes,
    ) -> Result<BlobRef, StorageError> {
        let reference = BlobRef::generate(namespace, suggested_name);
        let path = self.path_for(&reference)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await?;

        debug!(reference = %reference, bytes = data.len(), "Stored blob");
        Ok(reference)
    }

    async fn retrieve(&self, reference: &BlobRef) -> Result<Bytes, StorageError> {
        let path = self.path_for(reference)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(reference.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, reference: &BlobRef) -> Result<(), StorageError> {
        let path = self.path_for(reference)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(reference = %reference, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(reference = %reference, "Blob already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
