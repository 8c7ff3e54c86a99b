//! Image upload, listing, retrieval and deletion.
//!
//! # Upload Flow
//!
//! ```text
//! title + file ──► validate title ──► detect format ──► derive thumbnails
//!                                                             │
//!                        insert record ◄── store blobs ◄──────┘
//!                              │
//!                    on failure: delete every blob written so far
//! ```
//!
//! A record is only inserted once the original and the primary thumbnail are
//! stored, so nothing is ever half-saved. All lookups are owner-scoped: another
//! user's image is reported as [`ImageError::NotFound`].

mod visibility;

pub use visibility::{filter_representation, ImageRepresentation};

use std::sync::Arc;

use bytes::Bytes;
use chrono::FixedOffset;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::derive::{derivative_name, DerivativeGenerator, DerivedThumbnails, SourceFormat};
use crate::error::{ImageError, StorageError};
use crate::storage::{BlobRef, BlobStore, NAMESPACE_ORIGINALS, NAMESPACE_THUMBNAILS};
use crate::store::{ImageRecord, NewImage, RecordStore, User};
use crate::tier::TierRegistry;

/// Longest image title accepted.
pub const MAX_IMAGE_TITLE_LEN: usize = 255;

/// Owner-scoped image operations.
#[derive(Clone)]
pub struct ImageService {
    store: Arc<RecordStore>,
    blobs: Arc<dyn BlobStore>,
    tiers: TierRegistry,
    generator: DerivativeGenerator,
    clock: Arc<dyn Clock>,
    zone: FixedOffset,
}

impl ImageService {
    pub fn new(
        store: Arc<RecordStore>,
        blobs: Arc<dyn BlobStore>,
        generator: DerivativeGenerator,
        clock: Arc<dyn Clock>,
        zone: FixedOffset,
    ) -> Self {
        let tiers = TierRegistry::new(store.clone());
        Self {
            store,
            blobs,
            tiers,
            generator,
            clock,
            zone,
        }
    }

    pub fn tiers(&self) -> &TierRegistry {
        &self.tiers
    }

    /// Upload an image: derive the thumbnails the owner's tier asks for, then
    /// store blobs and record. Nothing persists if any step fails.
    pub async fn create_image(
        &self,
        user: &User,
        title: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<ImageRecord, ImageError> {
        let title = validate_title(title)?;
        let format = SourceFormat::from_file_name(file_name)?;
        let policy = self.tiers.policy_for(user)?;

        let thumbs = self
            .generator
            .derive_thumbnails(data.clone(), format, policy.thumbnail_sizes())
            .await
            .map_err(|e| {
                warn!(user_id = user.id, file = file_name, error = %e, "Thumbnail derivation failed");
                ImageError::IncompleteDerivation(e)
            })?;

        let mut written: Vec<BlobRef> = Vec::with_capacity(3);
        let result = self
            .persist(user, title, file_name, format, data, thumbs, &mut written)
            .await;

        match result {
            Ok(record) => {
                info!(
                    user_id = user.id,
                    image_id = record.id,
                    tier = policy.label(),
                    format = %format,
                    secondary = record.thumbnail2.is_some(),
                    "Image uploaded"
                );
                Ok(record)
            }
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Image upload aborted, removing stored blobs");
                self.remove_blobs(&written).await;
                Err(e.into())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        user: &User,
        title: String,
        file_name: &str,
        format: SourceFormat,
        original: Bytes,
        thumbs: DerivedThumbnails,
        written: &mut Vec<BlobRef>,
    ) -> Result<ImageRecord, StorageError> {
        let original_ref = self
            .blobs
            .store(NAMESPACE_ORIGINALS, file_name, original)
            .await?;
        written.push(original_ref.clone());

        let thumb1 = self
            .blobs
            .store(
                NAMESPACE_THUMBNAILS,
                &derivative_name(file_name, "_thumb1"),
                thumbs.primary,
            )
            .await?;
        written.push(thumb1.clone());

        let thumb2 = match thumbs.secondary {
            Some(bytes) => {
                let reference = self
                    .blobs
                    .store(
                        NAMESPACE_THUMBNAILS,
                        &derivative_name(file_name, "_thumb2"),
                        bytes,
                    )
                    .await?;
                written.push(reference.clone());
                Some(reference)
            }
            None => None,
        };

        self.store.insert_image(&NewImage {
            owner_id: user.id,
            title,
            format,
            original: original_ref,
            thumbnail1: thumb1,
            thumbnail2: thumb2,
            created_at: self.clock.now().with_timezone(&self.zone),
        })
    }

    /// The user's images, newest first.
    pub fn list_images(&self, user: &User) -> Result<Vec<ImageRecord>, ImageError> {
        Ok(self.store.list_images(user.id)?)
    }

    pub fn get_image(&self, user: &User, id: i64) -> Result<ImageRecord, ImageError> {
        self.store
            .get_image(user.id, id)?
            .ok_or(ImageError::NotFound)
    }

    /// The user's images filtered through their current tier.
    pub fn list_representations(&self, user: &User) -> Result<Vec<ImageRepresentation>, ImageError> {
        let policy = self.tiers.policy_for(user)?;
        Ok(self
            .list_images(user)?
            .iter()
            .map(|image| filter_representation(image, &policy))
            .collect())
    }

    /// One image filtered through the user's current tier.
    pub fn get_representation(&self, user: &User, id: i64) -> Result<ImageRepresentation, ImageError> {
        let policy = self.tiers.policy_for(user)?;
        let image = self.get_image(user, id)?;
        Ok(filter_representation(&image, &policy))
    }

    /// Filter an already-loaded record for `user`.
    pub fn represent(&self, user: &User, image: &ImageRecord) -> Result<ImageRepresentation, ImageError> {
        let policy = self.tiers.policy_for(user)?;
        Ok(filter_representation(image, &policy))
    }

    /// Delete an image and its blobs. Outstanding binary links stay valid.
    pub async fn delete_image(&self, user: &User, id: i64) -> Result<(), ImageError> {
        let record = self
            .store
            .delete_image(user.id, id)?
            .ok_or(ImageError::NotFound)?;

        self.remove_blobs(&record.blob_refs()).await;
        info!(user_id = user.id, image_id = id, "Image deleted");
        Ok(())
    }

    /// Delete a user with everything they own, blobs included.
    pub async fn delete_user(&self, user_id: i64) -> Result<(), ImageError> {
        let refs = self
            .store
            .delete_user(user_id)?
            .ok_or_else(|| StorageError::NotFound(format!("user {}", user_id)))?;

        self.remove_blobs(&refs).await;
        info!(user_id, blobs = refs.len(), "User deleted");
        Ok(())
    }

    async fn remove_blobs(&self, refs: &[BlobRef]) {
        for reference in refs {
            match self.blobs.delete(reference).await {
                Ok(()) => debug!(reference = %reference, "Removed blob"),
                Err(e) => warn!(reference = %reference, error = %e, "Failed to remove blob"),
            }
        }
    }
}

/// Trim a title and check it is non-empty and at most 255 characters.
pub fn validate_title(title: &str) -> Result<String, ImageError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ImageError::InvalidTitle {
            reason: "title must not be empty".to_string(),
        });
    }
    if trimmed.chars().count() > MAX_IMAGE_TITLE_LEN {
        return Err(ImageError::InvalidTitle {
            reason: format!("title is longer than {} characters", MAX_IMAGE_TITLE_LEN),
        });
    }
    Ok(trimmed.to_string())
}
