//! Expiring links to binary (black/white) image variants.
//!
//! # Lifecycle
//!
//! ```text
//!   create_link ──► Active ──(now > expiration)──► Expired ──sweep──► (deleted)
//! ```
//!
//! The expiration is fixed at creation (`created_at + ttl`) and never
//! recomputed; there is no renewal. Expired links stop being served right away,
//! and the sweep removes their rows and blobs later.
//!
//! # Time Zones
//!
//! Timestamps are written in the configured zone. Comparisons always convert
//! both sides into one zone as typed instants, so a non-UTC deployment sweeps
//! exactly the same links a UTC one would.

mod sweep;
mod ttl;

pub use ttl::{
    link_state, validate_ttl, LinkState, MAX_TTL_SECONDS, MIN_TTL_SECONDS, TTL_STEP_SECONDS,
};

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::derive::{derivative_name, DerivativeGenerator};
use crate::error::{LinkError, StorageError};
use crate::storage::{BlobRef, BlobStore, NAMESPACE_BINARIES};
use crate::store::{BinaryImageLink, NewBinaryLink, RecordStore, User};
use crate::tier::TierRegistry;

/// Creates, resolves and sweeps binary image links.
#[derive(Clone)]
pub struct LinkManager {
    store: Arc<RecordStore>,
    blobs: Arc<dyn BlobStore>,
    tiers: TierRegistry,
    generator: DerivativeGenerator,
    clock: Arc<dyn Clock>,
    zone: FixedOffset,
}

impl LinkManager {
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

    /// The current instant in the configured zone, read fresh on every call.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now().with_timezone(&self.zone)
    }

    /// Create a link to the binary variant of one of `user`'s images.
    ///
    /// Checks run in this order: ownership (`NotFound`), tier permission
    /// (`PermissionDenied`), lifetime (`InvalidTtl`). Then the binary variant
    /// is derived and stored, and the link inserted with
    /// `expiration = now + ttl`. If the insert fails the stored blob is removed.
    pub async fn create_link(
        &self,
        user: &User,
        image_id: i64,
        ttl_seconds: i64,
    ) -> Result<BinaryImageLink, LinkError> {
        let image = self
            .store
            .get_image(user.id, image_id)?
            .ok_or(LinkError::NotFound)?;

        let policy = self.tiers.policy_for(user)?;
        if !policy.allow_binary_link {
            return Err(LinkError::PermissionDenied {
                tier: policy.label().to_string(),
            });
        }

        let ttl = validate_ttl(ttl_seconds)?;

        let source = self.blobs.retrieve(&image.original).await?;
        let binary = self.generator.derive_binary(source, image.format).await?;

        let name = derivative_name(image.original.display_name(), "_binary");
        let reference = self.blobs.store(NAMESPACE_BINARIES, &name, binary).await?;

        let created_at = self.now();
        let new_link = NewBinaryLink {
            owner_id: user.id,
            image_id: image.id,
            binary: reference.clone(),
            ttl_seconds: ttl,
            created_at,
            expiration: created_at + Duration::seconds(ttl),
        };

        match self.store.insert_link(&new_link) {
            Ok(link) => {
                info!(
                    user_id = user.id,
                    image_id = image.id,
                    link_id = link.id,
                    ttl = ttl,
                    expiration = %link.expiration.to_rfc3339(),
                    "Binary link created"
                );
                Ok(link)
            }
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Link insert failed, removing binary blob");
                if let Err(cleanup) = self.blobs.delete(&reference).await {
                    warn!(reference = %reference, error = %cleanup, "Failed to remove binary blob");
                }
                Err(e.into())
            }
        }
    }

    /// The link exposing `binary` if it exists and has not expired.
    pub fn active_link_for(&self, binary: &BlobRef) -> Result<Option<BinaryImageLink>, StorageError> {
        let now = self.now();
        Ok(self
            .store
            .find_link_by_blob(binary)?
            .filter(|link| link_state(link, &now) == LinkState::Active))
    }
}
