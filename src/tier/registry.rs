use std::sync::Arc;

use tracing::{debug, info};

use super::{default_tiers, AccountTier, TierPolicy};
use crate::error::{StorageError, TierAuthoringError};
use crate::store::{RecordStore, User};

/// Resolves users to their effective [`TierPolicy`] and authors tiers.
#[derive(Clone)]
pub struct TierRegistry {
    store: Arc<RecordStore>,
}

impl TierRegistry {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Effective policy for `user`.
    ///
    /// Users without a tier, or whose tier no longer resolves, get
    /// [`TierPolicy::fail_closed`]. A failed lookup is an error, not a
    /// downgrade.
    pub fn policy_for(&self, user: &User) -> Result<TierPolicy, StorageError> {
        let Some(title) = user.tier.as_deref() else {
            return Ok(TierPolicy::fail_closed());
        };

        match self.store.get_tier(title)? {
            Some(tier) => Ok(tier.policy()),
            None => {
                debug!(user_id = user.id, tier = title, "Tier no longer exists, failing closed");
                Ok(TierPolicy::fail_closed())
            }
        }
    }

    /// Validate and store a tier, replacing any tier with the same title.
    pub fn upsert_tier(&self, tier: &AccountTier) -> Result<(), TierAuthoringError> {
        tier.validate()?;
        self.store.upsert_tier(tier)?;
        info!(tier = %tier.title, "Tier saved");
        Ok(())
    }

    pub fn list_tiers(&self) -> Result<Vec<AccountTier>, StorageError> {
        self.store.list_tiers()
    }

    /// Returns whether the tier existed.
    pub fn delete_tier(&self, title: &str) -> Result<bool, StorageError> {
        let deleted = self.store.delete_tier(title)?;
        if deleted {
            info!(tier = title, "Tier deleted, its users fall back to no tier");
        }
        Ok(deleted)
    }

    /// Store the built-in Basic/Premium/Enterprise/Custom tiers.
    pub fn seed_defaults(&self) -> Result<usize, TierAuthoringError> {
        let tiers = default_tiers();
        for tier in &tiers {
            self.upsert_tier(tier)?;
        }
        Ok(tiers.len())
    }
}
