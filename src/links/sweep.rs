//! Deletion of expired links.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone};
use tracing::{debug, info, warn};

use super::{link_state, LinkManager, LinkState};
use crate::error::StorageError;

impl LinkManager {
    /// Delete every link whose expiration is strictly before `now`.
    ///
    /// Each link is re-read when its turn comes, so a link created after the
    /// sweep started is judged on its own expiration. A failure on one link
    /// is logged and skipped. Returns the number of links deleted; a second
    /// call with no new expirations returns 0.
    pub async fn sweep_expired<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Result<usize, StorageError> {
        let now = now.with_timezone(&self.zone);
        let ids = self.store.list_link_ids()?;

        let mut deleted = 0;
        for id in ids {
            match self.sweep_one(id, &now).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => warn!(link_id = id, error = %e, "Skipping link during sweep"),
            }
        }

        if deleted > 0 {
            info!(deleted, now = %now.to_rfc3339(), "Sweep removed expired links");
        } else {
            debug!(now = %now.to_rfc3339(), "Sweep found no expired links");
        }
        Ok(deleted)
    }

    /// Sweep against the clock's current time.
    pub async fn sweep_now(&self) -> Result<usize, StorageError> {
        self.sweep_expired(self.now()).await
    }

    async fn sweep_one(&self, id: i64, now: &DateTime<FixedOffset>) -> Result<bool, StorageError> {
        let Some(link) = self.store.get_link(id)? else {
            // Deleted since the id list was read
            return Ok(false);
        };

        if link_state(&link, now) == LinkState::Active {
            return Ok(false);
        }

        // Blob first: if this fails the row stays and the next sweep retries
        self.blobs.delete(&link.binary).await?;
        let removed = self.store.delete_link(id)?;

        debug!(
            link_id = id,
            expiration = %link.expiration.to_rfc3339(),
            "Expired link deleted"
        );
        Ok(removed)
    }

    /// Sweep on a fixed interval until the task is dropped.
    pub async fn run_sweep_loop(self, interval: Duration) {
        info!("Sweeping expired links every {}s", interval.as_secs());
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            if let Err(e) = self.sweep_now().await {
                warn!("Sweep error: {}", e);
            }
        }
    }
}
