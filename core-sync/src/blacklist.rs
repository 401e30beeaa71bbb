//! # Blacklist Gate
//!
//! Tracks that keep failing, or that the user excluded, are recorded per
//! mapping and side so analysis stops re-enqueueing them. Entries never
//! expire; removing one is a user action.

use crate::error::Result;
use bridge_traits::time::Clock;
use core_store::{BlacklistEntry, BlacklistRepository, ServiceSide};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// Reason stored for tracks excluded by hand.
pub const MANUAL_EXCLUSION_REASON: &str = "Excluded by user";

#[derive(Clone)]
pub struct BlacklistGate {
    repository: Arc<dyn BlacklistRepository>,
    clock: Arc<dyn Clock>,
}

impl BlacklistGate {
    pub fn new(repository: Arc<dyn BlacklistRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn is_blacklisted(
        &self,
        mapping_id: &str,
        service: ServiceSide,
        track_id: &str,
    ) -> Result<bool> {
        Ok(self
            .repository
            .find(mapping_id, service, track_id)
            .await?
            .is_some())
    }

    /// All blacklisted track ids of one mapping side.
    pub async fn blocked(&self, mapping_id: &str, service: ServiceSide) -> Result<HashSet<String>> {
        Ok(self.repository.track_ids(mapping_id, service).await?)
    }

    /// Create the entry or bump its skip counter.
    #[instrument(skip(self, reason))]
    pub async fn record_skip(
        &self,
        mapping_id: &str,
        service: ServiceSide,
        track_id: &str,
        reason: &str,
    ) -> Result<BlacklistEntry> {
        let entry = self
            .repository
            .record_skip(mapping_id, service, track_id, reason, self.clock.unix_timestamp())
            .await?;

        info!(
            skip_counter = entry.skip_counter,
            reason, "Track blacklisted"
        );
        Ok(entry)
    }

    /// Exclude a track by hand.
    pub async fn exclude(
        &self,
        mapping_id: &str,
        service: ServiceSide,
        track_id: &str,
    ) -> Result<BlacklistEntry> {
        self.record_skip(mapping_id, service, track_id, MANUAL_EXCLUSION_REASON)
            .await
    }

    pub async fn entries(&self, mapping_id: &str) -> Result<Vec<BlacklistEntry>> {
        Ok(self.repository.list_for_mapping(mapping_id).await?)
    }

    /// Lift a blacklist entry. Returns whether it existed.
    pub async fn remove(&self, entry_id: &str) -> Result<bool> {
        Ok(self.repository.delete(entry_id).await?)
    }
}
