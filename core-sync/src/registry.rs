//! Adapter lookup by provider kind.

use crate::error::{Result, SyncError};
use bridge_traits::playlist::{PlaylistProvider, ProviderKind, QuotaStatus};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn PlaylistProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own [`kind`](PlaylistProvider::kind),
    /// replacing any previous one.
    pub fn register(mut self, provider: Arc<dyn PlaylistProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn PlaylistProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| SyncError::Internal(format!("No adapter registered for {}", kind)))
    }

    /// Quota snapshots of every adapter that enforces one.
    pub fn quota_statuses(&self) -> Vec<(ProviderKind, QuotaStatus)> {
        let mut statuses: Vec<_> = self
            .providers
            .iter()
            .filter_map(|(kind, provider)| provider.quota_status().map(|q| (*kind, q)))
            .collect();
        statuses.sort_by_key(|(kind, _)| kind.as_str());
        statuses
    }

    /// Hand each saved snapshot to the adapter of its kind.
    pub fn restore_quotas(&self, saved: &[(ProviderKind, QuotaStatus)]) {
        for (kind, status) in saved {
            if let Some(provider) = self.providers.get(kind) {
                provider.restore_quota(status);
            }
        }
    }
}
