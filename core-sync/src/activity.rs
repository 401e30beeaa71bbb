//! # Activity Logger
//!
//! Append-only audit trail written by both schedulers. Every entry is also
//! mirrored to `tracing` at the matching level. Recording never fails the
//! caller: a store error is logged and the entry dropped.

use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_store::{ActivityLevel, ActivityLog, ActivityLogRepository, JobType, SyncItem};
use std::sync::Arc;
use tracing::{error, info, warn};

/// An entry before it is stamped and stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub level: ActivityLevel,
    pub job_type: JobType,
    pub message: String,
    pub mapping_id: Option<String>,
    pub sync_item_id: Option<String>,
}

impl Activity {
    pub fn new(level: ActivityLevel, job_type: JobType, message: impl Into<String>) -> Self {
        Self {
            level,
            job_type,
            message: message.into(),
            mapping_id: None,
            sync_item_id: None,
        }
    }

    pub fn info(job_type: JobType, message: impl Into<String>) -> Self {
        Self::new(ActivityLevel::Info, job_type, message)
    }

    pub fn warn(job_type: JobType, message: impl Into<String>) -> Self {
        Self::new(ActivityLevel::Warn, job_type, message)
    }

    pub fn error(job_type: JobType, message: impl Into<String>) -> Self {
        Self::new(ActivityLevel::Error, job_type, message)
    }

    pub fn for_mapping(mut self, mapping_id: impl Into<String>) -> Self {
        self.mapping_id = Some(mapping_id.into());
        self
    }

    pub fn for_item(mut self, item: &SyncItem) -> Self {
        self.mapping_id = Some(item.mapping_id.clone());
        self.sync_item_id = Some(item.id.clone());
        self
    }
}

#[async_trait]
pub trait ActivityLogger: Send + Sync {
    async fn record(&self, activity: Activity);
}

/// Persists entries to the `activity_logs` collection.
pub struct StoreActivityLogger {
    repository: Arc<dyn ActivityLogRepository>,
    clock: Arc<dyn Clock>,
}

impl StoreActivityLogger {
    pub fn new(repository: Arc<dyn ActivityLogRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }
}

fn mirror(activity: &Activity) {
    let job_type = activity.job_type.as_str();
    let mapping_id = activity.mapping_id.as_deref().unwrap_or("-");
    let sync_item_id = activity.sync_item_id.as_deref().unwrap_or("-");

    match activity.level {
        ActivityLevel::Info => info!(job_type, mapping_id, sync_item_id, "{}", activity.message),
        ActivityLevel::Warn => warn!(job_type, mapping_id, sync_item_id, "{}", activity.message),
        ActivityLevel::Error => error!(job_type, mapping_id, sync_item_id, "{}", activity.message),
    }
}

#[async_trait]
impl ActivityLogger for StoreActivityLogger {
    async fn record(&self, activity: Activity) {
        mirror(&activity);

        let mut entry = ActivityLog::new(
            activity.level,
            activity.job_type,
            activity.message,
            self.clock.unix_timestamp(),
        );
        entry.mapping_id = activity.mapping_id;
        entry.sync_item_id = activity.sync_item_id;

        if let Err(e) = self.repository.append(&entry).await {
            warn!(error = %e, "Failed to persist activity log entry");
        }
    }
}
