//! # Executor Scheduler
//!
//! Drains a bounded batch of pending sync items per tick and applies each
//! one through the adapter of its target service.
//!
//! ## Item lifecycle
//!
//! ```text
//! pending --claim--> running --ok--> done
//!                       |
//!                       +--transient, attempts < max--> pending (backoff)
//!                       +--transient, attempts = max--> error + blacklist
//!                       +--permanent------------------> skipped + blacklist
//!                       +--auth-----------------------> error
//! ```
//!
//! Items are claimed with a conditional `pending -> running` transition, so
//! two executors sharing a store never both process the same item. Within a
//! batch renames run before track changes. After an auth failure or a rate
//! limit, the remaining items for that service are left pending and
//! unclaimed until the next tick.

use crate::activity::{Activity, ActivityLogger};
use crate::blacklist::BlacklistGate;
use crate::error::{FailureKind, Result, SyncError};
use crate::registry::ProviderRegistry;
use crate::scheduler::{PeriodicJob, TickGuard};
use async_trait::async_trait;
use bridge_traits::playlist::{ProviderError, ProviderKind};
use bridge_traits::time::Clock;
use core_runtime::config::MAX_RETRY_BACKOFF;
use core_runtime::events::{CoreEvent, EventBus, ExecutionEvent};
use core_store::{
    JobType, MappingRepository, QuotaRepository, ServiceSide, StatusChange, StoreError, SyncAction,
    SyncItem, SyncItemRepository, SyncItemStatus, SyncPayload,
};
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_BATCH_SIZE: u32 = 25;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Delay before retry number `attempts + 1`.
///
/// Exponential in `attempts` from `base`, capped at [`MAX_RETRY_BACKOFF`];
/// a longer server-requested wait is honoured as is.
pub fn retry_delay_secs(base: Duration, attempts: u32, retry_after_secs: Option<u64>) -> u64 {
    let exponent = attempts.saturating_sub(1).min(32);
    let backoff = base
        .as_secs()
        .saturating_mul(1u64 << exponent)
        .min(MAX_RETRY_BACKOFF.as_secs());
    backoff.max(retry_after_secs.unwrap_or(0)).max(1)
}

/// Outcome of one executor tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Another tick was still running; nothing was done
    pub overlapped: bool,
    /// Items this tick moved to `running`
    pub claimed: u32,
    pub succeeded: u32,
    pub retried: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Claimed by another executor first, or moved off `running` before
    /// the outcome was stored
    pub lost_claims: u32,
    /// Left pending because their service was halted this tick
    pub deferred: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Done,
    Retry,
    Failed,
    Skipped,
}

pub struct ExecutorScheduler {
    items: Arc<dyn SyncItemRepository>,
    mappings: Arc<dyn MappingRepository>,
    blacklist: BlacklistGate,
    activity: Arc<dyn ActivityLogger>,
    providers: ProviderRegistry,
    clock: Arc<dyn Clock>,
    batch_size: u32,
    max_attempts: u32,
    retry_backoff: Duration,
    events: Option<EventBus>,
    quotas: Option<Arc<dyn QuotaRepository>>,
    running: AtomicBool,
}

impl ExecutorScheduler {
    pub fn new(
        items: Arc<dyn SyncItemRepository>,
        mappings: Arc<dyn MappingRepository>,
        blacklist: BlacklistGate,
        activity: Arc<dyn ActivityLogger>,
        providers: ProviderRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            items,
            mappings,
            blacklist,
            activity,
            providers,
            clock,
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            events: None,
            quotas: None,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, base: Duration) -> Self {
        self.retry_backoff = base;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Save every adapter's quota snapshot after each tick.
    pub fn with_quota_store(mut self, quotas: Arc<dyn QuotaRepository>) -> Self {
        self.quotas = Some(quotas);
        self
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(events) = &self.events {
            events.emit(CoreEvent::Execution(event));
        }
    }

    /// Process one batch of due items.
    ///
    /// # Errors
    /// Only when the batch cannot be read; per-item failures are recorded
    /// on the item and counted in the report.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<ExecutionReport> {
        let Some(_guard) = TickGuard::try_acquire(&self.running) else {
            debug!("Executor tick still running, skipping");
            return Ok(ExecutionReport {
                overlapped: true,
                ..Default::default()
            });
        };

        let now = self.clock.unix_timestamp();
        let mut batch = self.items.fetch_pending_batch(now, self.batch_size).await?;
        // Stable: keeps oldest-first order within each action.
        batch.sort_by_key(|item| item.action.priority());

        let mut report = ExecutionReport::default();
        let mut halted: HashSet<ProviderKind> = HashSet::new();

        for item in &batch {
            let provider = item.target_provider();
            if halted.contains(&provider) {
                report.deferred += 1;
                continue;
            }

            match self.process(item, &mut halted).await {
                Ok(None) => report.lost_claims += 1,
                Ok(Some(settled)) => {
                    report.claimed += 1;
                    match settled {
                        Settled::Done => report.succeeded += 1,
                        Settled::Retry => report.retried += 1,
                        Settled::Failed => report.failed += 1,
                        Settled::Skipped => report.skipped += 1,
                    }
                }
                Err(e) => {
                    warn!(sync_item_id = %item.id, error = %e, "Failed to record item outcome");
                }
            }
        }

        for (kind, quota) in self.providers.quota_statuses() {
            info!(
                provider = %kind,
                used = quota.used,
                limit = quota.limit,
                remaining = quota.remaining(),
                resets_at = %quota.resets_at,
                "Provider quota"
            );
            if let Some(quotas) = &self.quotas {
                if let Err(e) = quotas.save(kind, &quota, now).await {
                    warn!(provider = %kind, error = %e, "Failed to save quota snapshot");
                }
            }
        }

        info!(
            batch = batch.len(),
            succeeded = report.succeeded,
            retried = report.retried,
            failed = report.failed,
            skipped = report.skipped,
            deferred = report.deferred,
            "Executor tick completed"
        );
        self.emit(ExecutionEvent::TickCompleted {
            processed: report.claimed,
            succeeded: report.succeeded,
            retried: report.retried,
            failed: report.failed,
            skipped: report.skipped,
        });

        Ok(report)
    }

    /// Claim, apply and settle one item. `Ok(None)` if the claim was lost.
    #[instrument(skip(self, item, halted), fields(sync_item_id = %item.id, action = %item.action))]
    async fn process(
        &self,
        item: &SyncItem,
        halted: &mut HashSet<ProviderKind>,
    ) -> Result<Option<Settled>> {
        let now = self.clock.unix_timestamp();

        if item.action != SyncAction::RenamePlaylist
            && self
                .blacklist
                .is_blacklisted(&item.mapping_id, item.service, &item.track_id)
                .await?
        {
            let won = self
                .items
                .transition(&item.id, &StatusChange::skip(SyncItemStatus::Pending, "Blacklisted", now))
                .await?;
            if !won {
                return Ok(None);
            }
            self.record(
                item,
                Activity::info(JobType::Execution, format!("Skipped {}: track is blacklisted", item.label())),
            )
            .await;
            self.finish(item, SyncItemStatus::Skipped);
            return Ok(Some(Settled::Skipped));
        }

        if !self.items.transition(&item.id, &StatusChange::claim(now)).await? {
            debug!("Item already claimed");
            return Ok(None);
        }

        let outcome = self.apply(item).await;
        self.settle(item, outcome, halted).await
    }

    async fn apply(&self, item: &SyncItem) -> Result<()> {
        let mapping = self
            .mappings
            .find_by_id(&item.mapping_id)
            .await?
            .ok_or_else(|| SyncError::Validation(format!("Mapping {} no longer exists", item.mapping_id)))?;

        let playlist_id = match item.service {
            ServiceSide::Source => &mapping.source_playlist_id,
            ServiceSide::Destination => &mapping.destination_playlist_id,
        };
        let kind = item.target_provider();
        let provider = self.providers.get(kind)?;

        match &item.payload {
            SyncPayload::AddTrack { query } => {
                let found = provider
                    .search_track(query)
                    .await
                    .map_err(|e| SyncError::provider(kind, e))?;
                let Some(track) = found else {
                    return Err(SyncError::provider(
                        kind,
                        ProviderError::NotFound(format!("No match for '{}'", query.search_terms())),
                    ));
                };
                provider
                    .add_track(playlist_id, &track.track_ref())
                    .await
                    .map_err(|e| SyncError::provider(kind, e))
            }
            SyncPayload::RemoveTrack { track } => provider
                .remove_track(playlist_id, track)
                .await
                .map_err(|e| SyncError::provider(kind, e)),
            SyncPayload::RenamePlaylist { new_name } => provider
                .rename_playlist(playlist_id, new_name)
                .await
                .map_err(|e| SyncError::provider(kind, e)),
        }
    }

    async fn settle(
        &self,
        item: &SyncItem,
        outcome: Result<()>,
        halted: &mut HashSet<ProviderKind>,
    ) -> Result<Option<Settled>> {
        let now = self.clock.unix_timestamp();

        let error = match outcome {
            Ok(()) => {
                if !self.store_outcome(item, &StatusChange::complete(now)).await? {
                    return Ok(None);
                }
                self.record(item, Activity::info(JobType::Execution, format!("Completed {}", item.label())))
                    .await;
                self.finish(item, SyncItemStatus::Done);
                return Ok(Some(Settled::Done));
            }
            Err(error) => error,
        };

        let attempts = item.attempts + 1;
        let message = error.to_string();
        let kind = error.kind();

        if matches!(
            &error,
            SyncError::Provider { source: ProviderError::RateLimited { .. }, .. }
        ) {
            halted.insert(item.target_provider());
        }

        let settled = match kind {
            FailureKind::Transient | FailureKind::Internal if attempts < self.max_attempts => {
                let delay = retry_delay_secs(self.retry_backoff, attempts, error.retry_after_secs());
                let next_attempt_at = now + i64::try_from(delay).unwrap_or(i64::MAX / 2);
                let change = StatusChange::retry_later(attempts, message.as_str(), next_attempt_at, now);
                if !self.store_outcome(item, &change).await? {
                    return Ok(None);
                }
                self.record(
                    item,
                    Activity::warn(
                        JobType::Execution,
                        format!(
                            "Retrying {} in {}s (attempt {}/{}): {}",
                            item.label(),
                            delay,
                            attempts,
                            self.max_attempts,
                            message
                        ),
                    ),
                )
                .await;
                Settled::Retry
            }
            FailureKind::Transient | FailureKind::Internal => {
                if !self.store_outcome(item, &StatusChange::fail(attempts, message.as_str(), now)).await? {
                    return Ok(None);
                }
                self.blacklist_item(item, &format!("Gave up after {} attempts: {}", attempts, message))
                    .await;
                self.record(
                    item,
                    Activity::error(
                        JobType::Execution,
                        format!("Failed {} after {} attempts: {}", item.label(), attempts, message),
                    ),
                )
                .await;
                Settled::Failed
            }
            FailureKind::Permanent => {
                let change = StatusChange::skip(SyncItemStatus::Running, message.as_str(), now).attempts(attempts);
                if !self.store_outcome(item, &change).await? {
                    return Ok(None);
                }
                self.blacklist_item(item, &message).await;
                self.record(
                    item,
                    Activity::warn(JobType::Execution, format!("Skipped {}: {}", item.label(), message)),
                )
                .await;
                Settled::Skipped
            }
            FailureKind::Validation => {
                let change = StatusChange::skip(SyncItemStatus::Running, message.as_str(), now).attempts(attempts);
                if !self.store_outcome(item, &change).await? {
                    return Ok(None);
                }
                self.record(
                    item,
                    Activity::warn(JobType::Execution, format!("Skipped {}: {}", item.label(), message)),
                )
                .await;
                Settled::Skipped
            }
            FailureKind::Auth => {
                halted.insert(item.target_provider());
                if !self.store_outcome(item, &StatusChange::fail(attempts, message.as_str(), now)).await? {
                    return Ok(None);
                }
                self.record(
                    item,
                    Activity::error(
                        JobType::Execution,
                        format!(
                            "Authorization failed for {}; {} paused until the next tick: {}",
                            item.label(),
                            item.target_provider().display_name(),
                            message
                        ),
                    ),
                )
                .await;
                Settled::Failed
            }
        };

        let status = match settled {
            Settled::Done => SyncItemStatus::Done,
            Settled::Retry => SyncItemStatus::Pending,
            Settled::Failed => SyncItemStatus::Error,
            Settled::Skipped => SyncItemStatus::Skipped,
        };
        self.finish(item, status);
        Ok(Some(settled))
    }

    /// Write a running item's outcome. `false` when the item left `running`
    /// while the action was in flight.
    async fn store_outcome(&self, item: &SyncItem, change: &StatusChange) -> Result<bool> {
        let stored = self.items.transition(&item.id, change).await?;
        if !stored {
            warn!(
                sync_item_id = %item.id,
                to = %change.to,
                "Sync item changed while running; outcome dropped"
            );
        }
        Ok(stored)
    }

    /// Renames have no track to blacklist.
    async fn blacklist_item(&self, item: &SyncItem, reason: &str) {
        if item.action == SyncAction::RenamePlaylist {
            return;
        }
        if let Err(e) = self
            .blacklist
            .record_skip(&item.mapping_id, item.service, &item.track_id, reason)
            .await
        {
            warn!(sync_item_id = %item.id, error = %e, "Failed to blacklist track");
        }
    }

    async fn record(&self, item: &SyncItem, activity: Activity) {
        self.activity.record(activity.for_item(item)).await;
    }

    fn finish(&self, item: &SyncItem, status: SyncItemStatus) {
        self.emit(ExecutionEvent::ItemFinished {
            sync_item_id: item.id.clone(),
            mapping_id: item.mapping_id.clone(),
            status: status.to_string(),
        });
    }

    /// Put an `error` item back in the queue with a fresh attempt budget.
    #[instrument(skip(self))]
    pub async fn retry_item(&self, id: &str) -> Result<()> {
        let item = self.find(id).await?;
        let now = self.clock.unix_timestamp();
        let change = StatusChange::new(item.status, SyncItemStatus::Pending, now)
            .attempts(0)
            .next_attempt_at(now);

        self.apply_manual(&item, change).await?;
        self.record(
            &item,
            Activity::info(JobType::System, format!("Requeued {} by user", item.label())),
        )
        .await;
        Ok(())
    }

    /// Give up on a `pending` or `error` item.
    #[instrument(skip(self))]
    pub async fn skip_item(&self, id: &str) -> Result<()> {
        let item = self.find(id).await?;
        let now = self.clock.unix_timestamp();
        let change = StatusChange::skip(item.status, "Skipped by user", now);

        self.apply_manual(&item, change).await?;
        self.record(
            &item,
            Activity::info(JobType::System, format!("Skipped {} by user", item.label())),
        )
        .await;
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<SyncItem> {
        self.items.find_by_id(id).await?.ok_or_else(|| {
            SyncError::Store(StoreError::NotFound {
                entity_type: "SyncItem".to_string(),
                id: id.to_string(),
            })
        })
    }

    async fn apply_manual(&self, item: &SyncItem, change: StatusChange) -> Result<()> {
        if item.status == SyncItemStatus::Running {
            return Err(StoreError::InvalidStateTransition {
                from: item.status.to_string(),
                to: change.to.to_string(),
            }
            .into());
        }

        if !self.items.transition(&item.id, &change).await? {
            return Err(SyncError::Internal(format!(
                "Sync item {} changed while being updated",
                item.id
            )));
        }
        self.finish(item, change.to);
        Ok(())
    }
}

#[async_trait]
impl PeriodicJob for ExecutorScheduler {
    fn name(&self) -> &'static str {
        "executor"
    }

    async fn run_once(&self) -> Result<()> {
        self.tick().await.map(|_| ())
    }
}
