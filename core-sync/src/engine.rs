//! # Sync Engine
//!
//! Wires the analysis and executor schedulers to a shared record store and
//! runs them as two independent periodic loops.
//!
//! ```ignore
//! let engine = SyncEngine::new(&config, Repositories::sqlite(pool, 5), providers, clock);
//! let handle = engine.start().await?;
//! // ...
//! handle.shutdown().await;
//! ```

use crate::activity::{ActivityLogger, StoreActivityLogger};
use crate::analysis::{AnalysisReport, AnalysisScheduler};
use crate::blacklist::BlacklistGate;
use crate::error::Result;
use crate::executor::{ExecutionReport, ExecutorScheduler};
use crate::registry::ProviderRegistry;
use crate::scheduler::spawn_periodic;
use bridge_traits::time::Clock;
use core_runtime::events::EventBus;
use core_runtime::EngineConfig;
use core_store::{
    ActivityLogRepository, BlacklistRepository, MappingRepository, QuotaRepository,
    SqliteActivityLogRepository, SqliteBlacklistRepository, SqliteMappingRepository,
    SqliteQuotaRepository, SqliteSyncItemRepository, StatusCounts, SyncItemRepository,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// The record store collections the engine works on.
#[derive(Clone)]
pub struct Repositories {
    pub mappings: Arc<dyn MappingRepository>,
    pub sync_items: Arc<dyn SyncItemRepository>,
    pub blacklist: Arc<dyn BlacklistRepository>,
    pub activity_logs: Arc<dyn ActivityLogRepository>,
    pub quotas: Arc<dyn QuotaRepository>,
}

impl Repositories {
    pub fn sqlite(pool: SqlitePool, min_interval_minutes: u32) -> Self {
        Self {
            mappings: Arc::new(
                SqliteMappingRepository::new(pool.clone()).with_min_interval(min_interval_minutes),
            ),
            sync_items: Arc::new(SqliteSyncItemRepository::new(pool.clone())),
            blacklist: Arc::new(SqliteBlacklistRepository::new(pool.clone())),
            activity_logs: Arc::new(SqliteActivityLogRepository::new(pool.clone())),
            quotas: Arc::new(SqliteQuotaRepository::new(pool)),
        }
    }
}

pub struct SyncEngine {
    analysis: Arc<AnalysisScheduler>,
    executor: Arc<ExecutorScheduler>,
    repositories: Repositories,
    providers: ProviderRegistry,
    blacklist: BlacklistGate,
    clock: Arc<dyn Clock>,
    analysis_tick: Duration,
    executor_tick: Duration,
    stale_claim_after: Duration,
}

impl SyncEngine {
    pub fn new(
        config: &EngineConfig,
        repositories: Repositories,
        providers: ProviderRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(config, repositories, providers, clock, None)
    }

    /// Like [`new`](Self::new), publishing scheduler events on `events`.
    pub fn with_event_bus(
        config: &EngineConfig,
        repositories: Repositories,
        providers: ProviderRegistry,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self::build(config, repositories, providers, clock, Some(events))
    }

    fn build(
        config: &EngineConfig,
        repositories: Repositories,
        providers: ProviderRegistry,
        clock: Arc<dyn Clock>,
        events: Option<EventBus>,
    ) -> Self {
        let blacklist = BlacklistGate::new(repositories.blacklist.clone(), clock.clone());
        let activity: Arc<dyn ActivityLogger> = Arc::new(StoreActivityLogger::new(
            repositories.activity_logs.clone(),
            clock.clone(),
        ));

        let mut analysis = AnalysisScheduler::new(
            repositories.mappings.clone(),
            repositories.sync_items.clone(),
            blacklist.clone(),
            activity.clone(),
            providers.clone(),
            clock.clone(),
        )
        .with_match_policy(config.match_policy);
        if let Some(days) = config.activity_retention_days {
            analysis = analysis.with_activity_retention(repositories.activity_logs.clone(), days);
        }

        let mut executor = ExecutorScheduler::new(
            repositories.sync_items.clone(),
            repositories.mappings.clone(),
            blacklist.clone(),
            activity,
            providers.clone(),
            clock.clone(),
        )
        .with_quota_store(repositories.quotas.clone())
        .with_batch_size(config.executor_batch_size)
        .with_max_attempts(config.max_attempts)
        .with_retry_backoff(config.retry_backoff);

        if let Some(events) = events {
            analysis = analysis.with_event_bus(events.clone());
            executor = executor.with_event_bus(events);
        }

        Self {
            analysis: Arc::new(analysis),
            executor: Arc::new(executor),
            repositories,
            providers,
            blacklist,
            clock,
            analysis_tick: config.analysis_tick,
            executor_tick: config.executor_tick,
            stale_claim_after: config.stale_claim_after,
        }
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    pub fn blacklist(&self) -> &BlacklistGate {
        &self.blacklist
    }

    /// Run one analysis tick outside the periodic loop.
    pub async fn analyze_now(&self) -> Result<AnalysisReport> {
        self.analysis.tick().await
    }

    /// Run one executor tick outside the periodic loop.
    pub async fn execute_now(&self) -> Result<ExecutionReport> {
        self.executor.tick().await
    }

    pub async fn retry_item(&self, id: &str) -> Result<()> {
        self.executor.retry_item(id).await
    }

    pub async fn skip_item(&self, id: &str) -> Result<()> {
        self.executor.skip_item(id).await
    }

    pub async fn status_counts(&self) -> Result<StatusCounts> {
        Ok(self.repositories.sync_items.count_by_status().await?)
    }

    /// Requeue items left `running` by a previous process, restore saved
    /// quota usage, then spawn both scheduler loops.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<EngineHandle> {
        let now = self.clock.unix_timestamp();
        let cutoff = now - i64::try_from(self.stale_claim_after.as_secs()).unwrap_or(i64::MAX);
        let requeued = self.repositories.sync_items.requeue_stale(cutoff, now).await?;
        if requeued > 0 {
            warn!(requeued, "Requeued sync items abandoned while running");
        }

        let saved = self.repositories.quotas.list().await?;
        self.providers.restore_quotas(&saved);

        let shutdown = CancellationToken::new();
        let tasks = vec![
            spawn_periodic(self.analysis.clone(), self.analysis_tick, shutdown.clone()),
            spawn_periodic(self.executor.clone(), self.executor_tick, shutdown.clone()),
        ];

        info!(
            analysis_tick_secs = self.analysis_tick.as_secs(),
            executor_tick_secs = self.executor_tick.as_secs(),
            "Sync engine started"
        );
        Ok(EngineHandle { shutdown, tasks })
    }
}

/// Running scheduler loops.
pub struct EngineHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop both loops, letting in-flight ticks finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Sync engine stopped");
    }
}
