//! # Analysis Scheduler
//!
//! On each tick, every mapping whose interval has elapsed is compared with
//! its source and destination playlists and the differences are queued as
//! sync items. Sync is source-authoritative: items always target the
//! destination.
//!
//! ## Per mapping
//!
//! 1. Fetch both playlists' current names.
//! 2. If `sync_name` is set and the names differ, queue a rename of the
//!    destination to the source name.
//! 3. If `sync_tracks` is set, page through both track lists, diff them
//!    under the configured [`MatchPolicy`] and queue `add_track` for missing
//!    tracks and `remove_track` for extra ones, leaving out blacklisted
//!    tracks.
//! 4. Stamp `last_analyzed_at`, also when steps 1-3 failed, so a broken
//!    mapping is retried on its interval rather than every tick.
//!
//! Queuing is idempotent: an item whose (mapping, track, action) is already
//! pending or running is not queued again, except that a pending rename is
//! updated to the latest source name. A failure in one mapping is
//! logged and does not affect the others.

use crate::activity::{Activity, ActivityLogger};
use crate::blacklist::BlacklistGate;
use crate::error::{Result, SyncError};
use crate::matching::diff_tracks;
use crate::registry::ProviderRegistry;
use crate::scheduler::{PeriodicJob, TickGuard};
use async_trait::async_trait;
use bridge_traits::playlist::{collect_tracks, PlaylistProvider, PlaylistTrack, ProviderKind};
use bridge_traits::time::Clock;
use core_runtime::events::{AnalysisEvent, CoreEvent, EventBus};
use core_runtime::MatchPolicy;
use core_store::{
    ActivityLogRepository, JobType, Mapping, MappingRepository, ServiceRoute, ServiceSide,
    SyncAction, SyncItem, SyncItemRepository,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const SECS_PER_DAY: i64 = 86_400;

/// Outcome of one analysis tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisReport {
    /// Another tick was still running; nothing was done
    pub overlapped: bool,
    pub mappings_analyzed: u32,
    pub mappings_failed: u32,
    pub items_enqueued: u32,
    /// Already pending or running
    pub duplicates: u32,
    pub blacklisted: u32,
    pub logs_pruned: u64,
}

#[derive(Debug, Default)]
struct MappingOutcome {
    source_name: String,
    destination_name: String,
    enqueued: u32,
    duplicates: u32,
    blacklisted: u32,
}

pub struct AnalysisScheduler {
    mappings: Arc<dyn MappingRepository>,
    items: Arc<dyn SyncItemRepository>,
    blacklist: BlacklistGate,
    activity: Arc<dyn ActivityLogger>,
    providers: ProviderRegistry,
    clock: Arc<dyn Clock>,
    route: ServiceRoute,
    match_policy: MatchPolicy,
    retention: Option<(Arc<dyn ActivityLogRepository>, u32)>,
    events: Option<EventBus>,
    running: AtomicBool,
}

impl AnalysisScheduler {
    pub fn new(
        mappings: Arc<dyn MappingRepository>,
        items: Arc<dyn SyncItemRepository>,
        blacklist: BlacklistGate,
        activity: Arc<dyn ActivityLogger>,
        providers: ProviderRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            mappings,
            items,
            blacklist,
            activity,
            providers,
            clock,
            route: ServiceRoute::new(ProviderKind::Spotify, ProviderKind::YouTube),
            match_policy: MatchPolicy::default(),
            retention: None,
            events: None,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_route(mut self, route: ServiceRoute) -> Self {
        self.route = route;
        self
    }

    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    /// Prune activity entries older than `days` once per tick.
    pub fn with_activity_retention(
        mut self,
        repository: Arc<dyn ActivityLogRepository>,
        days: u32,
    ) -> Self {
        self.retention = Some((repository, days));
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: AnalysisEvent) {
        if let Some(events) = &self.events {
            events.emit(CoreEvent::Analysis(event));
        }
    }

    /// Analyze every due mapping.
    ///
    /// # Errors
    /// Only when the due mappings cannot be read; per-mapping failures are
    /// counted in the report.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<AnalysisReport> {
        let Some(_guard) = TickGuard::try_acquire(&self.running) else {
            debug!("Analysis tick still running, skipping");
            return Ok(AnalysisReport {
                overlapped: true,
                ..Default::default()
            });
        };

        let now = self.clock.unix_timestamp();
        let due = self.mappings.find_due(now).await?;
        let mut report = AnalysisReport::default();

        for mapping in &due {
            match self.analyze_mapping(mapping, now).await {
                Ok(outcome) => {
                    report.mappings_analyzed += 1;
                    report.items_enqueued += outcome.enqueued;
                    report.duplicates += outcome.duplicates;
                    report.blacklisted += outcome.blacklisted;

                    if outcome.enqueued > 0 {
                        self.activity
                            .record(
                                Activity::info(
                                    JobType::Analysis,
                                    format!(
                                        "Queued {} change(s) for '{}'",
                                        outcome.enqueued, outcome.source_name
                                    ),
                                )
                                .for_mapping(&mapping.id),
                            )
                            .await;
                    }
                    self.emit(AnalysisEvent::MappingAnalyzed {
                        mapping_id: mapping.id.clone(),
                        enqueued: outcome.enqueued,
                    });
                    self.stamp(
                        mapping,
                        Some(&outcome.source_name),
                        Some(&outcome.destination_name),
                        now,
                    )
                    .await;
                }
                Err(e) => {
                    report.mappings_failed += 1;
                    self.activity
                        .record(
                            Activity::error(
                                JobType::Analysis,
                                format!("Analysis failed: {}", e),
                            )
                            .for_mapping(&mapping.id),
                        )
                        .await;
                    self.emit(AnalysisEvent::MappingFailed {
                        mapping_id: mapping.id.clone(),
                        error: e.to_string(),
                    });
                    self.stamp(mapping, None, None, now).await;
                }
            }
        }

        report.logs_pruned = self.prune_activity(now).await;

        info!(
            due = due.len(),
            analyzed = report.mappings_analyzed,
            failed = report.mappings_failed,
            enqueued = report.items_enqueued,
            duplicates = report.duplicates,
            blacklisted = report.blacklisted,
            "Analysis tick completed"
        );
        self.emit(AnalysisEvent::TickCompleted {
            mappings: report.mappings_analyzed + report.mappings_failed,
            enqueued: report.items_enqueued,
            failed: report.mappings_failed,
        });

        Ok(report)
    }

    async fn stamp(
        &self,
        mapping: &Mapping,
        source_name: Option<&str>,
        destination_name: Option<&str>,
        now: i64,
    ) {
        if let Err(e) = self
            .mappings
            .record_analysis(&mapping.id, source_name, destination_name, now)
            .await
        {
            warn!(mapping_id = %mapping.id, error = %e, "Failed to stamp analysis time");
        }
    }

    #[instrument(skip(self, mapping), fields(mapping_id = %mapping.id))]
    async fn analyze_mapping(&self, mapping: &Mapping, now: i64) -> Result<MappingOutcome> {
        let source = self.providers.get(self.route.source)?;
        let destination = self.providers.get(self.route.destination)?;

        let source_playlist = source
            .get_playlist(&mapping.source_playlist_id)
            .await
            .map_err(|e| SyncError::provider(self.route.source, e))?;
        let destination_playlist = destination
            .get_playlist(&mapping.destination_playlist_id)
            .await
            .map_err(|e| SyncError::provider(self.route.destination, e))?;

        let mut outcome = MappingOutcome {
            source_name: source_playlist.name,
            destination_name: destination_playlist.name,
            ..Default::default()
        };

        let mut planned = Vec::new();

        if mapping.sync_name
            && !outcome.source_name.is_empty()
            && outcome.source_name != outcome.destination_name
        {
            planned.push(SyncItem::rename_playlist(
                &mapping.id,
                self.route,
                outcome.source_name.clone(),
                now,
            ));
        }

        if mapping.sync_tracks {
            let (source_tracks, destination_tracks) = futures::try_join!(
                self.fetch_tracks(source.as_ref(), &mapping.source_playlist_id),
                self.fetch_tracks(destination.as_ref(), &mapping.destination_playlist_id),
            )?;
            debug!(
                source = source_tracks.len(),
                destination = destination_tracks.len(),
                "Fetched track lists"
            );

            let diff = diff_tracks(&source_tracks, &destination_tracks, self.match_policy);
            let blocked = self
                .blacklist
                .blocked(&mapping.id, ServiceSide::Destination)
                .await?;

            for track in &diff.to_add {
                if blocked.contains(&track.id) {
                    outcome.blacklisted += 1;
                } else {
                    planned.push(SyncItem::add_track(&mapping.id, self.route, track, now));
                }
            }
            for track in &diff.to_remove {
                if blocked.contains(&track.id) {
                    outcome.blacklisted += 1;
                } else {
                    planned.push(SyncItem::remove_track(&mapping.id, self.route, track, now));
                }
            }
        }

        for item in &planned {
            if self.items.enqueue(item).await? {
                outcome.enqueued += 1;
                continue;
            }
            outcome.duplicates += 1;
            // A queued rename follows the latest source name.
            if item.action == SyncAction::RenamePlaylist
                && self.items.replace_pending_payload(item).await?
            {
                debug!(new_name = %outcome.source_name, "Updated pending rename");
            }
        }

        Ok(outcome)
    }

    async fn fetch_tracks(
        &self,
        provider: &dyn PlaylistProvider,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistTrack>> {
        collect_tracks(provider, playlist_id)
            .await
            .map_err(|e| SyncError::provider(provider.kind(), e))
    }

    async fn prune_activity(&self, now: i64) -> u64 {
        let Some((repository, days)) = &self.retention else {
            return 0;
        };

        let cutoff = now - i64::from(*days) * SECS_PER_DAY;
        match repository.prune_older_than(cutoff).await {
            Ok(pruned) => {
                if pruned > 0 {
                    debug!(pruned, "Pruned activity log");
                }
                pruned
            }
            Err(e) => {
                warn!(error = %e, "Failed to prune activity log");
                0
            }
        }
    }
}

#[async_trait]
impl PeriodicJob for AnalysisScheduler {
    fn name(&self) -> &'static str {
        "analysis"
    }

    async fn run_once(&self) -> Result<()> {
        self.tick().await.map(|_| ())
    }
}
