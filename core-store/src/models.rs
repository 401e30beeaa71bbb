//! Records held by the store
//!
//! Plain data with validation; persistence lives in
//! [`repositories`](crate::repositories).

use crate::error::{Result, StoreError};
use bridge_traits::playlist::{PlaylistTrack, ProviderKind, TrackQuery, TrackRef};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Mapping
// =============================================================================

/// A pairing of one source playlist with one destination playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Mapping {
    pub id: String,
    pub source_playlist_id: String,
    pub destination_playlist_id: String,
    /// Name last seen on the source service
    pub source_playlist_name: String,
    /// Name last seen on the destination service
    pub destination_playlist_name: String,
    pub sync_name: bool,
    pub sync_tracks: bool,
    pub interval_minutes: i64,
    pub last_analyzed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Mapping {
    pub fn new(
        source_playlist_id: impl Into<String>,
        destination_playlist_id: impl Into<String>,
        interval_minutes: i64,
        now: i64,
    ) -> Self {
        Self {
            id: new_id(),
            source_playlist_id: source_playlist_id.into(),
            destination_playlist_id: destination_playlist_id.into(),
            source_playlist_name: String::new(),
            destination_playlist_name: String::new(),
            sync_name: true,
            sync_tracks: true,
            interval_minutes,
            last_analyzed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_names(
        mut self,
        source_name: impl Into<String>,
        destination_name: impl Into<String>,
    ) -> Self {
        self.source_playlist_name = source_name.into();
        self.destination_playlist_name = destination_name.into();
        self
    }

    pub fn with_options(mut self, sync_name: bool, sync_tracks: bool) -> Self {
        self.sync_name = sync_name;
        self.sync_tracks = sync_tracks;
        self
    }

    /// Check the mapping against the configured interval floor.
    pub fn validate(&self, min_interval_minutes: u32) -> std::result::Result<(), String> {
        if self.source_playlist_id.trim().is_empty() {
            return Err("Source playlist id cannot be empty".to_string());
        }

        if self.destination_playlist_id.trim().is_empty() {
            return Err("Destination playlist id cannot be empty".to_string());
        }

        if self.interval_minutes < i64::from(min_interval_minutes) {
            return Err(format!(
                "Interval of {} minutes is below the minimum of {} minutes",
                self.interval_minutes, min_interval_minutes
            ));
        }

        Ok(())
    }

    /// Earliest time the next analysis may run; `None` if never analyzed.
    pub fn next_due_at(&self) -> Option<i64> {
        self.last_analyzed_at
            .map(|at| at + self.interval_minutes * 60)
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.next_due_at().map_or(true, |due| due <= now)
    }
}

// =============================================================================
// Sync items
// =============================================================================

/// Which side of a mapping an item acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceSide {
    Source,
    Destination,
}

impl ServiceSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceSide::Source => "source",
            ServiceSide::Destination => "destination",
        }
    }
}

impl FromStr for ServiceSide {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "source" => Ok(ServiceSide::Source),
            "destination" => Ok(ServiceSide::Destination),
            other => Err(StoreError::invalid("service", format!("unknown side '{}'", other))),
        }
    }
}

impl fmt::Display for ServiceSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    AddTrack,
    RemoveTrack,
    RenamePlaylist,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::AddTrack => "add_track",
            SyncAction::RemoveTrack => "remove_track",
            SyncAction::RenamePlaylist => "rename_playlist",
        }
    }

    /// Execution order inside a batch: renames before track changes.
    pub fn priority(&self) -> u8 {
        match self {
            SyncAction::RenamePlaylist => 0,
            SyncAction::RemoveTrack | SyncAction::AddTrack => 1,
        }
    }
}

impl FromStr for SyncAction {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add_track" => Ok(SyncAction::AddTrack),
            "remove_track" => Ok(SyncAction::RemoveTrack),
            "rename_playlist" => Ok(SyncAction::RenamePlaylist),
            other => Err(StoreError::invalid("action", format!("unknown action '{}'", other))),
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a sync item.
///
/// ```text
/// pending -> running -> done
///    |          |-> pending   (transient failure, retried later)
///    |          |-> error     (retry ceiling reached or auth failure)
///    |          `-> skipped   (permanent failure)
///    `-> skipped              (manual)
/// error -> pending | skipped  (manual)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncItemStatus {
    Pending,
    Running,
    Done,
    Error,
    Skipped,
}

impl SyncItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncItemStatus::Pending => "pending",
            SyncItemStatus::Running => "running",
            SyncItemStatus::Done => "done",
            SyncItemStatus::Error => "error",
            SyncItemStatus::Skipped => "skipped",
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncItemStatus::Done | SyncItemStatus::Skipped)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SyncItemStatus::Pending | SyncItemStatus::Running)
    }

    pub fn can_transition_to(&self, next: SyncItemStatus) -> bool {
        use SyncItemStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Skipped)
                | (Running, Done)
                | (Running, Pending)
                | (Running, Error)
                | (Running, Skipped)
                | (Error, Pending)
                | (Error, Skipped)
        )
    }

    pub fn validate_transition(&self, next: SyncItemStatus) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(StoreError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl FromStr for SyncItemStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SyncItemStatus::Pending),
            "running" => Ok(SyncItemStatus::Running),
            "done" => Ok(SyncItemStatus::Done),
            "error" => Ok(SyncItemStatus::Error),
            "skipped" => Ok(SyncItemStatus::Skipped),
            other => Err(StoreError::invalid("status", format!("unknown status '{}'", other))),
        }
    }
}

impl fmt::Display for SyncItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action-specific data stored as JSON in `sync_items.payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncPayload {
    /// Resolved against the destination catalogue at execution time
    AddTrack { query: TrackQuery },
    RemoveTrack { track: TrackRef },
    RenamePlaylist { new_name: String },
}

impl SyncPayload {
    pub fn action(&self) -> SyncAction {
        match self {
            SyncPayload::AddTrack { .. } => SyncAction::AddTrack,
            SyncPayload::RemoveTrack { .. } => SyncAction::RemoveTrack,
            SyncPayload::RenamePlaylist { .. } => SyncAction::RenamePlaylist,
        }
    }
}

/// Source and destination services of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRoute {
    pub source: ProviderKind,
    pub destination: ProviderKind,
}

impl ServiceRoute {
    pub fn new(source: ProviderKind, destination: ProviderKind) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn provider_for(&self, side: ServiceSide) -> ProviderKind {
        match side {
            ServiceSide::Source => self.source,
            ServiceSide::Destination => self.destination,
        }
    }
}

/// One queued change against a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItem {
    pub id: String,
    pub mapping_id: String,
    pub service: ServiceSide,
    pub action: SyncAction,
    pub status: SyncItemStatus,
    /// De-duplication and blacklist key
    pub track_id: String,
    pub source_track_id: Option<String>,
    pub source_track_title: Option<String>,
    pub source_service: ProviderKind,
    pub destination_service: ProviderKind,
    pub payload: SyncPayload,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Not eligible for execution before this time
    pub next_attempt_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SyncItem {
    fn new(
        mapping_id: &str,
        service: ServiceSide,
        route: ServiceRoute,
        track_id: String,
        payload: SyncPayload,
        now: i64,
    ) -> Self {
        Self {
            id: new_id(),
            mapping_id: mapping_id.to_string(),
            service,
            action: payload.action(),
            status: SyncItemStatus::Pending,
            track_id,
            source_track_id: None,
            source_track_title: None,
            source_service: route.source,
            destination_service: route.destination,
            payload,
            attempts: 0,
            last_error: None,
            next_attempt_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy a source track onto the destination.
    pub fn add_track(
        mapping_id: &str,
        route: ServiceRoute,
        source_track: &PlaylistTrack,
        now: i64,
    ) -> Self {
        let mut item = Self::new(
            mapping_id,
            ServiceSide::Destination,
            route,
            source_track.id.clone(),
            SyncPayload::AddTrack {
                query: source_track.query(),
            },
            now,
        );
        item.source_track_id = Some(source_track.id.clone());
        item.source_track_title = Some(source_track.title.clone());
        item
    }

    /// Drop a destination track with no source counterpart.
    pub fn remove_track(
        mapping_id: &str,
        route: ServiceRoute,
        destination_track: &PlaylistTrack,
        now: i64,
    ) -> Self {
        let mut item = Self::new(
            mapping_id,
            ServiceSide::Destination,
            route,
            destination_track.id.clone(),
            SyncPayload::RemoveTrack {
                track: destination_track.track_ref(),
            },
            now,
        );
        item.source_track_title = Some(destination_track.title.clone());
        item
    }

    pub fn rename_playlist(
        mapping_id: &str,
        route: ServiceRoute,
        new_name: impl Into<String>,
        now: i64,
    ) -> Self {
        Self::new(
            mapping_id,
            ServiceSide::Destination,
            route,
            String::new(),
            SyncPayload::RenamePlaylist {
                new_name: new_name.into(),
            },
            now,
        )
    }

    /// Provider the item is executed against.
    pub fn target_provider(&self) -> ProviderKind {
        ServiceRoute::new(self.source_service, self.destination_service).provider_for(self.service)
    }

    /// Human-readable subject for log lines.
    pub fn label(&self) -> String {
        match (&self.payload, &self.source_track_title) {
            (SyncPayload::RenamePlaylist { new_name }, _) => format!("rename to '{}'", new_name),
            (_, Some(title)) => format!("{} '{}'", self.action, title),
            (_, None) => format!("{} {}", self.action, self.track_id),
        }
    }
}

/// Status update applied by [`SyncItemRepository::transition`].
///
/// `None` fields keep the stored value.
///
/// [`SyncItemRepository::transition`]: crate::repositories::SyncItemRepository::transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: SyncItemStatus,
    pub to: SyncItemStatus,
    pub attempts: Option<u32>,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<i64>,
    pub at: i64,
}

impl StatusChange {
    pub fn new(from: SyncItemStatus, to: SyncItemStatus, at: i64) -> Self {
        Self {
            from,
            to,
            attempts: None,
            last_error: None,
            next_attempt_at: None,
            at,
        }
    }

    /// pending -> running
    pub fn claim(at: i64) -> Self {
        Self::new(SyncItemStatus::Pending, SyncItemStatus::Running, at)
    }

    /// running -> done
    pub fn complete(at: i64) -> Self {
        Self::new(SyncItemStatus::Running, SyncItemStatus::Done, at)
    }

    /// running -> pending, eligible again at `next_attempt_at`
    pub fn retry_later(attempts: u32, error: impl Into<String>, next_attempt_at: i64, at: i64) -> Self {
        Self::new(SyncItemStatus::Running, SyncItemStatus::Pending, at)
            .attempts(attempts)
            .error(error)
            .next_attempt_at(next_attempt_at)
    }

    /// running -> error
    pub fn fail(attempts: u32, error: impl Into<String>, at: i64) -> Self {
        Self::new(SyncItemStatus::Running, SyncItemStatus::Error, at)
            .attempts(attempts)
            .error(error)
    }

    /// `from` -> skipped
    pub fn skip(from: SyncItemStatus, error: impl Into<String>, at: i64) -> Self {
        Self::new(from, SyncItemStatus::Skipped, at).error(error)
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    pub fn next_attempt_at(mut self, at: i64) -> Self {
        self.next_attempt_at = Some(at);
        self
    }
}

/// Number of items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub running: u64,
    pub done: u64,
    pub error: u64,
    pub skipped: u64,
}

impl StatusCounts {
    pub fn get(&self, status: SyncItemStatus) -> u64 {
        match status {
            SyncItemStatus::Pending => self.pending,
            SyncItemStatus::Running => self.running,
            SyncItemStatus::Done => self.done,
            SyncItemStatus::Error => self.error,
            SyncItemStatus::Skipped => self.skipped,
        }
    }

    pub(crate) fn set(&mut self, status: SyncItemStatus, count: u64) {
        match status {
            SyncItemStatus::Pending => self.pending = count,
            SyncItemStatus::Running => self.running = count,
            SyncItemStatus::Done => self.done = count,
            SyncItemStatus::Error => self.error = count,
            SyncItemStatus::Skipped => self.skipped = count,
        }
    }
}

// =============================================================================
// Blacklist
// =============================================================================

/// A track suppressed from future syncs for one mapping and side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub id: String,
    pub mapping_id: String,
    pub service: ServiceSide,
    pub track_id: String,
    pub reason: String,
    pub skip_counter: u32,
    pub last_skipped_at: i64,
    pub created_at: i64,
}

// =============================================================================
// Activity log
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Warn,
    Error,
}

impl ActivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityLevel::Info => "info",
            ActivityLevel::Warn => "warn",
            ActivityLevel::Error => "error",
        }
    }
}

impl FromStr for ActivityLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(ActivityLevel::Info),
            "warn" => Ok(ActivityLevel::Warn),
            "error" => Ok(ActivityLevel::Error),
            other => Err(StoreError::invalid("level", format!("unknown level '{}'", other))),
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Analysis,
    Execution,
    System,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Analysis => "analysis",
            JobType::Execution => "execution",
            JobType::System => "system",
        }
    }
}

impl FromStr for JobType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "analysis" => Ok(JobType::Analysis),
            "execution" => Ok(JobType::Execution),
            "system" => Ok(JobType::System),
            other => Err(StoreError::invalid("job_type", format!("unknown job type '{}'", other))),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: String,
    pub level: ActivityLevel,
    pub message: String,
    pub sync_item_id: Option<String>,
    pub mapping_id: Option<String>,
    pub job_type: JobType,
    pub created_at: i64,
}

impl ActivityLog {
    pub fn new(level: ActivityLevel, job_type: JobType, message: impl Into<String>, now: i64) -> Self {
        Self {
            id: new_id(),
            level,
            message: message.into(),
            sync_item_id: None,
            mapping_id: None,
            job_type,
            created_at: now,
        }
    }

    pub fn with_mapping(mut self, mapping_id: impl Into<String>) -> Self {
        self.mapping_id = Some(mapping_id.into());
        self
    }

    pub fn with_sync_item(mut self, sync_item_id: impl Into<String>) -> Self {
        self.sync_item_id = Some(sync_item_id.into());
        self
    }
}
