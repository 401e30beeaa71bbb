//! In-memory playlist service and a wired-up engine over an in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::playlist::{
    PlaylistProvider, PlaylistSummary, PlaylistTrack, ProviderError, ProviderKind,
    ProviderResult, QuotaStatus, TrackPage, TrackQuery, TrackRef,
};
use bridge_traits::time::{Clock, ManualClock};
use core_runtime::MatchPolicy;
use core_store::{create_test_pool, Mapping, PageRequest, SyncItem};
use core_sync::{
    normalize_title, ActivityLogger, AnalysisScheduler, BlacklistGate, ExecutorScheduler,
    ProviderRegistry, Repositories, StoreActivityLogger,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 2024-03-01T12:00:00Z
pub const NOW: i64 = 1_709_294_400;

pub fn track(id: &str, title: &str) -> PlaylistTrack {
    PlaylistTrack {
        id: id.to_string(),
        entry_id: None,
        title: title.to_string(),
        artists: vec!["Artist".to_string()],
        duration_ms: Some(180_000),
    }
}

#[derive(Default)]
struct FakeState {
    playlists: HashMap<String, (String, Vec<PlaylistTrack>)>,
    catalogue: Vec<PlaylistTrack>,
    failures: VecDeque<ProviderError>,
    calls: Vec<String>,
    next_entry: u32,
    quota: Option<QuotaStatus>,
}

/// Playlist service backed by a map, paging two tracks at a time.
pub struct FakeProvider {
    kind: ProviderKind,
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_playlist(self, id: &str, name: &str, tracks: Vec<PlaylistTrack>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let tracks = tracks
                .into_iter()
                .map(|mut t| {
                    state.next_entry += 1;
                    t.entry_id = Some(format!("entry-{}", state.next_entry));
                    t
                })
                .collect();
            state.playlists.insert(id.to_string(), (name.to_string(), tracks));
        }
        self
    }

    /// Tracks `search_track` can find.
    pub fn with_catalogue(self, tracks: Vec<PlaylistTrack>) -> Self {
        self.state.lock().unwrap().catalogue = tracks;
        self
    }

    /// Report a daily quota; `restore_quota` adopts same-window snapshots.
    pub fn with_quota(self, limit: u32, resets_at: i64) -> Self {
        self.state.lock().unwrap().quota = Some(QuotaStatus {
            used: 0,
            limit,
            resets_at: chrono::DateTime::from_timestamp(resets_at, 0).unwrap(),
        });
        self
    }

    /// Fail the next search or write call with `error`.
    pub fn fail_next(&self, error: ProviderError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    pub fn titles(&self, playlist_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.playlists[playlist_id]
            .1
            .iter()
            .map(|t| t.title.clone())
            .collect()
    }

    pub fn name(&self, playlist_id: &str) -> String {
        self.state.lock().unwrap().playlists[playlist_id].0.clone()
    }

    pub fn quota_used(&self) -> Option<u32> {
        self.state.lock().unwrap().quota.map(|q| q.used)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("search"))
            .collect()
    }

    fn begin(&self, call: String) -> ProviderResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PlaylistProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn quota_status(&self) -> Option<QuotaStatus> {
        self.state.lock().unwrap().quota
    }

    fn restore_quota(&self, saved: &QuotaStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(quota) = state.quota.as_mut() {
            if quota.resets_at == saved.resets_at {
                quota.used = quota.used.max(saved.used);
            }
        }
    }

    async fn list_playlists(&self) -> ProviderResult<Vec<PlaylistSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .playlists
            .iter()
            .map(|(id, (name, tracks))| PlaylistSummary {
                id: id.clone(),
                name: name.clone(),
                track_count: Some(tracks.len() as u32),
            })
            .collect())
    }

    async fn get_playlist(&self, playlist_id: &str) -> ProviderResult<PlaylistSummary> {
        let state = self.state.lock().unwrap();
        let (name, tracks) = state
            .playlists
            .get(playlist_id)
            .ok_or_else(|| ProviderError::NotFound(playlist_id.to_string()))?;
        Ok(PlaylistSummary {
            id: playlist_id.to_string(),
            name: name.clone(),
            track_count: Some(tracks.len() as u32),
        })
    }

    async fn list_tracks_page(
        &self,
        playlist_id: &str,
        cursor: Option<String>,
    ) -> ProviderResult<TrackPage> {
        let state = self.state.lock().unwrap();
        let (_, tracks) = state
            .playlists
            .get(playlist_id)
            .ok_or_else(|| ProviderError::NotFound(playlist_id.to_string()))?;

        let offset: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (offset + 2).min(tracks.len());
        Ok(TrackPage {
            tracks: tracks[offset..end].to_vec(),
            next_cursor: (end < tracks.len()).then(|| end.to_string()),
        })
    }

    async fn search_track(&self, query: &TrackQuery) -> ProviderResult<Option<PlaylistTrack>> {
        self.begin(format!("search {}", query.title))?;
        let wanted = normalize_title(&query.title);
        let state = self.state.lock().unwrap();
        Ok(state
            .catalogue
            .iter()
            .find(|t| normalize_title(&t.title) == wanted)
            .cloned())
    }

    async fn add_track(&self, playlist_id: &str, track: &TrackRef) -> ProviderResult<()> {
        self.begin(format!("add {}", track.id))?;
        let mut state = self.state.lock().unwrap();
        let mut found = state
            .catalogue
            .iter()
            .find(|t| t.id == track.id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(track.id.clone()))?;
        state.next_entry += 1;
        found.entry_id = Some(format!("entry-{}", state.next_entry));
        state
            .playlists
            .get_mut(playlist_id)
            .ok_or_else(|| ProviderError::NotFound(playlist_id.to_string()))?
            .1
            .push(found);
        Ok(())
    }

    async fn remove_track(&self, playlist_id: &str, track: &TrackRef) -> ProviderResult<()> {
        self.begin(format!("remove {}", track.id))?;
        let mut state = self.state.lock().unwrap();
        let tracks = &mut state
            .playlists
            .get_mut(playlist_id)
            .ok_or_else(|| ProviderError::NotFound(playlist_id.to_string()))?
            .1;
        let position = tracks
            .iter()
            .position(|t| match &track.entry_id {
                Some(entry) => t.entry_id.as_ref() == Some(entry),
                None => t.id == track.id,
            })
            .ok_or_else(|| ProviderError::NotFound(track.id.clone()))?;
        tracks.remove(position);
        Ok(())
    }

    async fn rename_playlist(&self, playlist_id: &str, new_name: &str) -> ProviderResult<()> {
        self.begin(format!("rename {}", new_name))?;
        let mut state = self.state.lock().unwrap();
        state
            .playlists
            .get_mut(playlist_id)
            .ok_or_else(|| ProviderError::NotFound(playlist_id.to_string()))?
            .0 = new_name.to_string();
        Ok(())
    }
}

pub struct Harness {
    pub repos: Repositories,
    pub clock: Arc<ManualClock>,
    pub spotify: Arc<FakeProvider>,
    pub youtube: Arc<FakeProvider>,
    pub providers: ProviderRegistry,
    pub gate: BlacklistGate,
    pub analysis: AnalysisScheduler,
    pub executor: ExecutorScheduler,
    pub mapping: Mapping,
}

impl Harness {
    /// Spotify playlist `sp-1` mirrored onto YouTube playlist `yt-1`.
    pub async fn new(spotify: FakeProvider, youtube: FakeProvider) -> Self {
        let pool = create_test_pool().await.unwrap();
        let repos = Repositories::sqlite(pool, 5);
        let clock = Arc::new(ManualClock::at_timestamp(NOW));
        let spotify = Arc::new(spotify);
        let youtube = Arc::new(youtube);
        let providers = ProviderRegistry::new()
            .register(spotify.clone())
            .register(youtube.clone());

        let mapping = Mapping::new("sp-1", "yt-1", 15, NOW);
        repos.mappings.insert(&mapping).await.unwrap();

        let gate = BlacklistGate::new(repos.blacklist.clone(), clock.clone());
        let analysis = AnalysisScheduler::new(
            repos.mappings.clone(),
            repos.sync_items.clone(),
            gate.clone(),
            logger(&repos, &clock),
            providers.clone(),
            clock.clone(),
        )
        .with_match_policy(MatchPolicy::Title);
        let executor = executor(&repos, &providers, &clock);

        Self {
            repos,
            clock,
            spotify,
            youtube,
            providers,
            gate,
            analysis,
            executor,
            mapping,
        }
    }

    pub fn clock_now(&self) -> i64 {
        self.clock.unix_timestamp()
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }

    pub async fn items(&self) -> Vec<SyncItem> {
        self.repos
            .sync_items
            .list_for_mapping(&self.mapping.id, PageRequest::new(0, 100))
            .await
            .unwrap()
            .items
    }

    pub async fn item(&self, id: &str) -> SyncItem {
        self.repos.sync_items.find_by_id(id).await.unwrap().unwrap()
    }
}

pub fn logger(repos: &Repositories, clock: &Arc<ManualClock>) -> Arc<dyn ActivityLogger> {
    Arc::new(StoreActivityLogger::new(
        repos.activity_logs.clone(),
        clock.clone(),
    ))
}

/// Batch of 25, three attempts, 30 s base backoff.
pub fn executor(
    repos: &Repositories,
    providers: &ProviderRegistry,
    clock: &Arc<ManualClock>,
) -> ExecutorScheduler {
    ExecutorScheduler::new(
        repos.sync_items.clone(),
        repos.mappings.clone(),
        BlacklistGate::new(repos.blacklist.clone(), clock.clone()),
        logger(repos, clock),
        providers.clone(),
        clock.clone(),
    )
    .with_batch_size(25)
    .with_max_attempts(3)
    .with_retry_backoff(Duration::from_secs(30))
}
