//! Playlist Provider Abstraction
//!
//! Common contract implemented by every streaming-service adapter. The sync
//! engine only ever talks to a [`PlaylistProvider`], so the source and
//! destination services are interchangeable variants of the same capability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::BridgeError;

/// Streaming services the engine knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Spotify,
    YouTube,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Spotify => "spotify",
            ProviderKind::YouTube => "youtube",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Spotify => "Spotify",
            ProviderKind::YouTube => "YouTube",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spotify" => Ok(ProviderKind::Spotify),
            "youtube" => Ok(ProviderKind::YouTube),
            other => Err(format!("Unknown provider: {}", other)),
        }
    }
}

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry later (rate limit, timeout, network, server error)
    Transient,
    /// Will never succeed for this input (not found, permission denied)
    Permanent,
    /// Credentials are missing, expired or revoked
    Auth,
}

/// Shared error taxonomy every adapter maps its HTTP failures into.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Rate limited: {message}")]
    RateLimited {
        retry_after_secs: Option<u64>,
        message: String,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error (status {status:?}): {message}")]
    Unknown {
        status: Option<u16>,
        message: String,
    },
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_)
            | ProviderError::Network(_) => ErrorClass::Transient,
            ProviderError::NotFound(_) | ProviderError::PermissionDenied(_) => {
                ErrorClass::Permanent
            }
            ProviderError::Unauthorized(_) => ErrorClass::Auth,
            ProviderError::Unknown { status, .. } => match status {
                Some(code) if (400..500).contains(code) => ErrorClass::Permanent,
                _ => ErrorClass::Transient,
            },
        }
    }

    /// Server-requested wait before retrying, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

impl From<BridgeError> for ProviderError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(msg) | BridgeError::Network(msg) => ProviderError::Network(msg),
            other => ProviderError::Unknown {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A playlist owned by the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub track_count: Option<u32>,
}

/// Provider-native reference to a track.
///
/// `entry_id` identifies the track's slot inside a specific playlist for
/// services that remove by entry rather than by track (YouTube playlist items).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl TrackRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry_id: None,
        }
    }
}

/// Service-neutral description of a track, used to find it elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackQuery {
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl TrackQuery {
    /// Free-text search terms: primary artist followed by title.
    pub fn search_terms(&self) -> String {
        match self.artists.first() {
            Some(artist) => format!("{} {}", artist, self.title),
            None => self.title.clone(),
        }
    }
}

/// One entry of a playlist as returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistTrack {
    pub id: String,
    pub entry_id: Option<String>,
    pub title: String,
    pub artists: Vec<String>,
    pub duration_ms: Option<u64>,
}

impl PlaylistTrack {
    pub fn track_ref(&self) -> TrackRef {
        TrackRef {
            id: self.id.clone(),
            entry_id: self.entry_id.clone(),
        }
    }

    pub fn query(&self) -> TrackQuery {
        TrackQuery {
            title: self.title.clone(),
            artists: self.artists.clone(),
            duration_ms: self.duration_ms,
        }
    }
}

/// A page of tracks plus the cursor for the next page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackPage {
    pub tracks: Vec<PlaylistTrack>,
    pub next_cursor: Option<String>,
}

/// Remaining request budget for services with a hard daily quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub used: u32,
    pub limit: u32,
    pub resets_at: DateTime<Utc>,
}

impl QuotaStatus {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

/// Playlist capability implemented by each streaming-service adapter.
///
/// Every call acquires a valid access token, is bounded by a per-call
/// timeout, and reports failures through [`ProviderError`].
#[async_trait]
pub trait PlaylistProvider: Send + Sync {
    /// Which service this adapter talks to
    fn kind(&self) -> ProviderKind;

    /// All playlists visible to the authenticated user
    async fn list_playlists(&self) -> ProviderResult<Vec<PlaylistSummary>>;

    /// Current name and size of one playlist
    async fn get_playlist(&self, playlist_id: &str) -> ProviderResult<PlaylistSummary>;

    /// One page of a playlist's tracks; `cursor` is `None` for the first page
    async fn list_tracks_page(
        &self,
        playlist_id: &str,
        cursor: Option<String>,
    ) -> ProviderResult<TrackPage>;

    /// Resolve a track described by another service into this service's ID space
    async fn search_track(&self, query: &TrackQuery) -> ProviderResult<Option<PlaylistTrack>>;

    async fn add_track(&self, playlist_id: &str, track: &TrackRef) -> ProviderResult<()>;

    async fn remove_track(&self, playlist_id: &str, track: &TrackRef) -> ProviderResult<()>;

    async fn rename_playlist(&self, playlist_id: &str, new_name: &str) -> ProviderResult<()>;

    /// Daily quota snapshot, for services that enforce one
    fn quota_status(&self) -> Option<QuotaStatus> {
        None
    }

    /// Resume quota accounting from a snapshot taken by an earlier process.
    fn restore_quota(&self, _saved: &QuotaStatus) {}
}

/// Lazily page through a playlist. Pages are fetched only as the stream is
/// polled; the first error ends the stream.
pub fn track_stream<'a>(
    provider: &'a dyn PlaylistProvider,
    playlist_id: &'a str,
) -> BoxStream<'a, ProviderResult<PlaylistTrack>> {
    stream::try_unfold(Some(None::<String>), move |state| async move {
        let Some(cursor) = state else {
            return Ok(None);
        };
        let page = provider.list_tracks_page(playlist_id, cursor).await?;
        let next = page.next_cursor.map(Some);
        Ok::<_, ProviderError>(Some((stream::iter(page.tracks.into_iter().map(Ok)), next)))
    })
    .try_flatten()
    .boxed()
}

/// Drain [`track_stream`] into a vector.
pub async fn collect_tracks(
    provider: &dyn PlaylistProvider,
    playlist_id: &str,
) -> ProviderResult<Vec<PlaylistTrack>> {
    track_stream(provider, playlist_id).try_collect().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct PagedProvider {
        pages: Vec<Vec<&'static str>>,
        calls: AtomicUsize,
    }

    fn track(id: &str) -> PlaylistTrack {
        PlaylistTrack {
            id: id.to_string(),
            entry_id: None,
            title: id.to_uppercase(),
            artists: vec![],
            duration_ms: None,
        }
    }

    #[async_trait]
    impl PlaylistProvider for PagedProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Spotify
        }

        async fn list_playlists(&self) -> ProviderResult<Vec<PlaylistSummary>> {
            Ok(vec![])
        }

        async fn get_playlist(&self, playlist_id: &str) -> ProviderResult<PlaylistSummary> {
            Err(ProviderError::NotFound(playlist_id.to_string()))
        }

        async fn list_tracks_page(
            &self,
            _playlist_id: &str,
            cursor: Option<String>,
        ) -> ProviderResult<TrackPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let index: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            let tracks = self.pages[index].iter().map(|id| track(id)).collect();
            let next_cursor = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
            Ok(TrackPage {
                tracks,
                next_cursor,
            })
        }

        async fn search_track(&self, _query: &TrackQuery) -> ProviderResult<Option<PlaylistTrack>> {
            Ok(None)
        }

        async fn add_track(&self, _playlist_id: &str, _track: &TrackRef) -> ProviderResult<()> {
            Ok(())
        }

        async fn remove_track(&self, _playlist_id: &str, _track: &TrackRef) -> ProviderResult<()> {
            Ok(())
        }

        async fn rename_playlist(&self, _playlist_id: &str, _new_name: &str) -> ProviderResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_error_classes() {
        let rate_limited = ProviderError::RateLimited {
            retry_after_secs: Some(5),
            message: "slow down".to_string(),
        };
        assert_eq!(rate_limited.class(), ErrorClass::Transient);
        assert_eq!(rate_limited.retry_after_secs(), Some(5));

        assert_eq!(
            ProviderError::NotFound("track".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            ProviderError::PermissionDenied("region".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            ProviderError::Unauthorized("expired".into()).class(),
            ErrorClass::Auth
        );
        assert_eq!(ProviderError::Timeout(5000).class(), ErrorClass::Transient);

        let bad_request = ProviderError::Unknown {
            status: Some(400),
            message: "invalid uri".into(),
        };
        assert_eq!(bad_request.class(), ErrorClass::Permanent);

        let server = ProviderError::Unknown {
            status: Some(503),
            message: "unavailable".into(),
        };
        assert_eq!(server.class(), ErrorClass::Transient);
    }

    #[test]
    fn test_bridge_errors_map_to_transient() {
        let err: ProviderError = BridgeError::Timeout("read".into()).into();
        assert_eq!(err.class(), ErrorClass::Transient);

        let err: ProviderError = BridgeError::OperationFailed("boom".into()).into();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("Spotify".parse::<ProviderKind>(), Ok(ProviderKind::Spotify));
        assert_eq!("youtube".parse::<ProviderKind>(), Ok(ProviderKind::YouTube));
        assert!("deezer".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::YouTube.to_string(), "youtube");
    }

    #[test]
    fn test_search_terms() {
        let query = TrackQuery {
            title: "Halo".into(),
            artists: vec!["Beyonce".into(), "Someone".into()],
            duration_ms: None,
        };
        assert_eq!(query.search_terms(), "Beyonce Halo");
    }

    #[tokio::test]
    async fn test_collect_tracks_follows_cursor() {
        let provider = PagedProvider {
            pages: vec![vec!["a", "b"], vec!["c"], vec!["d"]],
            calls: AtomicUsize::new(0),
        };

        let tracks = collect_tracks(&provider, "pl").await.unwrap();
        let ids: Vec<_> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_track_stream_is_lazy() {
        let provider = PagedProvider {
            pages: vec![vec!["a", "b"], vec!["c"]],
            calls: AtomicUsize::new(0),
        };

        let first: Vec<_> = track_stream(&provider, "pl").take(2).collect().await;
        assert_eq!(first.len(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
