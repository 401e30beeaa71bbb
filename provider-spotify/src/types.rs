//! Spotify Web API response types
//!
//! Only the fields the adapter reads are declared.

use bridge_traits::playlist::{PlaylistSummary, PlaylistTrack};
use serde::{Deserialize, Serialize};

/// Generic paging object
///
/// See: https://developer.spotify.com/documentation/web-api/reference/get-playlists-tracks
#[derive(Debug, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Absolute URL of the next page
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimplifiedPlaylist {
    pub id: String,
    pub name: String,
    pub tracks: Option<TracksRef>,
}

#[derive(Debug, Deserialize)]
pub struct TracksRef {
    pub total: u32,
}

impl From<SimplifiedPlaylist> for PlaylistSummary {
    fn from(playlist: SimplifiedPlaylist) -> Self {
        PlaylistSummary {
            id: playlist.id,
            name: playlist.name,
            track_count: playlist.tracks.map(|t| t.total),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItem {
    /// Null when the track was removed from the catalogue
    pub track: Option<Track>,
}

#[derive(Debug, Deserialize)]
pub struct Track {
    /// Null for local files
    pub id: Option<String>,
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub is_local: bool,
}

#[derive(Debug, Deserialize)]
pub struct Artist {
    pub name: String,
}

impl Track {
    /// Catalogue tracks only; local files cannot be referenced by id.
    pub fn into_playlist_track(self) -> Option<PlaylistTrack> {
        if self.is_local {
            return None;
        }
        let id = self.id?;
        Some(PlaylistTrack {
            id,
            entry_id: Some(self.uri),
            title: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            duration_ms: self.duration_ms,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub tracks: Paging<Track>,
}

#[derive(Debug, Serialize)]
pub struct AddTracksRequest<'a> {
    pub uris: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct RemoveTracksRequest<'a> {
    pub tracks: Vec<UriRef<'a>>,
}

#[derive(Debug, Serialize)]
pub struct UriRef<'a> {
    pub uri: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ChangeDetailsRequest<'a> {
    pub name: &'a str,
}
