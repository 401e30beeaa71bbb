//! YouTube Data API v3 resource types
//!
//! See: https://developers.google.com/youtube/v3/docs

use bridge_traits::playlist::{PlaylistSummary, PlaylistTrack};
use serde::{Deserialize, Serialize};

/// Generic `*.list` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub snippet: PlaylistSnippet,
    pub content_details: Option<PlaylistContentDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSnippet {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistContentDetails {
    pub item_count: Option<u32>,
}

impl From<Playlist> for PlaylistSummary {
    fn from(playlist: Playlist) -> Self {
        PlaylistSummary {
            id: playlist.id,
            name: playlist.snippet.title,
            track_count: playlist.content_details.and_then(|d| d.item_count),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    /// Playlist item id, needed for deletion
    pub id: String,
    pub snippet: PlaylistItemSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemSnippet {
    pub title: String,
    pub video_owner_channel_title: Option<String>,
    pub resource_id: ResourceId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub kind: String,
    pub video_id: Option<String>,
}

/// Auto-generated music channels are named "<Artist> - Topic".
fn artist_from_channel(channel: &str) -> String {
    channel
        .strip_suffix(" - Topic")
        .unwrap_or(channel)
        .to_string()
}

impl PlaylistItem {
    pub fn into_playlist_track(self) -> Option<PlaylistTrack> {
        let video_id = self.snippet.resource_id.video_id?;
        Some(PlaylistTrack {
            id: video_id,
            entry_id: Some(self.id),
            title: self.snippet.title,
            artists: self
                .snippet
                .video_owner_channel_title
                .as_deref()
                .map(artist_from_channel)
                .into_iter()
                .collect(),
            duration_ms: None,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: SearchResultId,
    pub snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultId {
    pub video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSnippet {
    pub title: String,
    pub channel_title: Option<String>,
}

impl SearchResult {
    pub fn into_playlist_track(self) -> Option<PlaylistTrack> {
        Some(PlaylistTrack {
            id: self.id.video_id?,
            entry_id: None,
            title: self.snippet.title,
            artists: self
                .snippet
                .channel_title
                .as_deref()
                .map(artist_from_channel)
                .into_iter()
                .collect(),
            duration_ms: None,
        })
    }
}

/// Body of `playlistItems.insert`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertPlaylistItem<'a> {
    pub snippet: InsertSnippet<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertSnippet<'a> {
    pub playlist_id: &'a str,
    pub resource_id: ResourceId,
}

/// Body of `playlists.update`
#[derive(Debug, Serialize)]
pub struct UpdatePlaylist<'a> {
    pub id: &'a str,
    pub snippet: PlaylistSnippet,
}
