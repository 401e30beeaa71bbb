//! YouTube Data API v3 connector
//!
//! Implements [`PlaylistProvider`] for the destination side of a mapping.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::playlist::{
    PlaylistProvider, PlaylistSummary, PlaylistTrack, ProviderKind, ProviderResult, QuotaStatus,
    TrackPage, TrackQuery, TrackRef,
};
use bridge_traits::time::{Clock, SystemClock};
use core_auth::AccessTokenSource;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, YouTubeError};
use crate::quota::{QuotaCost, QuotaTracker, DEFAULT_DAILY_QUOTA};
use crate::types::{
    InsertPlaylistItem, InsertSnippet, ListResponse, Playlist, PlaylistItem, ResourceId,
    SearchResult, UpdatePlaylist,
};

/// YouTube Data API base URL
pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// `maxResults` for list calls (API maximum)
const MAX_RESULTS: u32 = 50;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// YouTube Data API connector
///
/// Every request is charged against the daily quota before it is sent;
/// [`quota_status`](PlaylistProvider::quota_status) reports what is left.
pub struct YouTubeConnector {
    http_client: Arc<dyn HttpClient>,
    tokens: Arc<dyn AccessTokenSource>,
    quota: QuotaTracker,
    api_base: String,
    request_timeout: Duration,
}

impl YouTubeConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            http_client,
            tokens,
            quota: QuotaTracker::new(DEFAULT_DAILY_QUOTA, Arc::new(SystemClock)),
            api_base: YOUTUBE_API_BASE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Budget and clock used for quota accounting.
    pub fn with_daily_quota(mut self, limit: u32, clock: Arc<dyn Clock>) -> Self {
        self.quota = QuotaTracker::new(limit, clock);
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn url(&self, resource: &str, params: &[(&str, &str)]) -> Result<String> {
        let query =
            serde_urlencoded::to_string(params).map_err(|e| YouTubeError::Parse(e.to_string()))?;
        Ok(format!("{}/{}?{}", self.api_base, resource, query))
    }

    async fn execute_once(&self, request: HttpRequest, cost: QuotaCost) -> Result<HttpResponse> {
        self.quota
            .try_reserve(cost)
            .map_err(|retry_after_secs| YouTubeError::QuotaExhausted { retry_after_secs })?;

        match tokio::time::timeout(self.request_timeout, self.http_client.execute(request)).await {
            Ok(response) => Ok(response?),
            Err(_) => Err(YouTubeError::Timeout(self.request_timeout.as_millis() as u64)),
        }
    }

    /// Send an authorized request; on 401 refresh the token once and retry.
    #[instrument(skip(self, request), fields(method = ?request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest, cost: QuotaCost) -> Result<HttpResponse> {
        let token = self.tokens.access_token(ProviderKind::YouTube).await?;
        let response = self
            .execute_once(request.clone().bearer_token(token.as_str()), cost)
            .await?;

        let response = if response.status == 401 {
            warn!("YouTube rejected access token, refreshing");
            let token = self
                .tokens
                .refresh_rejected(ProviderKind::YouTube, &token)
                .await?;
            self.execute_once(request.bearer_token(token), cost).await?
        } else {
            response
        };

        if response.is_success() {
            debug!(
                status = response.status,
                quota_used = self.quota.status().used,
                "YouTube request succeeded"
            );
            return Ok(response);
        }

        let error = YouTubeError::from_response(&response);
        if error.is_quota_exceeded() {
            self.quota.mark_exhausted();
            return Err(YouTubeError::QuotaExhausted {
                retry_after_secs: self.quota.secs_until_reset(),
            });
        }

        warn!(status = response.status, error = %error, "YouTube request failed");
        Err(error)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String, cost: QuotaCost) -> Result<T> {
        let request = HttpRequest::new(HttpMethod::Get, url).header("Accept", "application/json");
        let response = self.send(request, cost).await?;
        serde_json::from_slice(&response.body).map_err(|e| YouTubeError::Parse(e.to_string()))
    }

    async fn fetch_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let max_results = MAX_RESULTS.to_string();
        let mut playlists = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("part", "snippet,contentDetails"),
                ("mine", "true"),
                ("maxResults", max_results.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let page: ListResponse<Playlist> =
                self.get_json(self.url("playlists", &params)?, QuotaCost::List).await?;
            playlists.extend(page.items.into_iter().map(PlaylistSummary::from));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(playlists),
            }
        }
    }

    async fn fetch_playlist(&self, playlist_id: &str) -> Result<Playlist> {
        let url = self.url(
            "playlists",
            &[("part", "snippet,contentDetails"), ("id", playlist_id)],
        )?;
        let page: ListResponse<Playlist> = self.get_json(url, QuotaCost::List).await?;

        page.items.into_iter().next().ok_or_else(|| YouTubeError::Api {
            status: 404,
            reason: Some("playlistNotFound".to_string()),
            message: format!("Playlist {} not found", playlist_id),
        })
    }

    async fn fetch_items_page(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListResponse<PlaylistItem>> {
        let max_results = MAX_RESULTS.to_string();
        let mut params = vec![
            ("part", "snippet"),
            ("playlistId", playlist_id),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        self.get_json(self.url("playlistItems", &params)?, QuotaCost::List)
            .await
    }

    /// Playlist item id of the first entry holding `video_id`.
    async fn find_entry_id(&self, playlist_id: &str, video_id: &str) -> Result<Option<String>> {
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .fetch_items_page(playlist_id, page_token.as_deref())
                .await?;

            let found = page
                .items
                .into_iter()
                .filter_map(PlaylistItem::into_playlist_track)
                .find(|track| track.id == video_id)
                .and_then(|track| track.entry_id);
            if found.is_some() {
                return Ok(found);
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(None),
            }
        }
    }

    async fn search(&self, query: &TrackQuery) -> Result<Option<PlaylistTrack>> {
        let terms = query.search_terms();
        let url = self.url(
            "search",
            &[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", "1"),
                ("q", terms.as_str()),
            ],
        )?;

        let page: ListResponse<SearchResult> = self.get_json(url, QuotaCost::Search).await?;
        Ok(page
            .items
            .into_iter()
            .find_map(SearchResult::into_playlist_track))
    }

    async fn insert_item(&self, playlist_id: &str, video_id: &str) -> Result<()> {
        let body = InsertPlaylistItem {
            snippet: InsertSnippet {
                playlist_id,
                resource_id: ResourceId {
                    kind: "youtube#video".to_string(),
                    video_id: Some(video_id.to_string()),
                },
            },
        };
        let request = HttpRequest::new(
            HttpMethod::Post,
            self.url("playlistItems", &[("part", "snippet")])?,
        )
        .json(&body)?;

        self.send(request, QuotaCost::Write).await?;
        Ok(())
    }

    async fn delete_item(&self, playlist_id: &str, track: &TrackRef) -> Result<()> {
        let entry_id = match &track.entry_id {
            Some(entry_id) => entry_id.clone(),
            None => self
                .find_entry_id(playlist_id, &track.id)
                .await?
                .ok_or_else(|| YouTubeError::Api {
                    status: 404,
                    reason: Some("playlistItemNotFound".to_string()),
                    message: format!("Video {} is not in playlist {}", track.id, playlist_id),
                })?,
        };

        let request = HttpRequest::new(
            HttpMethod::Delete,
            self.url("playlistItems", &[("id", entry_id.as_str())])?,
        );
        self.send(request, QuotaCost::Write).await?;
        Ok(())
    }

    /// `playlists.update` replaces the whole snippet, so the current one is
    /// read first to keep the description.
    async fn update_title(&self, playlist_id: &str, new_name: &str) -> Result<()> {
        let mut snippet = self.fetch_playlist(playlist_id).await?.snippet;
        snippet.title = new_name.to_string();

        let body = UpdatePlaylist {
            id: playlist_id,
            snippet,
        };
        let request = HttpRequest::new(HttpMethod::Put, self.url("playlists", &[("part", "snippet")])?)
            .json(&body)?;

        self.send(request, QuotaCost::Write).await?;
        Ok(())
    }
}

#[async_trait]
impl PlaylistProvider for YouTubeConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::YouTube
    }

    #[instrument(skip(self))]
    async fn list_playlists(&self) -> ProviderResult<Vec<PlaylistSummary>> {
        let playlists = self.fetch_playlists().await?;
        info!(count = playlists.len(), "Listed YouTube playlists");
        Ok(playlists)
    }

    #[instrument(skip(self))]
    async fn get_playlist(&self, playlist_id: &str) -> ProviderResult<PlaylistSummary> {
        Ok(self.fetch_playlist(playlist_id).await?.into())
    }

    #[instrument(skip(self))]
    async fn list_tracks_page(
        &self,
        playlist_id: &str,
        cursor: Option<String>,
    ) -> ProviderResult<TrackPage> {
        let page = self.fetch_items_page(playlist_id, cursor.as_deref()).await?;
        Ok(TrackPage {
            tracks: page
                .items
                .into_iter()
                .filter_map(PlaylistItem::into_playlist_track)
                .collect(),
            next_cursor: page.next_page_token,
        })
    }

    #[instrument(skip(self), fields(title = %query.title))]
    async fn search_track(&self, query: &TrackQuery) -> ProviderResult<Option<PlaylistTrack>> {
        Ok(self.search(query).await?)
    }

    #[instrument(skip(self), fields(video_id = %track.id))]
    async fn add_track(&self, playlist_id: &str, track: &TrackRef) -> ProviderResult<()> {
        Ok(self.insert_item(playlist_id, &track.id).await?)
    }

    #[instrument(skip(self), fields(video_id = %track.id))]
    async fn remove_track(&self, playlist_id: &str, track: &TrackRef) -> ProviderResult<()> {
        Ok(self.delete_item(playlist_id, track).await?)
    }

    #[instrument(skip(self))]
    async fn rename_playlist(&self, playlist_id: &str, new_name: &str) -> ProviderResult<()> {
        Ok(self.update_title(playlist_id, new_name).await?)
    }

    fn quota_status(&self) -> Option<QuotaStatus> {
        Some(self.quota.status())
    }

    fn restore_quota(&self, saved: &QuotaStatus) {
        self.quota.restore(saved);
    }
}
