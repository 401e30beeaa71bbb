//! Spotify Web API connector
//!
//! Implements [`PlaylistProvider`] for the source side of a mapping.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::playlist::{
    PlaylistProvider, PlaylistSummary, PlaylistTrack, ProviderKind, ProviderResult, TrackPage,
    TrackQuery, TrackRef,
};
use core_auth::AccessTokenSource;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SpotifyError};
use crate::types::{
    AddTracksRequest, ChangeDetailsRequest, Paging, PlaylistItem, RemoveTracksRequest,
    SearchResponse, SimplifiedPlaylist, Track, UriRef,
};

/// Spotify Web API base URL
pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

/// Page size for playlist items (API maximum)
const TRACKS_PAGE_SIZE: u32 = 100;

/// Page size for the user's playlists (API maximum)
const PLAYLISTS_PAGE_SIZE: u32 = 50;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Spotify Web API connector
///
/// # Example
///
/// ```ignore
/// use provider_spotify::SpotifyConnector;
/// use bridge_traits::playlist::collect_tracks;
///
/// let spotify = SpotifyConnector::new(http_client, token_store);
/// let tracks = collect_tracks(&spotify, "37i9dQZF1DXcBWIGoYBM5M").await?;
/// ```
pub struct SpotifyConnector {
    http_client: Arc<dyn HttpClient>,
    tokens: Arc<dyn AccessTokenSource>,
    api_base: String,
    request_timeout: Duration,
}

impl SpotifyConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            http_client,
            tokens,
            api_base: SPOTIFY_API_BASE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Bound for each HTTP call, including the retry after a token refresh.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Track URI used by the playlist endpoints.
    fn track_uri(track: &TrackRef) -> String {
        match &track.entry_id {
            Some(uri) if uri.starts_with("spotify:") => uri.clone(),
            _ => format!("spotify:track:{}", track.id),
        }
    }

    async fn execute_once(&self, request: HttpRequest) -> Result<HttpResponse> {
        match tokio::time::timeout(self.request_timeout, self.http_client.execute(request)).await {
            Ok(response) => Ok(response?),
            Err(_) => Err(SpotifyError::Timeout(self.request_timeout.as_millis() as u64)),
        }
    }

    /// Send an authorized request; on 401 refresh the token once and retry.
    #[instrument(skip(self, request), fields(method = ?request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let token = self.tokens.access_token(ProviderKind::Spotify).await?;
        let response = self
            .execute_once(request.clone().bearer_token(token.as_str()))
            .await?;

        let response = if response.status == 401 {
            warn!("Spotify rejected access token, refreshing");
            let token = self
                .tokens
                .refresh_rejected(ProviderKind::Spotify, &token)
                .await?;
            self.execute_once(request.bearer_token(token)).await?
        } else {
            response
        };

        if response.is_success() {
            debug!(status = response.status, "Spotify request succeeded");
            Ok(response)
        } else {
            let error = SpotifyError::from_response(&response);
            warn!(status = response.status, error = %error, "Spotify request failed");
            Err(error)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let request = HttpRequest::new(HttpMethod::Get, url).header("Accept", "application/json");
        let response = self.send(request).await?;
        serde_json::from_slice(&response.body).map_err(|e| SpotifyError::Parse(e.to_string()))
    }

    async fn send_json<B: serde::Serialize>(
        &self,
        method: HttpMethod,
        url: String,
        body: &B,
    ) -> Result<()> {
        let request = HttpRequest::new(method, url).json(body)?;
        self.send(request).await?;
        Ok(())
    }

    async fn fetch_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let mut playlists = Vec::new();
        let mut next = Some(self.url(&format!("/me/playlists?limit={}", PLAYLISTS_PAGE_SIZE)));

        while let Some(url) = next {
            let page: Paging<SimplifiedPlaylist> = self.get_json(url).await?;
            playlists.extend(page.items.into_iter().map(PlaylistSummary::from));
            next = page.next;
        }

        Ok(playlists)
    }

    async fn fetch_tracks_page(&self, playlist_id: &str, cursor: Option<String>) -> Result<TrackPage> {
        let url = cursor.unwrap_or_else(|| {
            self.url(&format!(
                "/playlists/{}/tracks?limit={}",
                playlist_id, TRACKS_PAGE_SIZE
            ))
        });

        let page: Paging<PlaylistItem> = self.get_json(url).await?;
        let tracks = page
            .items
            .into_iter()
            .filter_map(|item| item.track)
            .filter_map(Track::into_playlist_track)
            .collect();

        Ok(TrackPage {
            tracks,
            next_cursor: page.next,
        })
    }

    async fn search(&self, query: &TrackQuery) -> Result<Option<PlaylistTrack>> {
        let params = serde_urlencoded::to_string([
            ("q", query.search_terms().as_str()),
            ("type", "track"),
            ("limit", "1"),
        ])
        .map_err(|e| SpotifyError::Parse(e.to_string()))?;

        let response: SearchResponse = self.get_json(self.url(&format!("/search?{}", params))).await?;
        Ok(response
            .tracks
            .items
            .into_iter()
            .find_map(Track::into_playlist_track))
    }
}

#[async_trait]
impl PlaylistProvider for SpotifyConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Spotify
    }

    #[instrument(skip(self))]
    async fn list_playlists(&self) -> ProviderResult<Vec<PlaylistSummary>> {
        let playlists = self.fetch_playlists().await?;
        info!(count = playlists.len(), "Listed Spotify playlists");
        Ok(playlists)
    }

    #[instrument(skip(self))]
    async fn get_playlist(&self, playlist_id: &str) -> ProviderResult<PlaylistSummary> {
        let url = self.url(&format!(
            "/playlists/{}?fields=id,name,tracks.total",
            playlist_id
        ));
        let playlist: SimplifiedPlaylist = self.get_json(url).await?;
        Ok(playlist.into())
    }

    #[instrument(skip(self))]
    async fn list_tracks_page(
        &self,
        playlist_id: &str,
        cursor: Option<String>,
    ) -> ProviderResult<TrackPage> {
        Ok(self.fetch_tracks_page(playlist_id, cursor).await?)
    }

    #[instrument(skip(self), fields(title = %query.title))]
    async fn search_track(&self, query: &TrackQuery) -> ProviderResult<Option<PlaylistTrack>> {
        Ok(self.search(query).await?)
    }

    #[instrument(skip(self), fields(track_id = %track.id))]
    async fn add_track(&self, playlist_id: &str, track: &TrackRef) -> ProviderResult<()> {
        let uri = Self::track_uri(track);
        let body = AddTracksRequest { uris: vec![&uri] };
        self.send_json(
            HttpMethod::Post,
            self.url(&format!("/playlists/{}/tracks", playlist_id)),
            &body,
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(track_id = %track.id))]
    async fn remove_track(&self, playlist_id: &str, track: &TrackRef) -> ProviderResult<()> {
        let uri = Self::track_uri(track);
        let body = RemoveTracksRequest {
            tracks: vec![UriRef { uri: &uri }],
        };
        self.send_json(
            HttpMethod::Delete,
            self.url(&format!("/playlists/{}/tracks", playlist_id)),
            &body,
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rename_playlist(&self, playlist_id: &str, new_name: &str) -> ProviderResult<()> {
        self.send_json(
            HttpMethod::Put,
            self.url(&format!("/playlists/{}", playlist_id)),
            &ChangeDetailsRequest { name: new_name },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::RetryPolicy;
    use bridge_traits::playlist::{collect_tracks, ErrorClass, ProviderError};
    use core_auth::AuthError;
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn execute_with_retry(
                &self,
                request: HttpRequest,
                policy: RetryPolicy,
            ) -> BridgeResult<HttpResponse>;
        }
    }

    /// Hands out "token-N", bumping N on every refresh.
    #[derive(Default)]
    struct CountingTokens {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl AccessTokenSource for CountingTokens {
        async fn access_token(&self, _provider: ProviderKind) -> core_auth::Result<String> {
            Ok(format!("token-{}", self.refreshes.load(Ordering::SeqCst)))
        }

        async fn refresh_rejected(
            &self,
            _provider: ProviderKind,
            _rejected: &str,
        ) -> core_auth::Result<String> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{}", n))
        }
    }

    struct NoTokens;

    #[async_trait]
    impl AccessTokenSource for NoTokens {
        async fn access_token(&self, provider: ProviderKind) -> core_auth::Result<String> {
            Err(AuthError::TokenNotFound(provider))
        }

        async fn refresh_rejected(&self, provider: ProviderKind, _: &str) -> core_auth::Result<String> {
            Err(AuthError::TokenNotFound(provider))
        }
    }

    fn connector(mock: MockHttpClient) -> (SpotifyConnector, Arc<CountingTokens>) {
        let tokens = Arc::new(CountingTokens::default());
        let connector = SpotifyConnector::new(Arc::new(mock), tokens.clone())
            .with_api_base("https://api.test/v1");
        (connector, tokens)
    }

    const PAGE_ONE: &str = r#"{
        "items": [
            {"track": {"id": "a", "uri": "spotify:track:a", "name": "Alpha", "duration_ms": 1000,
                       "artists": [{"name": "One"}]}},
            {"track": {"id": "b", "uri": "spotify:track:b", "name": "Beta", "artists": []}}
        ],
        "next": "https://api.test/v1/playlists/pl/tracks?offset=100&limit=100"
    }"#;

    const PAGE_TWO: &str = r#"{
        "items": [
            {"track": {"id": "c", "uri": "spotify:track:c", "name": "Gamma", "artists": []}}
        ],
        "next": null
    }"#;

    #[tokio::test]
    async fn test_tracks_follow_next_url() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(2)
            .returning(|request| {
                assert_eq!(
                    request.headers.get("Authorization").map(String::as_str),
                    Some("Bearer token-0")
                );
                let body = if request.url.contains("offset=100") {
                    PAGE_TWO
                } else {
                    assert_eq!(request.url, "https://api.test/v1/playlists/pl/tracks?limit=100");
                    PAGE_ONE
                };
                Ok(HttpResponse::new(200, body))
            });

        let (spotify, _) = connector(mock);
        let tracks = collect_tracks(&spotify, "pl").await.unwrap();

        let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(tracks[0].artists, vec!["One".to_string()]);
    }

    #[tokio::test]
    async fn test_get_playlist() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|request| {
            assert!(request.url.starts_with("https://api.test/v1/playlists/pl?fields="));
            Ok(HttpResponse::new(
                200,
                r#"{"id": "pl", "name": "Road Trip", "tracks": {"total": 12}}"#,
            ))
        });

        let (spotify, _) = connector(mock);
        let playlist = spotify.get_playlist("pl").await.unwrap();
        assert_eq!(playlist.name, "Road Trip");
        assert_eq!(playlist.track_count, Some(12));
    }

    #[tokio::test]
    async fn test_search_encodes_query() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|request| {
            assert!(request.url.contains("q=Adele+Hello"));
            assert!(request.url.contains("type=track"));
            Ok(HttpResponse::new(
                200,
                r#"{"tracks": {"items": [{"id": "h", "uri": "spotify:track:h", "name": "Hello",
                    "artists": [{"name": "Adele"}]}], "next": null}}"#,
            ))
        });

        let (spotify, _) = connector(mock);
        let query = TrackQuery {
            title: "Hello".into(),
            artists: vec!["Adele".into()],
            duration_ms: None,
        };
        let found = spotify.search_track(&query).await.unwrap().unwrap();
        assert_eq!(found.id, "h");
    }

    #[tokio::test]
    async fn test_remove_sends_track_uri() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|request| {
            assert_eq!(request.method, HttpMethod::Delete);
            let body: serde_json::Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
            assert_eq!(body["tracks"][0]["uri"], "spotify:track:x");
            Ok(HttpResponse::new(200, r#"{"snapshot_id": "s"}"#))
        });

        let (spotify, _) = connector(mock);
        spotify.remove_track("pl", &TrackRef::new("x")).await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once_then_succeeds() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(2).returning(|request| {
            match request.headers.get("Authorization").map(String::as_str) {
                Some("Bearer token-0") => Ok(HttpResponse::new(401, "")),
                Some("Bearer token-1") => Ok(HttpResponse::new(200, r#"{"snapshot_id": "s"}"#)),
                other => panic!("unexpected token {:?}", other),
            }
        });

        let (spotify, tokens) = connector(mock);
        spotify.rename_playlist("pl", "New").await.unwrap();
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_unauthorized_surfaces() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(2)
            .returning(|_| Ok(HttpResponse::new(401, r#"{"error": {"status": 401, "message": "Invalid access token"}}"#)));

        let (spotify, tokens) = connector(mock);
        let err = spotify.add_track("pl", &TrackRef::new("x")).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Auth);
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_transient() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(429, "").with_header("Retry-After", "30")));

        let (spotify, _) = connector(mock);
        let err = spotify.list_playlists().await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: Some(30),
                message: String::new()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_tokens_are_auth_failures() {
        let mock = MockHttpClient::new();
        let spotify = SpotifyConnector::new(Arc::new(mock), Arc::new(NoTokens));

        let err = spotify.list_playlists().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Auth);
    }

    struct SlowHttpClient;

    #[async_trait]
    impl HttpClient for SlowHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(HttpResponse::new(200, "{}"))
        }
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let spotify = SpotifyConnector::new(Arc::new(SlowHttpClient), Arc::new(CountingTokens::default()))
            .with_request_timeout(Duration::from_millis(20));

        let err = spotify.get_playlist("pl").await.unwrap_err();
        assert_eq!(err, ProviderError::Timeout(20));
        assert_eq!(err.class(), ErrorClass::Transient);
    }
}
