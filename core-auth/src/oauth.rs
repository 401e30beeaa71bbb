//! # OAuth Refresh Client
//!
//! Exchanges stored refresh tokens for new access tokens at each provider's
//! token endpoint (RFC 6749 section 6). The authorization-code leg of the
//! flow runs in the host's callback handler; this crate only keeps the
//! resulting tokens alive.

use crate::error::{AuthError, Result};
use crate::types::{ProviderKind, TokenGrant};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use core_runtime::config::ClientCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const MAX_RETRIES: u32 = 3;

/// Client registration and token endpoint for one provider.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub provider: ProviderKind,
    pub credentials: ClientCredentials,
    pub token_url: String,
}

impl OAuthConfig {
    pub fn new(provider: ProviderKind, credentials: ClientCredentials) -> Self {
        let token_url = match provider {
            ProviderKind::Spotify => SPOTIFY_TOKEN_URL,
            ProviderKind::YouTube => GOOGLE_TOKEN_URL,
        };

        Self {
            provider,
            credentials,
            token_url: token_url.to_string(),
        }
    }

    /// Override the token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

/// Something that can run the refresh-token grant.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, provider: ProviderKind, refresh_token: &str) -> Result<TokenGrant>;
}

/// Token response from the OAuth provider.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// [`TokenRefresher`] backed by an [`HttpClient`].
pub struct OAuthClient {
    http_client: Arc<dyn HttpClient>,
    configs: HashMap<ProviderKind, OAuthConfig>,
    request_timeout: Duration,
}

impl OAuthClient {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            configs: HashMap::new(),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_provider(mut self, config: OAuthConfig) -> Self {
        self.configs.insert(config.provider, config);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn config(&self, provider: ProviderKind) -> Result<&OAuthConfig> {
        self.configs.get(&provider).ok_or_else(|| {
            AuthError::Config(format!(
                "No OAuth client registered for {}",
                provider.display_name()
            ))
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    #[instrument(skip(self, refresh_token), fields(provider = %provider))]
    async fn refresh(&self, provider: ProviderKind, refresh_token: &str) -> Result<TokenGrant> {
        let config = self.config(provider)?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", config.credentials.client_id.as_str()),
            ("client_secret", config.credentials.client_secret.as_str()),
        ];
        let encoded_body = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Config(format!("Failed to encode token request: {}", e)))?;

        debug!("Refreshing access token");

        let mut attempts = 0;
        loop {
            attempts += 1;

            let request = HttpRequest::new(HttpMethod::Post, config.token_url.clone())
                .header("Accept", "application/json")
                .form(encoded_body.clone())
                .timeout(self.request_timeout);

            let outcome = self
                .http_client
                .execute_with_retry(request, RetryPolicy::no_retry())
                .await;

            let failure = match outcome {
                Ok(response) if response.is_success() => {
                    let body: TokenResponse = response.json().map_err(|e| {
                        AuthError::InvalidResponse(format!("Failed to parse token response: {}", e))
                    })?;

                    info!(expires_in = body.expires_in, "Access token refreshed");

                    return Ok(TokenGrant {
                        access_token: body.access_token,
                        refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
                        expires_in: body.expires_in,
                        scope: body.scope,
                    });
                }
                Ok(response) if response.is_client_error() => {
                    let reason = match response.json::<TokenErrorResponse>() {
                        Ok(err) => match err.error_description {
                            Some(description) => format!("{}: {}", err.error, description),
                            None => err.error,
                        },
                        Err(_) => format!("HTTP {}", response.status),
                    };

                    warn!(status = response.status, %reason, "Token refresh rejected");
                    return Err(AuthError::RefreshRejected { provider, reason });
                }
                Ok(response) => format!("token endpoint returned HTTP {}", response.status),
                Err(e) => e.to_string(),
            };

            if attempts >= MAX_RETRIES {
                return Err(AuthError::RefreshFailed(format!(
                    "{} after {} attempts",
                    failure, attempts
                )));
            }

            let delay = Duration::from_millis(100 * 2u64.pow(attempts - 1));
            warn!(
                attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Token refresh failed, retrying"
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::HttpResponse;
    use mockall::mock;

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

    fn client(mock: MockHttpClient) -> OAuthClient {
        OAuthClient::new(Arc::new(mock)).with_provider(OAuthConfig::new(
            ProviderKind::Spotify,
            ClientCredentials::new("client-id", "client-secret"),
        ))
    }

    #[tokio::test]
    async fn test_refresh_success_posts_form() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute_with_retry()
            .withf(|request, _| {
                let body = String::from_utf8(request.body.clone().unwrap().to_vec()).unwrap();
                request.url == SPOTIFY_TOKEN_URL
                    && request.method == HttpMethod::Post
                    && body.contains("grant_type=refresh_token")
                    && body.contains("refresh_token=old-refresh")
                    && body.contains("client_id=client-id")
            })
            .times(1)
            .returning(|_, _| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"access_token":"fresh","token_type":"Bearer","expires_in":3600,"scope":"playlist-modify-public"}"#,
                ))
            });

        let grant = client(mock)
            .refresh(ProviderKind::Spotify, "old-refresh")
            .await
            .unwrap();

        assert_eq!(grant.access_token, "fresh");
        assert_eq!(grant.refresh_token, None);
        assert_eq!(grant.expires_in, 3600);
        assert_eq!(grant.scope.as_deref(), Some("playlist-modify-public"));
    }

    #[tokio::test]
    async fn test_invalid_grant_is_rejected_without_retry() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute_with_retry().times(1).returning(|_, _| {
            Ok(HttpResponse::new(
                400,
                r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#,
            ))
        });

        let err = client(mock)
            .refresh(ProviderKind::Spotify, "revoked")
            .await
            .unwrap_err();

        match err {
            AuthError::RefreshRejected { provider, reason } => {
                assert_eq!(provider, ProviderKind::Spotify);
                assert!(reason.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_errors_retry_then_fail() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute_with_retry()
            .times(3)
            .returning(|_, _| Ok(HttpResponse::new(503, "unavailable")));

        let err = client(mock)
            .refresh(ProviderKind::Spotify, "token")
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::RefreshFailed(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_network_error_then_success() {
        let mut mock = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_execute_with_retry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(BridgeError::Network("reset".into())));
        mock.expect_execute_with_retry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"access_token":"ok","refresh_token":"rotated","expires_in":60}"#,
                ))
            });

        let grant = client(mock)
            .refresh(ProviderKind::Spotify, "token")
            .await
            .unwrap();
        assert_eq!(grant.refresh_token.as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn test_unregistered_provider() {
        let mock = MockHttpClient::new();
        let err = client(mock)
            .refresh(ProviderKind::YouTube, "token")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn test_default_token_urls() {
        let creds = ClientCredentials::new("id", "secret");
        assert_eq!(
            OAuthConfig::new(ProviderKind::YouTube, creds.clone()).token_url,
            GOOGLE_TOKEN_URL
        );
        assert_eq!(
            OAuthConfig::new(ProviderKind::Spotify, creds)
                .with_token_url("http://localhost/token")
                .token_url,
            "http://localhost/token"
        );
    }
}
