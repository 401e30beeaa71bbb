//! # OAuth Token Store
//!
//! Hands out valid access tokens to the playlist adapters. The store is an
//! explicit handle shared by `Arc`; there is no process-wide token cache.
//!
//! - Tokens expiring within the refresh buffer (30 s by default) are
//!   refreshed before being returned.
//! - Refreshes are serialized, so concurrent callers that find the same
//!   stale token trigger exactly one refresh.
//! - After a 401, adapters call [`AccessTokenSource::refresh_rejected`] with
//!   the token that was rejected; if another caller already replaced it, the
//!   newer token is returned without a second refresh.
//!
//! ```ignore
//! let store = TokenStore::new(repository, refresher, clock);
//! store.save(ProviderKind::Spotify, tokens_from_callback).await?;
//!
//! let bearer = store.access_token(ProviderKind::Spotify).await?;
//! ```

use crate::error::{AuthError, Result};
use crate::oauth::TokenRefresher;
use crate::repository::TokenRepository;
use crate::types::{OAuthTokens, ProviderKind};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Default window before expiry in which tokens are refreshed.
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 30;

/// Source of bearer tokens for adapter requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// A token that will stay valid for at least the refresh buffer
    async fn access_token(&self, provider: ProviderKind) -> Result<String>;

    /// Called once after the provider answered 401 for `rejected`
    async fn refresh_rejected(&self, provider: ProviderKind, rejected: &str) -> Result<String>;
}

pub struct TokenStore {
    repository: Arc<dyn TokenRepository>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    refresh_buffer: chrono::Duration,
    refresh_lock: Mutex<()>,
    events: Option<EventBus>,
}

impl TokenStore {
    pub fn new(
        repository: Arc<dyn TokenRepository>,
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            refresher,
            clock,
            refresh_buffer: chrono::Duration::seconds(DEFAULT_REFRESH_BUFFER_SECS),
            refresh_lock: Mutex::new(()),
            events: None,
        }
    }

    pub fn with_refresh_buffer(mut self, buffer: std::time::Duration) -> Self {
        self.refresh_buffer = chrono::Duration::from_std(buffer)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_REFRESH_BUFFER_SECS));
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Persist tokens obtained by the authorization-code callback.
    #[instrument(skip(self, tokens))]
    pub async fn save(&self, provider: ProviderKind, tokens: OAuthTokens) -> Result<()> {
        self.repository.upsert(provider, &tokens).await?;
        info!(expires_at = %tokens.expires_at, "Stored OAuth tokens");
        Ok(())
    }

    /// Disconnect a provider.
    pub async fn revoke(&self, provider: ProviderKind) -> Result<bool> {
        self.repository.delete(provider).await
    }

    /// Whether tokens exist for the provider.
    pub async fn is_connected(&self, provider: ProviderKind) -> Result<bool> {
        Ok(self.repository.get(provider).await?.is_some())
    }

    async fn load(&self, provider: ProviderKind) -> Result<OAuthTokens> {
        self.repository
            .get(provider)
            .await?
            .ok_or(AuthError::TokenNotFound(provider))
    }

    fn is_fresh(&self, tokens: &OAuthTokens) -> bool {
        !tokens.expires_within(self.refresh_buffer, self.clock.now())
    }

    /// Run the refresh grant and persist the result. Caller holds the lock.
    async fn refresh_locked(
        &self,
        provider: ProviderKind,
        current: &OAuthTokens,
    ) -> Result<OAuthTokens> {
        match self.refresher.refresh(provider, &current.refresh_token).await {
            Ok(grant) => {
                let next = grant.apply_to(current, self.clock.now());
                self.repository.upsert(provider, &next).await?;
                info!(provider = %provider, expires_at = %next.expires_at, "Refreshed access token");
                self.emit(AuthEvent::TokenRefreshed {
                    provider: provider.to_string(),
                });
                Ok(next)
            }
            Err(err) => {
                warn!(provider = %provider, error = %err, "Access token refresh failed");
                self.emit(AuthEvent::RefreshFailed {
                    provider: provider.to_string(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(events) = &self.events {
            events.emit(CoreEvent::Auth(event));
        }
    }
}

#[async_trait]
impl AccessTokenSource for TokenStore {
    #[instrument(skip(self))]
    async fn access_token(&self, provider: ProviderKind) -> Result<String> {
        let tokens = self.load(provider).await?;
        if self.is_fresh(&tokens) {
            return Ok(tokens.access_token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let tokens = self.load(provider).await?;
        if self.is_fresh(&tokens) {
            debug!("Token refreshed by concurrent caller");
            return Ok(tokens.access_token);
        }

        Ok(self.refresh_locked(provider, &tokens).await?.access_token)
    }

    #[instrument(skip(self, rejected))]
    async fn refresh_rejected(&self, provider: ProviderKind, rejected: &str) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        let tokens = self.load(provider).await?;
        if tokens.access_token != rejected && self.is_fresh(&tokens) {
            debug!("Rejected token already replaced");
            return Ok(tokens.access_token);
        }

        Ok(self.refresh_locked(provider, &tokens).await?.access_token)
    }
}
