//! # Sync Service
//!
//! Bootstrap façade: turns an [`EngineConfig`] into a running sync engine.
//!
//! The service opens the record store, builds the token store with an OAuth
//! refresh client for both services, constructs the Spotify (source) and
//! YouTube (destination) adapters and hands them to the [`SyncEngine`].
//! Hosts that supply their own HTTP client or clock (tests, embedded use)
//! go through [`SyncService::bootstrap_with`].
//!
//! ```ignore
//! let service = SyncService::bootstrap(EngineConfig::from_env()?).await?;
//! service.run_until(tokio::signal::ctrl_c().map(|_| ())).await?;
//! ```

pub mod error;

pub use error::{Result, ServiceError};

use bridge_desktop::ReqwestHttpClient;
use bridge_traits::http::HttpClient;
use bridge_traits::playlist::ProviderKind;
use bridge_traits::time::{Clock, SystemClock};
use core_auth::{OAuthClient, OAuthConfig, SqliteTokenRepository, TokenStore};
use core_runtime::events::EventBus;
use core_runtime::EngineConfig;
use core_store::{create_pool, DatabaseConfig};
use core_sync::{ProviderRegistry, Repositories, SyncEngine};
use provider_spotify::SpotifyConnector;
use provider_youtube::YouTubeConnector;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Host-provided capabilities.
#[derive(Clone)]
pub struct ServiceDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub clock: Arc<dyn Clock>,
}

impl ServiceDependencies {
    pub fn new(http_client: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self { http_client, clock }
    }

    /// `reqwest` client bounded by the configured API timeout, system clock.
    pub fn desktop(config: &EngineConfig) -> Result<Self> {
        let http_client = ReqwestHttpClient::with_timeout(config.api_timeout)?;
        Ok(Self::new(Arc::new(http_client), Arc::new(SystemClock)))
    }
}

pub struct SyncService {
    engine: SyncEngine,
    tokens: Arc<TokenStore>,
    events: EventBus,
}

impl SyncService {
    pub async fn bootstrap(config: EngineConfig) -> Result<Self> {
        let deps = ServiceDependencies::desktop(&config)?;
        Self::bootstrap_with(config, deps).await
    }

    pub async fn bootstrap_with(config: EngineConfig, deps: ServiceDependencies) -> Result<Self> {
        config.validate()?;
        let (spotify_credentials, youtube_credentials) = config.require_credentials()?;

        let pool = create_pool(DatabaseConfig::new(config.database_url.clone())).await?;
        let events = EventBus::default();

        let refresher = OAuthClient::new(deps.http_client.clone())
            .with_provider(OAuthConfig::new(
                ProviderKind::Spotify,
                spotify_credentials.clone(),
            ))
            .with_provider(OAuthConfig::new(
                ProviderKind::YouTube,
                youtube_credentials.clone(),
            ))
            .with_request_timeout(config.api_timeout);

        let tokens = Arc::new(
            TokenStore::new(
                Arc::new(SqliteTokenRepository::new(pool.clone())),
                Arc::new(refresher),
                deps.clock.clone(),
            )
            .with_refresh_buffer(config.token_refresh_buffer)
            .with_event_bus(events.clone()),
        );

        let spotify = SpotifyConnector::new(deps.http_client.clone(), tokens.clone())
            .with_request_timeout(config.api_timeout);
        let youtube = YouTubeConnector::new(deps.http_client.clone(), tokens.clone())
            .with_daily_quota(config.destination_daily_quota, deps.clock.clone())
            .with_request_timeout(config.api_timeout);

        let providers = ProviderRegistry::new()
            .register(Arc::new(spotify))
            .register(Arc::new(youtube));

        let engine = SyncEngine::with_event_bus(
            &config,
            Repositories::sqlite(pool, config.min_interval_minutes),
            providers,
            deps.clock,
            events.clone(),
        );

        info!(
            database_url = %config.database_url,
            match_policy = %config.match_policy,
            batch_size = config.executor_batch_size,
            max_attempts = config.max_attempts,
            "Sync service initialized"
        );

        Ok(Self {
            engine,
            tokens,
            events,
        })
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Token store, for the host's OAuth callback to save fresh grants into.
    pub fn tokens(&self) -> Arc<TokenStore> {
        Arc::clone(&self.tokens)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run both schedulers until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let handle = self.engine.start().await?;
        shutdown.await;
        info!("Shutdown requested");
        handle.shutdown().await;
        Ok(())
    }
}
