//! # Engine Configuration Module
//!
//! Settings consumed by the sync engine and its service bootstrap.
//!
//! ## Overview
//!
//! [`EngineConfig`] holds scheduler cadence, queue limits, retry and quota
//! ceilings, and the OAuth client credentials for both streaming services.
//! It can be assembled with [`EngineConfigBuilder`] or loaded from the
//! process environment with [`EngineConfig::from_env`]. Both paths run
//! [`EngineConfig::validate`] so misconfiguration fails at startup.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::EngineConfig;
//! use std::time::Duration;
//!
//! let config = EngineConfig::builder()
//!     .database_url("sqlite:sync.db")
//!     .executor_batch_size(10)
//!     .api_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.executor_batch_size, 10);
//! ```
//!
//! ## Environment
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PLAYLIST_SYNC_DATABASE_URL` | `sqlite:playlist-sync.db` |
//! | `PLAYLIST_SYNC_MIN_INTERVAL_MINUTES` | `5` |
//! | `PLAYLIST_SYNC_ANALYSIS_TICK_SECS` | `60` |
//! | `PLAYLIST_SYNC_EXECUTOR_TICK_SECS` | `60` |
//! | `PLAYLIST_SYNC_EXECUTOR_BATCH_SIZE` | `25` |
//! | `PLAYLIST_SYNC_MAX_ATTEMPTS` | `3` |
//! | `PLAYLIST_SYNC_RETRY_BACKOFF_SECS` | `30` |
//! | `PLAYLIST_SYNC_YOUTUBE_DAILY_QUOTA` | `10000` |
//! | `PLAYLIST_SYNC_API_TIMEOUT_SECS` | `10` |
//! | `PLAYLIST_SYNC_TOKEN_REFRESH_BUFFER_SECS` | `30` |
//! | `PLAYLIST_SYNC_STALE_CLAIM_SECS` | `900` |
//! | `PLAYLIST_SYNC_ACTIVITY_RETENTION_DAYS` | unset |
//! | `PLAYLIST_SYNC_MATCH_POLICY` | `title_contains` |
//! | `PLAYLIST_SYNC_LOG_LEVEL` / `PLAYLIST_SYNC_LOG_FORMAT` | `info` / build default |
//! | `SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET` | unset |
//! | `YOUTUBE_CLIENT_ID` / `YOUTUBE_CLIENT_SECRET` | unset |

use crate::error::{Error, Result};
use crate::logging::{redact_if_sensitive, LogFormat, LogLevel, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Lowest sync interval a mapping may use, in minutes.
pub const MIN_INTERVAL_FLOOR_MINUTES: u32 = 5;

/// Largest executor batch accepted.
pub const MAX_EXECUTOR_BATCH_SIZE: u32 = 500;

/// Upper bound for the computed retry delay.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(3600);

/// How tracks from two services with unrelated ID spaces are paired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Equal provider track IDs, else equal normalised titles by an agreeing artist
    TrackId,
    /// Normalised titles must be equal
    Title,
    /// The destination's normalised title must contain the source's
    #[default]
    TitleContains,
}

impl MatchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPolicy::TrackId => "track_id",
            MatchPolicy::Title => "title",
            MatchPolicy::TitleContains => "title_contains",
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "track_id" => Ok(MatchPolicy::TrackId),
            "title" => Ok(MatchPolicy::Title),
            "title_contains" => Ok(MatchPolicy::TitleContains),
            other => Err(Error::Config(format!(
                "Unknown match policy '{}' (expected track_id, title or title_contains)",
                other
            ))),
        }
    }
}

/// OAuth client registration for one streaming service.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &redact_if_sensitive("client_secret", &self.client_secret),
            )
            .finish()
    }
}

/// Sync engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// sqlx connection URL of the record store
    pub database_url: String,

    /// Smallest `interval_minutes` a mapping may be created or updated with
    pub min_interval_minutes: u32,

    /// Period of the analysis scheduler
    pub analysis_tick: Duration,

    /// Period of the executor scheduler
    pub executor_tick: Duration,

    /// Pending items processed per executor tick
    pub executor_batch_size: u32,

    /// Attempts allowed before a transiently failing item becomes `error`
    pub max_attempts: u32,

    /// Base delay for the exponential retry schedule
    pub retry_backoff: Duration,

    /// Daily unit budget of the YouTube Data API
    pub destination_daily_quota: u32,

    /// Timeout applied to every external API call
    pub api_timeout: Duration,

    /// Tokens expiring within this window are refreshed before use
    pub token_refresh_buffer: Duration,

    /// `running` items older than this are returned to `pending` at startup
    pub stale_claim_after: Duration,

    /// Activity log rows older than this many days are pruned
    pub activity_retention_days: Option<u32>,

    /// Cross-service track matching
    pub match_policy: MatchPolicy,

    pub spotify: Option<ClientCredentials>,
    pub youtube: Option<ClientCredentials>,

    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:playlist-sync.db".to_string(),
            min_interval_minutes: MIN_INTERVAL_FLOOR_MINUTES,
            analysis_tick: Duration::from_secs(60),
            executor_tick: Duration::from_secs(60),
            executor_batch_size: 25,
            max_attempts: 3,
            retry_backoff: Duration::from_secs(30),
            destination_daily_quota: 10_000,
            api_timeout: Duration::from_secs(10),
            token_refresh_buffer: Duration::from_secs(30),
            stale_claim_after: Duration::from_secs(900),
            activity_retention_days: None,
            match_policy: MatchPolicy::default(),
            spotify: None,
            youtube: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new builder seeded with defaults.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Unset keys keep
    /// their defaults; set but unparsable keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = EngineConfig::default();

        if let Some(url) = get("PLAYLIST_SYNC_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(v) = get("PLAYLIST_SYNC_MIN_INTERVAL_MINUTES") {
            config.min_interval_minutes = parse_number("PLAYLIST_SYNC_MIN_INTERVAL_MINUTES", &v)?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_ANALYSIS_TICK_SECS") {
            config.analysis_tick = parse_secs("PLAYLIST_SYNC_ANALYSIS_TICK_SECS", &v)?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_EXECUTOR_TICK_SECS") {
            config.executor_tick = parse_secs("PLAYLIST_SYNC_EXECUTOR_TICK_SECS", &v)?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_EXECUTOR_BATCH_SIZE") {
            config.executor_batch_size = parse_number("PLAYLIST_SYNC_EXECUTOR_BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_MAX_ATTEMPTS") {
            config.max_attempts = parse_number("PLAYLIST_SYNC_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_RETRY_BACKOFF_SECS") {
            config.retry_backoff = parse_secs("PLAYLIST_SYNC_RETRY_BACKOFF_SECS", &v)?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_YOUTUBE_DAILY_QUOTA") {
            config.destination_daily_quota =
                parse_number("PLAYLIST_SYNC_YOUTUBE_DAILY_QUOTA", &v)?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_API_TIMEOUT_SECS") {
            config.api_timeout = parse_secs("PLAYLIST_SYNC_API_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_TOKEN_REFRESH_BUFFER_SECS") {
            config.token_refresh_buffer =
                parse_secs("PLAYLIST_SYNC_TOKEN_REFRESH_BUFFER_SECS", &v)?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_STALE_CLAIM_SECS") {
            config.stale_claim_after = parse_secs("PLAYLIST_SYNC_STALE_CLAIM_SECS", &v)?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_ACTIVITY_RETENTION_DAYS") {
            config.activity_retention_days =
                Some(parse_number("PLAYLIST_SYNC_ACTIVITY_RETENTION_DAYS", &v)?);
        }
        if let Some(v) = get("PLAYLIST_SYNC_MATCH_POLICY") {
            config.match_policy = v.parse()?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_LOG_LEVEL") {
            config.logging.level = v.parse::<LogLevel>()?;
        }
        if let Some(v) = get("PLAYLIST_SYNC_LOG_FORMAT") {
            config.logging.format = v.parse::<LogFormat>()?;
        }

        config.spotify = credentials(get("SPOTIFY_CLIENT_ID"), get("SPOTIFY_CLIENT_SECRET"), "SPOTIFY")?;
        config.youtube = credentials(get("YOUTUBE_CLIENT_ID"), get("YOUTUBE_CLIENT_SECRET"), "YOUTUBE")?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database URL is not empty
    /// - Interval floor is at least 5 minutes
    /// - Tick periods, timeouts and quotas are non-zero
    /// - Batch size is within 1..=500
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::Config("Database URL cannot be empty".to_string()));
        }

        if self.min_interval_minutes < MIN_INTERVAL_FLOOR_MINUTES {
            return Err(Error::Config(format!(
                "Minimum sync interval must be at least {} minutes (got {})",
                MIN_INTERVAL_FLOOR_MINUTES, self.min_interval_minutes
            )));
        }

        if self.analysis_tick.is_zero() || self.executor_tick.is_zero() {
            return Err(Error::Config(
                "Scheduler tick periods must be greater than 0 seconds".to_string(),
            ));
        }

        if self.executor_batch_size == 0 || self.executor_batch_size > MAX_EXECUTOR_BATCH_SIZE {
            return Err(Error::Config(format!(
                "Executor batch size must be between 1 and {} (got {})",
                MAX_EXECUTOR_BATCH_SIZE, self.executor_batch_size
            )));
        }

        if self.max_attempts == 0 {
            return Err(Error::Config(
                "Retry ceiling must allow at least one attempt".to_string(),
            ));
        }

        if self.destination_daily_quota == 0 {
            return Err(Error::Config(
                "Daily quota ceiling must be greater than 0 units".to_string(),
            ));
        }

        if self.api_timeout.is_zero() {
            return Err(Error::Config(
                "API timeout must be greater than 0 seconds".to_string(),
            ));
        }

        Ok(())
    }

    /// Credentials for both services, or an error naming what is missing.
    pub fn require_credentials(&self) -> Result<(&ClientCredentials, &ClientCredentials)> {
        let spotify = self.spotify.as_ref().ok_or(Error::MissingCredentials {
            service: "Spotify",
            service_upper: "SPOTIFY",
        })?;
        let youtube = self.youtube.as_ref().ok_or(Error::MissingCredentials {
            service: "YouTube",
            service_upper: "YOUTUBE",
        })?;
        Ok((spotify, youtube))
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| Error::InvalidVar {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a non-negative integer",
        })
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    parse_number::<u64>(key, value).map(Duration::from_secs)
}

fn credentials(
    id: Option<String>,
    secret: Option<String>,
    prefix: &str,
) -> Result<Option<ClientCredentials>> {
    match (id, secret) {
        (Some(id), Some(secret)) => Ok(Some(ClientCredentials::new(id, secret))),
        (None, None) => Ok(None),
        _ => Err(Error::Config(format!(
            "{prefix}_CLIENT_ID and {prefix}_CLIENT_SECRET must be set together"
        ))),
    }
}

/// Builder for constructing [`EngineConfig`] instances.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    pub fn min_interval_minutes(mut self, minutes: u32) -> Self {
        self.config.min_interval_minutes = minutes;
        self
    }

    pub fn analysis_tick(mut self, period: Duration) -> Self {
        self.config.analysis_tick = period;
        self
    }

    pub fn executor_tick(mut self, period: Duration) -> Self {
        self.config.executor_tick = period;
        self
    }

    pub fn executor_batch_size(mut self, size: u32) -> Self {
        self.config.executor_batch_size = size;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn retry_backoff(mut self, delay: Duration) -> Self {
        self.config.retry_backoff = delay;
        self
    }

    pub fn destination_daily_quota(mut self, units: u32) -> Self {
        self.config.destination_daily_quota = units;
        self
    }

    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout = timeout;
        self
    }

    pub fn token_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.config.token_refresh_buffer = buffer;
        self
    }

    pub fn stale_claim_after(mut self, after: Duration) -> Self {
        self.config.stale_claim_after = after;
        self
    }

    pub fn activity_retention_days(mut self, days: u32) -> Self {
        self.config.activity_retention_days = Some(days);
        self
    }

    pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
        self.config.match_policy = policy;
        self
    }

    pub fn spotify_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.config.spotify = Some(credentials);
        self
    }

    pub fn youtube_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.config.youtube = Some(credentials);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
