//! # Record Store Pool
//!
//! SQLite pool shared by every repository.
//!
//! - **WAL Mode**: readers do not block the executor's writes
//! - **Foreign Keys**: enforced, so deleting a mapping cascades
//! - **Automatic Migrations**: `migrations/` is embedded and applied on startup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_store::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("playlist-sync.db")).await?;
//! ```
//!
//! Tests use [`create_test_pool`], an in-memory database on a single
//! connection (each SQLite `:memory:` connection is its own database).

use crate::error::{Result, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the store lives and how many connections may touch it.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:` URL or `sqlite::memory:`
    pub database_url: String,
    pub max_connections: u32,
    /// How long a caller waits for a free connection
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Accepts a plain file path or a full `sqlite:` URL.
    pub fn new(database: impl Into<String>) -> Self {
        let database = database.into();
        let database_url = if database.starts_with("sqlite:") {
            database
        } else {
            format!("sqlite:{}", database)
        };

        Self {
            database_url,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Each `:memory:` connection is a separate database, so those stay on
    /// a single connection.
    fn pool_size(&self) -> u32 {
        if self.database_url.contains(":memory:") {
            1
        } else {
            self.max_connections
        }
    }
}

/// Opens the pool, applies the embedded migrations and checks the
/// connection answers before handing it out.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    let pool_size = config.pool_size();
    info!(database_url = %config.database_url, pool_size, "Opening record store");

    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(pool_size)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .inspect_err(|e| warn!(error = %e, "Cannot open record store"))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;
    debug!("Migrations applied");

    sqlx::query("SELECT 1").execute(&pool).await?;
    Ok(pool)
}

/// In-memory store with migrations applied.
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}
