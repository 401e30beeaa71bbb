//! # Record Store
//!
//! SQLite persistence for the sync engine's collections: `mappings`,
//! `sync_items`, `blacklist`, `activity_logs`, `provider_quota` and
//! `oauth_tokens` (the latter is read and written by `core-auth`).
//!
//! The store is the single serialization point between the analysis and
//! executor schedulers. Claims and de-duplication are enforced here with
//! conditional updates and a partial unique index rather than in-process
//! locks.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, StoreError};
pub use models::{
    ActivityLevel, ActivityLog, BlacklistEntry, JobType, Mapping, ServiceRoute, ServiceSide,
    StatusChange, StatusCounts, SyncAction, SyncItem, SyncItemStatus, SyncPayload,
};
pub use repositories::{
    ActivityFilter, ActivityLogRepository, BlacklistRepository, MappingRepository, Page,
    PageRequest, QuotaRepository, SqliteActivityLogRepository, SqliteBlacklistRepository,
    SqliteMappingRepository, SqliteQuotaRepository, SqliteSyncItemRepository, SyncItemRepository,
};
