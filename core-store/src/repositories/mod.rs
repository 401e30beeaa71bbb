//! # Repositories
//!
//! One async trait per collection plus its SQLite implementation. Callers
//! hold the traits behind `Arc<dyn ...>` so schedulers can be tested against
//! the same in-memory database the repositories are tested with.

pub mod activity_log;
pub mod blacklist;
pub mod mapping;
pub mod pagination;
pub mod quota;
pub mod sync_item;

pub use activity_log::{ActivityFilter, ActivityLogRepository, SqliteActivityLogRepository};
pub use blacklist::{BlacklistRepository, SqliteBlacklistRepository};
pub use mapping::{MappingRepository, SqliteMappingRepository, DEFAULT_MIN_INTERVAL_MINUTES};
pub use pagination::{Page, PageRequest};
pub use quota::{QuotaRepository, SqliteQuotaRepository};
pub use sync_item::{SqliteSyncItemRepository, SyncItemRepository};
