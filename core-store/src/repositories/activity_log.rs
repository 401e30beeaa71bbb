//! Activity log repository
//!
//! Append-only: rows are never updated, only pruned by age.

use crate::error::{Result, StoreError};
use crate::models::{ActivityLevel, ActivityLog, JobType};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{query, FromRow, QueryBuilder, Sqlite, SqlitePool};

/// Optional filters for [`ActivityLogRepository::list_recent`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    pub level: Option<ActivityLevel>,
    pub job_type: Option<JobType>,
    pub mapping_id: Option<String>,
    pub sync_item_id: Option<String>,
}

impl ActivityFilter {
    pub fn level(mut self, level: ActivityLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn job_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }

    pub fn mapping(mut self, mapping_id: impl Into<String>) -> Self {
        self.mapping_id = Some(mapping_id.into());
        self
    }

    pub fn sync_item(mut self, sync_item_id: impl Into<String>) -> Self {
        self.sync_item_id = Some(sync_item_id.into());
        self
    }

    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE 1 = 1");
        if let Some(level) = self.level {
            builder.push(" AND level = ").push_bind(level.as_str());
        }
        if let Some(job_type) = self.job_type {
            builder.push(" AND job_type = ").push_bind(job_type.as_str());
        }
        if let Some(mapping_id) = &self.mapping_id {
            builder.push(" AND mapping_id = ").push_bind(mapping_id.clone());
        }
        if let Some(sync_item_id) = &self.sync_item_id {
            builder.push(" AND sync_item_id = ").push_bind(sync_item_id.clone());
        }
    }
}

#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    async fn append(&self, entry: &ActivityLog) -> Result<()>;

    /// Newest first
    async fn list_recent(&self, filter: &ActivityFilter, page: PageRequest) -> Result<Page<ActivityLog>>;

    /// Delete entries created before `cutoff`. Returns the number removed.
    async fn prune_older_than(&self, cutoff: i64) -> Result<u64>;
}

pub struct SqliteActivityLogRepository {
    pool: SqlitePool,
}

impl SqliteActivityLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ActivityLogRow {
    id: String,
    level: String,
    message: String,
    sync_item_id: Option<String>,
    mapping_id: Option<String>,
    job_type: String,
    created_at: i64,
}

impl TryFrom<ActivityLogRow> for ActivityLog {
    type Error = StoreError;

    fn try_from(row: ActivityLogRow) -> Result<Self> {
        Ok(ActivityLog {
            level: row.level.parse()?,
            job_type: row.job_type.parse()?,
            id: row.id,
            message: row.message,
            sync_item_id: row.sync_item_id,
            mapping_id: row.mapping_id,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ActivityLogRepository for SqliteActivityLogRepository {
    async fn append(&self, entry: &ActivityLog) -> Result<()> {
        query(
            r#"
            INSERT INTO activity_logs (id, level, message, sync_item_id, mapping_id, job_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(&entry.sync_item_id)
        .bind(&entry.mapping_id)
        .bind(entry.job_type.as_str())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(&self, filter: &ActivityFilter, page: PageRequest) -> Result<Page<ActivityLog>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM activity_logs");
        filter.push_where(&mut count);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM activity_logs");
        filter.push_where(&mut select);
        select
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows: Vec<ActivityLogRow> = select.build_query_as().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(ActivityLog::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(items, total.max(0) as u64, page))
    }

    async fn prune_older_than(&self, cutoff: i64) -> Result<u64> {
        let result = query("DELETE FROM activity_logs WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
