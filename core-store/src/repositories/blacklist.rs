//! Blacklist repository trait and implementation

use crate::error::{Result, StoreError};
use crate::models::{BlacklistEntry, ServiceSide};
use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

#[async_trait]
pub trait BlacklistRepository: Send + Sync {
    async fn find(
        &self,
        mapping_id: &str,
        service: ServiceSide,
        track_id: &str,
    ) -> Result<Option<BlacklistEntry>>;

    /// Create the entry with `skip_counter = 1` or bump the existing one.
    async fn record_skip(
        &self,
        mapping_id: &str,
        service: ServiceSide,
        track_id: &str,
        reason: &str,
        at: i64,
    ) -> Result<BlacklistEntry>;

    /// Blacklisted track ids of one mapping side, for bulk filtering
    async fn track_ids(&self, mapping_id: &str, service: ServiceSide) -> Result<HashSet<String>>;

    async fn list_for_mapping(&self, mapping_id: &str) -> Result<Vec<BlacklistEntry>>;

    /// Manual removal. Returns whether the entry existed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

pub struct SqliteBlacklistRepository {
    pool: SqlitePool,
}

impl SqliteBlacklistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct BlacklistRow {
    id: String,
    mapping_id: String,
    service: String,
    track_id: String,
    reason: String,
    skip_counter: i64,
    last_skipped_at: i64,
    created_at: i64,
}

impl TryFrom<BlacklistRow> for BlacklistEntry {
    type Error = StoreError;

    fn try_from(row: BlacklistRow) -> Result<Self> {
        Ok(BlacklistEntry {
            service: row.service.parse()?,
            skip_counter: u32::try_from(row.skip_counter).unwrap_or(u32::MAX),
            id: row.id,
            mapping_id: row.mapping_id,
            track_id: row.track_id,
            reason: row.reason,
            last_skipped_at: row.last_skipped_at,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl BlacklistRepository for SqliteBlacklistRepository {
    async fn find(
        &self,
        mapping_id: &str,
        service: ServiceSide,
        track_id: &str,
    ) -> Result<Option<BlacklistEntry>> {
        let row = query_as::<_, BlacklistRow>(
            "SELECT * FROM blacklist WHERE mapping_id = ? AND service = ? AND track_id = ?",
        )
        .bind(mapping_id)
        .bind(service.as_str())
        .bind(track_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BlacklistEntry::try_from).transpose()
    }

    async fn record_skip(
        &self,
        mapping_id: &str,
        service: ServiceSide,
        track_id: &str,
        reason: &str,
        at: i64,
    ) -> Result<BlacklistEntry> {
        query(
            r#"
            INSERT INTO blacklist (
                id, mapping_id, service, track_id, reason, skip_counter, last_skipped_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(mapping_id, service, track_id) DO UPDATE SET
                skip_counter = skip_counter + 1,
                reason = excluded.reason,
                last_skipped_at = excluded.last_skipped_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(mapping_id)
        .bind(service.as_str())
        .bind(track_id)
        .bind(reason)
        .bind(at)
        .bind(at)
        .execute(&self.pool)
        .await?;

        self.find(mapping_id, service, track_id)
            .await?
            .ok_or_else(|| StoreError::not_found("BlacklistEntry", track_id))
    }

    async fn track_ids(&self, mapping_id: &str, service: ServiceSide) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> =
            query_as("SELECT track_id FROM blacklist WHERE mapping_id = ? AND service = ?")
                .bind(mapping_id)
                .bind(service.as_str())
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_for_mapping(&self, mapping_id: &str) -> Result<Vec<BlacklistEntry>> {
        let rows = query_as::<_, BlacklistRow>(
            "SELECT * FROM blacklist WHERE mapping_id = ? ORDER BY last_skipped_at DESC",
        )
        .bind(mapping_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BlacklistEntry::try_from).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM blacklist WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
