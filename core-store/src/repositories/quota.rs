//! Quota snapshot repository trait and implementation

use crate::error::{Result, StoreError};
use async_trait::async_trait;
use bridge_traits::playlist::{ProviderKind, QuotaStatus};
use chrono::DateTime;
use sqlx::{query, query_as, FromRow, SqlitePool};

#[async_trait]
pub trait QuotaRepository: Send + Sync {
    /// Insert or replace the provider's snapshot
    async fn save(&self, provider: ProviderKind, status: &QuotaStatus, at: i64) -> Result<()>;

    /// Every stored snapshot
    async fn list(&self) -> Result<Vec<(ProviderKind, QuotaStatus)>>;
}

pub struct SqliteQuotaRepository {
    pool: SqlitePool,
}

impl SqliteQuotaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct QuotaRow {
    provider: String,
    used: i64,
    quota_limit: i64,
    resets_at: i64,
}

impl QuotaRow {
    fn into_snapshot(self) -> Result<(ProviderKind, QuotaStatus)> {
        let provider = self
            .provider
            .parse::<ProviderKind>()
            .map_err(|_| StoreError::invalid("provider", format!("unknown provider '{}'", self.provider)))?;
        let resets_at = DateTime::from_timestamp(self.resets_at, 0)
            .ok_or_else(|| StoreError::invalid("resets_at", format!("out of range: {}", self.resets_at)))?;

        Ok((
            provider,
            QuotaStatus {
                used: u32::try_from(self.used).unwrap_or(u32::MAX),
                limit: u32::try_from(self.quota_limit).unwrap_or(u32::MAX),
                resets_at,
            },
        ))
    }
}

#[async_trait]
impl QuotaRepository for SqliteQuotaRepository {
    async fn save(&self, provider: ProviderKind, status: &QuotaStatus, at: i64) -> Result<()> {
        query(
            r#"
            INSERT INTO provider_quota (provider, used, quota_limit, resets_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(provider) DO UPDATE SET
                used = excluded.used,
                quota_limit = excluded.quota_limit,
                resets_at = excluded.resets_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(provider.as_str())
        .bind(i64::from(status.used))
        .bind(i64::from(status.limit))
        .bind(status.resets_at.timestamp())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<(ProviderKind, QuotaStatus)>> {
        let rows: Vec<QuotaRow> = query_as(
            "SELECT provider, used, quota_limit, resets_at FROM provider_quota ORDER BY provider",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QuotaRow::into_snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    fn status(used: u32, resets_at: i64) -> QuotaStatus {
        QuotaStatus {
            used,
            limit: 10_000,
            resets_at: DateTime::from_timestamp(resets_at, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_save_overwrites_snapshot() {
        let repo = SqliteQuotaRepository::new(create_test_pool().await.unwrap());
        assert!(repo.list().await.unwrap().is_empty());

        repo.save(ProviderKind::YouTube, &status(150, 1_709_337_600), 10)
            .await
            .unwrap();
        repo.save(ProviderKind::YouTube, &status(400, 1_709_337_600), 20)
            .await
            .unwrap();

        let saved = repo.list().await.unwrap();
        assert_eq!(saved, vec![(ProviderKind::YouTube, status(400, 1_709_337_600))]);
    }
}
