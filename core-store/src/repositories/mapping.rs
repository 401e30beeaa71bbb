//! Mapping repository trait and implementation

use crate::error::{Result, StoreError};
use crate::models::Mapping;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};
use tracing::debug;

/// Default interval floor applied by [`SqliteMappingRepository`].
pub const DEFAULT_MIN_INTERVAL_MINUTES: u32 = 5;

/// Data access for playlist mappings
#[async_trait]
pub trait MappingRepository: Send + Sync {
    /// Insert a new mapping
    ///
    /// # Errors
    /// - `InvalidInput` if the interval is below the floor or an id is empty
    /// - `Conflict` if the (source, destination) pair is already mapped
    async fn insert(&self, mapping: &Mapping) -> Result<()>;

    /// Update sync options, interval and cached names
    ///
    /// # Errors
    /// Same validation as [`insert`](Self::insert); `NotFound` if missing.
    async fn update(&self, mapping: &Mapping) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Mapping>>;

    /// All mappings, oldest first
    async fn list(&self) -> Result<Vec<Mapping>>;

    /// Mappings never analyzed or whose interval has elapsed at `now`
    async fn find_due(&self, now: i64) -> Result<Vec<Mapping>>;

    /// Stamp `last_analyzed_at` and refresh any cached names that were fetched
    async fn record_analysis(
        &self,
        id: &str,
        source_name: Option<&str>,
        destination_name: Option<&str>,
        analyzed_at: i64,
    ) -> Result<()>;

    /// Delete the mapping together with its sync items and blacklist entries
    ///
    /// # Returns
    /// `Ok(false)` if the mapping did not exist
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// SQLite implementation of [`MappingRepository`]
pub struct SqliteMappingRepository {
    pool: SqlitePool,
    min_interval_minutes: u32,
}

impl SqliteMappingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            min_interval_minutes: DEFAULT_MIN_INTERVAL_MINUTES,
        }
    }

    /// Raise the interval floor; values below the default are ignored.
    pub fn with_min_interval(mut self, minutes: u32) -> Self {
        self.min_interval_minutes = minutes.max(DEFAULT_MIN_INTERVAL_MINUTES);
        self
    }

    fn validate(&self, mapping: &Mapping) -> Result<()> {
        mapping
            .validate(self.min_interval_minutes)
            .map_err(|message| StoreError::invalid("Mapping", message))
    }
}

#[async_trait]
impl MappingRepository for SqliteMappingRepository {
    async fn insert(&self, mapping: &Mapping) -> Result<()> {
        self.validate(mapping)?;

        query(
            r#"
            INSERT INTO mappings (
                id, source_playlist_id, destination_playlist_id,
                source_playlist_name, destination_playlist_name,
                sync_name, sync_tracks, interval_minutes, last_analyzed_at,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&mapping.id)
        .bind(&mapping.source_playlist_id)
        .bind(&mapping.destination_playlist_id)
        .bind(&mapping.source_playlist_name)
        .bind(&mapping.destination_playlist_name)
        .bind(mapping.sync_name)
        .bind(mapping.sync_tracks)
        .bind(mapping.interval_minutes)
        .bind(mapping.last_analyzed_at)
        .bind(mapping.created_at)
        .bind(mapping.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            StoreError::conflict_on_unique(
                e,
                format!(
                    "playlist {} is already mapped to {}",
                    mapping.source_playlist_id, mapping.destination_playlist_id
                ),
            )
        })?;

        debug!(mapping_id = %mapping.id, "Inserted mapping");
        Ok(())
    }

    async fn update(&self, mapping: &Mapping) -> Result<()> {
        self.validate(mapping)?;

        let result = query(
            r#"
            UPDATE mappings
            SET source_playlist_id = ?, destination_playlist_id = ?,
                source_playlist_name = ?, destination_playlist_name = ?,
                sync_name = ?, sync_tracks = ?, interval_minutes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&mapping.source_playlist_id)
        .bind(&mapping.destination_playlist_id)
        .bind(&mapping.source_playlist_name)
        .bind(&mapping.destination_playlist_name)
        .bind(mapping.sync_name)
        .bind(mapping.sync_tracks)
        .bind(mapping.interval_minutes)
        .bind(mapping.updated_at)
        .bind(&mapping.id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::conflict_on_unique(e, "playlist pair is already mapped"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Mapping", &mapping.id));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Mapping>> {
        let mapping = query_as::<_, Mapping>("SELECT * FROM mappings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(mapping)
    }

    async fn list(&self) -> Result<Vec<Mapping>> {
        let mappings =
            query_as::<_, Mapping>("SELECT * FROM mappings ORDER BY created_at ASC, rowid ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(mappings)
    }

    async fn find_due(&self, now: i64) -> Result<Vec<Mapping>> {
        let mappings = query_as::<_, Mapping>(
            r#"
            SELECT * FROM mappings
            WHERE last_analyzed_at IS NULL
               OR last_analyzed_at + interval_minutes * 60 <= ?
            ORDER BY COALESCE(last_analyzed_at, 0) ASC, created_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(mappings)
    }

    async fn record_analysis(
        &self,
        id: &str,
        source_name: Option<&str>,
        destination_name: Option<&str>,
        analyzed_at: i64,
    ) -> Result<()> {
        let result = query(
            r#"
            UPDATE mappings
            SET source_playlist_name = COALESCE(?, source_playlist_name),
                destination_playlist_name = COALESCE(?, destination_playlist_name),
                last_analyzed_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(source_name)
        .bind(destination_name)
        .bind(analyzed_at)
        .bind(analyzed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Mapping", id));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        query("DELETE FROM sync_items WHERE mapping_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        query("DELETE FROM blacklist WHERE mapping_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = query("DELETE FROM mappings WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{ServiceRoute, ServiceSide, SyncItem};
    use crate::repositories::{
        BlacklistRepository, SqliteBlacklistRepository, SqliteSyncItemRepository,
        SyncItemRepository,
    };
    use bridge_traits::playlist::{PlaylistTrack, ProviderKind};

    async fn setup() -> (SqlitePool, SqliteMappingRepository) {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteMappingRepository::new(pool.clone());
        (pool, repo)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (_, repo) = setup().await;

        let mapping = Mapping::new("sp-1", "yt-1", 15, 100).with_names("Road Trip", "Road Trip");
        repo.insert(&mapping).await.unwrap();

        let found = repo.find_by_id(&mapping.id).await.unwrap().unwrap();
        assert_eq!(found, mapping);
        assert!(found.sync_name);
        assert!(found.sync_tracks);
    }

    #[tokio::test]
    async fn test_interval_below_floor_rejected() {
        let (_, repo) = setup().await;

        let mapping = Mapping::new("sp-1", "yt-1", 4, 0);
        let err = repo.insert(&mapping).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput { .. }));

        let mut mapping = Mapping::new("sp-1", "yt-1", 5, 0);
        repo.insert(&mapping).await.unwrap();
        mapping.interval_minutes = 1;
        let err = repo.update(&mapping).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_configured_floor() {
        let (pool, _) = setup().await;
        let repo = SqliteMappingRepository::new(pool).with_min_interval(30);

        let err = repo.insert(&Mapping::new("a", "b", 10, 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_pair_conflicts() {
        let (_, repo) = setup().await;

        repo.insert(&Mapping::new("sp-1", "yt-1", 5, 0)).await.unwrap();
        let err = repo.insert(&Mapping::new("sp-1", "yt-1", 10, 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_find_due() {
        let (_, repo) = setup().await;

        let never = Mapping::new("a", "b", 5, 0);
        let mut recent = Mapping::new("c", "d", 10, 0);
        recent.last_analyzed_at = Some(1_000);
        let mut stale = Mapping::new("e", "f", 5, 0);
        stale.last_analyzed_at = Some(500);

        for mapping in [&never, &recent, &stale] {
            repo.insert(mapping).await.unwrap();
        }

        let due: Vec<String> = repo
            .find_due(1_200)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();

        assert_eq!(due, vec![never.id.clone(), stale.id.clone()]);
        assert_eq!(repo.find_due(1_600).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_record_analysis_keeps_names_when_absent() {
        let (_, repo) = setup().await;

        let mapping = Mapping::new("a", "b", 5, 0).with_names("Old", "Old");
        repo.insert(&mapping).await.unwrap();

        repo.record_analysis(&mapping.id, Some("New"), None, 300)
            .await
            .unwrap();

        let found = repo.find_by_id(&mapping.id).await.unwrap().unwrap();
        assert_eq!(found.source_playlist_name, "New");
        assert_eq!(found.destination_playlist_name, "Old");
        assert_eq!(found.last_analyzed_at, Some(300));

        let err = repo.record_analysis("missing", None, None, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (pool, repo) = setup().await;
        let items = SqliteSyncItemRepository::new(pool.clone());
        let blacklist = SqliteBlacklistRepository::new(pool);

        let mapping = Mapping::new("a", "b", 5, 0);
        repo.insert(&mapping).await.unwrap();

        let track = PlaylistTrack {
            id: "t1".into(),
            entry_id: None,
            title: "Song".into(),
            artists: vec![],
            duration_ms: None,
        };
        let route = ServiceRoute::new(ProviderKind::Spotify, ProviderKind::YouTube);
        let item = SyncItem::add_track(&mapping.id, route, &track, 0);
        assert!(items.enqueue(&item).await.unwrap());
        blacklist
            .record_skip(&mapping.id, ServiceSide::Destination, "t2", "region locked", 0)
            .await
            .unwrap();

        assert!(repo.delete(&mapping.id).await.unwrap());
        assert!(!repo.delete(&mapping.id).await.unwrap());
        assert!(items.find_by_id(&item.id).await.unwrap().is_none());
        assert!(blacklist
            .list_for_mapping(&mapping.id)
            .await
            .unwrap()
            .is_empty());
    }
}
