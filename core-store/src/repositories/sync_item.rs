//! # Sync Item Repository
//!
//! The work queue between analysis and execution.
//!
//! - [`enqueue`](SyncItemRepository::enqueue) refuses a second pending or
//!   running item for the same `(mapping_id, track_id, action)`; a partial
//!   unique index backs the check.
//! - [`transition`](SyncItemRepository::transition) is a conditional update
//!   on the current status. Exactly one of several racing callers observes
//!   `true`, which is how executor ticks claim items.

use crate::error::{is_unique_violation, Result, StoreError};
use crate::models::{
    ServiceSide, StatusChange, StatusCounts, SyncAction, SyncItem, SyncItemStatus, SyncPayload,
};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use bridge_traits::playlist::ProviderKind;
use sqlx::{query, query_as, FromRow, SqlitePool};
use tracing::debug;

#[async_trait]
pub trait SyncItemRepository: Send + Sync {
    /// Insert a pending item.
    ///
    /// # Returns
    /// `Ok(false)` without inserting if an active duplicate exists
    async fn enqueue(&self, item: &SyncItem) -> Result<bool>;

    /// Whether a pending or running item exists for the key
    async fn has_active(&self, mapping_id: &str, track_id: &str, action: SyncAction) -> Result<bool>;

    async fn find_by_id(&self, id: &str) -> Result<Option<SyncItem>>;

    /// Overwrite the payload of the pending item sharing `item`'s key.
    ///
    /// # Returns
    /// `Ok(true)` if a pending item held a different payload
    async fn replace_pending_payload(&self, item: &SyncItem) -> Result<bool>;

    /// Oldest pending items eligible at `now`
    async fn fetch_pending_batch(&self, now: i64, limit: u32) -> Result<Vec<SyncItem>>;

    /// Apply a validated status change if the item is still in `change.from`.
    ///
    /// # Returns
    /// `Ok(true)` if this call performed the transition
    ///
    /// # Errors
    /// - `InvalidStateTransition` for a transition the lifecycle forbids
    /// - `Conflict` when returning to pending would duplicate an active item
    async fn transition(&self, id: &str, change: &StatusChange) -> Result<bool>;

    /// Return running items not touched since `cutoff` to pending.
    async fn requeue_stale(&self, cutoff: i64, now: i64) -> Result<u64>;

    async fn count_by_status(&self) -> Result<StatusCounts>;

    /// Items of one mapping, newest first
    async fn list_for_mapping(&self, mapping_id: &str, page: PageRequest) -> Result<Page<SyncItem>>;
}

pub struct SqliteSyncItemRepository {
    pool: SqlitePool,
}

impl SqliteSyncItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SyncItemRow {
    id: String,
    mapping_id: String,
    service: String,
    action: String,
    status: String,
    track_id: String,
    source_track_id: Option<String>,
    source_track_title: Option<String>,
    source_service: String,
    destination_service: String,
    payload: String,
    attempts: i64,
    last_error: Option<String>,
    next_attempt_at: i64,
    created_at: i64,
    updated_at: i64,
}

fn parse_provider(field: &str, value: &str) -> Result<ProviderKind> {
    value
        .parse::<ProviderKind>()
        .map_err(|_| StoreError::invalid(field, format!("unknown provider '{}'", value)))
}

impl TryFrom<SyncItemRow> for SyncItem {
    type Error = StoreError;

    fn try_from(row: SyncItemRow) -> Result<Self> {
        let payload: SyncPayload = serde_json::from_str(&row.payload)?;

        Ok(SyncItem {
            service: row.service.parse::<ServiceSide>()?,
            action: row.action.parse::<SyncAction>()?,
            status: row.status.parse::<SyncItemStatus>()?,
            source_service: parse_provider("source_service", &row.source_service)?,
            destination_service: parse_provider("destination_service", &row.destination_service)?,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            id: row.id,
            mapping_id: row.mapping_id,
            track_id: row.track_id,
            source_track_id: row.source_track_id,
            source_track_title: row.source_track_title,
            payload,
            last_error: row.last_error,
            next_attempt_at: row.next_attempt_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn collect(rows: Vec<SyncItemRow>) -> Result<Vec<SyncItem>> {
    rows.into_iter().map(SyncItem::try_from).collect()
}

#[async_trait]
impl SyncItemRepository for SqliteSyncItemRepository {
    async fn enqueue(&self, item: &SyncItem) -> Result<bool> {
        if self
            .has_active(&item.mapping_id, &item.track_id, item.action)
            .await?
        {
            return Ok(false);
        }

        let payload = serde_json::to_string(&item.payload)?;

        let result = query(
            r#"
            INSERT INTO sync_items (
                id, mapping_id, service, action, status, track_id,
                source_track_id, source_track_title, source_service, destination_service,
                payload, attempts, last_error, next_attempt_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.mapping_id)
        .bind(item.service.as_str())
        .bind(item.action.as_str())
        .bind(item.status.as_str())
        .bind(&item.track_id)
        .bind(&item.source_track_id)
        .bind(&item.source_track_title)
        .bind(item.source_service.as_str())
        .bind(item.destination_service.as_str())
        .bind(payload)
        .bind(i64::from(item.attempts))
        .bind(&item.last_error)
        .bind(item.next_attempt_at)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(sync_item_id = %item.id, action = %item.action, "Enqueued sync item");
                Ok(true)
            }
            // Lost a race with a concurrent enqueue of the same key.
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn has_active(&self, mapping_id: &str, track_id: &str, action: SyncAction) -> Result<bool> {
        let (count,): (i64,) = query_as(
            r#"
            SELECT COUNT(*) FROM sync_items
            WHERE mapping_id = ? AND track_id = ? AND action = ?
              AND status IN ('pending', 'running')
            "#,
        )
        .bind(mapping_id)
        .bind(track_id)
        .bind(action.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn replace_pending_payload(&self, item: &SyncItem) -> Result<bool> {
        let payload = serde_json::to_string(&item.payload)?;

        let result = query(
            r#"
            UPDATE sync_items
            SET payload = ?, updated_at = ?
            WHERE mapping_id = ? AND track_id = ? AND action = ?
              AND status = 'pending' AND payload <> ?
            "#,
        )
        .bind(&payload)
        .bind(item.updated_at)
        .bind(&item.mapping_id)
        .bind(&item.track_id)
        .bind(item.action.as_str())
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<SyncItem>> {
        let row = query_as::<_, SyncItemRow>("SELECT * FROM sync_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SyncItem::try_from).transpose()
    }

    async fn fetch_pending_batch(&self, now: i64, limit: u32) -> Result<Vec<SyncItem>> {
        let rows = query_as::<_, SyncItemRow>(
            r#"
            SELECT * FROM sync_items
            WHERE status = 'pending' AND next_attempt_at <= ?
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn transition(&self, id: &str, change: &StatusChange) -> Result<bool> {
        change.from.validate_transition(change.to)?;

        let result = query(
            r#"
            UPDATE sync_items
            SET status = ?,
                attempts = COALESCE(?, attempts),
                last_error = COALESCE(?, last_error),
                next_attempt_at = COALESCE(?, next_attempt_at),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(change.to.as_str())
        .bind(change.attempts.map(i64::from))
        .bind(&change.last_error)
        .bind(change.next_attempt_at)
        .bind(change.at)
        .bind(id)
        .bind(change.from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            StoreError::conflict_on_unique(
                e,
                format!("an active item with the same target already exists for {}", id),
            )
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn requeue_stale(&self, cutoff: i64, now: i64) -> Result<u64> {
        let result = query(
            r#"
            UPDATE sync_items
            SET status = 'pending', updated_at = ?
            WHERE status = 'running' AND updated_at < ?
            "#,
        )
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self) -> Result<StatusCounts> {
        let rows: Vec<(String, i64)> =
            query_as("SELECT status, COUNT(*) FROM sync_items GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            counts.set(status.parse()?, count.max(0) as u64);
        }
        Ok(counts)
    }

    async fn list_for_mapping(&self, mapping_id: &str, page: PageRequest) -> Result<Page<SyncItem>> {
        let (total,): (i64,) = query_as("SELECT COUNT(*) FROM sync_items WHERE mapping_id = ?")
            .bind(mapping_id)
            .fetch_one(&self.pool)
            .await?;

        let rows = query_as::<_, SyncItemRow>(
            r#"
            SELECT * FROM sync_items
            WHERE mapping_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(mapping_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(collect(rows)?, total.max(0) as u64, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{Mapping, ServiceRoute};
    use crate::repositories::{MappingRepository, SqliteMappingRepository};
    use bridge_traits::playlist::PlaylistTrack;
    use std::sync::Arc;

    fn track(id: &str) -> PlaylistTrack {
        PlaylistTrack {
            id: id.to_string(),
            entry_id: None,
            title: format!("Song {}", id),
            artists: vec!["Band".into()],
            duration_ms: Some(180_000),
        }
    }

    fn route() -> ServiceRoute {
        ServiceRoute::new(ProviderKind::Spotify, ProviderKind::YouTube)
    }

    async fn setup() -> (SqliteSyncItemRepository, Mapping) {
        let pool = create_test_pool().await.unwrap();
        let mapping = Mapping::new("sp", "yt", 5, 0);
        SqliteMappingRepository::new(pool.clone())
            .insert(&mapping)
            .await
            .unwrap();
        (SqliteSyncItemRepository::new(pool), mapping)
    }

    #[tokio::test]
    async fn test_enqueue_round_trip() {
        let (repo, mapping) = setup().await;

        let item = SyncItem::add_track(&mapping.id, route(), &track("c"), 10);
        assert!(repo.enqueue(&item).await.unwrap());

        let found = repo.find_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(found, item);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_active_duplicate() {
        let (repo, mapping) = setup().await;

        let first = SyncItem::add_track(&mapping.id, route(), &track("c"), 10);
        let second = SyncItem::add_track(&mapping.id, route(), &track("c"), 20);
        assert!(repo.enqueue(&first).await.unwrap());
        assert!(!repo.enqueue(&second).await.unwrap());

        // A different action on the same track is a different key.
        let remove = SyncItem::remove_track(&mapping.id, route(), &track("c"), 20);
        assert!(repo.enqueue(&remove).await.unwrap());

        // Once the first item is finished the key is free again.
        assert!(repo.transition(&first.id, &StatusChange::claim(30)).await.unwrap());
        assert!(repo.transition(&first.id, &StatusChange::complete(31)).await.unwrap());
        assert!(repo.enqueue(&second).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_pending_batch_order_and_eligibility() {
        let (repo, mapping) = setup().await;

        let a = SyncItem::add_track(&mapping.id, route(), &track("a"), 10);
        let b = SyncItem::add_track(&mapping.id, route(), &track("b"), 10);
        let mut later = SyncItem::add_track(&mapping.id, route(), &track("z"), 5);
        later.next_attempt_at = 1_000;

        for item in [&a, &b, &later] {
            repo.enqueue(item).await.unwrap();
        }

        let ids: Vec<String> = repo
            .fetch_pending_batch(100, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![a.id.clone(), b.id.clone()]);

        assert_eq!(repo.fetch_pending_batch(100, 1).await.unwrap().len(), 1);
        assert_eq!(repo.fetch_pending_batch(1_000, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_only_one_claim_wins() {
        let (repo, mapping) = setup().await;
        let repo = Arc::new(repo);

        let item = SyncItem::add_track(&mapping.id, route(), &track("c"), 10);
        repo.enqueue(&item).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let repo = Arc::clone(&repo);
                let id = item.id.clone();
                tokio::spawn(async move { repo.transition(&id, &StatusChange::claim(20)).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let found = repo.find_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(found.status, SyncItemStatus::Running);
    }

    #[tokio::test]
    async fn test_retry_later_updates_fields() {
        let (repo, mapping) = setup().await;

        let item = SyncItem::add_track(&mapping.id, route(), &track("c"), 10);
        repo.enqueue(&item).await.unwrap();
        repo.transition(&item.id, &StatusChange::claim(20)).await.unwrap();
        repo.transition(
            &item.id,
            &StatusChange::retry_later(1, "rate limited", 80, 20),
        )
        .await
        .unwrap();

        let found = repo.find_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(found.status, SyncItemStatus::Pending);
        assert_eq!(found.attempts, 1);
        assert_eq!(found.last_error.as_deref(), Some("rate limited"));
        assert_eq!(found.next_attempt_at, 80);
        assert!(repo.fetch_pending_batch(79, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forbidden_transition() {
        let (repo, mapping) = setup().await;

        let item = SyncItem::add_track(&mapping.id, route(), &track("c"), 10);
        repo.enqueue(&item).await.unwrap();

        let change = StatusChange::new(SyncItemStatus::Done, SyncItemStatus::Pending, 20);
        let err = repo.transition(&item.id, &change).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidStateTransition { .. }));

        // Wrong expected state is a lost race, not an error.
        assert!(!repo.transition(&item.id, &StatusChange::complete(20)).await.unwrap());
    }

    #[tokio::test]
    async fn test_requeue_stale_and_counts() {
        let (repo, mapping) = setup().await;

        let stale = SyncItem::add_track(&mapping.id, route(), &track("a"), 0);
        let fresh = SyncItem::add_track(&mapping.id, route(), &track("b"), 0);
        repo.enqueue(&stale).await.unwrap();
        repo.enqueue(&fresh).await.unwrap();
        repo.transition(&stale.id, &StatusChange::claim(100)).await.unwrap();
        repo.transition(&fresh.id, &StatusChange::claim(900)).await.unwrap();

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.running, 2);

        assert_eq!(repo.requeue_stale(500, 1_000).await.unwrap(), 1);

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.get(SyncItemStatus::Done), 0);
    }

    #[tokio::test]
    async fn test_replace_pending_payload_only_touches_pending() {
        let (repo, mapping) = setup().await;

        let first = SyncItem::rename_playlist(&mapping.id, route(), "Old", 10);
        repo.enqueue(&first).await.unwrap();

        let newer = SyncItem::rename_playlist(&mapping.id, route(), "New", 20);
        assert!(!repo.enqueue(&newer).await.unwrap());
        assert!(repo.replace_pending_payload(&newer).await.unwrap());
        assert!(!repo.replace_pending_payload(&newer).await.unwrap());

        let stored = repo.find_by_id(&first.id).await.unwrap().unwrap();
        assert_eq!(
            stored.payload,
            SyncPayload::RenamePlaylist {
                new_name: "New".to_string()
            }
        );
        assert_eq!(stored.updated_at, 20);

        repo.transition(&first.id, &StatusChange::claim(30)).await.unwrap();
        let latest = SyncItem::rename_playlist(&mapping.id, route(), "Latest", 40);
        assert!(!repo.replace_pending_payload(&latest).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_for_mapping_pages() {
        let (repo, mapping) = setup().await;

        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let item = SyncItem::add_track(&mapping.id, route(), &track(id), i as i64);
            repo.enqueue(&item).await.unwrap();
        }

        let page = repo
            .list_for_mapping(&mapping.id, PageRequest::new(0, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].track_id, "c");
    }
}
