//! Local position cache
//!
//! Best-effort per-device store of exact playback-time checkpoints, keyed
//! by (curriculum, item). Authoritative for the exact seek position on
//! resume; the remote store only sees a coarser percentage-derived
//! snapshot. Treated as fallible everywhere: a failed write never blocks
//! playback.

use crate::error::Result;
use crate::tracker::PositionCheckpoint;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

/// Port over the local checkpoint store
#[async_trait]
pub trait PositionCache: Send + Sync {
    /// Cached elapsed seconds for the pair, or None when absent.
    /// Invalid persisted values are reported as absent, not as errors.
    async fn get(&self, curriculum_id: &str, content_item_id: i64) -> Result<Option<f64>>;

    /// Upsert the current checkpoint for the pair
    async fn set(&self, checkpoint: &PositionCheckpoint) -> Result<()>;
}

/// SQLite-backed position cache
pub struct SqlitePositionCache {
    pool: SqlitePool,
}

impl SqlitePositionCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionCache for SqlitePositionCache {
    async fn get(&self, curriculum_id: &str, content_item_id: i64) -> Result<Option<f64>> {
        let row = sqlx::query_as::<_, (f64,)>(
            r#"
            SELECT elapsed_seconds
            FROM position_checkpoints
            WHERE curriculum_guid = ? AND item_id = ?
            "#,
        )
        .bind(curriculum_id)
        .bind(content_item_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((elapsed,)) if elapsed.is_finite() && elapsed >= 0.0 => Ok(Some(elapsed)),
            Some((elapsed,)) => {
                debug!(
                    curriculum_id,
                    content_item_id, elapsed, "discarding invalid cached position"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, checkpoint: &PositionCheckpoint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO position_checkpoints
                (curriculum_guid, item_id, elapsed_seconds, total_seconds, captured_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(curriculum_guid, item_id) DO UPDATE SET
                elapsed_seconds = excluded.elapsed_seconds,
                total_seconds = excluded.total_seconds,
                captured_at = excluded.captured_at
            "#,
        )
        .bind(&checkpoint.curriculum_id)
        .bind(checkpoint.content_item_id)
        .bind(checkpoint.elapsed_seconds)
        .bind(checkpoint.total_seconds)
        .bind(checkpoint.captured_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_common::db::init::init_memory_database;

    #[tokio::test]
    async fn test_absent_pair_reads_as_none() {
        let pool = init_memory_database().await.unwrap();
        let cache = SqlitePositionCache::new(pool);

        let cached = cache.get("c-1", 7).await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let pool = init_memory_database().await.unwrap();
        let cache = SqlitePositionCache::new(pool);

        let cp = PositionCheckpoint::capture("c-1", 7, 42.5, 120.0);
        cache.set(&cp).await.unwrap();

        let cached = cache.get("c-1", 7).await.unwrap();
        assert_eq!(cached, Some(42.5));

        // Other pairs remain absent
        assert!(cache.get("c-1", 8).await.unwrap().is_none());
        assert!(cache.get("c-2", 7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_newer_write_supersedes() {
        let pool = init_memory_database().await.unwrap();
        let cache = SqlitePositionCache::new(pool);

        cache
            .set(&PositionCheckpoint::capture("c-1", 7, 10.0, 120.0))
            .await
            .unwrap();
        cache
            .set(&PositionCheckpoint::capture("c-1", 7, 55.25, 120.0))
            .await
            .unwrap();

        assert_eq!(cache.get("c-1", 7).await.unwrap(), Some(55.25));
    }

    #[tokio::test]
    async fn test_invalid_persisted_value_reads_as_absent() {
        let pool = init_memory_database().await.unwrap();

        sqlx::query(
            "INSERT INTO position_checkpoints (curriculum_guid, item_id, elapsed_seconds, total_seconds, captured_at)
             VALUES ('c-1', 7, -12.0, 120.0, CURRENT_TIMESTAMP)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let cache = SqlitePositionCache::new(pool);
        assert!(cache.get("c-1", 7).await.unwrap().is_none());
    }
}
