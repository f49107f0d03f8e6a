//! Curriculum content lists
//!
//! Models and storage for curricula and their ordered content items. The
//! tracker reads the ordered item array and writes the full array back
//! after toggling `completed`; everything else that edits curricula lives
//! outside this service.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// One unit of curriculum content (typically one video)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub title: String,
    /// Display-only duration string ("12:34"); the authoritative duration
    /// comes from the player at ready time
    pub duration_label: String,
    pub completed: bool,
    /// Opaque external video identifier
    pub source_ref: String,
    pub notes: String,
}

/// An ordered collection of content items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Curriculum {
    pub id: String,
    pub title: String,
    /// Array position = curriculum sequence
    pub contents: Vec<ContentItem>,
    /// Derived summary, recomputed on completion write-back
    pub progress_percent: f64,
}

impl Curriculum {
    /// Share of completed items in percent (0.0 for an empty curriculum)
    pub fn computed_progress_percent(&self) -> f64 {
        if self.contents.is_empty() {
            return 0.0;
        }
        let done = self.contents.iter().filter(|i| i.completed).count();
        done as f64 / self.contents.len() as f64 * 100.0
    }
}

/// Storage port for curriculum content lists
#[async_trait]
pub trait CurriculumStore: Send + Sync {
    /// Load a curriculum with its ordered content items
    async fn load(&self, curriculum_id: &str) -> Result<Curriculum>;

    /// Write back the full content list and recompute the derived
    /// progress summary. Returns the new progress percentage.
    async fn save_contents(&self, curriculum_id: &str, contents: &[ContentItem]) -> Result<f64>;

    /// Create a curriculum with its content list (seed/demo path)
    async fn create(&self, curriculum: &Curriculum) -> Result<()>;
}

/// SQLite-backed curriculum store
pub struct SqliteCurriculumStore {
    pool: SqlitePool,
}

impl SqliteCurriculumStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CurriculumStore for SqliteCurriculumStore {
    async fn load(&self, curriculum_id: &str) -> Result<Curriculum> {
        let header = sqlx::query_as::<_, (String, f64)>(
            "SELECT title, progress_percent FROM curricula WHERE guid = ?",
        )
        .bind(curriculum_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("curriculum {}", curriculum_id)))?;

        let rows = sqlx::query_as::<_, (i64, String, String, i64, String, String)>(
            r#"
            SELECT item_id, title, duration_label, completed, source_ref, notes
            FROM content_items
            WHERE curriculum_guid = ?
            ORDER BY seq
            "#,
        )
        .bind(curriculum_id)
        .fetch_all(&self.pool)
        .await?;

        let contents = rows
            .into_iter()
            .map(
                |(id, title, duration_label, completed, source_ref, notes)| ContentItem {
                    id,
                    title,
                    duration_label,
                    completed: completed != 0,
                    source_ref,
                    notes,
                },
            )
            .collect();

        Ok(Curriculum {
            id: curriculum_id.to_string(),
            title: header.0,
            contents,
            progress_percent: header.1,
        })
    }

    async fn save_contents(&self, curriculum_id: &str, contents: &[ContentItem]) -> Result<f64> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM curricula WHERE guid = ?)")
            .bind(curriculum_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(Error::NotFound(format!("curriculum {}", curriculum_id)));
        }

        // Full-array write-back: sequence positions are rewritten from the
        // array order on every save
        sqlx::query("DELETE FROM content_items WHERE curriculum_guid = ?")
            .bind(curriculum_id)
            .execute(&mut *tx)
            .await?;

        for (seq, item) in contents.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO content_items
                    (curriculum_guid, item_id, seq, title, duration_label, completed, source_ref, notes)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(curriculum_id)
            .bind(item.id)
            .bind(seq as i64)
            .bind(&item.title)
            .bind(&item.duration_label)
            .bind(item.completed as i64)
            .bind(&item.source_ref)
            .bind(&item.notes)
            .execute(&mut *tx)
            .await?;
        }

        let progress_percent = if contents.is_empty() {
            0.0
        } else {
            let done = contents.iter().filter(|i| i.completed).count();
            done as f64 / contents.len() as f64 * 100.0
        };

        sqlx::query(
            "UPDATE curricula SET progress_percent = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
        )
        .bind(progress_percent)
        .bind(curriculum_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(progress_percent)
    }

    async fn create(&self, curriculum: &Curriculum) -> Result<()> {
        sqlx::query("INSERT INTO curricula (guid, title, progress_percent) VALUES (?, ?, 0.0)")
            .bind(&curriculum.id)
            .bind(&curriculum.title)
            .execute(&self.pool)
            .await?;

        self.save_contents(&curriculum.id, &curriculum.contents)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_common::db::init::init_memory_database;

    fn demo_curriculum() -> Curriculum {
        Curriculum {
            id: "rust-basics".to_string(),
            title: "Rust basics".to_string(),
            contents: vec![
                ContentItem {
                    id: 1,
                    title: "Ownership".to_string(),
                    duration_label: "14:02".to_string(),
                    completed: false,
                    source_ref: "vid-ownership".to_string(),
                    notes: String::new(),
                },
                ContentItem {
                    id: 2,
                    title: "Borrowing".to_string(),
                    duration_label: "11:30".to_string(),
                    completed: false,
                    source_ref: "vid-borrowing".to_string(),
                    notes: "watch twice".to_string(),
                },
            ],
            progress_percent: 0.0,
        }
    }

    #[tokio::test]
    async fn test_create_and_load_preserves_order() {
        let pool = init_memory_database().await.unwrap();
        let store = SqliteCurriculumStore::new(pool);

        store.create(&demo_curriculum()).await.unwrap();

        let loaded = store.load("rust-basics").await.unwrap();
        assert_eq!(loaded.title, "Rust basics");
        assert_eq!(loaded.contents.len(), 2);
        assert_eq!(loaded.contents[0].id, 1);
        assert_eq!(loaded.contents[1].id, 2);
        assert_eq!(loaded.contents[1].notes, "watch twice");
        assert_eq!(loaded.progress_percent, 0.0);
    }

    #[tokio::test]
    async fn test_save_contents_recomputes_progress() {
        let pool = init_memory_database().await.unwrap();
        let store = SqliteCurriculumStore::new(pool);
        store.create(&demo_curriculum()).await.unwrap();

        let mut curriculum = store.load("rust-basics").await.unwrap();
        curriculum.contents[0].completed = true;

        let pct = store
            .save_contents("rust-basics", &curriculum.contents)
            .await
            .unwrap();
        assert!((pct - 50.0).abs() < 1e-9);

        let reloaded = store.load("rust-basics").await.unwrap();
        assert!(reloaded.contents[0].completed);
        assert!(!reloaded.contents[1].completed);
        assert!((reloaded.progress_percent - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_save_contents_unknown_curriculum() {
        let pool = init_memory_database().await.unwrap();
        let store = SqliteCurriculumStore::new(pool);

        let result = store.save_contents("missing", &[]).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_computed_progress_percent_empty() {
        let c = Curriculum {
            id: "x".to_string(),
            title: "Empty".to_string(),
            contents: vec![],
            progress_percent: 0.0,
        };
        assert_eq!(c.computed_progress_percent(), 0.0);
    }
}
