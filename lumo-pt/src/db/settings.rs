//! Settings database access
//!
//! Read/write settings from the settings table (key-value store).
//! All settings are device-wide; the schema and defaults are owned by
//! lumo-common.

use crate::error::Result;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

/// Tick cadence in milliseconds, clamped to a sane range (100-5000)
pub async fn load_tick_interval_ms(db: &Pool<Sqlite>) -> Result<u32> {
    let value = get_setting::<u32>(db, "tick_interval_ms")
        .await?
        .unwrap_or(1000);
    Ok(value.clamp(100, 5000))
}

/// Remote write throttle interval in seconds (minimum 1)
pub async fn load_remote_write_interval_s(db: &Pool<Sqlite>) -> Result<u32> {
    let value = get_setting::<u32>(db, "remote_write_interval_s")
        .await?
        .unwrap_or(5);
    Ok(value.max(1))
}

/// User-visible delay before auto-advancing past a completed item
pub async fn load_advance_delay_ms(db: &Pool<Sqlite>) -> Result<u64> {
    Ok(get_setting::<u64>(db, "advance_delay_ms")
        .await?
        .unwrap_or(1500))
}

/// Learner identity this device tracks for
///
/// Generated on first run; an unparseable stored value is replaced with a
/// fresh UUID rather than failing startup.
pub async fn get_or_create_user_id(db: &Pool<Sqlite>) -> Result<Uuid> {
    if let Some(raw) = get_setting::<String>(db, "user_id").await? {
        match Uuid::parse_str(&raw) {
            Ok(id) => return Ok(id),
            Err(_) => {
                warn!("Stored user_id is not a UUID, regenerating");
            }
        }
    }

    let id = Uuid::new_v4();
    set_setting(db, "user_id", id.to_string()).await?;
    Ok(id)
}

/// Get a typed setting value, None when absent or unparseable
async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    Ok(value.flatten().and_then(|v| v.parse::<T>().ok()))
}

/// Set a setting value (upsert)
async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_common::db::init::init_memory_database;

    #[tokio::test]
    async fn test_defaults_apply_when_settings_missing() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("DELETE FROM settings").execute(&pool).await.unwrap();

        assert_eq!(load_tick_interval_ms(&pool).await.unwrap(), 1000);
        assert_eq!(load_remote_write_interval_s(&pool).await.unwrap(), 5);
        assert_eq!(load_advance_delay_ms(&pool).await.unwrap(), 1500);
    }

    #[tokio::test]
    async fn test_tick_interval_is_clamped() {
        let pool = init_memory_database().await.unwrap();

        set_setting(&pool, "tick_interval_ms", 10).await.unwrap();
        assert_eq!(load_tick_interval_ms(&pool).await.unwrap(), 100);

        set_setting(&pool, "tick_interval_ms", 60000).await.unwrap();
        assert_eq!(load_tick_interval_ms(&pool).await.unwrap(), 5000);
    }

    #[tokio::test]
    async fn test_unparseable_setting_reads_as_default() {
        let pool = init_memory_database().await.unwrap();

        set_setting(&pool, "remote_write_interval_s", "not-a-number")
            .await
            .unwrap();
        assert_eq!(load_remote_write_interval_s(&pool).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_user_id_roundtrip() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("DELETE FROM settings").execute(&pool).await.unwrap();

        let first = get_or_create_user_id(&pool).await.unwrap();
        let second = get_or_create_user_id(&pool).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_corrupt_user_id_is_regenerated() {
        let pool = init_memory_database().await.unwrap();

        set_setting(&pool, "user_id", "not-a-uuid").await.unwrap();
        let id = get_or_create_user_id(&pool).await.unwrap();

        // Regenerated and persisted
        let stored = get_setting::<String>(&pool, "user_id").await.unwrap().unwrap();
        assert_eq!(stored, id.to_string());
    }
}
