//! Database initialization
//!
//! Creates the database on first run, applies the idempotent schema, and
//! seeds default settings so services start without manual setup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_connection(&pool).await?;
    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create an in-memory database with the full schema (tests, tooling)
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    configure_connection(&pool).await?;
    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    Ok(())
}

/// Apply the schema (idempotent, safe to call multiple times)
async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_curricula_table(pool).await?;
    create_content_items_table(pool).await?;
    create_position_checkpoints_table(pool).await?;

    Ok(())
}

/// Create the settings table
///
/// Stores service configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the curricula table
///
/// `progress_percent` is a derived summary recomputed on completion
/// write-back; the per-item completed flags are the source of truth.
pub async fn create_curricula_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS curricula (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            progress_percent REAL NOT NULL DEFAULT 0.0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the content_items table
///
/// One row per item; `seq` is the curriculum sequence position and is
/// rewritten on every full-list write-back.
pub async fn create_content_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_items (
            curriculum_guid TEXT NOT NULL REFERENCES curricula(guid) ON DELETE CASCADE,
            item_id INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            duration_label TEXT NOT NULL DEFAULT '',
            completed INTEGER NOT NULL DEFAULT 0,
            source_ref TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (curriculum_guid, item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the position_checkpoints table
///
/// One current checkpoint per (curriculum, item); rows are superseded by
/// newer writes, never explicitly deleted.
pub async fn create_position_checkpoints_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS position_checkpoints (
            curriculum_guid TEXT NOT NULL,
            item_id INTEGER NOT NULL,
            elapsed_seconds REAL NOT NULL,
            total_seconds REAL NOT NULL,
            captured_at TIMESTAMP NOT NULL,
            PRIMARY KEY (curriculum_guid, item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist with default values and resets
/// NULL values to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Tracker settings
    ensure_setting(pool, "tick_interval_ms", "1000").await?;
    ensure_setting(pool, "remote_write_interval_s", "5").await?;
    ensure_setting(pool, "advance_delay_ms", "1500").await?;

    // Identity of the learner this device tracks for
    let generated_user_id = uuid::Uuid::new_v4().to_string();
    ensure_setting(pool, "user_id", &generated_user_id).await?;

    info!("Default settings initialized");
    Ok(())
}

async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization races
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
