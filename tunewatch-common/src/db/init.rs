//! Database initialization
//!
//! Schema creation is idempotent: every statement is CREATE TABLE IF NOT
//! EXISTS / INSERT OR IGNORE, so startup against an existing database is a
//! no-op and two racing initializers converge on the same state.

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
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL mode allows the poll loop to write while API handlers read
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_all_tables(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// In-memory database for tests. A single connection is mandatory: each
/// `sqlite::memory:` connection would otherwise open its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_all_tables(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent, safe to call multiple times)
pub async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_artists_table(pool).await?;
    create_channels_table(pool).await?;
    create_notified_items_table(pool).await?;
    create_settings_table(pool).await?;
    Ok(())
}

/// Drop every tunewatch table. Used by the reset-state maintenance binary.
pub async fn drop_all_tables(pool: &SqlitePool) -> Result<()> {
    for table in ["notified_items", "channels", "artists", "users", "settings"] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(pool)
            .await?;
    }
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            registered_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the artists table
///
/// Watermark columns are nullable TEXT holding RFC 3339 UTC timestamps.
/// NULL is "never polled, never seeded" and is distinct from any sentinel.
async fn create_artists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            platform TEXT NOT NULL CHECK (platform IN ('soundcloud', 'spotify')),
            artist_id TEXT NOT NULL,
            artist_name TEXT NOT NULL,
            artist_url TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            guild_id TEXT NOT NULL,
            genres TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            last_release_date TEXT,
            last_playlist_date TEXT,
            last_repost_date TEXT,
            last_like_date TEXT,
            PRIMARY KEY (platform, artist_id, owner_id, guild_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artists_guild ON artists(guild_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artists_owner ON artists(owner_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_channels_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            guild_id TEXT NOT NULL,
            platform TEXT NOT NULL CHECK (platform IN ('soundcloud', 'spotify')),
            webhook_url TEXT NOT NULL,
            PRIMARY KEY (guild_id, platform)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the dedup ledger table
///
/// The primary key is the whole dedup key; `mark_notified` relies on the
/// uniqueness constraint so concurrent marks resolve to "already marked"
/// instead of erroring or double-inserting.
async fn create_notified_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notified_items (
            platform TEXT NOT NULL,
            artist_id TEXT NOT NULL,
            guild_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('release', 'playlist', 'repost', 'like')),
            content_id TEXT NOT NULL,
            notified_at TEXT NOT NULL,
            PRIMARY KEY (platform, artist_id, guild_id, kind, content_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores runtime configuration key-value pairs.
async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
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

/// Initialize or update default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Poll loop settings
    ensure_setting(pool, "poll_interval_secs", "300").await?;
    ensure_setting(pool, "platform_cooldown_secs", "43200").await?; // 12 hours

    // Fetcher settings
    ensure_setting(pool, "fetch_timeout_secs", "10").await?;
    ensure_setting(pool, "fetch_items_limit", "20").await?;

    // HTTP server settings
    ensure_setting(pool, "http_request_timeout_ms", "30000").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value.
///
/// If the setting doesn't exist, it is created with the default.
/// If the setting exists but has a NULL value, it is reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization races:
        // multiple tasks may pass the exists check simultaneously
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;
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
