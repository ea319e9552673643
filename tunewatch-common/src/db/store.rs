//! State store: per-artist watermarks, the dedup ledger, tracked-artist
//! rows, channel configuration, users, and runtime settings.
//!
//! Every write is a single statement, so each call is atomic on its own.
//! `mark_notified` serializes through the ledger's primary key: concurrent
//! marks for the same item resolve to "already marked" rather than erroring,
//! which keeps the at-most-once guarantee even if artist processing is ever
//! parallelized.

use crate::db::models::{
    ArtistKey, ChannelConfig, ContentKind, DedupKey, Platform, TrackedArtist, User,
};
use crate::{time, Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

/// Raw artists row; converted to [`TrackedArtist`] after parsing the
/// platform discriminant, genre list, and stored timestamps.
#[derive(FromRow)]
struct ArtistRow {
    platform: String,
    artist_id: String,
    artist_name: String,
    artist_url: String,
    owner_id: String,
    guild_id: String,
    genres: String,
    created_at: String,
    last_release_date: Option<String>,
    last_playlist_date: Option<String>,
    last_repost_date: Option<String>,
    last_like_date: Option<String>,
}

impl ArtistRow {
    fn into_artist(self) -> Result<TrackedArtist> {
        let parse_opt = |raw: &Option<String>| raw.as_deref().and_then(time::parse_timestamp);
        Ok(TrackedArtist {
            platform: Platform::parse(&self.platform)?,
            artist_name: self.artist_name,
            artist_url: self.artist_url,
            genres: serde_json::from_str(&self.genres).unwrap_or_default(),
            created_at: time::parse_timestamp(&self.created_at)
                .ok_or_else(|| Error::Internal(format!(
                    "unparseable created_at for artist {}: {}",
                    self.artist_id, self.created_at
                )))?,
            last_release_date: parse_opt(&self.last_release_date),
            last_playlist_date: parse_opt(&self.last_playlist_date),
            last_repost_date: parse_opt(&self.last_repost_date),
            last_like_date: parse_opt(&self.last_like_date),
            artist_id: self.artist_id,
            owner_id: self.owner_id,
            guild_id: self.guild_id,
        })
    }
}

const ARTIST_COLUMNS: &str = "platform, artist_id, artist_name, artist_url, owner_id, guild_id, \
     genres, created_at, last_release_date, last_playlist_date, last_repost_date, last_like_date";

/// Durable state store backed by SQLite
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- Watermarks ----

    /// Stored watermark for one content kind, or None if never set
    pub async fn watermark(
        &self,
        key: &ArtistKey,
        kind: ContentKind,
    ) -> Result<Option<DateTime<Utc>>> {
        let sql = format!(
            "SELECT {} FROM artists \
             WHERE platform = ? AND artist_id = ? AND owner_id = ? AND guild_id = ?",
            kind.watermark_column()
        );
        let raw: Option<Option<String>> = sqlx::query_scalar(&sql)
            .bind(key.platform.as_str())
            .bind(&key.artist_id)
            .bind(&key.owner_id)
            .bind(&key.guild_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(raw.flatten().as_deref().and_then(time::parse_timestamp))
    }

    /// Overwrite a watermark unconditionally
    pub async fn set_watermark(
        &self,
        key: &ArtistKey,
        kind: ContentKind,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE artists SET {} = ? \
             WHERE platform = ? AND artist_id = ? AND owner_id = ? AND guild_id = ?",
            kind.watermark_column()
        );
        sqlx::query(&sql)
            .bind(time::to_storage(&ts))
            .bind(key.platform.as_str())
            .bind(&key.artist_id)
            .bind(&key.owner_id)
            .bind(&key.guild_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Advance a watermark monotonically: the stored value only moves
    /// forward, so replaying a partially-committed cycle can never regress
    /// the cutoff. Seeding from NULL is the same operation.
    pub async fn advance_watermark(
        &self,
        key: &ArtistKey,
        kind: ContentKind,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        let column = kind.watermark_column();
        let stored = time::to_storage(&ts);
        let sql = format!(
            "UPDATE artists SET {column} = ? \
             WHERE platform = ? AND artist_id = ? AND owner_id = ? AND guild_id = ? \
               AND ({column} IS NULL OR {column} < ?)"
        );
        sqlx::query(&sql)
            .bind(&stored)
            .bind(key.platform.as_str())
            .bind(&key.artist_id)
            .bind(&key.owner_id)
            .bind(&key.guild_id)
            .bind(&stored)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- Dedup ledger ----

    /// Whether a notification was already sent for this item
    pub async fn is_notified(&self, key: &DedupKey) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM notified_items \
             WHERE platform = ? AND artist_id = ? AND guild_id = ? AND kind = ? AND content_id = ?",
        )
        .bind(key.platform.as_str())
        .bind(&key.artist_id)
        .bind(&key.guild_id)
        .bind(key.kind.as_str())
        .bind(&key.content_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Record that a notification was sent. Idempotent: returns true if the
    /// record was newly inserted, false if it already existed.
    pub async fn mark_notified(&self, key: &DedupKey) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO notified_items \
             (platform, artist_id, guild_id, kind, content_id, notified_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(key.platform.as_str())
        .bind(&key.artist_id)
        .bind(&key.guild_id)
        .bind(key.kind.as_str())
        .bind(&key.content_id)
        .bind(time::to_storage(&time::now()))
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!(content_id = %key.content_id, kind = %key.kind, "ledger entry already present");
        }
        Ok(inserted)
    }

    // ---- Tracked artists ----

    pub async fn add_artist(&self, artist: &TrackedArtist) -> Result<()> {
        let opt = |ts: &Option<DateTime<Utc>>| ts.as_ref().map(time::to_storage);
        sqlx::query(
            "INSERT OR REPLACE INTO artists \
             (platform, artist_id, artist_name, artist_url, owner_id, guild_id, genres, \
              created_at, last_release_date, last_playlist_date, last_repost_date, last_like_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(artist.platform.as_str())
        .bind(&artist.artist_id)
        .bind(&artist.artist_name)
        .bind(&artist.artist_url)
        .bind(&artist.owner_id)
        .bind(&artist.guild_id)
        .bind(serde_json::to_string(&artist.genres).unwrap_or_else(|_| "[]".into()))
        .bind(time::to_storage(&artist.created_at))
        .bind(opt(&artist.last_release_date))
        .bind(opt(&artist.last_playlist_date))
        .bind(opt(&artist.last_repost_date))
        .bind(opt(&artist.last_like_date))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete an artist row. Returns true if a row was removed.
    pub async fn remove_artist(&self, key: &ArtistKey) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM artists \
             WHERE platform = ? AND artist_id = ? AND owner_id = ? AND guild_id = ?",
        )
        .bind(key.platform.as_str())
        .bind(&key.artist_id)
        .bind(&key.owner_id)
        .bind(&key.guild_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn artist_exists(
        &self,
        platform: Platform,
        artist_id: &str,
        owner_id: &str,
        guild_id: &str,
    ) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM artists \
             WHERE platform = ? AND artist_id = ? AND owner_id = ? AND guild_id = ?",
        )
        .bind(platform.as_str())
        .bind(artist_id)
        .bind(owner_id)
        .bind(guild_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Full roster, ordered for stable cycle iteration
    pub async fn list_artists(&self) -> Result<Vec<TrackedArtist>> {
        let sql = format!(
            "SELECT {ARTIST_COLUMNS} FROM artists ORDER BY platform, artist_name, guild_id"
        );
        let rows: Vec<ArtistRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(ArtistRow::into_artist).collect()
    }

    pub async fn list_artists_by_owner(&self, owner_id: &str) -> Result<Vec<TrackedArtist>> {
        let sql = format!(
            "SELECT {ARTIST_COLUMNS} FROM artists WHERE owner_id = ? ORDER BY artist_name"
        );
        let rows: Vec<ArtistRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ArtistRow::into_artist).collect()
    }

    // ---- Notification channels ----

    pub async fn set_channel(&self, config: &ChannelConfig) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO channels (guild_id, platform, webhook_url) VALUES (?, ?, ?)",
        )
        .bind(&config.guild_id)
        .bind(config.platform.as_str())
        .bind(&config.webhook_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn channel(&self, guild_id: &str, platform: Platform) -> Result<Option<String>> {
        let url: Option<String> = sqlx::query_scalar(
            "SELECT webhook_url FROM channels WHERE guild_id = ? AND platform = ?",
        )
        .bind(guild_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(url)
    }

    // ---- Users ----

    pub async fn register_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO users (user_id, username, registered_at) VALUES (?, ?, ?)",
        )
        .bind(&user.user_id)
        .bind(&user.username)
        .bind(time::to_storage(&user.registered_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_registered(&self, user_id: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    // ---- Settings ----

    pub async fn setting(&self, key: &str) -> Result<Option<String>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.flatten())
    }

    /// Counts per platform for the status endpoint
    pub async fn artist_counts(&self) -> Result<Vec<(Platform, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT platform, COUNT(*) FROM artists GROUP BY platform")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|(platform, count)| Ok((Platform::parse(&platform)?, count)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;
    use chrono::TimeZone;

    fn artist(platform: Platform, id: &str) -> TrackedArtist {
        TrackedArtist {
            platform,
            artist_id: id.to_string(),
            artist_name: format!("artist-{id}"),
            artist_url: format!("https://example.com/{id}"),
            owner_id: "owner-1".to_string(),
            guild_id: "guild-1".to_string(),
            genres: vec!["house".to_string()],
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            last_release_date: None,
            last_playlist_date: None,
            last_repost_date: None,
            last_like_date: None,
        }
    }

    async fn store() -> Store {
        Store::new(init_memory_database().await.unwrap())
    }

    #[tokio::test]
    async fn test_watermark_null_until_set() {
        let store = store().await;
        let a = artist(Platform::Soundcloud, "a1");
        store.add_artist(&a).await.unwrap();

        let key = a.key();
        assert!(store.watermark(&key, ContentKind::Release).await.unwrap().is_none());

        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        store.set_watermark(&key, ContentKind::Release, ts).await.unwrap();
        assert_eq!(store.watermark(&key, ContentKind::Release).await.unwrap(), Some(ts));

        // Other kinds remain unset
        assert!(store.watermark(&key, ContentKind::Like).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_advance_watermark_is_monotonic() {
        let store = store().await;
        let a = artist(Platform::Soundcloud, "a1");
        store.add_artist(&a).await.unwrap();
        let key = a.key();

        let newer = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let older = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        // Seeding from NULL
        store.advance_watermark(&key, ContentKind::Like, newer).await.unwrap();
        assert_eq!(store.watermark(&key, ContentKind::Like).await.unwrap(), Some(newer));

        // Older timestamp never regresses the cutoff
        store.advance_watermark(&key, ContentKind::Like, older).await.unwrap();
        assert_eq!(store.watermark(&key, ContentKind::Like).await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn test_mark_notified_idempotent() {
        let store = store().await;
        let a = artist(Platform::Soundcloud, "a1");
        store.add_artist(&a).await.unwrap();

        let key = DedupKey::new(&a, ContentKind::Repost, "https://example.com/r1");
        assert!(!store.is_notified(&key).await.unwrap());

        assert!(store.mark_notified(&key).await.unwrap());
        assert!(store.is_notified(&key).await.unwrap());

        // Second mark resolves to "already marked"
        assert!(!store.mark_notified(&key).await.unwrap());
        assert!(store.is_notified(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_artist_round_trip_preserves_watermarks() {
        let store = store().await;
        let mut a = artist(Platform::Spotify, "sp1");
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        a.last_release_date = Some(ts);
        store.add_artist(&a).await.unwrap();

        let listed = store.list_artists().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].platform, Platform::Spotify);
        assert_eq!(listed[0].last_release_date, Some(ts));
        assert_eq!(listed[0].last_like_date, None);
        assert_eq!(listed[0].genres, vec!["house".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_artist() {
        let store = store().await;
        let a = artist(Platform::Soundcloud, "a1");
        store.add_artist(&a).await.unwrap();

        assert!(store.remove_artist(&a.key()).await.unwrap());
        assert!(!store.remove_artist(&a.key()).await.unwrap());
        assert!(store.list_artists().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_channel_config() {
        let store = store().await;
        assert!(store.channel("g1", Platform::Soundcloud).await.unwrap().is_none());

        store
            .set_channel(&ChannelConfig {
                guild_id: "g1".to_string(),
                platform: Platform::Soundcloud,
                webhook_url: "https://hooks.example/abc".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            store.channel("g1", Platform::Soundcloud).await.unwrap().as_deref(),
            Some("https://hooks.example/abc")
        );
        // Per-platform: spotify stays unconfigured
        assert!(store.channel("g1", Platform::Spotify).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_registration() {
        let store = store().await;
        assert!(!store.is_registered("u1").await.unwrap());

        store
            .register_user(&User {
                user_id: "u1".to_string(),
                username: "listener".to_string(),
                registered_at: time::now(),
            })
            .await
            .unwrap();

        assert!(store.is_registered("u1").await.unwrap());
    }
}
