//! Command-surface operations
//!
//! Mutations on the tracked-artist roster, exposed over the HTTP API and
//! kept outside the poll loop's concern. The one correctness-critical rule
//! lives here: tracking seeds every watermark to the tracking instant —
//! never to an upstream-supplied historical date — so the first real poll
//! already has a cutoff and pre-existing content is not reported as new.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use tunewatch_common::db::{ArtistKey, ChannelConfig, Platform, Store, TrackedArtist, User};
use tunewatch_common::Error as CommonError;

/// Request to start tracking an artist
#[derive(Debug, Clone, Deserialize)]
pub struct TrackRequest {
    pub platform: Platform,
    pub artist_id: String,
    pub artist_name: String,
    pub artist_url: String,
    pub owner_id: String,
    pub guild_id: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Start tracking an artist for a guild.
///
/// The owner must be registered; re-tracking an already-tracked artist is
/// rejected rather than silently resetting its watermarks.
pub async fn track_artist(
    store: &Store,
    request: TrackRequest,
    now: DateTime<Utc>,
) -> Result<TrackedArtist> {
    if !store.is_registered(&request.owner_id).await? {
        return Err(CommonError::InvalidInput(format!(
            "owner {} is not registered",
            request.owner_id
        ))
        .into());
    }

    if store
        .artist_exists(
            request.platform,
            &request.artist_id,
            &request.owner_id,
            &request.guild_id,
        )
        .await?
    {
        return Err(CommonError::InvalidInput(format!(
            "artist {} already tracked",
            request.artist_id
        ))
        .into());
    }

    let artist = TrackedArtist {
        platform: request.platform,
        artist_id: request.artist_id,
        artist_name: request.artist_name,
        artist_url: request.artist_url,
        owner_id: request.owner_id,
        guild_id: request.guild_id,
        genres: request.genres,
        created_at: now,
        // Seed all four watermarks to the tracking instant: the backlog of
        // pre-existing releases/likes/reposts/playlists is already "seen".
        last_release_date: Some(now),
        last_playlist_date: Some(now),
        last_repost_date: Some(now),
        last_like_date: Some(now),
    };

    store.add_artist(&artist).await?;
    info!(
        artist = %artist.artist_name,
        platform = %artist.platform,
        guild = %artist.guild_id,
        "now tracking"
    );
    Ok(artist)
}

/// Stop tracking an artist. Returns false when nothing was tracked.
pub async fn untrack_artist(store: &Store, key: &ArtistKey) -> Result<bool> {
    let removed = store.remove_artist(key).await?;
    if removed {
        info!(artist = %key.artist_id, guild = %key.guild_id, "stopped tracking");
    }
    Ok(removed)
}

/// List an owner's tracked artists
pub async fn list_artists(store: &Store, owner_id: &str) -> Result<Vec<TrackedArtist>> {
    Ok(store.list_artists_by_owner(owner_id).await?)
}

/// Configure the notification webhook for a (guild, platform) pair
pub async fn set_notification_channel(
    store: &Store,
    guild_id: String,
    platform: Platform,
    webhook_url: String,
) -> Result<()> {
    if webhook_url.trim().is_empty() {
        return Err(CommonError::InvalidInput("webhook_url must not be empty".into()).into());
    }
    store
        .set_channel(&ChannelConfig {
            guild_id,
            platform,
            webhook_url,
        })
        .await?;
    Ok(())
}

/// Register a user so they may track artists
pub async fn register_user(store: &Store, user_id: String, username: String) -> Result<User> {
    let user = User {
        user_id,
        username,
        registered_at: tunewatch_common::time::now(),
    };
    store.register_user(&user).await?;
    Ok(user)
}
