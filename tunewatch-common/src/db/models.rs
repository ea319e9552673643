//! Database models

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Music platform an artist is tracked on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Soundcloud,
    Spotify,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Soundcloud, Platform::Spotify];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Soundcloud => "soundcloud",
            Platform::Spotify => "spotify",
        }
    }

    pub fn parse(s: &str) -> Result<Platform> {
        match s {
            "soundcloud" => Ok(Platform::Soundcloud),
            "spotify" => Ok(Platform::Spotify),
            other => Err(Error::InvalidInput(format!("unknown platform: {other}"))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content kind with its own watermark and comparison policy.
///
/// `ALL` is in cycle processing order: release checks for the whole roster
/// complete before playlist checks begin, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Release,
    Playlist,
    Repost,
    Like,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Release,
        ContentKind::Playlist,
        ContentKind::Repost,
        ContentKind::Like,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Release => "release",
            ContentKind::Playlist => "playlist",
            ContentKind::Repost => "repost",
            ContentKind::Like => "like",
        }
    }

    /// Column in the `artists` table holding this kind's watermark
    pub fn watermark_column(&self) -> &'static str {
        match self {
            ContentKind::Release => "last_release_date",
            ContentKind::Playlist => "last_playlist_date",
            ContentKind::Repost => "last_repost_date",
            ContentKind::Like => "last_like_date",
        }
    }

    /// Single-latest kinds compare only the newest fetched item against the
    /// watermark; multi-item kinds consult the dedup ledger per item.
    pub fn is_single_latest(&self) -> bool {
        matches!(self, ContentKind::Release | ContentKind::Playlist)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a tracked artist row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtistKey {
    pub platform: Platform,
    pub artist_id: String,
    pub owner_id: String,
    pub guild_id: String,
}

/// An artist tracked for a guild by an owner.
///
/// Watermarks are nullable: NULL means the kind has never been polled and
/// never been seeded. Tracking seeds all four to the tracking instant so
/// pre-existing content is never reported as new.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedArtist {
    pub platform: Platform,
    pub artist_id: String,
    pub artist_name: String,
    pub artist_url: String,
    pub owner_id: String,
    pub guild_id: String,
    pub genres: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_release_date: Option<DateTime<Utc>>,
    pub last_playlist_date: Option<DateTime<Utc>>,
    pub last_repost_date: Option<DateTime<Utc>>,
    pub last_like_date: Option<DateTime<Utc>>,
}

impl TrackedArtist {
    pub fn key(&self) -> ArtistKey {
        ArtistKey {
            platform: self.platform,
            artist_id: self.artist_id.clone(),
            owner_id: self.owner_id.clone(),
            guild_id: self.guild_id.clone(),
        }
    }

    pub fn watermark(&self, kind: ContentKind) -> Option<DateTime<Utc>> {
        match kind {
            ContentKind::Release => self.last_release_date,
            ContentKind::Playlist => self.last_playlist_date,
            ContentKind::Repost => self.last_repost_date,
            ContentKind::Like => self.last_like_date,
        }
    }
}

/// Composite key of the dedup ledger. Presence of a row for this key is
/// definitive proof a notification was already sent for the item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub platform: Platform,
    pub artist_id: String,
    pub guild_id: String,
    pub kind: ContentKind,
    pub content_id: String,
}

impl DedupKey {
    pub fn new(artist: &TrackedArtist, kind: ContentKind, content_id: impl Into<String>) -> Self {
        Self {
            platform: artist.platform,
            artist_id: artist.artist_id.clone(),
            guild_id: artist.guild_id.clone(),
            kind,
            content_id: content_id.into(),
        }
    }
}

/// Per-guild, per-platform notification channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub guild_id: String,
    pub platform: Platform,
    pub webhook_url: String,
}

/// A registered user allowed to track artists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub registered_at: DateTime<Utc>,
}
