//! Platform fetcher adapters
//!
//! Fetchers return closed, explicitly-typed records validated at this
//! boundary; nothing dict-shaped ever reaches the change detector. Failures
//! are a typed result, never an exception-as-control-flow signal: a rate
//! limit is `FetchError::RateLimited`, which the scheduler turns into a
//! platform cooldown.

pub mod soundcloud;
pub mod spotify;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tunewatch_common::db::TrackedArtist;

pub use soundcloud::SoundCloudFetcher;
pub use spotify::SpotifyFetcher;

/// Typed fetch failure taxonomy
#[derive(Debug, Error)]
pub enum FetchError {
    /// Upstream signalled a rate/request limit; triggers platform cooldown
    #[error("rate limit exceeded")]
    RateLimited,

    /// Artist or resource not found upstream (deleted or renamed)
    #[error("not found: {0}")]
    NotFound(String),

    /// Network error or upstream 5xx; retried next cycle
    #[error("transient error: {0}")]
    Transient(String),
}

impl FetchError {
    /// Map an HTTP status to the failure taxonomy. 429 is the documented
    /// rate-limit status on both platforms; SoundCloud also serves 403 with
    /// a "rate/request limit" body when a client_id is exhausted.
    pub fn from_status(status: reqwest::StatusCode, body_hint: &str) -> FetchError {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return FetchError::RateLimited;
        }
        if status == reqwest::StatusCode::FORBIDDEN
            && body_hint.to_lowercase().contains("rate/request limit")
        {
            return FetchError::RateLimited;
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return FetchError::NotFound(body_hint.to_string());
        }
        FetchError::Transient(format!("upstream status {status}: {body_hint}"))
    }
}

/// A content item as observed upstream, normalized at the fetch boundary.
///
/// `release_date` stays optional: an unparseable upstream timestamp makes
/// the item malformed, and malformed items are skipped by the detector
/// instead of failing the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Platform-native track/album id, if any
    pub id: Option<String>,
    pub title: String,
    pub artist_name: String,
    pub url: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub cover_url: Option<String>,
    /// Formatted as m:ss
    pub duration: Option<String>,
    pub track_count: u32,
    pub features: Option<String>,
    pub genres: Vec<String>,
    pub repost: bool,
}

impl ContentRecord {
    /// Derive the most stable available identifier for deduplication:
    /// URL, then platform id, then title.
    pub fn content_id(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        if let Some(id) = self.id.as_deref().filter(|i| !i.is_empty()) {
            return Some(id.to_string());
        }
        if !self.title.is_empty() {
            return Some(self.title.clone());
        }
        None
    }
}

/// Fetches current platform state for a tracked artist.
///
/// Platforms without a content kind return `Ok(None)` / an empty list
/// rather than an error, so the scheduler needs no per-platform special
/// cases.
#[async_trait]
pub trait PlatformFetcher: Send + Sync {
    /// Single latest release, if the artist has any
    async fn latest_release(&self, artist: &TrackedArtist)
        -> Result<Option<ContentRecord>, FetchError>;

    /// Single latest playlist, if any
    async fn latest_playlist(&self, artist: &TrackedArtist)
        -> Result<Option<ContentRecord>, FetchError>;

    /// Recent reposts, newest first
    async fn recent_reposts(&self, artist: &TrackedArtist)
        -> Result<Vec<ContentRecord>, FetchError>;

    /// Recent likes, newest first
    async fn recent_likes(&self, artist: &TrackedArtist)
        -> Result<Vec<ContentRecord>, FetchError>;
}

#[async_trait]
impl<T: PlatformFetcher + ?Sized> PlatformFetcher for std::sync::Arc<T> {
    async fn latest_release(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Option<ContentRecord>, FetchError> {
        (**self).latest_release(artist).await
    }

    async fn latest_playlist(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Option<ContentRecord>, FetchError> {
        (**self).latest_playlist(artist).await
    }

    async fn recent_reposts(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Vec<ContentRecord>, FetchError> {
        (**self).recent_reposts(artist).await
    }

    async fn recent_likes(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Vec<ContentRecord>, FetchError> {
        (**self).recent_likes(artist).await
    }
}

/// Production fetcher set: one client per platform, dispatched by the
/// artist's platform.
pub struct PlatformClients {
    pub soundcloud: SoundCloudFetcher,
    pub spotify: SpotifyFetcher,
}

impl PlatformClients {
    fn client(&self, artist: &TrackedArtist) -> &dyn PlatformFetcher {
        match artist.platform {
            tunewatch_common::db::Platform::Soundcloud => &self.soundcloud,
            tunewatch_common::db::Platform::Spotify => &self.spotify,
        }
    }
}

#[async_trait]
impl PlatformFetcher for PlatformClients {
    async fn latest_release(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Option<ContentRecord>, FetchError> {
        self.client(artist).latest_release(artist).await
    }

    async fn latest_playlist(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Option<ContentRecord>, FetchError> {
        self.client(artist).latest_playlist(artist).await
    }

    async fn recent_reposts(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Vec<ContentRecord>, FetchError> {
        self.client(artist).recent_reposts(artist).await
    }

    async fn recent_likes(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Vec<ContentRecord>, FetchError> {
        self.client(artist).recent_likes(artist).await
    }
}

/// Convert milliseconds to m:ss
pub(crate) fn format_track_duration(milliseconds: u64) -> String {
    let seconds = milliseconds / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

static FEATURE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\(feat\.?\s*([^)]+)\)",
        r"(?i)\[feat\.?\s*([^\]]+)\]",
        r"(?i)\bft\.?\s+([^\-–(\[]+)",
        r"(?i)\bw/\s?([^)\-–]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("feature pattern must compile"))
    .collect()
});

/// Extract featured artists from a track title, e.g.
/// "Night Drive (feat. A & B)" -> "A, B". Returns None when nothing matches.
pub fn extract_features(title: &str) -> Option<String> {
    let mut names: Vec<String> = Vec::new();
    for pattern in FEATURE_PATTERNS.iter() {
        for caps in pattern.captures_iter(title) {
            let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            for name in raw
                .replace(" and ", ",")
                .split(['/', '&', ','])
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                if !names.iter().any(|existing| existing.eq_ignore_ascii_case(name)) {
                    names.push(name.to_string());
                }
            }
        }
    }
    if names.is_empty() {
        None
    } else {
        names.sort_by_key(|n| n.to_lowercase());
        Some(names.join(", "))
    }
}
