//! SoundCloud api-v2 client
//!
//! Resolves the artist's profile URL to a numeric user id, then reads the
//! public tracks / playlists / reposts / likes listings. All responses are
//! normalized into [`ContentRecord`] here; timestamps that fail to parse
//! stay `None` and are skipped downstream as malformed.

use super::{
    extract_features, format_track_duration, ContentRecord, FetchError, PlatformFetcher,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tunewatch_common::db::TrackedArtist;
use tunewatch_common::time;

const SOUNDCLOUD_BASE_URL: &str = "https://api-v2.soundcloud.com";
const USER_AGENT: &str = "tunewatch/0.1.0 (+https://github.com/tunewatch/tunewatch)";
const RATE_LIMIT_MS: u64 = 250;

/// SoundCloud user profile (resolve target)
#[derive(Debug, Clone, Deserialize)]
pub struct ScUser {
    pub id: u64,
    pub username: String,
    pub permalink_url: Option<String>,
    pub avatar_url: Option<String>,
    pub kind: Option<String>,
}

/// SoundCloud track
#[derive(Debug, Clone, Deserialize)]
pub struct ScTrack {
    pub id: u64,
    pub title: String,
    pub created_at: Option<String>,
    pub permalink_url: Option<String>,
    pub artwork_url: Option<String>,
    /// Milliseconds
    pub duration: Option<u64>,
    pub genre: Option<String>,
    pub user: Option<ScUser>,
}

/// SoundCloud playlist/album
#[derive(Debug, Clone, Deserialize)]
pub struct ScPlaylist {
    pub id: u64,
    pub title: String,
    pub created_at: Option<String>,
    pub permalink_url: Option<String>,
    pub artwork_url: Option<String>,
    /// Milliseconds, whole playlist
    pub duration: Option<u64>,
    pub track_count: Option<u32>,
    pub user: Option<ScUser>,
}

/// Entry of the reposts stream: the repost instant lives on the entry,
/// the content on the nested track.
#[derive(Debug, Clone, Deserialize)]
pub struct ScStreamItem {
    pub created_at: Option<String>,
    pub track: Option<ScTrack>,
}

/// Entry of the likes listing: `created_at` is the like instant.
#[derive(Debug, Clone, Deserialize)]
pub struct ScLikeItem {
    pub created_at: Option<String>,
    pub track: Option<ScTrack>,
}

/// Paged collection wrapper used by the stream/likes endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ScCollection<T> {
    pub collection: Vec<T>,
}

/// Minimum-interval limiter so a full roster pass stays polite upstream
struct RequestPacer {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RequestPacer {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// SoundCloud fetcher
pub struct SoundCloudFetcher {
    http: reqwest::Client,
    client_id: String,
    pacer: Arc<RequestPacer>,
    items_limit: u32,
}

impl SoundCloudFetcher {
    pub fn new(client_id: String, timeout_secs: u64, items_limit: u32) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        Ok(Self {
            http,
            client_id,
            pacer: Arc::new(RequestPacer::new(RATE_LIMIT_MS)),
            items_limit,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        self.pacer.wait().await;

        tracing::debug!(url = %url, "querying SoundCloud api-v2");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Transient(format!("response parse: {e}")))
    }

    /// Resolve the stored profile URL to the numeric user id
    async fn resolve_user(&self, artist: &TrackedArtist) -> Result<ScUser, FetchError> {
        let url = format!(
            "{SOUNDCLOUD_BASE_URL}/resolve?url={}&client_id={}",
            artist.artist_url, self.client_id
        );
        let user: ScUser = self.get_json(&url).await?;
        if user.kind.as_deref() == Some("user") || user.kind.is_none() {
            Ok(user)
        } else {
            Err(FetchError::NotFound(format!(
                "{} does not resolve to an artist profile",
                artist.artist_url
            )))
        }
    }

    fn track_record(&self, track: ScTrack, repost: bool, ts_override: Option<&str>) -> ContentRecord {
        let raw_ts = ts_override.or(track.created_at.as_deref());
        ContentRecord {
            id: Some(track.id.to_string()),
            url: track.permalink_url.clone(),
            release_date: raw_ts.and_then(time::parse_timestamp),
            cover_url: track
                .artwork_url
                .clone()
                .or_else(|| track.user.as_ref().and_then(|u| u.avatar_url.clone())),
            duration: track.duration.map(format_track_duration),
            track_count: 1,
            features: extract_features(&track.title),
            genres: track.genre.clone().filter(|g| !g.is_empty()).into_iter().collect(),
            artist_name: track
                .user
                .as_ref()
                .map(|u| u.username.clone())
                .unwrap_or_default(),
            title: track.title,
            repost,
        }
    }

    fn playlist_record(&self, playlist: ScPlaylist) -> ContentRecord {
        ContentRecord {
            id: Some(playlist.id.to_string()),
            url: playlist.permalink_url.clone(),
            release_date: playlist.created_at.as_deref().and_then(time::parse_timestamp),
            cover_url: playlist
                .artwork_url
                .clone()
                .or_else(|| playlist.user.as_ref().and_then(|u| u.avatar_url.clone())),
            duration: playlist.duration.map(format_track_duration),
            track_count: playlist.track_count.unwrap_or(0),
            features: extract_features(&playlist.title),
            genres: Vec::new(),
            artist_name: playlist
                .user
                .as_ref()
                .map(|u| u.username.clone())
                .unwrap_or_default(),
            title: playlist.title,
            repost: false,
        }
    }
}

#[async_trait]
impl PlatformFetcher for SoundCloudFetcher {
    async fn latest_release(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Option<ContentRecord>, FetchError> {
        let user = self.resolve_user(artist).await?;
        let url = format!(
            "{SOUNDCLOUD_BASE_URL}/users/{}/tracks?client_id={}&limit=1",
            user.id, self.client_id
        );
        let tracks: Vec<ScTrack> = self.get_json(&url).await?;
        Ok(tracks
            .into_iter()
            .next()
            .map(|t| self.track_record(t, false, None)))
    }

    async fn latest_playlist(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Option<ContentRecord>, FetchError> {
        let user = self.resolve_user(artist).await?;
        let url = format!(
            "{SOUNDCLOUD_BASE_URL}/users/{}/playlists?client_id={}&limit=1",
            user.id, self.client_id
        );
        let playlists: Vec<ScPlaylist> = self.get_json(&url).await?;
        Ok(playlists.into_iter().next().map(|p| self.playlist_record(p)))
    }

    async fn recent_reposts(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Vec<ContentRecord>, FetchError> {
        let user = self.resolve_user(artist).await?;
        let url = format!(
            "{SOUNDCLOUD_BASE_URL}/stream/users/{}/reposts?client_id={}&limit={}",
            user.id, self.client_id, self.items_limit
        );
        let page: ScCollection<ScStreamItem> = self.get_json(&url).await?;
        Ok(page
            .collection
            .into_iter()
            .filter_map(|item| {
                let reposted_at = item.created_at;
                item.track
                    .map(|t| self.track_record(t, true, reposted_at.as_deref()))
            })
            .collect())
    }

    async fn recent_likes(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Vec<ContentRecord>, FetchError> {
        let user = self.resolve_user(artist).await?;
        let url = format!(
            "{SOUNDCLOUD_BASE_URL}/users/{}/likes?client_id={}&limit={}",
            user.id, self.client_id, self.items_limit
        );
        let page: ScCollection<ScLikeItem> = self.get_json(&url).await?;
        Ok(page
            .collection
            .into_iter()
            .filter_map(|item| {
                let liked_at = item.created_at;
                item.track
                    .map(|t| self.track_record(t, false, liked_at.as_deref()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> SoundCloudFetcher {
        SoundCloudFetcher::new("test-client-id".to_string(), 10, 20).unwrap()
    }

    fn sample_track() -> ScTrack {
        serde_json::from_value(serde_json::json!({
            "id": 99,
            "title": "Night Drive (feat. Ada)",
            "created_at": "2024-03-01T00:00:00Z",
            "permalink_url": "https://soundcloud.com/tester/night-drive",
            "artwork_url": "https://i1.sndcdn.com/artworks-99.jpg",
            "duration": 185000,
            "genre": "house",
            "user": {"id": 7, "username": "Tester", "kind": "user"}
        }))
        .unwrap()
    }

    #[test]
    fn test_track_normalization() {
        let rec = fetcher().track_record(sample_track(), false, None);
        assert_eq!(rec.id.as_deref(), Some("99"));
        assert_eq!(rec.url.as_deref(), Some("https://soundcloud.com/tester/night-drive"));
        assert_eq!(rec.artist_name, "Tester");
        assert_eq!(rec.duration.as_deref(), Some("3:05"));
        assert_eq!(rec.features.as_deref(), Some("Ada"));
        assert_eq!(rec.genres, vec!["house".to_string()]);
        assert!(!rec.repost);
        assert!(rec.release_date.is_some());
    }

    #[test]
    fn test_repost_uses_repost_instant_not_track_date() {
        let rec = fetcher().track_record(sample_track(), true, Some("2024-04-05T12:00:00Z"));
        assert!(rec.repost);
        assert_eq!(
            rec.release_date,
            tunewatch_common::time::parse_timestamp("2024-04-05T12:00:00Z")
        );
    }

    #[test]
    fn test_malformed_timestamp_survives_as_none() {
        let mut track = sample_track();
        track.created_at = Some("???".to_string());
        let rec = fetcher().track_record(track, false, None);
        assert!(rec.release_date.is_none());
        // The record itself is intact; only the timestamp is missing.
        assert_eq!(rec.title, "Night Drive (feat. Ada)");
    }

    #[test]
    fn test_collection_deserialization() {
        let page: ScCollection<ScStreamItem> = serde_json::from_value(serde_json::json!({
            "collection": [
                {"created_at": "2024-04-05T12:00:00Z", "track": {"id": 1, "title": "A"}},
                {"created_at": "2024-04-04T12:00:00Z"}
            ]
        }))
        .unwrap();
        assert_eq!(page.collection.len(), 2);
        assert!(page.collection[0].track.is_some());
        assert!(page.collection[1].track.is_none());
    }
}
