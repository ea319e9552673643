//! Spotify Web API client
//!
//! Uses the client-credentials flow; the access token is cached in-process
//! and refreshed shortly before expiry. Spotify only carries the release
//! kind for this service: playlists, reposts, and likes are SoundCloud
//! concepts, so those methods return empty results.

use super::{extract_features, ContentRecord, FetchError, PlatformFetcher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tunewatch_common::db::TrackedArtist;
use tunewatch_common::time;

const SPOTIFY_API_BASE_URL: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const USER_AGENT: &str = "tunewatch/0.1.0 (+https://github.com/tunewatch/tunewatch)";
/// Refresh this long before the token actually expires
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpImage {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpArtistRef {
    pub name: String,
}

/// Album/single entry of the artist-albums listing
#[derive(Debug, Clone, Deserialize)]
pub struct SpAlbum {
    pub id: String,
    pub name: String,
    pub release_date: Option<String>,
    pub total_tracks: Option<u32>,
    #[serde(default)]
    pub external_urls: Option<SpExternalUrls>,
    #[serde(default)]
    pub images: Vec<SpImage>,
    #[serde(default)]
    pub artists: Vec<SpArtistRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpAlbumsPage {
    pub items: Vec<SpAlbum>,
}

/// Spotify fetcher
pub struct SpotifyFetcher {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyFetcher {
    pub fn new(
        client_id: String,
        client_secret: String,
        timeout_secs: u64,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        Ok(Self {
            http,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    /// Current access token, refreshing through the client-credentials
    /// flow when missing or close to expiry.
    async fn access_token(&self) -> Result<String, FetchError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        tracing::debug!("refreshing Spotify access token");
        let response = self
            .http
            .post(SPOTIFY_TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("token parse: {e}")))?;

        let margin = Duration::from_secs(TOKEN_EXPIRY_MARGIN_SECS.min(token.expires_in));
        let entry = CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in) - margin,
        };
        *cached = Some(entry);
        Ok(token.access_token)
    }

    async fn get_albums(&self, artist_id: &str) -> Result<SpAlbumsPage, FetchError> {
        let token = self.access_token().await?;
        let url = format!(
            "{SPOTIFY_API_BASE_URL}/artists/{artist_id}/albums\
             ?include_groups=album,single&limit=10&market=US"
        );

        tracing::debug!(artist_id = %artist_id, "querying Spotify artist albums");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Token revoked early; drop the cache so the next cycle refreshes
            *self.token.lock().await = None;
            return Err(FetchError::Transient("access token rejected".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("response parse: {e}")))
    }
}

fn album_timestamp(album: &SpAlbum) -> Option<DateTime<Utc>> {
    album.release_date.as_deref().and_then(time::parse_timestamp)
}

fn album_record(album: SpAlbum) -> ContentRecord {
    let release_date = album_timestamp(&album);
    ContentRecord {
        id: Some(album.id),
        url: album.external_urls.and_then(|u| u.spotify),
        release_date,
        cover_url: album.images.first().map(|i| i.url.clone()),
        duration: None,
        track_count: album.total_tracks.unwrap_or(0),
        features: extract_features(&album.name),
        genres: Vec::new(),
        artist_name: album
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        title: album.name,
        repost: false,
    }
}

#[async_trait]
impl PlatformFetcher for SpotifyFetcher {
    async fn latest_release(
        &self,
        artist: &TrackedArtist,
    ) -> Result<Option<ContentRecord>, FetchError> {
        let page = self.get_albums(&artist.artist_id).await?;
        // The listing is not reliably date-ordered across album/single
        // groups; pick the newest parseable release date ourselves.
        let latest = page
            .items
            .into_iter()
            .filter(|album| album_timestamp(album).is_some())
            .max_by_key(album_timestamp);
        Ok(latest.map(album_record))
    }

    async fn latest_playlist(
        &self,
        _artist: &TrackedArtist,
    ) -> Result<Option<ContentRecord>, FetchError> {
        Ok(None)
    }

    async fn recent_reposts(
        &self,
        _artist: &TrackedArtist,
    ) -> Result<Vec<ContentRecord>, FetchError> {
        Ok(Vec::new())
    }

    async fn recent_likes(
        &self,
        _artist: &TrackedArtist,
    ) -> Result<Vec<ContentRecord>, FetchError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn album(id: &str, date: &str) -> SpAlbum {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": "Midnight EP",
            "release_date": date,
            "total_tracks": 4,
            "external_urls": {"spotify": format!("https://open.spotify.com/album/{id}")},
            "images": [{"url": "https://i.scdn.co/image/abc"}],
            "artists": [{"name": "Tester"}, {"name": "Guest"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_album_normalization() {
        let rec = album_record(album("al1", "2024-01-02"));
        assert_eq!(rec.id.as_deref(), Some("al1"));
        assert_eq!(rec.url.as_deref(), Some("https://open.spotify.com/album/al1"));
        assert_eq!(rec.artist_name, "Tester, Guest");
        assert_eq!(rec.track_count, 4);
        assert!(rec.release_date.is_some());
        assert!(!rec.repost);
    }

    #[test]
    fn test_date_only_release_parses_to_end_of_day() {
        let rec = album_record(album("al1", "2024-01-02"));
        let ts = rec.release_date.unwrap();
        assert_eq!(ts, time::parse_timestamp("2024-01-02").unwrap());
    }

    #[test]
    fn test_latest_selection_ignores_unparseable_dates() {
        let albums = vec![
            album("old", "2023-06-01"),
            album("garbled", "unknown"),
            album("new", "2024-01-02"),
        ];
        let latest = albums
            .into_iter()
            .filter(|a| album_timestamp(a).is_some())
            .max_by_key(album_timestamp)
            .unwrap();
        assert_eq!(latest.id, "new");
    }

    #[test]
    fn test_token_response_deserialization() {
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "tok",
            "token_type": "Bearer",
            "expires_in": 3600
        }))
        .unwrap();
        assert_eq!(token.access_token, "tok");
        assert_eq!(token.expires_in, 3600);
    }
}
