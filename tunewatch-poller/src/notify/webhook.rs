//! Webhook notifier
//!
//! Posts Discord-compatible embed payloads to the webhook configured for
//! the artist's (guild, platform) pair. A missing channel is a delivery
//! failure, not a silent skip: the item stays uncommitted and is retried
//! once a channel is configured.

use super::{DeliveryError, Notifier};
use crate::fetch::ContentRecord;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use tunewatch_common::db::{ContentKind, Platform, Store, TrackedArtist};

/// Embed accent colors per platform (Spotify green, SoundCloud orange)
const COLOR_SPOTIFY: u32 = 0x1DB954;
const COLOR_SOUNDCLOUD: u32 = 0xFF5500;

pub struct WebhookNotifier {
    store: Store,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(store: Store, timeout_secs: u64) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DeliveryError::Network(e.to_string()))?;
        Ok(Self { store, http })
    }

    fn headline(kind: ContentKind, artist: &TrackedArtist) -> String {
        match kind {
            ContentKind::Release => format!("New release from {}", artist.artist_name),
            ContentKind::Playlist => format!("New playlist from {}", artist.artist_name),
            ContentKind::Repost => format!("{} reposted a track", artist.artist_name),
            ContentKind::Like => format!("{} liked a track", artist.artist_name),
        }
    }

    /// Build the webhook payload: one embed, fields only for data we have.
    fn payload(artist: &TrackedArtist, kind: ContentKind, record: &ContentRecord) -> serde_json::Value {
        let color = match artist.platform {
            Platform::Spotify => COLOR_SPOTIFY,
            Platform::Soundcloud => COLOR_SOUNDCLOUD,
        };

        let mut fields = vec![json!({
            "name": "Artist",
            "value": record.artist_name.clone(),
            "inline": true,
        })];
        if let Some(date) = record.release_date {
            fields.push(json!({
                "name": "Date",
                "value": date.format("%Y-%m-%d").to_string(),
                "inline": true,
            }));
        }
        if let Some(duration) = &record.duration {
            fields.push(json!({"name": "Duration", "value": duration, "inline": true}));
        }
        if record.track_count > 1 {
            fields.push(json!({"name": "Tracks", "value": record.track_count.to_string(), "inline": true}));
        }
        if let Some(features) = &record.features {
            fields.push(json!({"name": "Featuring", "value": features, "inline": false}));
        }
        if !record.genres.is_empty() {
            fields.push(json!({"name": "Genres", "value": record.genres.join(", "), "inline": false}));
        }

        let mut embed = json!({
            "title": format!("{} — {}", Self::headline(kind, artist), record.title),
            "color": color,
            "fields": fields,
        });
        if let Some(url) = &record.url {
            embed["url"] = json!(url);
        }
        if let Some(cover) = &record.cover_url {
            embed["thumbnail"] = json!({"url": cover});
        }

        json!({"embeds": [embed]})
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        artist: &TrackedArtist,
        kind: ContentKind,
        record: &ContentRecord,
    ) -> Result<(), DeliveryError> {
        let webhook_url = self
            .store
            .channel(&artist.guild_id, artist.platform)
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?
            .ok_or_else(|| DeliveryError::NoChannel {
                guild_id: artist.guild_id.clone(),
                platform: artist.platform.to_string(),
            })?;

        let body = Self::payload(artist, kind, record);
        debug!(guild = %artist.guild_id, kind = %kind, title = %record.title, "posting webhook");

        let response = self
            .http
            .post(&webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    fn artist() -> TrackedArtist {
        TrackedArtist {
            platform: Platform::Soundcloud,
            artist_id: "tester".to_string(),
            artist_name: "Tester".to_string(),
            artist_url: "https://soundcloud.com/tester".to_string(),
            owner_id: "owner".to_string(),
            guild_id: "guild".to_string(),
            genres: vec![],
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            last_release_date: None,
            last_playlist_date: None,
            last_repost_date: None,
            last_like_date: None,
        }
    }

    fn record() -> ContentRecord {
        ContentRecord {
            id: Some("99".to_string()),
            title: "Night Drive".to_string(),
            artist_name: "Tester".to_string(),
            url: Some("https://soundcloud.com/tester/night-drive".to_string()),
            release_date: Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
            cover_url: Some("https://i1.sndcdn.com/artworks-99.jpg".to_string()),
            duration: Some("3:05".to_string()),
            track_count: 1,
            features: None,
            genres: vec!["house".to_string()],
            repost: false,
        }
    }

    #[test]
    fn test_payload_shape() {
        let payload = WebhookNotifier::payload(&artist(), ContentKind::Release, &record());
        let embed = &payload["embeds"][0];

        assert_eq!(embed["title"], "New release from Tester — Night Drive");
        assert_eq!(embed["url"], "https://soundcloud.com/tester/night-drive");
        assert_eq!(embed["color"], COLOR_SOUNDCLOUD);
        assert_eq!(embed["thumbnail"]["url"], "https://i1.sndcdn.com/artworks-99.jpg");

        let fields = embed["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["name"] == "Date" && f["value"] == "2024-01-02"));
        assert!(fields.iter().any(|f| f["name"] == "Genres" && f["value"] == "house"));
    }

    #[test]
    fn test_payload_omits_missing_fields() {
        let mut rec = record();
        rec.cover_url = None;
        rec.duration = None;
        rec.genres.clear();

        let payload = WebhookNotifier::payload(&artist(), ContentKind::Like, &rec);
        let embed = &payload["embeds"][0];

        assert!(embed.get("thumbnail").is_none());
        let fields = embed["fields"].as_array().unwrap();
        assert!(!fields.iter().any(|f| f["name"] == "Duration"));
        assert!(!fields.iter().any(|f| f["name"] == "Genres"));
    }

    #[test]
    fn test_headline_per_kind() {
        let a = artist();
        assert_eq!(WebhookNotifier::headline(ContentKind::Repost, &a), "Tester reposted a track");
        assert_eq!(WebhookNotifier::headline(ContentKind::Like, &a), "Tester liked a track");
    }
}
