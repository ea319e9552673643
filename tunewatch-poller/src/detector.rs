//! Change detection
//!
//! Pure decision logic: given the stored watermark for one content kind,
//! the set of already-notified content ids, and the freshly fetched
//! candidates, decide which items are genuinely new and what the next
//! watermark should become. No network, no database — the scheduler feeds
//! this function and commits its output after delivery is confirmed.
//!
//! Per-kind policy:
//! - Release/Playlist: only the single latest item matters. Without a prior
//!   watermark the item's date seeds the watermark and nothing is notified
//!   (bootstrap); with one, strictly-newer notifies and advances.
//! - Repost/Like: every candidate is checked against the dedup ledger
//!   first — a ledgered id never notifies again, even if its timestamp
//!   looks new. Unledgered items must still be strictly newer than the
//!   watermark. Both kinds advance their watermark, which bounds ledger
//!   growth (the ledger alone would already prevent repeats).

use crate::fetch::ContentRecord;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;
use tunewatch_common::db::ContentKind;

/// Inputs for one (artist, kind) decision
pub struct DetectInput<'a> {
    pub kind: ContentKind,
    pub watermark: Option<DateTime<Utc>>,
    /// Content ids already present in the dedup ledger
    pub ledgered: &'a HashSet<String>,
    pub candidates: Vec<ContentRecord>,
}

/// One item that should be notified
#[derive(Debug, Clone)]
pub struct PendingNotification {
    pub content_id: String,
    pub timestamp: DateTime<Utc>,
    pub record: ContentRecord,
}

/// Result of a decision pass
#[derive(Debug, Default)]
pub struct Detection {
    /// Items to notify, oldest first so deliveries read chronologically
    pub notify: Vec<PendingNotification>,
    /// Set when there was no prior watermark: seed to this instant and do
    /// not notify (prevents a flood of pre-existing content)
    pub seed_watermark: Option<DateTime<Utc>>,
    /// Candidates dropped for a missing/unparseable timestamp or id
    pub skipped_malformed: usize,
}

/// Decide which candidates are new for one artist and content kind.
pub fn decide(input: DetectInput<'_>) -> Detection {
    let mut detection = Detection::default();
    let kind = input.kind;

    // Validate candidates once: every decision below needs both a stable
    // id and a comparison timestamp. Duplicated ids within the batch are
    // processed once (first occurrence wins).
    let mut seen_in_batch: HashSet<String> = HashSet::new();
    let mut valid: Vec<PendingNotification> = Vec::new();
    for record in input.candidates {
        let (content_id, timestamp) = match (record.content_id(), record.release_date) {
            (Some(id), Some(ts)) => (id, ts),
            _ => {
                debug!(kind = %kind, title = %record.title, "skipping malformed candidate");
                detection.skipped_malformed += 1;
                continue;
            }
        };
        if !seen_in_batch.insert(content_id.clone()) {
            continue;
        }
        valid.push(PendingNotification { content_id, timestamp, record });
    }

    if valid.is_empty() {
        return detection;
    }

    if kind.is_single_latest() {
        // Only the newest fetched item matters.
        let Some(latest) = valid.into_iter().max_by_key(|item| item.timestamp) else {
            return detection;
        };

        match input.watermark {
            None => {
                // Bootstrap: remember where "new" starts, report nothing.
                detection.seed_watermark = Some(latest.timestamp);
            }
            Some(watermark) if latest.timestamp > watermark => {
                detection.notify.push(latest);
            }
            Some(_) => {} // equal or older: already seen (idempotent re-poll)
        }
        return detection;
    }

    // Multi-item kinds: ledger first, then the watermark cutoff.
    let Some(watermark) = input.watermark else {
        // No watermark was ever seeded for this kind (pre-existing rows
        // from before the kind was tracked). Same bootstrap rule: seed to
        // the newest candidate, notify nothing.
        detection.seed_watermark = valid.iter().map(|item| item.timestamp).max();
        return detection;
    };

    for item in valid {
        if input.ledgered.contains(&item.content_id) {
            continue;
        }
        if item.timestamp <= watermark {
            continue; // stale
        }
        detection.notify.push(item);
    }
    detection.notify.sort_by_key(|item| item.timestamp);
    detection
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(raw: &str) -> DateTime<Utc> {
        tunewatch_common::time::parse_timestamp(raw).unwrap()
    }

    fn record(id: &str, date: Option<&str>) -> ContentRecord {
        ContentRecord {
            id: Some(id.to_string()),
            title: format!("track-{id}"),
            artist_name: "Tester".to_string(),
            url: Some(format!("https://example.com/{id}")),
            release_date: date.map(ts),
            cover_url: None,
            duration: None,
            track_count: 1,
            features: None,
            genres: vec![],
            repost: false,
        }
    }

    fn empty_ledger() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn test_release_strictly_newer_notifies_once() {
        let ledger = empty_ledger();
        let detection = decide(DetectInput {
            kind: ContentKind::Release,
            watermark: Some(ts("2024-01-01T00:00:00Z")),
            ledgered: &ledger,
            candidates: vec![record("r1", Some("2024-01-02T00:00:00Z"))],
        });

        assert_eq!(detection.notify.len(), 1);
        assert_eq!(detection.notify[0].timestamp, ts("2024-01-02T00:00:00Z"));
        assert!(detection.seed_watermark.is_none());
    }

    #[test]
    fn test_release_equal_timestamp_is_already_seen() {
        let ledger = empty_ledger();
        let detection = decide(DetectInput {
            kind: ContentKind::Release,
            watermark: Some(ts("2024-01-02T00:00:00Z")),
            ledgered: &ledger,
            candidates: vec![record("r1", Some("2024-01-02T00:00:00Z"))],
        });
        assert!(detection.notify.is_empty());

        let detection = decide(DetectInput {
            kind: ContentKind::Release,
            watermark: Some(ts("2024-01-02T00:00:00Z")),
            ledgered: &ledger,
            candidates: vec![record("r1", Some("2023-12-31T00:00:00Z"))],
        });
        assert!(detection.notify.is_empty());
    }

    #[test]
    fn test_release_bootstrap_seeds_without_notifying() {
        let ledger = empty_ledger();
        let detection = decide(DetectInput {
            kind: ContentKind::Release,
            watermark: None,
            ledgered: &ledger,
            candidates: vec![record("old", Some("2020-05-05T00:00:00Z"))],
        });

        assert!(detection.notify.is_empty());
        assert_eq!(detection.seed_watermark, Some(ts("2020-05-05T00:00:00Z")));
    }

    #[test]
    fn test_release_only_latest_item_considered() {
        let ledger = empty_ledger();
        let detection = decide(DetectInput {
            kind: ContentKind::Release,
            watermark: Some(ts("2024-01-01T00:00:00Z")),
            ledgered: &ledger,
            candidates: vec![
                record("a", Some("2024-01-03T00:00:00Z")),
                record("b", Some("2024-01-05T00:00:00Z")),
                record("c", Some("2024-01-02T00:00:00Z")),
            ],
        });

        assert_eq!(detection.notify.len(), 1);
        assert_eq!(detection.notify[0].content_id, "https://example.com/b");
    }

    #[test]
    fn test_ledgered_repost_never_renotifies() {
        // Even a newer-looking timestamp cannot beat the ledger.
        let mut ledger = empty_ledger();
        ledger.insert("https://example.com/R1".to_string());

        let detection = decide(DetectInput {
            kind: ContentKind::Repost,
            watermark: Some(ts("2024-01-01T00:00:00Z")),
            ledgered: &ledger,
            candidates: vec![record("R1", Some("2099-01-01T00:00:00Z"))],
        });

        assert!(detection.notify.is_empty());
    }

    #[test]
    fn test_like_newer_than_watermark_notifies() {
        let ledger = empty_ledger();
        let detection = decide(DetectInput {
            kind: ContentKind::Like,
            watermark: Some(ts("2024-02-01T00:00:00Z")),
            ledgered: &ledger,
            candidates: vec![record("99", Some("2024-03-01T00:00:00Z"))],
        });

        assert_eq!(detection.notify.len(), 1);
        assert_eq!(detection.notify[0].timestamp, ts("2024-03-01T00:00:00Z"));
    }

    #[test]
    fn test_like_stale_items_skipped() {
        let ledger = empty_ledger();
        let detection = decide(DetectInput {
            kind: ContentKind::Like,
            watermark: Some(ts("2024-02-01T00:00:00Z")),
            ledgered: &ledger,
            candidates: vec![
                record("old", Some("2024-01-15T00:00:00Z")),
                record("boundary", Some("2024-02-01T00:00:00Z")),
                record("new", Some("2024-02-02T00:00:00Z")),
            ],
        });

        assert_eq!(detection.notify.len(), 1);
        assert_eq!(detection.notify[0].content_id, "https://example.com/new");
    }

    #[test]
    fn test_multi_kind_notifications_chronological() {
        let ledger = empty_ledger();
        let detection = decide(DetectInput {
            kind: ContentKind::Repost,
            watermark: Some(ts("2024-01-01T00:00:00Z")),
            ledgered: &ledger,
            candidates: vec![
                record("b", Some("2024-01-05T00:00:00Z")),
                record("a", Some("2024-01-03T00:00:00Z")),
            ],
        });

        let order: Vec<&str> = detection.notify.iter().map(|n| n.content_id.as_str()).collect();
        assert_eq!(order, ["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn test_malformed_candidates_skipped_not_fatal() {
        let ledger = empty_ledger();
        let detection = decide(DetectInput {
            kind: ContentKind::Like,
            watermark: Some(ts("2024-01-01T00:00:00Z")),
            ledgered: &ledger,
            candidates: vec![
                record("no-date", None),
                record("ok", Some("2024-01-02T00:00:00Z")),
            ],
        });

        assert_eq!(detection.skipped_malformed, 1);
        assert_eq!(detection.notify.len(), 1);
        assert_eq!(detection.notify[0].content_id, "https://example.com/ok");
    }

    #[test]
    fn test_duplicate_content_id_within_batch_processed_once() {
        let ledger = empty_ledger();
        let mut first = record("dup", Some("2024-01-02T00:00:00Z"));
        let mut second = record("dup", Some("2024-01-03T00:00:00Z"));
        first.url = Some("https://example.com/same".to_string());
        second.url = Some("https://example.com/same".to_string());

        let detection = decide(DetectInput {
            kind: ContentKind::Repost,
            watermark: Some(ts("2024-01-01T00:00:00Z")),
            ledgered: &ledger,
            candidates: vec![first, second],
        });

        assert_eq!(detection.notify.len(), 1);
        assert_eq!(detection.notify[0].timestamp, ts("2024-01-02T00:00:00Z"));
    }

    #[test]
    fn test_multi_kind_without_watermark_bootstraps() {
        let ledger = empty_ledger();
        let detection = decide(DetectInput {
            kind: ContentKind::Like,
            watermark: None,
            ledgered: &ledger,
            candidates: vec![
                record("a", Some("2024-01-03T00:00:00Z")),
                record("b", Some("2024-01-05T00:00:00Z")),
            ],
        });

        assert!(detection.notify.is_empty());
        assert_eq!(detection.seed_watermark, Some(ts("2024-01-05T00:00:00Z")));
    }

    #[test]
    fn test_empty_candidates_do_nothing() {
        let ledger = empty_ledger();
        let detection = decide(DetectInput {
            kind: ContentKind::Release,
            watermark: None,
            ledgered: &ledger,
            candidates: vec![],
        });
        assert!(detection.notify.is_empty());
        assert!(detection.seed_watermark.is_none());
    }

    #[test]
    fn test_date_only_release_newer_than_same_day_watermark() {
        // A same-day date-only release (normalized to end of day) still
        // notifies when the watermark is an earlier instant that day.
        let ledger = empty_ledger();
        let watermark = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();
        let detection = decide(DetectInput {
            kind: ContentKind::Release,
            watermark: Some(watermark),
            ledgered: &ledger,
            candidates: vec![record("r1", Some("2024-01-02"))],
        });
        assert_eq!(detection.notify.len(), 1);
    }
}
