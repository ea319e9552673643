//! Timestamp utilities
//!
//! All timestamps in tunewatch are timezone-aware and normalized to UTC.
//! Upstream platforms are inconsistent about date formats: SoundCloud emits
//! full RFC 3339 instants, Spotify frequently emits bare `YYYY-MM-DD` dates
//! (and occasionally `YYYY` or `YYYY-MM` for old catalog entries). The
//! parser here accepts all of those; callers treat `None` as a malformed
//! timestamp and skip the item rather than failing the batch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse an upstream-supplied timestamp into a UTC instant.
///
/// Accepted forms:
/// - RFC 3339 with `Z` or a numeric offset, with or without fractional
///   seconds (`2024-01-02T03:04:05Z`, `2024-01-02T03:04:05.123+00:00`)
/// - RFC 3339 compact offset without a colon (`2024-01-02T03:04:05+0000`)
/// - Naive date-time (`2024-01-02T03:04:05`), assumed UTC
/// - Bare date (`2024-01-02`), normalized to the END of that day so a
///   date-only release never compares older than a same-day instant
///   already stored as a watermark
///
/// Returns `None` for anything else, including empty strings.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // Bare date: normalize to end of day.
    if raw.len() == 10 && raw.matches('-').count() == 2 {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
        let dt = date.and_hms_opt(23, 59, 59)?;
        return Some(Utc.from_utc_datetime(&dt));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // Offset without colon (e.g. "+0000"), with or without fraction.
    for fmt in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // Naive date-time: assume UTC.
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    None
}

/// Format a timestamp for storage (RFC 3339, UTC).
pub fn to_storage(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_parse_rfc3339_zulu() {
        let ts = parse_timestamp("2024-01-02T03:04:05Z").unwrap();
        assert_eq!(ts.timestamp(), 1_704_164_645);
    }

    #[test]
    fn test_parse_rfc3339_fractional() {
        let ts = parse_timestamp("2024-01-02T03:04:05.500+00:00").unwrap();
        assert_eq!(ts.second(), 5);
    }

    #[test]
    fn test_parse_compact_offset() {
        let with_colon = parse_timestamp("2024-01-02T03:04:05+00:00").unwrap();
        let without_colon = parse_timestamp("2024-01-02T03:04:05+0000").unwrap();
        assert_eq!(with_colon, without_colon);
    }

    #[test]
    fn test_parse_naive_assumed_utc() {
        let ts = parse_timestamp("2024-01-02T03:04:05").unwrap();
        assert_eq!(ts, parse_timestamp("2024-01-02T03:04:05Z").unwrap());
    }

    #[test]
    fn test_parse_bare_date_end_of_day() {
        let ts = parse_timestamp("2024-01-02").unwrap();
        assert_eq!(ts.hour(), 23);
        assert_eq!(ts.minute(), 59);
        assert_eq!(ts.second(), 59);
        // A date-only release compares newer than any instant earlier that day.
        let same_day = parse_timestamp("2024-01-02T12:00:00Z").unwrap();
        assert!(ts > same_day);
    }

    #[test]
    fn test_parse_garbage_returns_none() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("   ").is_none());
        assert!(parse_timestamp("not-a-date").is_none());
        assert!(parse_timestamp("2024-13-45").is_none());
    }

    #[test]
    fn test_storage_round_trip() {
        let ts = parse_timestamp("2024-03-01T00:00:00Z").unwrap();
        let stored = to_storage(&ts);
        assert_eq!(parse_timestamp(&stored).unwrap(), ts);
    }
}
