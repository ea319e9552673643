//! Per-platform rate-limit cooldowns
//!
//! When a fetcher reports a rate limit, the platform is suppressed for a
//! fixed window spanning cycles. The tracker is held by the scheduler and
//! is purely in-memory: a restart clears it, which is safe because the
//! first post-restart fetch either succeeds or trips the breaker again.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tunewatch_common::db::Platform;

#[derive(Debug, Default)]
pub struct PlatformCooldowns {
    until: HashMap<Platform, DateTime<Utc>>,
}

impl PlatformCooldowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or extend) a cooldown window for a platform
    pub fn trip(&mut self, platform: Platform, now: DateTime<Utc>, window: Duration) {
        let until = now + window;
        let entry = self.until.entry(platform).or_insert(until);
        if *entry < until {
            *entry = until;
        }
    }

    /// If the platform is cooling down at `now`, returns when it ends
    pub fn active(&self, platform: Platform, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.until.get(&platform).copied().filter(|until| *until > now)
    }

    /// Cooldown ends for the status endpoint, expired entries excluded
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<(Platform, DateTime<Utc>)> {
        let mut entries: Vec<(Platform, DateTime<Utc>)> = self
            .until
            .iter()
            .filter(|(_, until)| **until > now)
            .map(|(platform, until)| (*platform, *until))
            .collect();
        entries.sort_by_key(|(platform, _)| platform.as_str());
        entries
    }
}
