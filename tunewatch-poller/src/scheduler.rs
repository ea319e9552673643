//! Poll loop
//!
//! Drives the periodic check cycles. Run times are aligned to a fixed
//! wall-clock grid (every `poll_interval_secs`, default 5 minutes) instead
//! of a fixed delay from the previous run, so cycle start times stay on
//! absolute boundaries no matter how long a cycle takes. Cycles never
//! overlap: the loop awaits each cycle before arming the next tick, and a
//! tick whose slot passed while a cycle was still running fires as soon as
//! that cycle finishes.
//!
//! Within a cycle the roster is processed grouped by content kind —
//! release, playlist, repost, like — each kind covering every artist
//! before the next kind begins. The ordering is a stable contract for log
//! comparability, not a correctness requirement.

use crate::cooldown::PlatformCooldowns;
use crate::detector::{decide, DetectInput};
use crate::fetch::{ContentRecord, FetchError, PlatformFetcher};
use crate::notify::Notifier;
use crate::state::SharedState;
use crate::Result;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tunewatch_common::db::{ContentKind, DedupKey, Store, TrackedArtist};
use tunewatch_common::time;
use uuid::Uuid;

/// Poll loop configuration
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Wall-clock grid period in seconds (default: 300 = 5 minutes)
    pub poll_interval_secs: u64,

    /// Platform suppression window after a rate limit (default: 43200 = 12h)
    pub platform_cooldown_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            platform_cooldown_secs: 43_200,
        }
    }
}

impl PollerConfig {
    /// Load poll loop configuration from database settings, falling back
    /// to defaults for anything missing or unparseable.
    pub async fn from_database(store: &Store) -> Self {
        let mut config = Self::default();

        if let Ok(Some(raw)) = store.setting("poll_interval_secs").await {
            if let Ok(interval) = raw.parse::<u64>() {
                config.poll_interval_secs = interval.max(1);
            }
        }
        if let Ok(Some(raw)) = store.setting("platform_cooldown_secs").await {
            if let Ok(cooldown) = raw.parse::<u64>() {
                config.platform_cooldown_secs = cooldown;
            }
        }

        config
    }
}

/// The next run instant on the wall-clock grid strictly after `after`
pub fn next_aligned_run(after: DateTime<Utc>, period_secs: i64) -> DateTime<Utc> {
    let period = period_secs.max(1);
    let next = (after.timestamp().div_euclid(period) + 1) * period;
    Utc.timestamp_opt(next, 0)
        .single()
        .unwrap_or(after + ChronoDuration::seconds(period))
}

/// Notifications emitted in one cycle, per content kind
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct KindCounts {
    pub release: u64,
    pub playlist: u64,
    pub repost: u64,
    pub like: u64,
}

impl KindCounts {
    pub fn increment(&mut self, kind: ContentKind) {
        match kind {
            ContentKind::Release => self.release += 1,
            ContentKind::Playlist => self.playlist += 1,
            ContentKind::Repost => self.repost += 1,
            ContentKind::Like => self.like += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.release + self.playlist + self.repost + self.like
    }
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub artists_checked: usize,
    pub notified: KindCounts,
    pub errors: u64,
    pub skipped_cooldown: u64,
}

impl CycleSummary {
    pub fn new(cycle_id: Uuid, started_at: DateTime<Utc>, artists_checked: usize) -> Self {
        Self {
            cycle_id,
            started_at,
            finished_at: None,
            artists_checked,
            notified: KindCounts::default(),
            errors: 0,
            skipped_cooldown: 0,
        }
    }
}

/// The poll loop lifecycle object.
///
/// Constructed once by the process entry point and consumed by [`run`];
/// there is no global "already started" flag because there is no way to
/// start the same poller twice.
pub struct Poller<F, N> {
    store: Store,
    fetcher: F,
    notifier: N,
    config: PollerConfig,
    cooldowns: PlatformCooldowns,
    state: Arc<SharedState>,
}

impl<F: PlatformFetcher, N: Notifier> Poller<F, N> {
    pub fn new(
        store: Store,
        fetcher: F,
        notifier: N,
        config: PollerConfig,
        state: Arc<SharedState>,
    ) -> Self {
        Self {
            store,
            fetcher,
            notifier,
            config,
            cooldowns: PlatformCooldowns::new(),
            state,
        }
    }

    /// Drive the loop until process shutdown. WAITING(next_run) →
    /// RUNNING(cycle) → WAITING(next_run'), no terminal state.
    pub async fn run(mut self) {
        let period = self.config.poll_interval_secs as i64;
        info!(
            "Poll loop started (interval: {}s, cooldown: {}s)",
            self.config.poll_interval_secs, self.config.platform_cooldown_secs
        );

        let mut target = next_aligned_run(time::now(), period);
        loop {
            let now = time::now();
            // More than one full period behind: realign to the grid instead
            // of replaying a backlog of stale ticks.
            if target + ChronoDuration::seconds(period) < now {
                target = next_aligned_run(now, period);
            }

            let wait_ms = (target - now).num_milliseconds().max(0);
            debug!("Next check at {} (in {:.1}s)", target.format("%H:%M:%S"), wait_ms as f64 / 1000.0);
            tokio::time::sleep(std::time::Duration::from_millis(wait_ms as u64)).await;

            match self.run_cycle(time::now()).await {
                Ok(summary) => self.state.record_cycle(summary).await,
                // Only a store-unavailable condition lands here; the cycle
                // is abandoned and retried at the next tick.
                Err(e) => error!("Check cycle aborted: {e}"),
            }

            // Advance the chain grid-point to grid-point: an overrun makes
            // exactly this next tick fire immediately (wait_ms clamps to 0).
            target = next_aligned_run(target, period);
        }
    }

    /// One full pass over the roster, grouped by content kind.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleSummary> {
        let cycle_id = Uuid::new_v4();
        let artists = self.store.list_artists().await?;
        let mut summary = CycleSummary::new(cycle_id, now, artists.len());

        if artists.is_empty() {
            debug!(cycle = %cycle_id, "no artists tracked, nothing to check");
            summary.finished_at = Some(time::now());
            return Ok(summary);
        }

        info!(cycle = %cycle_id, artists = artists.len(), "starting check cycle");

        for kind in ContentKind::ALL {
            for artist in &artists {
                if let Some(until) = self.cooldowns.active(artist.platform, now) {
                    debug!(
                        artist = %artist.artist_name,
                        platform = %artist.platform,
                        until = %until,
                        "skipping check, platform cooling down"
                    );
                    summary.skipped_cooldown += 1;
                    continue;
                }
                self.check_artist(artist, kind, now, &mut summary).await?;
            }
        }

        summary.finished_at = Some(time::now());
        info!(
            cycle = %cycle_id,
            checked = summary.artists_checked,
            new_releases = summary.notified.release,
            new_playlists = summary.notified.playlist,
            new_reposts = summary.notified.repost,
            new_likes = summary.notified.like,
            errors = summary.errors,
            "check cycle complete"
        );
        Ok(summary)
    }

    /// Check one (artist, kind) pair. Fetch and delivery failures are
    /// absorbed here — only store errors propagate and abort the cycle.
    async fn check_artist(
        &mut self,
        artist: &TrackedArtist,
        kind: ContentKind,
        now: DateTime<Utc>,
        summary: &mut CycleSummary,
    ) -> Result<()> {
        let fetched = match kind {
            ContentKind::Release => self
                .fetcher
                .latest_release(artist)
                .await
                .map(|item| item.into_iter().collect()),
            ContentKind::Playlist => self
                .fetcher
                .latest_playlist(artist)
                .await
                .map(|item| item.into_iter().collect()),
            ContentKind::Repost => self.fetcher.recent_reposts(artist).await,
            ContentKind::Like => self.fetcher.recent_likes(artist).await,
        };

        let candidates: Vec<ContentRecord> = match fetched {
            Ok(candidates) => candidates,
            Err(FetchError::RateLimited) => {
                let window = ChronoDuration::seconds(self.config.platform_cooldown_secs as i64);
                self.cooldowns.trip(artist.platform, now, window);
                warn!(
                    platform = %artist.platform,
                    until = %(now + window),
                    "rate limit reported, cooling platform down"
                );
                summary.errors += 1;
                return Ok(());
            }
            Err(FetchError::NotFound(msg)) => {
                // Artist likely deleted or renamed upstream; watermark untouched.
                info!(artist = %artist.artist_name, kind = %kind, "not found upstream: {msg}");
                return Ok(());
            }
            Err(FetchError::Transient(msg)) => {
                debug!(artist = %artist.artist_name, kind = %kind, "transient fetch failure: {msg}");
                summary.errors += 1;
                return Ok(());
            }
        };

        if candidates.is_empty() {
            return Ok(());
        }

        // Ledger lookups happen before the pure decision; single-latest
        // kinds are governed by the watermark alone.
        let mut ledgered: HashSet<String> = HashSet::new();
        if !kind.is_single_latest() {
            for record in &candidates {
                if let Some(content_id) = record.content_id() {
                    let key = DedupKey::new(artist, kind, content_id.clone());
                    if self.store.is_notified(&key).await? {
                        ledgered.insert(content_id);
                    }
                }
            }
        }

        let detection = decide(DetectInput {
            kind,
            watermark: artist.watermark(kind),
            ledgered: &ledgered,
            candidates,
        });

        let artist_key = artist.key();
        if let Some(seed) = detection.seed_watermark {
            self.store.advance_watermark(&artist_key, kind, seed).await?;
            info!(
                artist = %artist.artist_name,
                kind = %kind,
                watermark = %seed,
                "bootstrapped watermark, nothing reported"
            );
        }

        for pending in detection.notify {
            match self.notifier.notify(artist, kind, &pending.record).await {
                Ok(()) => {
                    // Commit only after the send is confirmed: ledger entry
                    // first (the stronger guard), then the watermark.
                    let dedup_key = DedupKey::new(artist, kind, pending.content_id.clone());
                    self.store.mark_notified(&dedup_key).await?;
                    self.store
                        .advance_watermark(&artist_key, kind, pending.timestamp)
                        .await?;
                    summary.notified.increment(kind);
                    info!(
                        artist = %artist.artist_name,
                        kind = %kind,
                        title = %pending.record.title,
                        "notification posted"
                    );
                }
                Err(e) => {
                    // Not marked, not advanced: retried next cycle.
                    warn!(
                        artist = %artist.artist_name,
                        kind = %kind,
                        title = %pending.record.title,
                        "delivery failed, will retry next cycle: {e}"
                    );
                    summary.errors += 1;
                }
            }
        }

        Ok(())
    }
}
