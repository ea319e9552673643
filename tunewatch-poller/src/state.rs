//! Shared service state
//!
//! Thread-safe snapshot of the poll loop's progress, read by the HTTP
//! status endpoint while the scheduler writes after each cycle.

use crate::scheduler::CycleSummary;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// State shared between the scheduler and the HTTP surface
pub struct SharedState {
    pub started_at: DateTime<Utc>,
    last_cycle: RwLock<Option<CycleSummary>>,
    cycles_completed: AtomicU64,
}

impl SharedState {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            last_cycle: RwLock::new(None),
            cycles_completed: AtomicU64::new(0),
        }
    }

    /// Record the outcome of a completed cycle
    pub async fn record_cycle(&self, summary: CycleSummary) {
        *self.last_cycle.write().await = Some(summary);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn last_cycle(&self) -> Option<CycleSummary> {
        self.last_cycle.read().await.clone()
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_record_and_read_cycle() {
        let state = SharedState::new(Utc::now());
        assert!(state.last_cycle().await.is_none());
        assert_eq!(state.cycles_completed(), 0);

        let summary = CycleSummary::new(Uuid::new_v4(), Utc::now(), 3);
        state.record_cycle(summary.clone()).await;

        let stored = state.last_cycle().await.unwrap();
        assert_eq!(stored.cycle_id, summary.cycle_id);
        assert_eq!(state.cycles_completed(), 1);
    }
}
