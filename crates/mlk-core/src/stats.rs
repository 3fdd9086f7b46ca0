use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{StateStore, KEY_STATISTICS};

/// Counter snapshot exposed to the control layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub comments_sent: u64,
    #[serde(default)]
    pub reactions_set: u64,
    #[serde(default)]
    pub channels_processed: u64,
    #[serde(default)]
    pub errors: u64,
}

/// Lock-free counters; monotonically non-decreasing until [`StatsTracker::reset`].
#[derive(Debug, Default)]
pub struct StatsTracker {
    comments_sent: AtomicU64,
    reactions_set: AtomicU64,
    channels_processed: AtomicU64,
    errors: AtomicU64,
}

impl StatsTracker {
    pub fn from_snapshot(s: Statistics) -> Self {
        Self {
            comments_sent: AtomicU64::new(s.comments_sent),
            reactions_set: AtomicU64::new(s.reactions_set),
            channels_processed: AtomicU64::new(s.channels_processed),
            errors: AtomicU64::new(s.errors),
        }
    }

    pub fn load(store: &StateStore) -> Self {
        Self::from_snapshot(store.load_state_or(KEY_STATISTICS, Statistics::default()))
    }

    pub fn comment_sent(&self) {
        self.comments_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reaction_set(&self) {
        self.reactions_set.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_processed(&self) {
        self.channels_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Statistics {
        Statistics {
            comments_sent: self.comments_sent.load(Ordering::Relaxed),
            reactions_set: self.reactions_set.load(Ordering::Relaxed),
            channels_processed: self.channels_processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.comments_sent.store(0, Ordering::Relaxed);
        self.reactions_set.store(0, Ordering::Relaxed);
        self.channels_processed.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }

    /// Best-effort save; a failed write is logged and retried on the next call.
    pub fn persist(&self, store: &StateStore) {
        if let Err(e) = store.save_state(KEY_STATISTICS, &self.snapshot()) {
            warn!(error = %e, "failed to persist statistics");
        }
    }
}
