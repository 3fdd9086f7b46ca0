//! Deduplicating FIFO between the coordinator and the worker.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::{
    domain::ChannelId,
    processed::ProcessedRegistry,
    store::{StateStore, KEY_CHANNEL_QUEUE},
    Result,
};

#[derive(Default)]
struct QueueState {
    items: VecDeque<ChannelId>,
    queued: HashSet<ChannelId>,
}

/// The only hand-off primitive between discovery and engagement.
///
/// An identifier is never queued twice while pending, and never queued once it
/// is in the processed registry. Order is strictly FIFO.
pub struct EngagementQueue {
    processed: Arc<ProcessedRegistry>,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl EngagementQueue {
    pub fn new(processed: Arc<ProcessedRegistry>) -> Self {
        Self {
            processed,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Returns true if the identifier was appended.
    pub fn enqueue(&self, channel: ChannelId) -> bool {
        if self.processed.contains(&channel) {
            debug!(channel = %channel, "already processed, not queued");
            return false;
        }
        let Ok(mut st) = self.state.lock() else {
            return false;
        };
        if !st.queued.insert(channel.clone()) {
            debug!(channel = %channel, "already queued");
            return false;
        }
        st.items.push_back(channel.clone());
        drop(st);

        self.notify.notify_one();
        info!(channel = %channel, "channel queued");
        true
    }

    fn pop(&self) -> Option<ChannelId> {
        let mut st = self.state.lock().ok()?;
        let item = st.items.pop_front()?;
        st.queued.remove(&item);
        Some(item)
    }

    /// Wait up to `timeout` for the next identifier.
    pub async fn dequeue(&self, timeout: Duration) -> Option<ChannelId> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.pop() {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.pop();
            }
        }
    }

    /// Drop every pending identifier. Returns how many were discarded.
    pub fn drain(&self) -> usize {
        let Ok(mut st) = self.state.lock() else {
            return 0;
        };
        let n = st.items.len();
        st.items.clear();
        st.queued.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<ChannelId> {
        self.state
            .lock()
            .map(|s| s.items.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Persist pending identifiers under `channel_queue`.
    pub fn persist(&self, store: &StateStore) -> Result<()> {
        let items = self.snapshot();
        store.save_state(KEY_CHANNEL_QUEUE, &items)?;
        debug!(count = items.len(), "queue persisted");
        Ok(())
    }

    /// Re-enqueue a persisted snapshot; unreadable snapshots are discarded.
    pub fn restore(&self, store: &StateStore) -> usize {
        let items: Vec<ChannelId> = match store.load_state(KEY_CHANNEL_QUEUE) {
            Ok(Some(v)) => v,
            Ok(None) => return 0,
            Err(e) => {
                warn!(error = %e, "persisted queue unreadable, starting empty");
                return 0;
            }
        };
        let restored = items.into_iter().filter(|c| self.enqueue(c.clone())).count();
        if restored > 0 {
            info!(count = restored, "queue restored");
        }
        restored
    }
}
