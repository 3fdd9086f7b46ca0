use std::{collections::HashSet, sync::Mutex};

use tracing::info;

use crate::{domain::ChannelId, store::StateStore, Result};

/// Append-only record of channels the worker has finished.
///
/// Writes go to the store first and only then into the in-memory set, so a
/// membership hit always means the record is durable.
pub struct ProcessedRegistry {
    store: StateStore,
    seen: Mutex<HashSet<String>>,
}

impl ProcessedRegistry {
    pub fn load(store: StateStore) -> Result<Self> {
        let seen = store.processed_channels()?;
        info!(count = seen.len(), "processed channels loaded");
        Ok(Self {
            store,
            seen: Mutex::new(seen),
        })
    }

    /// Re-read the durable set (e.g. after retention pruning).
    pub fn reload(&self) -> Result<()> {
        let fresh = self.store.processed_channels()?;
        if let Ok(mut seen) = self.seen.lock() {
            *seen = fresh;
        }
        Ok(())
    }

    pub fn contains(&self, channel: &ChannelId) -> bool {
        self.seen
            .lock()
            .map(|s| s.contains(channel.as_str()))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record(&self, channel: &ChannelId) -> Result<()> {
        self.store.add_processed_channel(channel.as_str())?;
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(channel.as_str().to_string());
        }
        Ok(())
    }
}
