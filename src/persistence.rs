//! Persistence Snapshotter
//!
//! Serializes the full entry set and statistics into durable storage, and
//! restores them once at startup unless the snapshot is stale.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{
    current_timestamp_ms, CacheEntry, CacheEventKind, CacheStats, CacheStore, CacheValue,
    SharedStore,
};
use crate::error::{CacheError, Result};
use crate::storage::KvStorage;

/// Storage key the snapshot is written under.
pub const SNAPSHOT_KEY: &str = "advanced_cache_data";

/// Snapshots older than this are discarded at startup.
pub const SNAPSHOT_MAX_AGE_MS: u64 = 24 * 60 * 60 * 1000;

// == Snapshot ==
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<V> {
    pub entries: Vec<(String, CacheEntry<V>)>,
    pub stats: CacheStats,
    /// Unix milliseconds when the snapshot was taken
    pub timestamp: u64,
}

// == Snapshotter ==
pub struct Snapshotter {
    storage: Arc<dyn KvStorage>,
    max_age_ms: u64,
}

impl Snapshotter {
    pub fn new(storage: Arc<dyn KvStorage>) -> Self {
        Self {
            storage,
            max_age_ms: SNAPSHOT_MAX_AGE_MS,
        }
    }

    // == Save ==
    /// Writes the store's entries and statistics. Returns the bytes written.
    ///
    /// Storage I/O happens while `store` is borrowed; async callers holding
    /// a lock should use [`save_shared`](Self::save_shared).
    pub fn save<V: CacheValue>(&self, store: &CacheStore<V>) -> Result<usize> {
        let payload = Self::encode(store)?;
        let written = self.write(&payload)?;
        store
            .events()
            .emit(CacheEventKind::PersistenceSave, None, Some(written));
        Ok(written)
    }

    /// Saves a shared store, serializing under the read lock and writing to
    /// storage on the blocking pool with the lock released.
    pub async fn save_shared<V: CacheValue>(
        self: &Arc<Self>,
        cache: &SharedStore<V>,
    ) -> Result<usize> {
        let payload = {
            let store = cache.read().await;
            Self::encode(&*store)?
        };

        let snapshotter = Arc::clone(self);
        let written = tokio::task::spawn_blocking(move || snapshotter.write(&payload))
            .await
            .map_err(|e| CacheError::Internal(format!("Snapshot writer failed: {}", e)))??;

        cache
            .read()
            .await
            .events()
            .emit(CacheEventKind::PersistenceSave, None, Some(written));
        Ok(written)
    }

    /// Serializes the store into a snapshot payload.
    pub fn encode<V: CacheValue>(store: &CacheStore<V>) -> Result<String> {
        let snapshot = Snapshot {
            entries: store.snapshot_entries(),
            stats: store.stats(),
            timestamp: current_timestamp_ms(),
        };
        debug!("Encoding snapshot of {} entries", snapshot.entries.len());
        Ok(serde_json::to_string(&snapshot)?)
    }

    /// Writes an encoded payload under [`SNAPSHOT_KEY`].
    pub fn write(&self, payload: &str) -> Result<usize> {
        self.storage.set(SNAPSHOT_KEY, payload)?;
        debug!("Saved snapshot: {} bytes", payload.len());
        Ok(payload.len())
    }

    // == Load ==
    /// Reads the snapshot, returning None if absent or older than the age ceiling.
    pub fn load<V: CacheValue>(&self, now: u64) -> Result<Option<Snapshot<V>>> {
        let Some(raw) = self.storage.get(SNAPSHOT_KEY)? else {
            return Ok(None);
        };
        let snapshot: Snapshot<V> = serde_json::from_str(&raw)?;

        let age = now.saturating_sub(snapshot.timestamp);
        if age > self.max_age_ms {
            info!("Discarding snapshot that is {} ms old", age);
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    // == Restore ==
    /// Loads the snapshot into `store`. Any failure is logged and treated as
    /// "no snapshot". Returns the number of entries restored.
    pub fn restore_into<V: CacheValue>(&self, store: &mut CacheStore<V>) -> usize {
        match self.load::<V>(current_timestamp_ms()) {
            Ok(Some(snapshot)) => {
                let count = snapshot.entries.len();
                store.restore(snapshot.entries, snapshot.stats);
                info!("Restored {} entries from snapshot", count);
                count
            }
            Ok(None) => 0,
            Err(e) => {
                warn!("Ignoring unreadable snapshot: {}", e);
                0
            }
        }
    }
}
