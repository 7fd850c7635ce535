//! Persistence Snapshot Task
//!
//! Background task that periodically writes the store to durable storage.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheValue, SharedStore};
use crate::persistence::Snapshotter;

/// Spawns a task saving a snapshot every `interval`. Failures are logged and
/// the next round tries again.
///
/// The store is only locked while it is serialized; the storage write runs
/// on the blocking pool.
pub fn spawn_snapshot_task<V: CacheValue>(
    cache: SharedStore<V>,
    snapshotter: Arc<Snapshotter>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting snapshot task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            match snapshotter.save_shared(&cache).await {
                Ok(bytes) => debug!("Snapshot written ({} bytes)", bytes),
                Err(e) => warn!("Snapshot failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::config::CacheConfig;
    use crate::persistence::SNAPSHOT_KEY;
    use crate::storage::{KvStorage, MemoryStorage};
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn test_snapshot_task_writes_periodically() {
        let storage = Arc::new(MemoryStorage::new());
        let snapshotter = Arc::new(Snapshotter::new(storage.clone()));
        let cache: SharedStore<String> =
            Arc::new(RwLock::new(CacheStore::new(&CacheConfig::default())));
        cache
            .write()
            .await
            .set("a".to_string(), "alpha".to_string(), None, None)
            .unwrap();

        let handle = spawn_snapshot_task(cache, snapshotter, Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        let raw = storage.get(SNAPSHOT_KEY).unwrap().unwrap();
        assert!(raw.contains("alpha"));
    }
}
