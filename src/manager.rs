//! Cache Manager
//!
//! [`AdvancedCache`] composes the store, replication, persistence and the
//! background tasks behind one async surface. Instances are constructed
//! explicitly; there is no process-wide default cache.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{
    CacheEntry, CacheEventKind, CacheStats, CacheStore, CacheValue, Counter, EntryMetadata,
    EventSubscription, SharedStore,
};
use crate::cluster::{ClusterNode, ClusterTransport, NoopTransport, ReplicationCoordinator};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::persistence::Snapshotter;
use crate::storage::{KvStorage, MemoryStorage};
use crate::tasks::{
    spawn_cleanup_task, spawn_cluster_listener, spawn_cluster_sync_task, spawn_snapshot_task,
};

// == Builder ==
/// Wires a cache to its storage medium and replication transport.
///
/// Storage defaults to a private [`MemoryStorage`], transport to [`NoopTransport`].
pub struct CacheBuilder<V> {
    config: CacheConfig,
    storage: Option<Arc<dyn KvStorage>>,
    transport: Option<Arc<dyn ClusterTransport>>,
    _value: PhantomData<V>,
}

impl<V: CacheValue> CacheBuilder<V> {
    pub fn storage(mut self, storage: Arc<dyn KvStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ClusterTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    // == Start ==
    /// Restores the snapshot (if enabled) and spawns the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> AdvancedCache<V> {
        let config = self.config;
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let transport = self.transport.unwrap_or_else(|| Arc::new(NoopTransport));

        let mut store = CacheStore::new(&config);
        let snapshotter = config.persistence_enabled.then(|| {
            let snapshotter = Arc::new(Snapshotter::new(storage.clone()));
            snapshotter.restore_into(&mut store);
            snapshotter
        });
        let store: SharedStore<V> = Arc::new(RwLock::new(store));

        let mut tasks = vec![spawn_cleanup_task(store.clone(), config.cleanup_interval())];

        if let Some(snapshotter) = &snapshotter {
            tasks.push(spawn_snapshot_task(
                store.clone(),
                snapshotter.clone(),
                config.persistence_interval(),
            ));
        }

        let coordinator = config.clustering_enabled.then(|| {
            tasks.extend(transport.spawn_reader(config.mirror_poll_interval()));
            Arc::new(ReplicationCoordinator::new(
                config.node_address.clone(),
                transport,
                storage,
            ))
        });
        if let Some(coordinator) = &coordinator {
            if let Some(receiver) = coordinator.subscribe() {
                tasks.push(spawn_cluster_listener(
                    store.clone(),
                    coordinator.clone(),
                    receiver,
                ));
            }
            tasks.push(spawn_cluster_sync_task(
                store.clone(),
                coordinator.clone(),
                config.cluster_sync_interval(),
            ));
            info!("Cache node {} joined cluster", coordinator.node_id());
        }

        AdvancedCache {
            store,
            coordinator,
            snapshotter,
            tasks: Mutex::new(tasks),
            destroyed: AtomicBool::new(false),
        }
    }
}

// == Advanced Cache ==
/// Public cache surface. Every call after [`destroy`](Self::destroy) fails
/// with [`CacheError::Destroyed`].
pub struct AdvancedCache<V: CacheValue> {
    store: SharedStore<V>,
    coordinator: Option<Arc<ReplicationCoordinator>>,
    snapshotter: Option<Arc<Snapshotter>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl<V: CacheValue> AdvancedCache<V> {
    pub fn builder(config: CacheConfig) -> CacheBuilder<V> {
        CacheBuilder {
            config,
            storage: None,
            transport: None,
            _value: PhantomData,
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(CacheError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Copies the entry to replicate while the store guard is held.
    /// Publishing happens after the guard is released.
    fn replica(&self, store: &CacheStore<V>, key: &str) -> Option<CacheEntry<V>> {
        self.coordinator.as_ref().and_then(|_| store.entry(key))
    }

    fn replicate_set(&self, key: &str, replica: Option<CacheEntry<V>>) {
        if let (Some(coordinator), Some(entry)) = (&self.coordinator, replica) {
            coordinator.broadcast_set(key, &entry);
        }
    }

    fn replicate_delete(&self, key: &str) {
        if let Some(coordinator) = &self.coordinator {
            coordinator.broadcast_delete(key);
        }
    }

    // == Set ==
    /// Stores `value` under `key`. `ttl_ms` falls back to the configured default.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl_ms: Option<u64>) -> Result<()> {
        self.set_with_metadata(key, value, ttl_ms, None).await
    }

    pub async fn set_with_metadata(
        &self,
        key: impl Into<String>,
        value: V,
        ttl_ms: Option<u64>,
        metadata: Option<EntryMetadata>,
    ) -> Result<()> {
        self.ensure_alive()?;
        let key = key.into();
        let replica = {
            let mut store = self.store.write().await;
            store.set(key.clone(), value, ttl_ms, metadata)?;
            self.replica(&store, &key)
        };
        self.replicate_set(&key, replica);
        Ok(())
    }

    // == Get ==
    /// Returns the live value for `key`, or None on a miss.
    pub async fn get(&self, key: &str) -> Result<Option<V>> {
        self.ensure_alive()?;
        Ok(self.store.write().await.get(key))
    }

    pub async fn has(&self, key: &str) -> Result<bool> {
        self.ensure_alive()?;
        Ok(self.store.write().await.has(key))
    }

    // == Delete ==
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_alive()?;
        let removed = self.store.write().await.delete(key);
        if removed {
            self.replicate_delete(key);
        }
        Ok(removed)
    }

    // == Clear ==
    pub async fn clear(&self) -> Result<()> {
        self.ensure_alive()?;
        self.store.write().await.clear();
        if let Some(coordinator) = &self.coordinator {
            coordinator.broadcast_clear();
        }
        Ok(())
    }

    // == Expire ==
    /// Restarts the TTL window of `key` with a new TTL.
    pub async fn expire(&self, key: &str, ttl_ms: u64) -> Result<bool> {
        self.ensure_alive()?;
        let replica = {
            let mut store = self.store.write().await;
            store.expire(key, ttl_ms).then(|| self.replica(&store, key))
        };
        let updated = replica.is_some();
        self.replicate_set(key, replica.flatten());
        Ok(updated)
    }

    /// Remaining TTL in milliseconds, -1 if absent or expired.
    pub async fn ttl(&self, key: &str) -> Result<i64> {
        self.ensure_alive()?;
        Ok(self.store.write().await.ttl(key))
    }

    // == Invalidate Pattern ==
    /// Deletes every key matching `pattern`; returns how many were removed.
    pub async fn invalidate_pattern(&self, pattern: &Regex) -> Result<usize> {
        self.ensure_alive()?;
        let removed = self.store.write().await.invalidate_pattern(pattern);
        for key in &removed {
            self.replicate_delete(key);
        }
        Ok(removed.len())
    }

    // == Batch ==
    pub async fn set_multiple(&self, items: Vec<(String, V)>, ttl_ms: Option<u64>) -> Result<()> {
        self.ensure_alive()?;
        let keys: Vec<String> = items.iter().map(|(k, _)| k.clone()).collect();
        let (result, replicas) = {
            let mut store = self.store.write().await;
            let result = store.set_multiple(items, ttl_ms);
            let replicas: Vec<_> = keys.iter().map(|key| self.replica(&store, key)).collect();
            (result, replicas)
        };
        for (key, replica) in keys.iter().zip(replicas) {
            self.replicate_set(key, replica);
        }
        result
    }

    pub async fn get_multiple(&self, keys: &[&str]) -> Result<HashMap<String, Option<V>>> {
        self.ensure_alive()?;
        Ok(self.store.write().await.get_multiple(keys))
    }

    // == Observability ==
    pub async fn stats(&self) -> Result<CacheStats> {
        self.ensure_alive()?;
        Ok(self.store.read().await.stats())
    }

    pub async fn len(&self) -> Result<usize> {
        self.ensure_alive()?;
        Ok(self.store.read().await.len())
    }

    /// Subscribes to lifecycle events; an empty slice means every kind.
    /// Dropping the subscription unsubscribes.
    pub async fn subscribe(&self, kinds: &[CacheEventKind]) -> Result<EventSubscription> {
        self.ensure_alive()?;
        Ok(self.store.read().await.subscribe(kinds))
    }

    pub fn node_id(&self) -> Option<&str> {
        self.coordinator.as_ref().map(|c| c.node_id())
    }

    pub fn is_leader(&self) -> bool {
        self.coordinator.as_ref().is_some_and(|c| c.is_leader())
    }

    pub fn cluster_nodes(&self) -> Vec<ClusterNode> {
        self.coordinator
            .as_ref()
            .map(|c| c.nodes())
            .unwrap_or_default()
    }

    // == Save Snapshot ==
    /// Writes a snapshot now. A no-op when persistence is disabled.
    pub async fn save_snapshot(&self) -> Result<()> {
        self.ensure_alive()?;
        if let Some(snapshotter) = &self.snapshotter {
            snapshotter.save_shared(&self.store).await?;
        }
        Ok(())
    }

    fn abort_tasks(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }
    }

    // == Destroy ==
    /// Tears the instance down: cancels the background tasks, flushes a final
    /// snapshot, clears the store and detaches every subscriber. Idempotent.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.abort_tasks();

        if let Some(snapshotter) = &self.snapshotter {
            if let Err(e) = snapshotter.save_shared(&self.store).await {
                warn!("Final snapshot failed: {}", e);
            }
        }
        {
            let mut store = self.store.write().await;
            store.clear();
            store.close_events();
        }

        if let Some(coordinator) = &self.coordinator {
            coordinator.resign();
        }
        info!("Cache destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl<V: CacheValue + Counter> AdvancedCache<V> {
    // == Increment ==
    /// Adds `amount` to the counter at `key` (missing counts as 0).
    pub async fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        self.ensure_alive()?;
        let (value, replica) = {
            let mut store = self.store.write().await;
            let value = store.increment(key, amount)?;
            (value, self.replica(&store, key))
        };
        self.replicate_set(key, replica);
        Ok(value)
    }

    pub async fn decrement(&self, key: &str, amount: i64) -> Result<i64> {
        self.ensure_alive()?;
        let (value, replica) = {
            let mut store = self.store.write().await;
            let value = store.decrement(key, amount)?;
            (value, self.replica(&store, key))
        };
        self.replicate_set(key, replica);
        Ok(value)
    }
}

impl<V: CacheValue> Drop for AdvancedCache<V> {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
