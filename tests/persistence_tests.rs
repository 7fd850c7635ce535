//! Integration Tests for Snapshots and Teardown
//!
//! Restarts a cache over the same storage medium and checks what survives.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tabcache::persistence::SNAPSHOT_KEY;
use tabcache::storage::{FileStorage, KvStorage, MemoryStorage};
use tabcache::{AdvancedCache, CacheConfig, CacheError, CacheEventKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Session {
    user: String,
    scopes: Vec<String>,
}

fn session(user: &str) -> Session {
    Session {
        user: user.to_string(),
        scopes: vec!["read".to_string(), "write".to_string()],
    }
}

fn config() -> CacheConfig {
    CacheConfig {
        clustering_enabled: false,
        persistence_interval_ms: 50,
        ..CacheConfig::default()
    }
}

#[tokio::test]
async fn test_periodic_snapshot_survives_restart() {
    let storage = Arc::new(MemoryStorage::new());
    let first: AdvancedCache<Session> = AdvancedCache::builder(config())
        .storage(storage.clone())
        .start();
    first.set("s1", session("ada"), None).await.unwrap();
    first.get("s1").await.unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(storage.get(SNAPSHOT_KEY).unwrap().is_some());
    // Dropped without destroy: only the periodic snapshot remains
    drop(first);

    let second: AdvancedCache<Session> = AdvancedCache::builder(config())
        .storage(storage)
        .start();
    assert_eq!(second.get("s1").await.unwrap(), Some(session("ada")));

    let stats = second.stats().await.unwrap();
    assert_eq!(stats.total_entries, 1);
    assert!(stats.hits >= 2);
}

#[tokio::test]
async fn test_compressed_entries_survive_restart() {
    let storage = Arc::new(MemoryStorage::new());
    let long_user = "x".repeat(5_000);
    let first: AdvancedCache<Session> = AdvancedCache::builder(config())
        .storage(storage.clone())
        .start();
    first.set("big", session(&long_user), None).await.unwrap();
    first.destroy().await;

    let second: AdvancedCache<Session> = AdvancedCache::builder(config())
        .storage(storage)
        .start();

    assert_eq!(second.get("big").await.unwrap(), Some(session(&long_user)));
    assert_eq!(second.stats().await.unwrap().compressions, 1);
}

#[tokio::test]
async fn test_file_storage_restart() {
    let dir = std::env::temp_dir().join(format!("tabcache-it-{}", uuid::Uuid::new_v4()));
    {
        let storage = Arc::new(FileStorage::open(&dir).unwrap());
        let cache: AdvancedCache<i64> = AdvancedCache::builder(config())
            .storage(storage)
            .start();
        cache.increment("visits", 7).await.unwrap();
        cache.destroy().await;
    }

    let storage = Arc::new(FileStorage::open(&dir).unwrap());
    let cache: AdvancedCache<i64> = AdvancedCache::builder(config())
        .storage(storage)
        .start();
    assert_eq!(cache.get("visits").await.unwrap(), Some(7));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(SNAPSHOT_KEY, "{not json").unwrap();

    let cache: AdvancedCache<i64> = AdvancedCache::builder(config())
        .storage(storage)
        .start();

    assert_eq!(cache.len().await.unwrap(), 0);
    cache.set("a", 1, None).await.unwrap();
    assert_eq!(cache.get("a").await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_snapshot_quota_failure_is_reported() {
    let storage = Arc::new(MemoryStorage::with_quota(16));
    let cache: AdvancedCache<String> = AdvancedCache::builder(config())
        .storage(storage)
        .start();
    cache.set("a", "more than sixteen bytes".to_string(), None).await.unwrap();

    let result = cache.save_snapshot().await;

    assert!(matches!(result, Err(CacheError::Storage(_))));
    // The cache keeps serving
    assert!(cache.has("a").await.unwrap());
}

#[tokio::test]
async fn test_destroy_emits_save_and_rejects_calls() {
    let cache: AdvancedCache<i64> = AdvancedCache::builder(config()).start();
    let mut events = cache
        .subscribe(&[CacheEventKind::PersistenceSave, CacheEventKind::Clear])
        .await
        .unwrap();
    cache.set("a", 1, None).await.unwrap();

    cache.destroy().await;

    let kinds: Vec<CacheEventKind> = events.drain().into_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![CacheEventKind::PersistenceSave, CacheEventKind::Clear]
    );
    assert!(matches!(cache.len().await, Err(CacheError::Destroyed)));
    assert!(matches!(cache.increment("a", 1).await, Err(CacheError::Destroyed)));
}
