//! Cache Store Module
//!
//! Main cache engine: entry map, capacity governor, compression, TTL and statistics.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{
    CacheEntry, CacheEventKind, CacheStats, CompressionCodec, Counter, EntryMetadata, EventBus,
    EventSubscription, EvictionPolicy, StoredValue, MAX_KEY_LENGTH,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Cache Value ==
/// Bounds every cached value type satisfies.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Store handle shared between the public surface and the background tasks.
pub type SharedStore<V> = Arc<RwLock<CacheStore<V>>>;

// == Cache Store ==
/// Main cache storage with pluggable eviction, compression and TTL support.
///
/// All operations take `&mut self`; compound operations such as
/// check-capacity-then-insert are atomic with respect to one another.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Performance statistics
    stats: CacheStats,
    /// Lifecycle event publisher
    events: EventBus,
    codec: CompressionCodec,
    policy: EvictionPolicy,
    /// Maximum summed `size_bytes`
    max_size: usize,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Default TTL in milliseconds for entries without explicit TTL
    default_ttl_ms: u64,
    /// Monotonic recency counter
    tick: u64,
}

impl<V: CacheValue> CacheStore<V> {
    // == Constructor ==
    /// Creates a new CacheStore from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            events: EventBus::new(),
            codec: CompressionCodec::new(config.enable_compression, config.compression_threshold),
            policy: config.eviction_policy,
            max_size: config.max_size,
            max_entries: config.max_entries,
            default_ttl_ms: config.default_ttl_ms,
            tick: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    // == Set ==
    /// Stores a key-value pair with optional TTL, replacing any existing entry.
    ///
    /// The value is compressed when its JSON form exceeds the compression
    /// threshold. Room is made via the eviction policy before the insert.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl_ms` - Optional TTL in milliseconds (uses the default if None)
    /// * `metadata` - Optional caller attributes
    pub fn set(
        &mut self,
        key: String,
        value: V,
        ttl_ms: Option<u64>,
        metadata: Option<EntryMetadata>,
    ) -> Result<()> {
        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidRequest(format!(
                "Key must be between 1 and {} bytes",
                MAX_KEY_LENGTH
            )));
        }

        let (stored, size_bytes) = self.encode(&key, value);

        // Re-set replaces the entry wholesale
        if let Some(old) = self.entries.remove(&key) {
            self.stats.remove_entry(old.size_bytes);
        }

        self.make_room(size_bytes);

        let tick = self.next_tick();
        let mut entry = CacheEntry::new(stored, size_bytes, ttl_ms.unwrap_or(self.default_ttl_ms))
            .with_metadata(metadata);
        entry.access_tick = tick;

        self.entries.insert(key.clone(), entry);
        self.stats.add_entry(size_bytes);
        self.events
            .emit(CacheEventKind::Set, Some(key.as_str()), Some(size_bytes));

        debug!("Set key '{}' ({} bytes)", key, size_bytes);
        Ok(())
    }

    /// Serializes `value` to measure it and compresses it when worthwhile.
    fn encode(&mut self, key: &str, value: V) -> (StoredValue<V>, usize) {
        let bytes = match serde_json::to_vec(&value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize value for '{}', storing raw: {}", key, e);
                return (StoredValue::Raw(value), std::mem::size_of::<V>());
            }
        };

        if !self.codec.should_compress(bytes.len()) {
            return (StoredValue::Raw(value), bytes.len());
        }

        match self.codec.compress(&bytes) {
            Ok(compressed) if compressed.len() < bytes.len() => {
                self.stats.record_compression(bytes.len(), compressed.len());
                self.events.emit(
                    CacheEventKind::Compression,
                    Some(key),
                    Some(compressed.len()),
                );
                let size = compressed.len();
                (StoredValue::Lz4(compressed), size)
            }
            Ok(_) => (StoredValue::Raw(value), bytes.len()),
            Err(e) => {
                warn!("{} for '{}', storing uncompressed", e, key);
                (StoredValue::Raw(value), bytes.len())
            }
        }
    }

    // == Capacity Governor ==
    /// Evicts until `required` more bytes and one more entry fit.
    ///
    /// Stops when nothing is left to evict, letting the insert proceed over budget.
    fn make_room(&mut self, required: usize) {
        let now = current_timestamp_ms();
        while self.stats.total_size + required > self.max_size
            || self.entries.len() >= self.max_entries
        {
            let Some(victim) = self.policy.select_victim(&self.entries, now) else {
                if required > self.max_size {
                    warn!(
                        "Entry of {} bytes exceeds max cache size {}, inserting over budget",
                        required, self.max_size
                    );
                }
                break;
            };
            if let Some(evicted) = self.entries.remove(&victim) {
                self.stats.remove_entry(evicted.size_bytes);
                self.stats.record_eviction();
                self.events
                    .emit(CacheEventKind::Evict, Some(victim.as_str()), Some(evicted.size_bytes));
                debug!("Evicted key '{}' ({} policy)", victim, self.policy);
            }
        }
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns None if the key is absent, expired (the entry is removed) or
    /// cannot be decoded.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = current_timestamp_ms();
        if !self.live_or_reap(key, now) {
            self.stats.record_miss();
            return None;
        }

        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        entry.touch(now, tick);
        let size = entry.size_bytes;

        let decoded = match &entry.value {
            StoredValue::Raw(value) => Some(value.clone()),
            StoredValue::Lz4(bytes) => {
                let value = decode_compressed(&self.codec, key, bytes);
                if value.is_some() {
                    self.events
                        .emit(CacheEventKind::Decompression, Some(key), Some(size));
                }
                value
            }
        };

        match decoded {
            Some(value) => {
                self.stats.record_hit();
                self.events.emit(CacheEventKind::Get, Some(key), Some(size));
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Returns true if `key` is present and live; reaps it if expired.
    fn live_or_reap(&mut self, key: &str, now: u64) -> bool {
        match self.entries.get(key) {
            None => false,
            Some(entry) if entry.is_expired_at(now) => {
                self.remove_entry(key, CacheEventKind::Expire);
                false
            }
            Some(_) => true,
        }
    }

    fn remove_entry(&mut self, key: &str, kind: CacheEventKind) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.stats.remove_entry(entry.size_bytes);
        self.events.emit(kind, Some(key), Some(entry.size_bytes));
        Some(entry)
    }

    // == Has ==
    /// Checks for a live entry without touching access bookkeeping.
    pub fn has(&mut self, key: &str) -> bool {
        self.live_or_reap(key, current_timestamp_ms())
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key, CacheEventKind::Delete).is_some()
    }

    // == Clear ==
    /// Removes every entry and resets size/count statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats.reset_occupancy();
        self.events.emit(CacheEventKind::Clear, None, None);
    }

    // == Expire ==
    /// Overrides the TTL of an existing entry and restarts its TTL window.
    pub fn expire(&mut self, key: &str, ttl_ms: u64) -> bool {
        let now = current_timestamp_ms();
        if !self.live_or_reap(key, now) {
            return false;
        }
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.restart_ttl(ttl_ms, now);
                true
            }
            None => false,
        }
    }

    // == TTL ==
    /// Remaining TTL in milliseconds, or -1 if the key is absent or expired.
    /// An expired entry is reaped.
    pub fn ttl(&mut self, key: &str) -> i64 {
        let now = current_timestamp_ms();
        if !self.live_or_reap(key, now) {
            return -1;
        }
        self.entries
            .get(key)
            .map_or(-1, |entry| {
                i64::try_from(entry.ttl_remaining_ms(now)).unwrap_or(i64::MAX)
            })
    }

    // == Invalidate Pattern ==
    /// Deletes every key matching `pattern`. Returns the removed keys.
    pub fn invalidate_pattern(&mut self, pattern: &Regex) -> Vec<String> {
        let matching: Vec<String> = self
            .entries
            .keys()
            .filter(|key| pattern.is_match(key))
            .cloned()
            .collect();

        for key in &matching {
            self.remove_entry(key, CacheEventKind::Delete);
        }
        matching
    }

    // == Batch Operations ==
    /// Sets every pair independently. All pairs are attempted; the first error is returned.
    pub fn set_multiple(&mut self, items: Vec<(String, V)>, ttl_ms: Option<u64>) -> Result<()> {
        let mut first_error = None;
        for (key, value) in items {
            if let Err(e) = self.set(key, value, ttl_ms, None) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Gets every key independently; a miss for one key does not affect the others.
    pub fn get_multiple(&mut self, keys: &[&str]) -> HashMap<String, Option<V>> {
        keys.iter()
            .map(|key| (key.to_string(), self.get(key)))
            .collect()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key, CacheEventKind::Expire);
        }

        self.stats.record_cleanup(now);
        self.events.emit(CacheEventKind::Cleanup, None, None);
        expired_keys.len()
    }

    // == Replication Hooks ==
    /// Installs an entry received from a peer. Bypasses the capacity governor.
    pub fn apply_remote_set(&mut self, key: String, mut entry: CacheEntry<V>) {
        if let Some(old) = self.entries.remove(&key) {
            self.stats.remove_entry(old.size_bytes);
        }
        entry.access_tick = self.next_tick();
        self.stats.add_entry(entry.size_bytes);
        self.events
            .emit(CacheEventKind::ClusterSync, Some(key.as_str()), Some(entry.size_bytes));
        self.entries.insert(key, entry);
    }

    /// Removes an entry on behalf of a peer.
    pub fn apply_remote_delete(&mut self, key: &str) -> bool {
        self.remove_entry(key, CacheEventKind::ClusterSync).is_some()
    }

    /// Returns a clone of the raw entry, without access bookkeeping.
    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.get(key).cloned()
    }

    /// Clones every entry.
    pub fn snapshot_entries(&self) -> Vec<(String, CacheEntry<V>)> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect()
    }

    // == Restore ==
    /// Loads entries verbatim and adopts `stats`, reconciling size and count
    /// with what was actually loaded. TTLs are not re-validated.
    pub fn restore(&mut self, entries: Vec<(String, CacheEntry<V>)>, stats: CacheStats) {
        self.entries.clear();
        self.stats = stats;
        self.stats.reset_occupancy();
        for (key, mut entry) in entries {
            entry.access_tick = self.next_tick();
            self.stats.add_entry(entry.size_bytes);
            self.entries.insert(key, entry);
        }
        self.events.emit(CacheEventKind::PersistenceLoad, None, None);
    }

    // == Events ==
    /// Subscribes to lifecycle events; an empty slice means every kind.
    pub fn subscribe(&self, kinds: &[CacheEventKind]) -> EventSubscription {
        self.events.subscribe(kinds)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Detaches every event subscriber.
    pub fn close_events(&mut self) {
        self.events.close();
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: CacheValue + Counter> CacheStore<V> {
    // == Increment ==
    /// Adds `amount` to the numeric value at `key`, treating a missing key as 0.
    ///
    /// A result the value type cannot represent is rejected and the stored
    /// counter is left unchanged. The existing TTL and metadata are not preserved; the entry is re-set
    /// with the default TTL.
    pub fn increment(&mut self, key: &str, amount: i64) -> Result<i64> {
        let current = match self.get(key) {
            Some(value) => value
                .to_counter()
                .ok_or_else(|| CacheError::InvalidValue(format!("'{}' is not a number", key)))?,
            None => 0,
        };
        let next = current.checked_add(amount).ok_or_else(|| {
            CacheError::InvalidValue(format!("Counter '{}' would overflow", key))
        })?;
        let value = V::from_counter(next).ok_or_else(|| {
            CacheError::InvalidValue(format!("Counter '{}' cannot hold {}", key, next))
        })?;
        self.set(key.to_string(), value, None, None)?;
        Ok(next)
    }

    // == Decrement ==
    pub fn decrement(&mut self, key: &str, amount: i64) -> Result<i64> {
        let negated = amount.checked_neg().ok_or_else(|| {
            CacheError::InvalidValue(format!("Cannot decrement '{}' by {}", key, amount))
        })?;
        self.increment(key, negated)
    }
}

/// Decompresses and decodes a stored value, falling back to reading the
/// stored bytes as plain JSON.
fn decode_compressed<V: CacheValue>(codec: &CompressionCodec, key: &str, bytes: &[u8]) -> Option<V> {
    let decoded = codec
        .decompress(bytes)
        .and_then(|raw| serde_json::from_slice(&raw).map_err(CacheError::from));
    match decoded {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to decode '{}': {}, trying stored bytes as-is", key, e);
            serde_json::from_slice(bytes).ok()
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::thread::sleep;
    use std::time::Duration;

    fn config() -> CacheConfig {
        CacheConfig {
            max_entries: 100,
            default_ttl_ms: 300_000,
            ..CacheConfig::default()
        }
    }

    fn store() -> CacheStore<Value> {
        CacheStore::new(&config())
    }

    #[test]
    fn test_store_new() {
        let store = store();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = store();

        store.set("key1".to_string(), json!({"x": 1}), None, None).unwrap();

        assert_eq!(store.get("key1"), Some(json!({"x": 1})));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = store();
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn test_store_overwrite_resets_entry() {
        let mut store = store();

        store.set("key1".to_string(), json!("value1"), None, None).unwrap();
        store.get("key1");
        store.set("key1".to_string(), json!("value2"), None, None).unwrap();

        assert_eq!(store.entry("key1").unwrap().access_count, 0);
        assert_eq!(store.get("key1"), Some(json!("value2")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().total_size, 8);
    }

    #[test]
    fn test_store_rejects_invalid_key() {
        let mut store = store();
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);

        assert!(matches!(
            store.set(long_key, json!(1), None, None),
            Err(CacheError::InvalidRequest(_))
        ));
        assert!(matches!(
            store.set(String::new(), json!(1), None, None),
            Err(CacheError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_ttl_scenario() {
        let mut store = store();

        store.set("a".to_string(), json!({"x": 1}), Some(50), None).unwrap();
        assert_eq!(store.get("a"), Some(json!({"x": 1})));

        sleep(Duration::from_millis(60));

        assert!(store.get("a").is_none());
        assert!(!store.has("a"));
        assert_eq!(store.len(), 0);
        assert_eq!(store.stats().total_size, 0);
    }

    #[test]
    fn test_has_reaps_expired_entry() {
        let mut store = store();
        store.set("a".to_string(), json!(1), Some(10), None).unwrap();

        sleep(Duration::from_millis(30));

        assert!(!store.has("a"));
        assert!(store.entry("a").is_none());
    }

    #[test]
    fn test_lru_eviction_scenario() {
        let mut store: CacheStore<i64> = CacheStore::new(&CacheConfig {
            max_entries: 2,
            eviction_policy: EvictionPolicy::Lru,
            ..config()
        });

        store.set("a".to_string(), 1, None, None).unwrap();
        store.set("b".to_string(), 2, None, None).unwrap();
        store.get("a");
        store.set("c".to_string(), 3, None, None).unwrap();

        assert!(!store.has("b"));
        assert!(store.has("a"));
        assert!(store.has("c"));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_lfu_eviction() {
        let mut store: CacheStore<i64> = CacheStore::new(&CacheConfig {
            max_entries: 2,
            eviction_policy: EvictionPolicy::Lfu,
            ..config()
        });

        store.set("a".to_string(), 1, None, None).unwrap();
        store.set("b".to_string(), 2, None, None).unwrap();
        store.get("a");
        store.get("a");
        store.get("b");
        store.set("c".to_string(), 3, None, None).unwrap();

        assert!(store.has("a"));
        assert!(!store.has("b"));
    }

    #[test]
    fn test_size_bound_evicts_until_fits() {
        // Each "xxxxxxxx" value is 10 bytes of JSON
        let mut store: CacheStore<String> = CacheStore::new(&CacheConfig {
            max_size: 25,
            enable_compression: false,
            ..config()
        });

        store.set("a".to_string(), "x".repeat(8), None, None).unwrap();
        store.set("b".to_string(), "x".repeat(8), None, None).unwrap();
        store.set("c".to_string(), "x".repeat(8), None, None).unwrap();

        let stats = store.stats();
        assert!(stats.total_size <= 25);
        assert_eq!(stats.total_entries, 2);
        assert!(!store.has("a"));
    }

    #[test]
    fn test_oversized_entry_inserted_over_budget() {
        let mut store: CacheStore<String> = CacheStore::new(&CacheConfig {
            max_size: 5,
            enable_compression: false,
            ..config()
        });

        store.set("small".to_string(), "a".to_string(), None, None).unwrap();
        store.set("big".to_string(), "x".repeat(32), None, None).unwrap();

        assert!(!store.has("small"));
        assert!(store.has("big"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_compression_round_trip() {
        let mut store: CacheStore<String> = CacheStore::new(&CacheConfig {
            compression_threshold: 64,
            ..config()
        });
        let big = "hello world ".repeat(100);

        store.set("big".to_string(), big.clone(), None, None).unwrap();
        store.set("small".to_string(), "tiny".to_string(), None, None).unwrap();

        let entry = store.entry("big").unwrap();
        assert!(entry.is_compressed());
        assert!(entry.size_bytes < big.len());
        assert!(!store.entry("small").unwrap().is_compressed());

        assert_eq!(store.get("big"), Some(big));
        let stats = store.stats();
        assert_eq!(stats.compressions, 1);
        assert!(stats.compression_ratio > 0.0 && stats.compression_ratio < 1.0);
    }

    #[test]
    fn test_corrupt_compressed_value_is_a_miss() {
        let mut store: CacheStore<String> = CacheStore::new(&config());
        let mut entry = CacheEntry::new(StoredValue::Lz4(vec![0xff; 8]), 8, 60_000);
        entry.created_at = current_timestamp_ms();
        store.apply_remote_set("broken".to_string(), entry);
        store.set("fine".to_string(), "ok".to_string(), None, None).unwrap();

        let results = store.get_multiple(&["broken", "fine"]);

        assert_eq!(results["broken"], None);
        assert_eq!(results["fine"], Some("ok".to_string()));
    }

    #[test]
    fn test_store_delete_is_idempotent() {
        let mut store = store();
        store.set("key1".to_string(), json!("v"), None, None).unwrap();

        assert!(store.delete("key1"));
        let before = store.stats();
        assert!(!store.delete("key1"));
        assert_eq!(store.stats(), before);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_keeps_cumulative_counters() {
        let mut store = store();
        store.set("a".to_string(), json!(1), None, None).unwrap();
        store.get("a");
        store.get("missing");

        store.clear();

        let stats = store.stats();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_expire_restarts_window() {
        let mut store = store();
        store.set("a".to_string(), json!(1), Some(80), None).unwrap();

        sleep(Duration::from_millis(50));
        assert!(store.expire("a", 80));
        sleep(Duration::from_millis(50));

        assert!(store.has("a"));
        assert!(!store.expire("missing", 10));
    }

    #[test]
    fn test_ttl_remaining() {
        let mut store = store();
        store.set("a".to_string(), json!(1), Some(10_000), None).unwrap();

        let remaining = store.ttl("a");
        assert!(remaining <= 10_000 && remaining >= 9_000);
        assert_eq!(store.ttl("missing"), -1);
    }

    #[test]
    fn test_ttl_of_expired_entry_reaps_it() {
        let mut store = store();
        store.set("a".to_string(), json!(1), Some(20), None).unwrap();

        sleep(Duration::from_millis(40));

        assert_eq!(store.ttl("a"), -1);
        assert!(store.entry("a").is_none());
        assert_eq!(store.stats().total_entries, 0);
    }

    #[test]
    fn test_increment_scenario() {
        let mut store: CacheStore<i64> = CacheStore::new(&config());

        assert_eq!(store.increment("counter", 1).unwrap(), 1);
        assert_eq!(store.increment("counter", 1).unwrap(), 2);
        assert_eq!(store.increment("counter", 1).unwrap(), 3);
        assert_eq!(store.decrement("counter", 3).unwrap(), 0);
    }

    #[test]
    fn test_unsigned_counter_rejects_going_negative() {
        let mut store: CacheStore<u64> = CacheStore::new(&config());

        assert!(matches!(
            store.decrement("n", 1),
            Err(CacheError::InvalidValue(_))
        ));
        assert_eq!(store.get("n"), None);

        store.set("n".to_string(), 2, None, None).unwrap();
        assert!(store.decrement("n", 3).is_err());
        assert_eq!(store.get("n"), Some(2));
        assert_eq!(store.increment("n", 1).unwrap(), 3);
        assert_eq!(store.decrement("n", 1).unwrap(), 2);
    }

    #[test]
    fn test_i32_counter_rejects_overflow() {
        let mut store: CacheStore<i32> = CacheStore::new(&config());
        store.set("n".to_string(), i32::MAX, None, None).unwrap();

        assert!(matches!(
            store.increment("n", 1),
            Err(CacheError::InvalidValue(_))
        ));
        assert_eq!(store.get("n"), Some(i32::MAX));
        assert_eq!(store.decrement("n", 1).unwrap(), i64::from(i32::MAX) - 1);
    }

    #[test]
    fn test_increment_non_numeric_fails() {
        let mut store = store();
        store.set("name".to_string(), json!("bob"), None, None).unwrap();

        assert!(matches!(
            store.increment("name", 1),
            Err(CacheError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_invalidate_pattern_scenario() {
        let mut store = store();
        for key in ["session_1", "session_2", "other"] {
            store.set(key.to_string(), json!(true), None, None).unwrap();
        }

        let removed = store.invalidate_pattern(&Regex::new("^session_").unwrap());

        assert_eq!(removed.len(), 2);
        assert!(store.has("other"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_multiple_and_get_multiple() {
        let mut store = store();
        store
            .set_multiple(
                vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))],
                None,
            )
            .unwrap();

        let results = store.get_multiple(&["a", "b", "c"]);
        assert_eq!(results["a"], Some(json!(1)));
        assert_eq!(results["b"], Some(json!(2)));
        assert_eq!(results["c"], None);
    }

    #[test]
    fn test_store_cleanup_expired() {
        let mut store = store();

        store.set("key1".to_string(), json!(1), Some(10), None).unwrap();
        store.set("key2".to_string(), json!(2), Some(10_000), None).unwrap();

        sleep(Duration::from_millis(30));

        let removed = store.cleanup_expired();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.stats().last_cleanup.is_some());
    }

    #[test]
    fn test_events_emitted() {
        let mut store: CacheStore<i64> = CacheStore::new(&CacheConfig {
            max_entries: 1,
            ..config()
        });
        let mut sub = store.subscribe(&[]);

        store.set("a".to_string(), 1, None, None).unwrap();
        store.get("a");
        store.set("b".to_string(), 2, None, None).unwrap();
        store.delete("b");
        store.clear();

        let kinds: Vec<CacheEventKind> = sub.drain().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CacheEventKind::Set,
                CacheEventKind::Get,
                CacheEventKind::Evict,
                CacheEventKind::Set,
                CacheEventKind::Delete,
                CacheEventKind::Clear,
            ]
        );
    }

    #[test]
    fn test_restore_reconciles_occupancy() {
        let mut source = store();
        source.set("a".to_string(), json!("aaaa"), None, None).unwrap();
        source.set("b".to_string(), json!("bb"), None, None).unwrap();
        source.get("a");

        let mut stale_stats = source.stats();
        stale_stats.total_entries = 99;

        let mut target = store();
        target.restore(source.snapshot_entries(), stale_stats);

        let stats = target.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_size, source.stats().total_size);
        assert_eq!(stats.hits, 1);
        assert_eq!(target.get("b"), Some(json!("bb")));
    }
}
