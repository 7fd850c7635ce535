//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and access bookkeeping.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Stored Value ==
/// The value held by an entry, either as-is or as lz4-compressed JSON bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum StoredValue<V> {
    /// Uncompressed value
    Raw(V),
    /// lz4 block (size-prefixed) over the JSON encoding of the value
    Lz4(Vec<u8>),
}

impl<V> StoredValue<V> {
    /// Whether decompression must run before the value is returned.
    pub fn is_compressed(&self) -> bool {
        matches!(self, StoredValue::Lz4(_))
    }
}

// == Entry Metadata ==
/// Caller-supplied attributes carried alongside an entry. Opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: StoredValue<V>,
    /// Creation timestamp (Unix milliseconds), reset by `expire`
    pub created_at: u64,
    /// Last successful read (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Time-to-live relative to `created_at`
    pub ttl_ms: u64,
    /// Number of successful reads
    pub access_count: u64,
    /// Size of the stored (possibly compressed) value
    pub size_bytes: usize,
    #[serde(default)]
    pub metadata: Option<EntryMetadata>,
    /// Store-local recency tick; breaks ties between equal millisecond stamps.
    #[serde(skip)]
    pub(crate) access_tick: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry stamped with the current time.
    ///
    /// # Arguments
    /// * `value` - The (possibly compressed) value to store
    /// * `size_bytes` - Serialized size of `value`
    /// * `ttl_ms` - TTL in milliseconds
    pub fn new(value: StoredValue<V>, size_bytes: usize, ttl_ms: u64) -> Self {
        let now = current_timestamp_ms();

        Self {
            value,
            created_at: now,
            last_accessed_at: now,
            ttl_ms,
            access_count: 0,
            size_bytes,
            metadata: None,
            access_tick: 0,
        }
    }

    /// Attaches metadata to the entry.
    pub fn with_metadata(mut self, metadata: Option<EntryMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once strictly more than `ttl_ms` has elapsed since
    /// `created_at`; at exactly `ttl_ms` it is still live.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) > self.ttl_ms
    }

    /// Checks if the entry has expired against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds at `now`, saturating at zero.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.ttl_ms
            .saturating_sub(now.saturating_sub(self.created_at))
    }

    // == Touch ==
    /// Records a successful read.
    pub fn touch(&mut self, now: u64, tick: u64) {
        self.access_count += 1;
        self.last_accessed_at = now;
        self.access_tick = tick;
    }

    // == Restart TTL ==
    /// Overrides the TTL and restarts the TTL window from `now`.
    pub fn restart_ttl(&mut self, ttl_ms: u64, now: u64) {
        self.ttl_ms = ttl_ms;
        self.created_at = now;
    }

    /// Whether the stored value is compressed.
    pub fn is_compressed(&self) -> bool {
        self.value.is_compressed()
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn raw(value: &str, ttl_ms: u64) -> CacheEntry<String> {
        CacheEntry::new(StoredValue::Raw(value.to_string()), value.len() + 2, ttl_ms)
    }

    #[test]
    fn test_entry_creation() {
        let entry = raw("test_value", 60_000);

        assert_eq!(entry.value, StoredValue::Raw("test_value".to_string()));
        assert_eq!(entry.access_count, 0);
        assert_eq!(entry.created_at, entry.last_accessed_at);
        assert!(!entry.is_compressed());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = raw("test_value", 50);

        assert!(!entry.is_expired());

        sleep(Duration::from_millis(70));

        assert!(entry.is_expired());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let mut entry = raw("test", 100);
        entry.created_at = 1_000;

        // Live at exactly ttl elapsed, expired one millisecond later
        assert!(!entry.is_expired_at(1_100));
        assert!(entry.is_expired_at(1_101));
    }

    #[test]
    fn test_ttl_remaining_ms() {
        let mut entry = raw("test", 10_000);
        entry.created_at = 5_000;

        assert_eq!(entry.ttl_remaining_ms(5_000), 10_000);
        assert_eq!(entry.ttl_remaining_ms(9_000), 6_000);
        assert_eq!(entry.ttl_remaining_ms(20_000), 0);
    }

    #[test]
    fn test_touch_updates_access_bookkeeping() {
        let mut entry = raw("test", 10_000);

        entry.touch(entry.created_at + 5, 7);
        entry.touch(entry.created_at + 9, 8);

        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.last_accessed_at, entry.created_at + 9);
        assert_eq!(entry.access_tick, 8);
    }

    #[test]
    fn test_restart_ttl() {
        let mut entry = raw("test", 10);
        entry.created_at = 0;

        entry.restart_ttl(1_000, 500);

        assert_eq!(entry.ttl_ms, 1_000);
        assert_eq!(entry.created_at, 500);
        assert!(!entry.is_expired_at(1_400));
    }

    #[test]
    fn test_compressed_value_serializes_with_encoding_tag() {
        let entry: CacheEntry<String> = CacheEntry::new(StoredValue::Lz4(vec![1, 2, 3]), 3, 10);
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["value"]["encoding"], "lz4");
        assert!(entry.is_compressed());
    }
}
