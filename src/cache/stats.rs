//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions and compression.

use serde::{Deserialize, Serialize};

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found, expired or undecodable)
    pub misses: u64,
    /// Number of entries evicted by the capacity governor
    pub evictions: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Current sum of `size_bytes` over all entries
    pub total_size: usize,
    /// Number of values stored compressed
    pub compressions: u64,
    /// Running mean of compressed/original size over all compressions
    pub compression_ratio: f64,
    /// Unix milliseconds of the last cleanup sweep
    pub last_cleanup: Option<u64>,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Record Compression ==
    /// Folds one compression into the running ratio.
    pub fn record_compression(&mut self, original: usize, compressed: usize) {
        if original == 0 {
            return;
        }
        let ratio = compressed as f64 / original as f64;
        let n = self.compressions as f64;
        self.compression_ratio = (self.compression_ratio * n + ratio) / (n + 1.0);
        self.compressions += 1;
    }

    // == Size Accounting ==
    /// Accounts for an inserted entry.
    pub fn add_entry(&mut self, size_bytes: usize) {
        self.total_entries += 1;
        self.total_size += size_bytes;
    }

    /// Accounts for a removed entry.
    pub fn remove_entry(&mut self, size_bytes: usize) {
        self.total_entries = self.total_entries.saturating_sub(1);
        self.total_size = self.total_size.saturating_sub(size_bytes);
    }

    /// Resets size and count. Cumulative counters are left untouched.
    pub fn reset_occupancy(&mut self) {
        self.total_entries = 0;
        self.total_size = 0;
    }

    pub fn record_cleanup(&mut self, at: u64) {
        self.last_cleanup = Some(at);
    }
}
