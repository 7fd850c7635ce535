//! Eviction Policy Module
//!
//! Chooses a victim key when the capacity governor needs to free room.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;

// == Eviction Policy ==
/// Strategy used to pick the entry to evict.
///
/// Every policy is a linear scan over the current entries; the store is bounded
/// by `max_entries` so this stays cheap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently read (or written) entry
    #[default]
    Lru,
    /// Least frequently read entry
    Lfu,
    /// Any already-expired entry, falling back to LRU when none is expired
    Ttl,
    /// Uniformly random live key
    Random,
}

impl EvictionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Ttl => "ttl",
            EvictionPolicy::Random => "random",
        }
    }

    // == Select Victim ==
    /// Returns the key to evict, or None if the store is empty.
    pub fn select_victim<V>(
        &self,
        entries: &HashMap<String, CacheEntry<V>>,
        now: u64,
    ) -> Option<String> {
        match self {
            EvictionPolicy::Lru => least_recently_used(entries),
            EvictionPolicy::Lfu => entries
                .iter()
                .min_by_key(|(_, e)| (e.access_count, e.access_tick))
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Ttl => entries
                .iter()
                .filter(|(_, e)| e.is_expired_at(now))
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone())
                .or_else(|| least_recently_used(entries)),
            EvictionPolicy::Random => entries.keys().choose(&mut rand::rng()).cloned(),
        }
    }
}

fn least_recently_used<V>(entries: &HashMap<String, CacheEntry<V>>) -> Option<String> {
    entries
        .iter()
        .min_by_key(|(_, e)| (e.last_accessed_at, e.access_tick))
        .map(|(k, _)| k.clone())
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "ttl" => Ok(EvictionPolicy::Ttl),
            "random" => Ok(EvictionPolicy::Random),
            other => Err(format!("unknown eviction policy: {}", other)),
        }
    }
}
