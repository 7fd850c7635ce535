//! Cache Module
//!
//! Provides in-memory caching with TTL expiration, pluggable eviction,
//! compression and lifecycle events.

mod compression;
mod counter;
mod entry;
mod events;
mod eviction;
mod stats;
mod store;


// Re-export public types
pub use compression::CompressionCodec;
pub use counter::Counter;
pub use entry::{current_timestamp_ms, CacheEntry, EntryMetadata, StoredValue};
pub use events::{CacheEvent, CacheEventKind, EventBus, EventSubscription};
pub use eviction::EvictionPolicy;
pub use stats::CacheStats;
pub use store::{CacheStore, CacheValue, SharedStore};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
