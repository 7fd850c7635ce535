//! Tabcache - an embeddable in-memory cache engine
//!
//! TTL expiry, size and entry bounds with pluggable eviction, transparent
//! compression, cross-instance replication with soft leader election and
//! periodic snapshots. Ships with an HTTP front end over the same engine.

pub mod api;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod persistence;
pub mod storage;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheEvent, CacheEventKind, CacheStats, EvictionPolicy};
pub use cluster::{ClusterBus, ClusterTransport};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use manager::{AdvancedCache, CacheBuilder};
pub use storage::{FileStorage, KvStorage, MemoryStorage};
