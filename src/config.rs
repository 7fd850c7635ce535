//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::EvictionPolicy;

/// Cache and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum summed size of stored values in bytes
    pub max_size: usize,
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Default TTL in milliseconds for entries without explicit TTL
    pub default_ttl_ms: u64,
    /// Expired-entry sweep interval in milliseconds
    pub cleanup_interval_ms: u64,
    /// Serialized size above which values are compressed
    pub compression_threshold: usize,
    pub enable_compression: bool,
    pub persistence_enabled: bool,
    /// Snapshot interval in milliseconds
    pub persistence_interval_ms: u64,
    pub clustering_enabled: bool,
    /// Leader sync / heartbeat interval in milliseconds
    pub cluster_sync_interval_ms: u64,
    /// How often mirrored cluster messages are read back from storage, in milliseconds
    pub mirror_poll_interval_ms: u64,
    pub eviction_policy: EvictionPolicy,
    /// Address this node reports to its peers
    pub node_address: String,
    /// HTTP server port
    pub server_port: u16,
    /// Directory backing durable storage for the server binary
    pub data_dir: PathBuf,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_SIZE` - Maximum total size in bytes (default: 100 MiB)
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 10000)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL (default: 300000)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Cleanup frequency (default: 60000)
    /// - `CACHE_COMPRESSION_THRESHOLD` - Compression threshold in bytes (default: 1024)
    /// - `CACHE_ENABLE_COMPRESSION` - (default: true)
    /// - `CACHE_PERSISTENCE_ENABLED` - (default: true)
    /// - `CACHE_PERSISTENCE_INTERVAL_MS` - Snapshot frequency (default: 30000)
    /// - `CACHE_CLUSTERING_ENABLED` - (default: true)
    /// - `CACHE_CLUSTER_SYNC_INTERVAL_MS` - (default: 5000)
    /// - `CACHE_MIRROR_POLL_INTERVAL_MS` - (default: 100)
    /// - `CACHE_EVICTION_POLICY` - `lru`, `lfu`, `ttl` or `random` (default: lru)
    /// - `CACHE_NODE_ADDRESS` - (default: 127.0.0.1:<port>)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_DATA_DIR` - Snapshot directory (default: .tabcache)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let server_port = env_or("SERVER_PORT", defaults.server_port);

        Self {
            max_size: env_or("CACHE_MAX_SIZE", defaults.max_size),
            max_entries: env_or("CACHE_MAX_ENTRIES", defaults.max_entries),
            default_ttl_ms: env_or("CACHE_DEFAULT_TTL_MS", defaults.default_ttl_ms),
            cleanup_interval_ms: env_or("CACHE_CLEANUP_INTERVAL_MS", defaults.cleanup_interval_ms),
            compression_threshold: env_or(
                "CACHE_COMPRESSION_THRESHOLD",
                defaults.compression_threshold,
            ),
            enable_compression: env_or("CACHE_ENABLE_COMPRESSION", defaults.enable_compression),
            persistence_enabled: env_or("CACHE_PERSISTENCE_ENABLED", defaults.persistence_enabled),
            persistence_interval_ms: env_or(
                "CACHE_PERSISTENCE_INTERVAL_MS",
                defaults.persistence_interval_ms,
            ),
            clustering_enabled: env_or("CACHE_CLUSTERING_ENABLED", defaults.clustering_enabled),
            cluster_sync_interval_ms: env_or(
                "CACHE_CLUSTER_SYNC_INTERVAL_MS",
                defaults.cluster_sync_interval_ms,
            ),
            mirror_poll_interval_ms: env_or(
                "CACHE_MIRROR_POLL_INTERVAL_MS",
                defaults.mirror_poll_interval_ms,
            ),
            eviction_policy: env_or("CACHE_EVICTION_POLICY", defaults.eviction_policy),
            node_address: env::var("CACHE_NODE_ADDRESS")
                .unwrap_or_else(|_| format!("127.0.0.1:{}", server_port)),
            server_port,
            data_dir: env::var("CACHE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn persistence_interval(&self) -> Duration {
        Duration::from_millis(self.persistence_interval_ms)
    }

    pub fn cluster_sync_interval(&self) -> Duration {
        Duration::from_millis(self.cluster_sync_interval_ms)
    }

    pub fn mirror_poll_interval(&self) -> Duration {
        Duration::from_millis(self.mirror_poll_interval_ms)
    }
}

/// Parses `name` from the environment, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100 * 1024 * 1024,
            max_entries: 10_000,
            default_ttl_ms: 5 * 60 * 1000,
            cleanup_interval_ms: 60_000,
            compression_threshold: 1024,
            enable_compression: true,
            persistence_enabled: true,
            persistence_interval_ms: 30_000,
            clustering_enabled: true,
            cluster_sync_interval_ms: 5_000,
            mirror_poll_interval_ms: 100,
            eviction_policy: EvictionPolicy::Lru,
            node_address: "127.0.0.1:3000".to_string(),
            server_port: 3000,
            data_dir: PathBuf::from(".tabcache"),
        }
    }
}
