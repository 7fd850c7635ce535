//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache instance.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired cache entries at configured intervals
//! - Cluster Sync: Leader claim, heartbeat and sync requests
//! - Cluster Listener: Applies replication messages from peers
//! - Mirror Reader: Pulls replication messages other processes mirrored into storage
//! - Snapshot: Writes the store to durable storage

mod cleanup;
mod cluster;
mod snapshot;

pub use cleanup::spawn_cleanup_task;
pub use cluster::{spawn_cluster_listener, spawn_cluster_sync_task, spawn_mirror_reader};
pub use snapshot::spawn_snapshot_task;
