//! Cluster Tasks
//!
//! The periodic sync/heartbeat schedule, the listener applying peer messages
//! and the reader pulling mirrored messages out of shared storage.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{current_timestamp_ms, CacheValue, SharedStore};
use crate::cluster::{ChannelTransport, ClusterMessage, ReplicationCoordinator};

/// Spawns the cluster schedule: leader claim, heartbeat and (when leading)
/// a `sync_request` every `interval`.
pub fn spawn_cluster_sync_task<V: CacheValue>(
    cache: SharedStore<V>,
    coordinator: Arc<ReplicationCoordinator>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting cluster sync task for node {} with interval of {:?}",
            coordinator.node_id(),
            interval
        );

        loop {
            coordinator.tick(&cache).await;
            tokio::time::sleep(interval).await;
        }
    })
}

/// Spawns the listener that applies messages arriving on `receiver`.
///
/// Ends when the transport closes.
pub fn spawn_cluster_listener<V: CacheValue>(
    cache: SharedStore<V>,
    coordinator: Arc<ReplicationCoordinator>,
    mut receiver: broadcast::Receiver<ClusterMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => coordinator.handle_message(&cache, message).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Cluster listener lagged, {} messages lost", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Cluster transport closed, listener exiting");
                    break;
                }
            }
        }
    })
}

/// Spawns the mirror reader: every `interval`, delivers slots other
/// processes wrote into the transport's storage onto its local bus.
///
/// Slots written before the reader started are skipped. Storage access runs
/// on the blocking pool.
pub fn spawn_mirror_reader(transport: ChannelTransport, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let since = current_timestamp_ms();
        info!("Starting mirror reader with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;
            let poller = transport.clone();
            let polled = tokio::task::spawn_blocking(move || {
                poller.poll_mirror(since, current_timestamp_ms())
            })
            .await;
            match polled {
                Ok(Ok(0)) => {}
                Ok(Ok(delivered)) => debug!("Delivered {} mirrored cluster messages", delivered),
                Ok(Err(e)) => warn!("Mirror poll failed: {}", e),
                Err(e) => warn!("Mirror poll task failed: {}", e),
            }
        }
    })
}
