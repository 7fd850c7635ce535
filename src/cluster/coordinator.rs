//! Replication Coordinator
//!
//! Broadcasts local mutations, applies remote ones, runs the leader's periodic
//! sync requests and keeps the peer registry. Best effort throughout: transport
//! failures are logged and never fail the local operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::{current_timestamp_ms, CacheEntry, CacheValue, SharedStore};
use crate::cluster::{ClusterAction, ClusterMessage, ClusterTransport, LeaderElection};
use crate::storage::KvStorage;

/// Peers unseen for this long are reported offline.
pub const NODE_OFFLINE_AFTER_MS: u64 = 30_000;

/// Peers unseen for this long are dropped from the registry.
pub const NODE_PRUNE_AFTER_MS: u64 = 5 * 60 * 1000;

// == Cluster Node ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
    Syncing,
}

/// A peer as last reported over the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterNode {
    pub id: String,
    pub address: Option<String>,
    pub status: NodeStatus,
    pub last_seen: u64,
    pub data_size: usize,
    pub entry_count: usize,
}

impl ClusterNode {
    fn new(id: &str, now: u64) -> Self {
        Self {
            id: id.to_string(),
            address: None,
            status: NodeStatus::Online,
            last_seen: now,
            data_size: 0,
            entry_count: 0,
        }
    }
}

// == Replication Coordinator ==
pub struct ReplicationCoordinator {
    node_id: String,
    address: String,
    transport: Arc<dyn ClusterTransport>,
    election: LeaderElection,
    nodes: RwLock<HashMap<String, ClusterNode>>,
    leader: AtomicBool,
}

impl ReplicationCoordinator {
    /// Creates a coordinator with a fresh random node id.
    pub fn new(
        address: impl Into<String>,
        transport: Arc<dyn ClusterTransport>,
        storage: Arc<dyn KvStorage>,
    ) -> Self {
        let node_id = uuid::Uuid::new_v4().to_string();
        Self {
            election: LeaderElection::new(storage, node_id.clone()),
            node_id,
            address: address.into(),
            transport,
            nodes: RwLock::new(HashMap::new()),
            leader: AtomicBool::new(false),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    /// Known peers, excluding this node.
    pub fn nodes(&self) -> Vec<ClusterNode> {
        let mut nodes: Vec<ClusterNode> = self.nodes.read().values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<ClusterMessage>> {
        self.transport.subscribe()
    }

    fn publish(&self, action: ClusterAction) {
        let name = action.name();
        let message = ClusterMessage {
            source: self.node_id.clone(),
            timestamp: current_timestamp_ms(),
            action,
        };
        if let Err(e) = self.transport.publish(&message) {
            warn!("Cluster broadcast of {} failed: {}", name, e);
        }
    }

    // == Outgoing Mutations ==
    pub fn broadcast_set<V: CacheValue>(&self, key: &str, entry: &CacheEntry<V>) {
        match serde_json::to_value(entry) {
            Ok(entry) => self.publish(ClusterAction::Set {
                key: key.to_string(),
                entry,
            }),
            Err(e) => warn!("Cannot replicate '{}': {}", key, e),
        }
    }

    pub fn broadcast_delete(&self, key: &str) {
        self.publish(ClusterAction::Delete {
            key: key.to_string(),
        });
    }

    pub fn broadcast_clear(&self) {
        self.publish(ClusterAction::Clear);
    }

    // == Tick ==
    /// One round of the cluster schedule: claim or refresh leadership, send a
    /// heartbeat, request a sync if leading, and age out silent peers.
    pub async fn tick<V: CacheValue>(&self, store: &SharedStore<V>) {
        let now = current_timestamp_ms();
        let leading = match self.election.try_claim(now) {
            Ok(leading) => leading,
            Err(e) => {
                warn!("Leader election failed: {}", e);
                false
            }
        };
        if self.leader.swap(leading, Ordering::SeqCst) != leading {
            info!(
                "Node {} {} cluster leader",
                self.node_id,
                if leading { "became" } else { "is no longer" }
            );
        }

        let stats = store.read().await.stats();
        self.publish(ClusterAction::Heartbeat {
            address: self.address.clone(),
            data_size: stats.total_size,
            entry_count: stats.total_entries,
        });

        if leading {
            self.publish(ClusterAction::SyncRequest);
        }

        self.refresh_nodes(now);
    }

    /// Marks silent peers offline and drops long-silent ones.
    pub fn refresh_nodes(&self, now: u64) {
        self.nodes.write().retain(|_, node| {
            let silence = now.saturating_sub(node.last_seen);
            if silence > NODE_OFFLINE_AFTER_MS {
                node.status = NodeStatus::Offline;
            }
            silence <= NODE_PRUNE_AFTER_MS
        });
    }

    fn touch_node(&self, id: &str, now: u64, status: NodeStatus) {
        let mut nodes = self.nodes.write();
        let node = nodes
            .entry(id.to_string())
            .or_insert_with(|| ClusterNode::new(id, now));
        node.last_seen = now;
        node.status = status;
    }

    // == Handle Message ==
    /// Applies a message from a peer. Messages from this node are ignored.
    ///
    /// Remote entries are written straight into the store, bypassing the
    /// capacity governor.
    pub async fn handle_message<V: CacheValue>(
        &self,
        store: &SharedStore<V>,
        message: ClusterMessage,
    ) {
        if message.source == self.node_id {
            return;
        }
        let now = current_timestamp_ms();
        self.touch_node(&message.source, now, NodeStatus::Online);
        debug!(
            "Applying {} from node {}",
            message.action.name(),
            message.source
        );

        match message.action {
            ClusterAction::Set { key, entry } => {
                if let Some(entry) = decode_entry::<V>(&key, entry) {
                    store.write().await.apply_remote_set(key, entry);
                }
            }
            ClusterAction::Delete { key } => {
                store.write().await.apply_remote_delete(&key);
            }
            ClusterAction::Clear => store.write().await.clear(),
            ClusterAction::SyncRequest => {
                let snapshot = store.read().await.snapshot_entries();
                let entries = snapshot
                    .into_iter()
                    .filter_map(|(key, entry)| match serde_json::to_value(&entry) {
                        Ok(value) => Some((key, value)),
                        Err(e) => {
                            warn!("Skipping '{}' in sync reply: {}", key, e);
                            None
                        }
                    })
                    .collect();
                self.publish(ClusterAction::SyncData { entries });
            }
            ClusterAction::SyncData { entries } => {
                self.touch_node(&message.source, now, NodeStatus::Syncing);
                let count = entries.len();
                {
                    let mut store = store.write().await;
                    for (key, entry) in entries {
                        if let Some(entry) = decode_entry::<V>(&key, entry) {
                            store.apply_remote_set(key, entry);
                        }
                    }
                }
                self.touch_node(&message.source, now, NodeStatus::Online);
                debug!("Synced {} entries from node {}", count, message.source);
            }
            ClusterAction::Heartbeat {
                address,
                data_size,
                entry_count,
            } => {
                if let Some(node) = self.nodes.write().get_mut(&message.source) {
                    node.address = Some(address);
                    node.data_size = data_size;
                    node.entry_count = entry_count;
                }
            }
        }
    }

    /// Gives up the leader slot, if held. Called on teardown.
    pub fn resign(&self) {
        if let Err(e) = self.election.resign() {
            warn!("Failed to release cluster leadership: {}", e);
        }
        self.leader.store(false, Ordering::SeqCst);
    }
}

fn decode_entry<V: CacheValue>(key: &str, entry: Value) -> Option<CacheEntry<V>> {
    match serde_json::from_value(entry) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("Ignoring undecodable replicated entry '{}': {}", key, e);
            None
        }
    }
}
