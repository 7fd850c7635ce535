//! Broadcast transports for replication messages.
//!
//! [`NoopTransport`] serves single-context deployments. [`ClusterBus`] is a
//! shared in-process channel; its transports can additionally mirror every
//! message into a [`KvStorage`] and poll that storage for messages written
//! by other processes, which is how separate contexts reach each other.
//!
//! Mirror slots are keyed `cache_cluster_<timestamp>_<seq>_<node>` and stay
//! readable for [`MIRROR_MAX_AGE_MS`] before any poller sweeps them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cluster::ClusterMessage;
use crate::error::Result;
use crate::storage::KvStorage;
use crate::tasks::spawn_mirror_reader;

/// Prefix of the storage keys replication messages are mirrored under.
pub const MIRROR_KEY_PREFIX: &str = "cache_cluster_";

/// Mirror slots older than this are swept instead of delivered.
pub const MIRROR_MAX_AGE_MS: u64 = 30_000;

const BUS_CAPACITY: usize = 1024;

// == Transport Trait ==
/// Fire-and-forget delivery of replication messages to sibling contexts.
pub trait ClusterTransport: Send + Sync {
    /// Publishes a message to every subscriber, including the sender's own.
    fn publish(&self, message: &ClusterMessage) -> Result<()>;

    /// Returns a receiver for incoming messages, or None if the transport
    /// never delivers anything.
    fn subscribe(&self) -> Option<broadcast::Receiver<ClusterMessage>>;

    /// Starts pulling messages published outside this process, if the
    /// transport has such a source. The handle is aborted on teardown.
    fn spawn_reader(&self, _interval: Duration) -> Option<JoinHandle<()>> {
        None
    }
}

// == Noop Transport ==
/// Transport for deployments with a single context.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

impl ClusterTransport for NoopTransport {
    fn publish(&self, _message: &ClusterMessage) -> Result<()> {
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ClusterMessage>> {
        None
    }
}

// == Mirror Slots ==
/// Ordering position of a mirror slot, parsed from its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MirrorSlot {
    timestamp: u64,
    seq: u64,
}

impl MirrorSlot {
    /// Parses `cache_cluster_<ts>_<seq>_<node>`. Other keys under the prefix,
    /// such as the leader slot, yield None.
    fn parse(key: &str) -> Option<Self> {
        let mut parts = key.strip_prefix(MIRROR_KEY_PREFIX)?.splitn(3, '_');
        let timestamp = parts.next()?.parse().ok()?;
        let seq = parts.next()?.parse().ok()?;
        parts.next().filter(|node| !node.is_empty())?;
        Some(Self { timestamp, seq })
    }
}

fn mirror_key(timestamp: u64, seq: u64, source: &str) -> String {
    let node: String = source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    format!("{}{}_{}_{}", MIRROR_KEY_PREFIX, timestamp, seq, node)
}

/// Slots this bus has written or already delivered.
#[derive(Debug, Default)]
struct MirrorLedger {
    seen: HashSet<String>,
    seq: u64,
}

// == Cluster Bus ==
/// Shared medium connecting every cache instance created from it.
#[derive(Debug, Clone)]
pub struct ClusterBus {
    sender: broadcast::Sender<ClusterMessage>,
    ledger: Arc<Mutex<MirrorLedger>>,
}

impl ClusterBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            sender,
            ledger: Arc::new(Mutex::new(MirrorLedger::default())),
        }
    }

    /// Creates a transport attached to this bus.
    pub fn transport(&self) -> ChannelTransport {
        ChannelTransport {
            sender: self.sender.clone(),
            mirror: None,
            ledger: self.ledger.clone(),
        }
    }

    /// Creates a transport that also writes each message into `storage` and
    /// can read back messages other buses wrote there.
    pub fn mirrored_transport(&self, storage: Arc<dyn KvStorage>) -> ChannelTransport {
        ChannelTransport {
            mirror: Some(storage),
            ..self.transport()
        }
    }
}

impl Default for ClusterBus {
    fn default() -> Self {
        Self::new()
    }
}

// == Channel Transport ==
#[derive(Clone)]
pub struct ChannelTransport {
    sender: broadcast::Sender<ClusterMessage>,
    mirror: Option<Arc<dyn KvStorage>>,
    ledger: Arc<Mutex<MirrorLedger>>,
}

impl ChannelTransport {
    fn write_mirror(&self, storage: &dyn KvStorage, message: &ClusterMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        let key = {
            let mut ledger = self.ledger.lock();
            ledger.seq += 1;
            let key = mirror_key(message.timestamp, ledger.seq, &message.source);
            ledger.seen.insert(key.clone());
            key
        };
        storage.set(&key, &payload)?;
        Ok(())
    }

    // == Poll Mirror ==
    /// Delivers mirror slots written by other buses onto this bus, oldest
    /// first, and sweeps slots older than [`MIRROR_MAX_AGE_MS`].
    ///
    /// Slots stamped before `since` are marked seen without delivery.
    /// Returns the number of messages delivered.
    pub fn poll_mirror(&self, since: u64, now: u64) -> Result<usize> {
        let Some(storage) = &self.mirror else {
            return Ok(0);
        };

        let mut slots: Vec<(MirrorSlot, String)> = storage
            .keys_with_prefix(MIRROR_KEY_PREFIX)?
            .into_iter()
            .filter_map(|key| MirrorSlot::parse(&key).map(|slot| (slot, key)))
            .collect();
        slots.sort();

        let mut delivered = 0;
        for (slot, key) in slots {
            if now.saturating_sub(slot.timestamp) > MIRROR_MAX_AGE_MS {
                if let Err(e) = storage.remove(&key) {
                    warn!("Failed to sweep mirror slot {}: {}", key, e);
                }
                continue;
            }

            let fresh = self.ledger.lock().seen.insert(key.clone());
            if !fresh || slot.timestamp < since {
                continue;
            }

            let Some(raw) = storage.get(&key)? else {
                continue;
            };
            match serde_json::from_str::<ClusterMessage>(&raw) {
                Ok(message) => {
                    if self.sender.send(message).is_err() {
                        debug!("No cluster subscribers for mirrored slot {}", key);
                    }
                    delivered += 1;
                }
                Err(e) => warn!("Ignoring unreadable mirror slot {}: {}", key, e),
            }
        }

        // Swept slots can never be delivered again
        self.ledger.lock().seen.retain(|key| {
            MirrorSlot::parse(key)
                .is_some_and(|slot| now.saturating_sub(slot.timestamp) <= 2 * MIRROR_MAX_AGE_MS)
        });
        Ok(delivered)
    }
}

impl ClusterTransport for ChannelTransport {
    fn publish(&self, message: &ClusterMessage) -> Result<()> {
        if self.sender.send(message.clone()).is_err() {
            debug!("No cluster subscribers for {}", message.action.name());
        }
        match &self.mirror {
            Some(storage) => self.write_mirror(storage.as_ref(), message),
            None => Ok(()),
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ClusterMessage>> {
        Some(self.sender.subscribe())
    }

    fn spawn_reader(&self, interval: Duration) -> Option<JoinHandle<()>> {
        self.mirror
            .is_some()
            .then(|| spawn_mirror_reader(self.clone(), interval))
    }
}
