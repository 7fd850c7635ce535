//! Cluster Module
//!
//! Best-effort, eventually-consistent replication between cache instances
//! sharing a broadcast medium. Not a consensus protocol: no ordering or
//! delivery guarantees.

mod coordinator;
mod leader;
mod message;
mod transport;

pub use coordinator::{
    ClusterNode, NodeStatus, ReplicationCoordinator, NODE_OFFLINE_AFTER_MS, NODE_PRUNE_AFTER_MS,
};
pub use leader::{LeaderClaim, LeaderElection, LEADER_KEY, LEADER_STALE_AFTER_MS};
pub use message::{ClusterAction, ClusterMessage};
pub use transport::{
    ChannelTransport, ClusterBus, ClusterTransport, NoopTransport, MIRROR_KEY_PREFIX,
    MIRROR_MAX_AGE_MS,
};
