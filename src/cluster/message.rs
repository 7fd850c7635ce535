//! Replication wire messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A replication message broadcast between cache instances.
///
/// Entries travel as JSON so the transport stays independent of the value type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMessage {
    /// Node id of the sender
    pub source: String,
    /// Unix milliseconds at send time
    pub timestamp: u64,
    #[serde(flatten)]
    pub action: ClusterAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClusterAction {
    Set {
        key: String,
        entry: Value,
    },
    Delete {
        key: String,
    },
    Clear,
    /// Leader asks every peer for its full entry set
    SyncRequest,
    SyncData {
        entries: Vec<(String, Value)>,
    },
    Heartbeat {
        address: String,
        data_size: usize,
        entry_count: usize,
    },
}

impl ClusterAction {
    pub fn name(&self) -> &'static str {
        match self {
            ClusterAction::Set { .. } => "set",
            ClusterAction::Delete { .. } => "delete",
            ClusterAction::Clear => "clear",
            ClusterAction::SyncRequest => "sync_request",
            ClusterAction::SyncData { .. } => "sync_data",
            ClusterAction::Heartbeat { .. } => "heartbeat",
        }
    }
}
