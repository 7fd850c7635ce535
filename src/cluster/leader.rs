//! Soft leader election over a shared storage slot.
//!
//! A node claims leadership by writing its id and timestamp to
//! [`LEADER_KEY`] when the slot is empty, already its own, or older than
//! [`LEADER_STALE_AFTER_MS`]. There is no fencing: two nodes may briefly both
//! believe they lead, which only duplicates `sync_request` traffic.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::storage::KvStorage;

pub const LEADER_KEY: &str = "cache_cluster_leader";

/// Age after which a leader claim may be taken over.
pub const LEADER_STALE_AFTER_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderClaim {
    pub node_id: String,
    pub timestamp: u64,
}

pub struct LeaderElection {
    storage: Arc<dyn KvStorage>,
    node_id: String,
}

impl LeaderElection {
    pub fn new(storage: Arc<dyn KvStorage>, node_id: impl Into<String>) -> Self {
        Self {
            storage,
            node_id: node_id.into(),
        }
    }

    /// Reads the current claim. An unreadable slot counts as empty.
    pub fn current(&self) -> Result<Option<LeaderClaim>> {
        let claim = self
            .storage
            .get(LEADER_KEY)?
            .and_then(|raw| serde_json::from_str(&raw).ok());
        Ok(claim)
    }

    // == Try Claim ==
    /// Claims (or refreshes) leadership at `now`. Returns whether this node leads.
    pub fn try_claim(&self, now: u64) -> Result<bool> {
        let claimable = match self.current()? {
            None => true,
            Some(claim) if claim.node_id == self.node_id => true,
            Some(claim) => now.saturating_sub(claim.timestamp) > LEADER_STALE_AFTER_MS,
        };
        if !claimable {
            return Ok(false);
        }

        let claim = LeaderClaim {
            node_id: self.node_id.clone(),
            timestamp: now,
        };
        self.storage
            .set(LEADER_KEY, &serde_json::to_string(&claim)?)?;
        debug!("Node {} holds leadership at {}", self.node_id, now);
        Ok(true)
    }

    // == Resign ==
    /// Releases the slot if this node holds it.
    pub fn resign(&self) -> Result<()> {
        if let Some(claim) = self.current()? {
            if claim.node_id == self.node_id {
                self.storage.remove(LEADER_KEY)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn pair() -> (LeaderElection, LeaderElection) {
        let storage: Arc<dyn KvStorage> = Arc::new(MemoryStorage::new());
        (
            LeaderElection::new(storage.clone(), "a"),
            LeaderElection::new(storage, "b"),
        )
    }

    #[test]
    fn test_first_claim_wins() {
        let (a, b) = pair();

        assert!(a.try_claim(1_000).unwrap());
        assert!(!b.try_claim(2_000).unwrap());
        assert_eq!(a.current().unwrap().unwrap().node_id, "a");
    }

    #[test]
    fn test_leader_refreshes_own_claim() {
        let (a, b) = pair();

        a.try_claim(1_000).unwrap();
        assert!(a.try_claim(25_000).unwrap());
        // Refreshed at 25s, so not stale at 50s
        assert!(!b.try_claim(50_000).unwrap());
    }

    #[test]
    fn test_stale_claim_is_taken_over() {
        let (a, b) = pair();

        a.try_claim(1_000).unwrap();
        assert!(!b.try_claim(1_000 + LEADER_STALE_AFTER_MS).unwrap());
        assert!(b.try_claim(1_001 + LEADER_STALE_AFTER_MS).unwrap());
        assert_eq!(b.current().unwrap().unwrap().node_id, "b");
    }

    #[test]
    fn test_resign_only_clears_own_claim() {
        let (a, b) = pair();

        a.try_claim(1_000).unwrap();
        b.resign().unwrap();
        assert!(a.current().unwrap().is_some());

        a.resign().unwrap();
        assert!(a.current().unwrap().is_none());
        assert!(b.try_claim(2_000).unwrap());
    }

    #[test]
    fn test_garbage_slot_is_claimable() {
        let storage: Arc<dyn KvStorage> = Arc::new(MemoryStorage::new());
        storage.set(LEADER_KEY, "1699999999999").unwrap();

        let election = LeaderElection::new(storage, "a");
        assert!(election.try_claim(5).unwrap());
    }
}
