//! Cache Event Bus
//!
//! Publishes cache lifecycle events to subscribers over a tokio broadcast channel.
//! Dropping an [`EventSubscription`] unsubscribes it.

use std::fmt;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::debug;

use crate::cache::entry::current_timestamp_ms;

/// Buffered events per subscriber before the slowest one starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

// == Event Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    Set,
    Get,
    Delete,
    Expire,
    Evict,
    Cleanup,
    Clear,
    ClusterSync,
    PersistenceSave,
    PersistenceLoad,
    Compression,
    Decompression,
}

impl CacheEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            CacheEventKind::Set => "set",
            CacheEventKind::Get => "get",
            CacheEventKind::Delete => "delete",
            CacheEventKind::Expire => "expire",
            CacheEventKind::Evict => "evict",
            CacheEventKind::Cleanup => "cleanup",
            CacheEventKind::Clear => "clear",
            CacheEventKind::ClusterSync => "cluster_sync",
            CacheEventKind::PersistenceSave => "persistence_save",
            CacheEventKind::PersistenceLoad => "persistence_load",
            CacheEventKind::Compression => "compression",
            CacheEventKind::Decompression => "decompression",
        }
    }
}

impl fmt::Display for CacheEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// == Cache Event ==
/// A single lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    /// Affected key, absent for bulk events such as `clear`
    pub key: Option<String>,
    /// Size of the affected entry, when one is involved
    pub size_bytes: Option<usize>,
    pub timestamp: u64,
}

// == Event Bus ==
/// Internal publish/subscribe utility held by the store.
#[derive(Debug)]
pub struct EventBus {
    sender: Option<broadcast::Sender<CacheEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender: Some(sender),
        }
    }

    // == Emit ==
    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, kind: CacheEventKind, key: Option<&str>, size_bytes: Option<usize>) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.receiver_count() == 0 {
            return;
        }
        let event = CacheEvent {
            kind,
            key: key.map(str::to_string),
            size_bytes,
            timestamp: current_timestamp_ms(),
        };
        if sender.send(event).is_err() {
            debug!("Event {} dropped, no subscribers", kind);
        }
    }

    // == Subscribe ==
    /// Subscribes to the given kinds; an empty slice subscribes to everything.
    pub fn subscribe(&self, kinds: &[CacheEventKind]) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.as_ref().map(|s| s.subscribe()),
            kinds: kinds.to_vec(),
        }
    }

    // == Close ==
    /// Detaches all subscribers. Their pending `recv` calls return `None`.
    pub fn close(&mut self) {
        self.sender = None;
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// == Event Subscription ==
/// Receiving half of a subscription. Drop it to unsubscribe.
#[derive(Debug)]
pub struct EventSubscription {
    receiver: Option<broadcast::Receiver<CacheEvent>>,
    kinds: Vec<CacheEventKind>,
}

impl EventSubscription {
    fn wants(&self, event: &CacheEvent) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&event.kind)
    }

    /// Waits for the next matching event. Returns None once the bus is closed.
    pub async fn recv(&mut self) -> Option<CacheEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next matching event already buffered, if any.
    pub fn try_recv(&mut self) -> Option<CacheEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drains every buffered matching event.
    pub fn drain(&mut self) -> Vec<CacheEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Explicit unsubscribe handle; equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}
