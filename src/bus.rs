//! Cache invalidation bus.
//!
//! Downstream read caches (unread counters, per-feed/category counts)
//! subscribe here and drop their cached aggregates when anything is
//! confirmed against the remote. Publishers never learn who is listening,
//! and caches never learn about queues or workers.

use tokio::sync::broadcast;

/// A confirmed remote mutation. Published only after the server accepted
/// the change, never on a merely optimistic local write.
#[derive(Debug, Clone, PartialEq)]
pub enum Invalidation {
    /// A batch of entry status updates was confirmed.
    EntryStatus { count: usize },
    /// A whole feed was marked read.
    Feed { id: i64 },
    /// A whole category was marked read.
    Category { id: i64 },
}

#[derive(Clone)]
pub struct InvalidationBus {
    tx: broadcast::Sender<Invalidation>,
}

impl InvalidationBus {
    const CAPACITY: usize = 64;

    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(Self::CAPACITY);
        Self { tx }
    }

    /// Broadcast to all current subscribers. Publishing with no subscribers
    /// is a no-op.
    pub fn publish(&self, event: Invalidation) {
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(receivers = receivers, "Published cache invalidation");
            }
            Err(_) => {
                tracing::trace!("No cache invalidation subscribers");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.tx.subscribe()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}
