//! Owned unread-count cache.
//!
//! Consumers read aggregates through this object instead of hitting the
//! store on every render. It knows nothing about queues or workers — it
//! only listens to the invalidation bus and drops its cached value when a
//! mutation is confirmed, forcing a recomputation on the next read.

use crate::bus::InvalidationBus;
use crate::storage::{Counts, Database, StorageError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub struct CountCache {
    db: Database,
    cached: Mutex<Option<Counts>>,
}

impl CountCache {
    pub fn new(db: Database) -> Arc<Self> {
        Arc::new(Self {
            db,
            cached: Mutex::new(None),
        })
    }

    /// Current unread counts, recomputed from storage only on a cache miss.
    pub async fn counts(&self) -> Result<Counts, StorageError> {
        if let Some(counts) = self.cached.lock().clone() {
            return Ok(counts);
        }
        let counts = self.db.unread_counts().await?;
        *self.cached.lock() = Some(counts.clone());
        Ok(counts)
    }

    /// Drop the cached aggregate; the next read recomputes.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    /// Subscribe to the invalidation bus for the cache's lifetime.
    ///
    /// The returned handle owns the subscription; aborting it detaches the
    /// cache from the bus.
    pub fn spawn_listener(self: Arc<Self>, bus: &InvalidationBus) -> JoinHandle<()> {
        let cache = self;
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        tracing::debug!(event = ?event, "Dropping cached unread counts");
                        cache.invalidate();
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Missed events still mean something changed
                        tracing::debug!(missed, "Invalidation stream lagged, dropping cached counts");
                        cache.invalidate();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
