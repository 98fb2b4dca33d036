//! Queue-draining coordinator: explicit, user-visible reconciliation of
//! everything accumulated while offline.
//!
//! Entry-status operations are partitioned by target value so N pending
//! entries collapse into at most two batched remote calls. Feed and
//! category operations act on whole collections and go out one call per
//! collection id, with bounded concurrency.

use crate::bus::{Invalidation, InvalidationBus};
use crate::host::{Confirm, NotificationSink, Notice};
use crate::queue::{CollectionQueue, EntryQueue, QueueError};
use crate::remote::{RemoteClient, RemoteError};
use crate::storage::EntryStatus;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Queue failure: {0}")]
    Queue(#[from] QueueError),
}

/// Pending-operation counts across the three queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCounts {
    pub entries: usize,
    pub feeds: usize,
    pub categories: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.entries + self.feeds + self.categories
    }
}

/// Aggregate result of one drain across all three queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Whether a drain/clear needs the user's go-ahead.
///
/// `Auto` is for lifecycle triggers (connectivity restored, app resume);
/// `Interactive` routes through [`NotificationSink::confirm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    Auto,
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    NothingPending,
    Declined,
    Completed(SyncSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    NothingPending,
    Declined,
    Cleared { discarded: usize },
}

#[derive(Debug, Clone, Copy)]
enum CollectionKind {
    Feed,
    Category,
}

impl CollectionKind {
    fn label(&self) -> &'static str {
        match self {
            CollectionKind::Feed => "feed",
            CollectionKind::Category => "category",
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct SyncCoordinator {
    entry_queue: EntryQueue,
    feed_queue: CollectionQueue,
    category_queue: CollectionQueue,
    remote: Arc<RemoteClient>,
    bus: InvalidationBus,
    notifier: Arc<dyn NotificationSink>,
    drain_concurrency: usize,
}

impl SyncCoordinator {
    pub fn new(
        entry_queue: EntryQueue,
        feed_queue: CollectionQueue,
        category_queue: CollectionQueue,
        remote: Arc<RemoteClient>,
        bus: InvalidationBus,
        notifier: Arc<dyn NotificationSink>,
        drain_concurrency: usize,
    ) -> Self {
        Self {
            entry_queue,
            feed_queue,
            category_queue,
            remote,
            bus,
            notifier,
            drain_concurrency: drain_concurrency.max(1),
        }
    }

    /// Current pending counts, per queue.
    pub fn queue_counts(&self) -> QueueCounts {
        QueueCounts {
            entries: self.entry_queue.count(),
            feeds: self.feed_queue.count(),
            categories: self.category_queue.count(),
        }
    }

    /// Drain all three queues and report one unified summary.
    ///
    /// A batch that fails stays queued in full (the remote contract returns
    /// one status per batch request, so no per-id outcome exists) and is
    /// counted as failed; nothing is retried automatically.
    pub async fn process_all(&self, mode: ConfirmMode) -> Result<ProcessOutcome, SyncError> {
        let counts = self.queue_counts();
        if counts.total() == 0 {
            self.notifier.notify(Notice::NothingPending);
            return Ok(ProcessOutcome::NothingPending);
        }
        if mode == ConfirmMode::Interactive
            && !self.notifier.confirm(Confirm::Sync {
                pending: counts.total(),
            })
        {
            tracing::debug!(pending = counts.total(), "Queue drain declined");
            return Ok(ProcessOutcome::Declined);
        }

        tracing::info!(
            entries = counts.entries,
            feeds = counts.feeds,
            categories = counts.categories,
            "Draining sync queues"
        );

        let mut summary = SyncSummary::default();
        self.drain_entries(&mut summary).await?;
        self.drain_collection(&self.feed_queue, CollectionKind::Feed, &mut summary)
            .await?;
        self.drain_collection(&self.category_queue, CollectionKind::Category, &mut summary)
            .await?;

        self.notifier.notify(Notice::SyncCompleted {
            processed: summary.processed,
            failed: summary.failed,
        });
        Ok(ProcessOutcome::Completed(summary))
    }

    /// Discard every queued operation without reconciling.
    ///
    /// Destructive: unsynced user intent is lost permanently, so the
    /// interactive mode requires an explicit confirmation.
    pub fn clear_all(&self, mode: ConfirmMode) -> Result<ClearOutcome, SyncError> {
        let counts = self.queue_counts();
        if counts.total() == 0 {
            return Ok(ClearOutcome::NothingPending);
        }
        if mode == ConfirmMode::Interactive
            && !self.notifier.confirm(Confirm::Discard {
                pending: counts.total(),
            })
        {
            return Ok(ClearOutcome::Declined);
        }

        self.entry_queue.clear()?;
        self.feed_queue.clear()?;
        self.category_queue.clear()?;
        tracing::info!(discarded = counts.total(), "Discarded all pending sync queues");
        self.notifier.notify(Notice::QueuesCleared {
            discarded: counts.total(),
        });
        Ok(ClearOutcome::Cleared {
            discarded: counts.total(),
        })
    }

    /// Partition pending entry operations by target value and issue at most
    /// two batched calls, one per value.
    async fn drain_entries(&self, summary: &mut SyncSummary) -> Result<(), SyncError> {
        let pending = self.entry_queue.load();
        if pending.is_empty() {
            return Ok(());
        }

        let mut to_read = Vec::new();
        let mut to_unread = Vec::new();
        for (id, change) in &pending {
            if change.target.is_read_class() {
                to_read.push(*id);
            } else {
                to_unread.push(*id);
            }
        }

        for (status, ids) in [
            (EntryStatus::Read, to_read),
            (EntryStatus::Unread, to_unread),
        ] {
            if ids.is_empty() {
                continue;
            }
            match self.remote.update_entries(&ids, status).await {
                Ok(()) => {
                    self.entry_queue.remove_many(&ids)?;
                    self.bus.publish(Invalidation::EntryStatus { count: ids.len() });
                    summary.processed += ids.len();
                }
                Err(e) => {
                    tracing::warn!(
                        count = ids.len(),
                        status = %status,
                        error = %e,
                        "Batch status update failed, keeping entries queued"
                    );
                    summary.failed += ids.len();
                }
            }
        }
        Ok(())
    }

    /// Drain a feed/category queue: one remote call per collection id, with
    /// bounded concurrency. These endpoints act on a whole collection, so
    /// they cannot be batched the way entry updates are.
    async fn drain_collection(
        &self,
        queue: &CollectionQueue,
        kind: CollectionKind,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        let pending = queue.load();
        if pending.is_empty() {
            return Ok(());
        }

        let results: Vec<(i64, Result<(), RemoteError>)> =
            stream::iter(pending.keys().copied().collect::<Vec<_>>())
                .map(|id| {
                    let remote = Arc::clone(&self.remote);
                    async move {
                        let result = match kind {
                            CollectionKind::Feed => remote.mark_feed_read(id).await,
                            CollectionKind::Category => remote.mark_category_read(id).await,
                        };
                        (id, result)
                    }
                })
                .buffer_unordered(self.drain_concurrency)
                .collect()
                .await;

        for (id, result) in results {
            match result {
                Ok(()) => {
                    queue.remove(id)?;
                    self.bus.publish(match kind {
                        CollectionKind::Feed => Invalidation::Feed { id },
                        CollectionKind::Category => Invalidation::Category { id },
                    });
                    summary.processed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        collection = kind.label(),
                        id,
                        error = %e,
                        "Mark-all-read failed, keeping collection queued"
                    );
                    summary.failed += 1;
                }
            }
        }
        Ok(())
    }
}
