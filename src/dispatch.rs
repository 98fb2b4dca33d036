//! Background dispatcher: one isolated worker per triggered status change.
//!
//! The caller's path is purely local — load, optimistic write, spawn — and
//! never blocks on network I/O. Each worker carries a frozen snapshot of
//! the inputs it needs and reports its outcome over a channel to a single
//! consumer task, which is the only writer of the fallback queue on this
//! path (queue writers must be serialized).
//!
//! Per entity there is at most one live worker: dispatching again
//! terminates the previous worker before starting a replacement, so two
//! concurrent remote writes to the same entry can never race.

use crate::bus::{Invalidation, InvalidationBus};
use crate::host::{ConnectivityProbe, NotificationSink, Notice};
use crate::queue::{EntryQueue, QueueError, StatusChange};
use crate::remote::RemoteClient;
use crate::storage::{Database, EntryStatus, StorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const OUTCOME_CHANNEL_CAPACITY: usize = 64;
/// How often finished worker handles are swept out of the tracker.
const REAPER_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// Error and Outcome Types
// ============================================================================

#[derive(Debug, Error)]
pub enum DispatchError {
    /// `removed` is reported by the remote but never settable locally.
    #[error("Status {0} is not a settable target")]
    InvalidTarget(EntryStatus),

    /// Local store failure: the optimistic update did not happen.
    #[error("Local store failure: {0}")]
    Storage(#[from] StorageError),

    /// The offline fallback could not be recorded.
    #[error("Queue failure: {0}")]
    Queue(#[from] QueueError),
}

/// How a dispatch request was resolved on the caller's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The entry already had this read/unread classification; nothing done.
    NoOp,
    /// Offline at dispatch time; the change was queued for a later drain.
    Queued,
    /// A background worker is carrying the change to the server.
    InFlight,
}

enum WorkerOutcome {
    /// The remote accepted the update.
    Confirmed { entry_id: i64 },
    /// The remote was unreachable or rejected the update; the change must
    /// be queued for a later drain.
    Deferred { entry_id: i64, change: StatusChange },
}

// ============================================================================
// Dispatcher
// ============================================================================

type WorkerMap = Arc<Mutex<HashMap<i64, JoinHandle<()>>>>;

pub struct Dispatcher {
    db: Database,
    queue: EntryQueue,
    remote: Arc<RemoteClient>,
    probe: Arc<dyn ConnectivityProbe>,
    notifier: Arc<dyn NotificationSink>,
    workers: WorkerMap,
    outcome_tx: mpsc::Sender<WorkerOutcome>,
    consumer: JoinHandle<()>,
    reaper: JoinHandle<()>,
}

impl Dispatcher {
    pub fn new(
        db: Database,
        queue: EntryQueue,
        remote: Arc<RemoteClient>,
        probe: Arc<dyn ConnectivityProbe>,
        notifier: Arc<dyn NotificationSink>,
        bus: InvalidationBus,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
        let workers: WorkerMap = Arc::new(Mutex::new(HashMap::new()));

        let consumer = tokio::spawn(consume_outcomes(
            outcome_rx,
            queue.clone(),
            bus,
            Arc::clone(&notifier),
        ));
        let reaper = tokio::spawn(reap_loop(Arc::clone(&workers)));

        Self {
            db,
            queue,
            remote,
            probe,
            notifier,
            workers,
            outcome_tx,
            consumer,
            reaper,
        }
    }

    /// Apply a status change locally and carry it to the server in the
    /// background.
    ///
    /// The local write is visible before this function returns; the remote
    /// call (if any) happens on an isolated worker task. A failed or
    /// impossible dispatch always lands in the durable queue — intent is
    /// never silently lost.
    pub async fn dispatch(
        &self,
        entry_id: i64,
        target: EntryStatus,
    ) -> Result<Dispatch, DispatchError> {
        if target == EntryStatus::Removed {
            return Err(DispatchError::InvalidTarget(target));
        }

        let record = self
            .db
            .get_entry(entry_id)
            .await?
            .ok_or(StorageError::NotFound(entry_id))?;

        if record.status.is_read_class() == target.is_read_class() {
            // Redundant request: skip the remote call entirely, and drop any
            // in-flight worker still carrying an older, now-superseded target.
            self.cancel(entry_id);
            tracing::debug!(entry_id, status = %record.status, "Status already matches, nothing to dispatch");
            return Ok(Dispatch::NoOp);
        }

        let original = record.status;
        // Optimistic write first: the UI reflects the new state immediately,
        // before any network round-trip.
        let dispatched_at = self.db.set_status(entry_id, target).await?;

        self.cancel(entry_id);
        self.reap_finished();

        if !self.probe.is_online() {
            // The worker cannot usefully run; record the fallback on the
            // caller's path so the intent survives a restart.
            self.queue.enqueue(
                entry_id,
                StatusChange {
                    target,
                    original,
                    queued_at: dispatched_at,
                },
            )?;
            self.notifier.notify(Notice::SyncDeferred { entry_id });
            tracing::debug!(entry_id, target = %target, "Offline at dispatch time, queued for later sync");
            return Ok(Dispatch::Queued);
        }

        let worker = Worker {
            db: self.db.clone(),
            remote: Arc::clone(&self.remote),
            probe: Arc::clone(&self.probe),
            outcome_tx: self.outcome_tx.clone(),
            entry_id,
            target,
            original,
            dispatched_at,
        };
        let handle = tokio::spawn(worker.run());
        if let Some(previous) = self.workers.lock().insert(entry_id, handle) {
            previous.abort();
        }
        Ok(Dispatch::InFlight)
    }

    /// Terminate the live worker for an entry, if any.
    ///
    /// Hosts must call this before destroying local state for the entry
    /// (e.g., purging a downloaded copy), so a worker completing late cannot
    /// write to state that no longer logically exists.
    pub fn cancel(&self, entry_id: i64) {
        if let Some(handle) = self.workers.lock().remove(&entry_id) {
            if !handle.is_finished() {
                tracing::debug!(entry_id, "Terminating in-flight status worker");
            }
            handle.abort();
        }
    }

    /// Number of workers still running. At most one per entity.
    pub fn live_workers(&self) -> usize {
        self.workers
            .lock()
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    fn reap_finished(&self) {
        self.workers.lock().retain(|_, handle| !handle.is_finished());
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.consumer.abort();
        self.reaper.abort();
        for (_, handle) in self.workers.lock().drain() {
            handle.abort();
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Frozen snapshot of everything one remote update needs.
///
/// Workers share no mutable state with the dispatcher: they may outlive the
/// caller's continuation and are cancelled by abort.
struct Worker {
    db: Database,
    remote: Arc<RemoteClient>,
    probe: Arc<dyn ConnectivityProbe>,
    outcome_tx: mpsc::Sender<WorkerOutcome>,
    entry_id: i64,
    target: EntryStatus,
    original: EntryStatus,
    dispatched_at: i64,
}

impl Worker {
    async fn run(self) {
        if !self.probe.is_online() {
            tracing::debug!(entry_id = self.entry_id, "Connectivity lost before the remote call");
            self.report(WorkerOutcome::Deferred {
                entry_id: self.entry_id,
                change: StatusChange {
                    target: self.target,
                    original: self.original,
                    queued_at: self.dispatched_at,
                },
            })
            .await;
            return;
        }

        match self.remote.update_entries(&[self.entry_id], self.target).await {
            Ok(()) => {
                self.report(WorkerOutcome::Confirmed {
                    entry_id: self.entry_id,
                })
                .await;
            }
            Err(e) => {
                tracing::warn!(
                    entry_id = self.entry_id,
                    error = %e,
                    "Remote rejected status update, reverting local change"
                );
                // Auto-heal: undo the optimistic write, unless the user has
                // written again since this worker was dispatched.
                match self
                    .db
                    .set_status_from_worker(self.entry_id, self.original, self.dispatched_at)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(
                            entry_id = self.entry_id,
                            "Newer local write present, revert skipped"
                        );
                    }
                    Err(db_err) => {
                        tracing::warn!(
                            entry_id = self.entry_id,
                            error = %db_err,
                            "Failed to revert local status after remote rejection"
                        );
                    }
                }
                self.report(WorkerOutcome::Deferred {
                    entry_id: self.entry_id,
                    change: StatusChange {
                        target: self.target,
                        original: self.original,
                        queued_at: self.dispatched_at,
                    },
                })
                .await;
            }
        }
    }

    async fn report(&self, outcome: WorkerOutcome) {
        if self.outcome_tx.send(outcome).await.is_err() {
            tracing::debug!(entry_id = self.entry_id, "Dispatcher outcome channel closed");
        }
    }
}

// ============================================================================
// Outcome Consumer and Reaper
// ============================================================================

/// Single consumer of worker outcomes: the only queue writer on the
/// dispatch path.
async fn consume_outcomes(
    mut rx: mpsc::Receiver<WorkerOutcome>,
    queue: EntryQueue,
    bus: InvalidationBus,
    notifier: Arc<dyn NotificationSink>,
) {
    while let Some(outcome) = rx.recv().await {
        match outcome {
            WorkerOutcome::Confirmed { entry_id } => {
                // Clear any fallback left by an earlier failed attempt;
                // removing an absent id is a safe no-op.
                if let Err(e) = queue.remove(entry_id) {
                    tracing::warn!(
                        entry_id,
                        error = %e,
                        "Failed to clear queued fallback after confirmed update"
                    );
                }
                bus.publish(Invalidation::EntryStatus { count: 1 });
            }
            WorkerOutcome::Deferred { entry_id, change } => match queue.enqueue(entry_id, change) {
                Ok(()) => notifier.notify(Notice::SyncDeferred { entry_id }),
                Err(e) => {
                    tracing::warn!(
                        entry_id,
                        error = %e,
                        "Failed to queue status change for later sync"
                    );
                }
            },
        }
    }
}

/// Periodically drops finished handles so abandoned trackers cannot grow
/// without bound.
async fn reap_loop(workers: WorkerMap) {
    let mut interval = tokio::time::interval(REAPER_INTERVAL);
    loop {
        interval.tick().await;
        let mut workers = workers.lock();
        let before = workers.len();
        workers.retain(|_, handle| !handle.is_finished());
        let reaped = before - workers.len();
        if reaped > 0 {
            tracing::trace!(reaped, "Reaped finished status workers");
        }
    }
}
