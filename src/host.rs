//! Interfaces the engine consumes from the host application.
//!
//! The engine never probes the network or talks to the user directly; the
//! host supplies both behaviors through these traits. Implementations must
//! be cheap and non-blocking — `is_online` in particular sits on the
//! dispatch path.

/// Answers "can we reach the network right now?".
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;
}

/// User-visible messages the engine emits.
///
/// One variant per event kind so the handled set stays statically
/// enumerable; hosts switch on this instead of parsing strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A status change could not reach the server and was queued.
    /// Informational only — never an error from the user's point of view.
    SyncDeferred { entry_id: i64 },
    /// A drain was requested but no queue holds anything.
    NothingPending,
    /// A drain finished; counts aggregated across all three queues.
    SyncCompleted { processed: usize, failed: usize },
    /// All queues were discarded without reconciliation.
    QueuesCleared { discarded: usize },
}

/// A yes/no question the engine must ask before proceeding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Confirm {
    /// Drain the queues now? Carries the aggregate pending count.
    Sync { pending: usize },
    /// Permanently discard unsynced intent?
    Discard { pending: usize },
}

/// Sink for notices and confirmation prompts.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);

    /// Ask the user to approve an action. Only called in interactive modes;
    /// auto-confirmed flows (e.g., a connectivity-restored trigger) bypass it.
    fn confirm(&self, request: Confirm) -> bool;
}
