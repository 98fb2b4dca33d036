//! Offline-first read-status synchronization engine for Miniflux-compatible
//! feed readers.
//!
//! A status change is written to the local store first (the UI reflects it
//! immediately), then carried to the server by an isolated background
//! worker. When the network is unavailable or the server rejects the call,
//! the change lands in a durable per-entity queue that survives restarts;
//! the [`coordinator::SyncCoordinator`] later drains all queues in batches.
//! Confirmed mutations are announced on the [`bus::InvalidationBus`] so
//! read caches can drop stale aggregates.
//!
//! Everything network-facing degrades to "stay local, try again later";
//! nothing in this crate panics the host process.

pub mod bus;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod engine;
pub mod host;
pub mod queue;
pub mod remote;
pub mod storage;

pub use bus::{Invalidation, InvalidationBus};
pub use cache::CountCache;
pub use config::{Config, ConfigError};
pub use coordinator::{
    ClearOutcome, ConfirmMode, ProcessOutcome, QueueCounts, SyncCoordinator, SyncError,
    SyncSummary,
};
pub use dispatch::{Dispatch, DispatchError, Dispatcher};
pub use engine::{EngineError, SyncEngine};
pub use host::{Confirm, ConnectivityProbe, NotificationSink, Notice};
pub use queue::{
    CollectionAction, CollectionOp, CollectionQueue, DurableQueue, EntryQueue, QueueError,
    StatusChange,
};
pub use remote::{RemoteClient, RemoteError};
pub use storage::{Counts, Database, EntryRecord, EntryStatus, NewEntry, StorageError};
