//! Durable mutation queues: one persisted key-value file per entity class.
//!
//! A queue maps entity id -> pending operation. Enqueueing over an existing
//! id overwrites it (last-write-wins coalescing), which bounds queue growth
//! no matter how often the user toggles state while offline. A missing or
//! corrupt backing file reads as empty: losing unsynced intent is preferable
//! to blocking the user entirely.
//!
//! Every mutation is a fresh load-modify-save of the whole map. There is no
//! finer-grained locking; individual operations are idempotent (removing an
//! absent id, overwriting an existing one) so near-simultaneous writers
//! degrade safely.

use crate::storage::EntryStatus;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bumped whenever the on-disk layout changes; older files read as empty.
const SCHEMA_VERSION: u32 = 1;

pub const ENTRY_QUEUE_FILE: &str = "entry-status-queue.json";
pub const FEED_QUEUE_FILE: &str = "feed-queue.json";
pub const CATEGORY_QUEUE_FILE: &str = "category-queue.json";

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by queue writes.
///
/// Reads never fail: corruption and absence both yield an empty queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to write queue file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode queue file: {0}")]
    Encode(#[from] serde_json::Error),
}

// ============================================================================
// Queue Payloads
// ============================================================================

/// Pending status change for a single entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Desired terminal state on the remote.
    pub target: EntryStatus,
    /// Value to roll back to if reconciliation is abandoned.
    pub original: EntryStatus,
    /// Enqueue time, milliseconds since epoch.
    pub queued_at: i64,
}

/// Operation applying to a whole feed or category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionAction {
    MarkAllRead,
}

/// Pending operation for a feed or category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionOp {
    pub action: CollectionAction,
    /// Enqueue time, milliseconds since epoch.
    pub queued_at: i64,
}

pub type EntryQueue = DurableQueue<StatusChange>;
pub type CollectionQueue = DurableQueue<CollectionOp>;

// ============================================================================
// Durable Queue
// ============================================================================

#[derive(Deserialize)]
struct QueueFile<E> {
    version: u32,
    entries: BTreeMap<i64, E>,
}

/// Borrowed counterpart of [`QueueFile`] so `save` serializes without
/// cloning the map.
#[derive(Serialize)]
struct QueueFileRef<'a, E> {
    version: u32,
    entries: &'a BTreeMap<i64, E>,
}

/// A persistent entity-id -> pending-operation map, one per entity class.
///
/// When the map drains to zero entries the backing file is deleted rather
/// than written empty, so "nothing pending" stays detectable via a bare
/// existence check.
pub struct DurableQueue<E> {
    path: PathBuf,
    label: &'static str,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Clone for DurableQueue<E> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            label: self.label,
            _marker: PhantomData,
        }
    }
}

impl<E> DurableQueue<E>
where
    E: Serialize + DeserializeOwned,
{
    pub fn open(dir: &Path, file_name: &str, label: &'static str) -> Self {
        Self {
            path: dir.join(file_name),
            label,
            _marker: PhantomData,
        }
    }

    /// Load the full pending map.
    ///
    /// Missing file, unreadable file, malformed JSON, and unknown schema
    /// versions all yield an empty map. Corruption must never block the user.
    pub fn load(&self) -> BTreeMap<i64, E> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(queue = self.label, error = %e, "Queue file unreadable, treating as empty");
                return BTreeMap::new();
            }
        };

        let file: QueueFile<E> = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(queue = self.label, error = %e, "Queue file corrupt, treating as empty");
                return BTreeMap::new();
            }
        };

        if file.version != SCHEMA_VERSION {
            tracing::warn!(
                queue = self.label,
                found = file.version,
                expected = SCHEMA_VERSION,
                "Queue file has unknown schema version, treating as empty"
            );
            return BTreeMap::new();
        }

        file.entries
    }

    /// Persist the full pending map atomically (write-temp-then-rename).
    ///
    /// An empty map deletes the backing file instead.
    pub fn save(&self, entries: &BTreeMap<i64, E>) -> Result<(), QueueError> {
        if entries.is_empty() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(QueueError::Io(e)),
            }
            return Ok(());
        }

        let file = QueueFileRef {
            version: SCHEMA_VERSION,
            entries,
        };
        let content = serde_json::to_string_pretty(&file)?;

        // Randomized temp name so a crashed writer never collides with the
        // next one; rename is atomic on the same filesystem.
        use std::time::{SystemTime, UNIX_EPOCH};
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = self.path.with_extension(format!("tmp.{:016x}", suffix));

        let mut temp_file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        if let Err(e) = temp_file
            .write_all(content.as_bytes())
            .and_then(|_| temp_file.sync_all())
        {
            let _ = std::fs::remove_file(&temp_path);
            return Err(QueueError::Io(e));
        }
        drop(temp_file);

        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(QueueError::Io(e));
        }
        Ok(())
    }

    /// Record a pending operation, overwriting any prior one for this id.
    pub fn enqueue(&self, id: i64, entry: E) -> Result<(), QueueError> {
        let mut entries = self.load();
        entries.insert(id, entry);
        self.save(&entries)
    }

    /// Drop the pending operation for an id. Removing an absent id is a no-op.
    pub fn remove(&self, id: i64) -> Result<(), QueueError> {
        let mut entries = self.load();
        if entries.remove(&id).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }

    /// Drop the pending operations for a set of ids in one write.
    pub fn remove_many(&self, ids: &[i64]) -> Result<(), QueueError> {
        let mut entries = self.load();
        let before = entries.len();
        for id in ids {
            entries.remove(id);
        }
        if entries.len() != before {
            self.save(&entries)?;
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.load().len()
    }

    /// Discard every pending operation and delete the backing file.
    pub fn clear(&self) -> Result<(), QueueError> {
        self.save(&BTreeMap::new())
    }
}
