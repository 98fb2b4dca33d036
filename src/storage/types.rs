use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-layer errors.
///
/// Local persistence failures are fatal to the calling operation: callers
/// must treat the attempted write as not having happened. No retry is
/// performed here.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The entry has never been materialized locally.
    #[error("Entry {0} not found in local store")]
    NotFound(i64),

    /// A persisted status column held a value outside the known set.
    #[error("Invalid status value in local store: {0:?}")]
    InvalidStatus(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

// ============================================================================
// Entry Status
// ============================================================================

/// Read/unread state of an entry.
///
/// `Removed` is a terminal state reported by the remote server; it is never
/// a valid target for a local status change, and classifies as read for the
/// purposes of the dispatch no-op check (a removed entry is not unread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Unread,
    Read,
    Removed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Unread => "unread",
            EntryStatus::Read => "read",
            EntryStatus::Removed => "removed",
        }
    }

    /// Read/unread classification: `Removed` counts as read.
    pub fn is_read_class(&self) -> bool {
        !matches!(self, EntryStatus::Unread)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread" => Ok(EntryStatus::Unread),
            "read" => Ok(EntryStatus::Read),
            "removed" => Ok(EntryStatus::Removed),
            other => Err(StorageError::InvalidStatus(other.to_string())),
        }
    }
}

// ============================================================================
// Helper Types
// ============================================================================

/// Entry metadata supplied when an entry is first materialized locally
/// (e.g., downloaded for offline reading).
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub id: i64,
    pub feed_id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub url: Option<String>,
    pub status: EntryStatus,
}

/// Internal row type for entry queries (used by sqlx FromRow).
/// Converts to EntryRecord via into_record() with status validation.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryDbRow {
    pub id: i64,
    pub feed_id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub url: Option<String>,
    pub status: String,
    pub last_updated: i64,
    pub pending_from_worker: bool,
    pub pending_from_worker_at: Option<i64>,
}

impl EntryDbRow {
    pub(crate) fn into_record(self) -> Result<EntryRecord, StorageError> {
        Ok(EntryRecord {
            id: self.id,
            feed_id: self.feed_id,
            category_id: self.category_id,
            title: self.title,
            url: self.url,
            status: self.status.parse()?,
            last_updated: self.last_updated,
            pending_from_worker: self.pending_from_worker,
            pending_from_worker_at: self.pending_from_worker_at,
        })
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Locally persisted status record for one entry.
///
/// This is the ground truth for what the user currently sees. `last_updated`
/// is set on every local mutation (milliseconds since epoch).
/// `pending_from_worker` marks that the last write was an automatic revert
/// performed by a background worker rather than a user action.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRecord {
    pub id: i64,
    pub feed_id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub url: Option<String>,
    pub status: EntryStatus,
    pub last_updated: i64,
    pub pending_from_worker: bool,
    pub pending_from_worker_at: Option<i64>,
}

/// Unread-count aggregates computed from the local store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counts {
    pub total_unread: i64,
    pub per_feed: HashMap<i64, i64>,
    pub per_category: HashMap<i64, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [EntryStatus::Unread, EntryStatus::Read, EntryStatus::Removed] {
            assert_eq!(status.as_str().parse::<EntryStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "starred".parse::<EntryStatus>().unwrap_err();
        assert!(matches!(err, StorageError::InvalidStatus(_)));
    }

    #[test]
    fn removed_classifies_as_read() {
        assert!(EntryStatus::Removed.is_read_class());
        assert!(EntryStatus::Read.is_read_class());
        assert!(!EntryStatus::Unread.is_read_class());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EntryStatus::Unread).unwrap(),
            "\"unread\""
        );
        assert_eq!(
            serde_json::from_str::<EntryStatus>("\"read\"").unwrap(),
            EntryStatus::Read
        );
    }
}
