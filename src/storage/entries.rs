//! Entry status operations: the local ground truth for what the user sees.
//!
//! Every write here is a single SQL statement, so a crash can never leave a
//! partial record behind. User-initiated writes and worker-initiated writes
//! go through separate paths: the worker path carries a staleness guard so a
//! slow worker completing late cannot clobber a newer user action.

use super::types::{Counts, EntryDbRow, EntryRecord, EntryStatus, NewEntry, StorageError};
use super::Database;

impl Database {
    // ========================================================================
    // Entry Lifecycle
    // ========================================================================

    /// Materialize an entry locally, or refresh its descriptive metadata.
    ///
    /// The status and timestamps of an already-known entry are preserved:
    /// the remote never wins over a local status through this path.
    pub async fn upsert_entry(&self, entry: &NewEntry) -> Result<(), StorageError> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO entries (id, feed_id, category_id, title, url, status, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                feed_id = excluded.feed_id,
                category_id = excluded.category_id,
                title = excluded.title,
                url = excluded.url
        "#,
        )
        .bind(entry.id)
        .bind(entry.feed_id)
        .bind(entry.category_id)
        .bind(&entry.title)
        .bind(&entry.url)
        .bind(entry.status.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load the current status record for an entry.
    pub async fn get_entry(&self, entry_id: i64) -> Result<Option<EntryRecord>, StorageError> {
        let row: Option<EntryDbRow> = sqlx::query_as(
            r#"
            SELECT id, feed_id, category_id, title, url, status,
                   last_updated, pending_from_worker, pending_from_worker_at
            FROM entries
            WHERE id = ?
        "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EntryDbRow::into_record).transpose()
    }

    /// Purge an entry from the local store.
    ///
    /// Callers must cancel any live dispatch for the entry first, so a
    /// revived worker cannot write to state that no longer logically exists.
    pub async fn delete_entry(&self, entry_id: i64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Status Writes
    // ========================================================================

    /// User-initiated status write.
    ///
    /// Sets the status and `last_updated`, and clears the worker marker:
    /// from this point on, the latest intent is the user's. Returns the
    /// `last_updated` value written, which callers use as the staleness
    /// bound for any worker revert of this same write.
    pub async fn set_status(&self, entry_id: i64, status: EntryStatus) -> Result<i64, StorageError> {
        let now = chrono::Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE entries
            SET status = ?, last_updated = ?,
                pending_from_worker = 0, pending_from_worker_at = NULL
            WHERE id = ?
        "#,
        )
        .bind(status.as_str())
        .bind(now)
        .bind(entry_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(entry_id));
        }
        Ok(now)
    }

    /// Worker-initiated status write (automatic revert after a failed remote
    /// call).
    ///
    /// Only applies while `last_updated <= not_after_ms`; if the user wrote
    /// again after the worker was dispatched, the newer intent wins and the
    /// revert is skipped. Returns whether the write was applied.
    pub async fn set_status_from_worker(
        &self,
        entry_id: i64,
        status: EntryStatus,
        not_after_ms: i64,
    ) -> Result<bool, StorageError> {
        let now = chrono::Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE entries
            SET status = ?, last_updated = ?,
                pending_from_worker = 1, pending_from_worker_at = ?
            WHERE id = ? AND last_updated <= ?
        "#,
        )
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .bind(entry_id)
        .bind(not_after_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    /// Compute unread counts per feed and per category.
    ///
    /// This is the recomputation behind the count cache; callers should go
    /// through [`crate::cache::CountCache`] rather than calling this on
    /// every read.
    pub async fn unread_counts(&self) -> Result<Counts, StorageError> {
        let per_feed: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT feed_id, COUNT(*)
            FROM entries
            WHERE status = 'unread'
            GROUP BY feed_id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let per_category: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT category_id, COUNT(*)
            FROM entries
            WHERE status = 'unread' AND category_id IS NOT NULL
            GROUP BY category_id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let total_unread = per_feed.iter().map(|(_, n)| n).sum();
        Ok(Counts {
            total_unread,
            per_feed: per_feed.into_iter().collect(),
            per_category: per_category.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn entry(id: i64, feed_id: i64) -> NewEntry {
        NewEntry {
            id,
            feed_id,
            category_id: Some(7),
            title: format!("Entry {}", id),
            url: Some(format!("https://example.com/{}", id)),
            status: EntryStatus::Unread,
        }
    }

    #[tokio::test]
    async fn upsert_then_load() {
        let db = test_db().await;
        db.upsert_entry(&entry(42, 1)).await.unwrap();

        let rec = db.get_entry(42).await.unwrap().unwrap();
        assert_eq!(rec.id, 42);
        assert_eq!(rec.feed_id, 1);
        assert_eq!(rec.status, EntryStatus::Unread);
        assert!(!rec.pending_from_worker);
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let db = test_db().await;
        assert!(db.get_entry(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_preserves_existing_status() {
        let db = test_db().await;
        db.upsert_entry(&entry(42, 1)).await.unwrap();
        db.set_status(42, EntryStatus::Read).await.unwrap();

        // Re-materializing (e.g., a fresh download) must not reset the status
        db.upsert_entry(&entry(42, 1)).await.unwrap();
        let rec = db.get_entry(42).await.unwrap().unwrap();
        assert_eq!(rec.status, EntryStatus::Read);
    }

    #[tokio::test]
    async fn user_write_clears_worker_marker() {
        let db = test_db().await;
        db.upsert_entry(&entry(42, 1)).await.unwrap();
        db.set_status_from_worker(42, EntryStatus::Read, i64::MAX)
            .await
            .unwrap();
        let rec = db.get_entry(42).await.unwrap().unwrap();
        assert!(rec.pending_from_worker);
        assert!(rec.pending_from_worker_at.is_some());

        db.set_status(42, EntryStatus::Unread).await.unwrap();
        let rec = db.get_entry(42).await.unwrap().unwrap();
        assert!(!rec.pending_from_worker);
        assert!(rec.pending_from_worker_at.is_none());
    }

    #[tokio::test]
    async fn set_status_on_missing_entry_errors() {
        let db = test_db().await;
        let err = db.set_status(999, EntryStatus::Read).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(999)));
    }

    #[tokio::test]
    async fn stale_worker_write_is_skipped() {
        let db = test_db().await;
        db.upsert_entry(&entry(42, 1)).await.unwrap();
        db.set_status(42, EntryStatus::Read).await.unwrap();
        let written_at = db.get_entry(42).await.unwrap().unwrap().last_updated;

        // Worker dispatched before the user's write must not clobber it
        let applied = db
            .set_status_from_worker(42, EntryStatus::Unread, written_at - 1)
            .await
            .unwrap();
        assert!(!applied);
        let rec = db.get_entry(42).await.unwrap().unwrap();
        assert_eq!(rec.status, EntryStatus::Read);
        assert!(!rec.pending_from_worker);
    }

    #[tokio::test]
    async fn delete_entry_removes_record() {
        let db = test_db().await;
        db.upsert_entry(&entry(42, 1)).await.unwrap();
        db.delete_entry(42).await.unwrap();
        assert!(db.get_entry(42).await.unwrap().is_none());

        // Deleting again is a no-op
        db.delete_entry(42).await.unwrap();
    }

    #[tokio::test]
    async fn unread_counts_aggregate_by_feed_and_category() {
        let db = test_db().await;
        for id in 1..=3 {
            db.upsert_entry(&entry(id, 1)).await.unwrap();
        }
        let mut other = entry(4, 2);
        other.category_id = Some(9);
        db.upsert_entry(&other).await.unwrap();
        db.set_status(1, EntryStatus::Read).await.unwrap();

        let counts = db.unread_counts().await.unwrap();
        assert_eq!(counts.total_unread, 3);
        assert_eq!(counts.per_feed.get(&1), Some(&2));
        assert_eq!(counts.per_feed.get(&2), Some(&1));
        assert_eq!(counts.per_category.get(&7), Some(&2));
        assert_eq!(counts.per_category.get(&9), Some(&1));
    }
}
