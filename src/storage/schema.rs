use super::types::StorageError;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Handle to the local entry-status database.
///
/// Pure local persistence: nothing in here touches the network. The pool is
/// cheap to clone and safe to hand to background workers.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite:{}?mode=rwc", path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY,
                feed_id INTEGER NOT NULL,
                category_id INTEGER,
                title TEXT NOT NULL,
                url TEXT,
                status TEXT NOT NULL DEFAULT 'unread',
                last_updated INTEGER NOT NULL,
                pending_from_worker INTEGER NOT NULL DEFAULT 0,
                pending_from_worker_at INTEGER
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_status ON entries(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_feed ON entries(feed_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_category ON entries(category_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
