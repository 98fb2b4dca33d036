//! Wiring facade: opens the store and queues, builds the remote client,
//! and starts the background pieces (dispatcher tasks, cache listener).

use crate::bus::InvalidationBus;
use crate::cache::CountCache;
use crate::config::Config;
use crate::coordinator::SyncCoordinator;
use crate::dispatch::Dispatcher;
use crate::host::{ConnectivityProbe, NotificationSink};
use crate::queue::{
    CollectionQueue, EntryQueue, CATEGORY_QUEUE_FILE, ENTRY_QUEUE_FILE, FEED_QUEUE_FILE,
};
use crate::remote::{RemoteClient, RemoteError};
use crate::storage::{Database, StorageError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

const DB_FILE: &str = "readmark.db";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to prepare data directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote client unavailable: {0}")]
    Remote(#[from] RemoteError),

    #[error("Failed to open local store: {0}")]
    Storage(#[from] StorageError),
}

/// One fully wired sync engine over a data directory.
///
/// The host keeps exactly one of these per account; dropping it stops the
/// background tasks.
pub struct SyncEngine {
    db: Database,
    bus: InvalidationBus,
    dispatcher: Dispatcher,
    coordinator: SyncCoordinator,
    cache: Arc<CountCache>,
    cache_listener: JoinHandle<()>,
}

impl SyncEngine {
    pub async fn open(
        config: &Config,
        data_dir: &Path,
        probe: Arc<dyn ConnectivityProbe>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, EngineError> {
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join(DB_FILE);
        let db = Database::open(&db_path.to_string_lossy()).await?;

        let entry_queue = EntryQueue::open(data_dir, ENTRY_QUEUE_FILE, "entry-status");
        let feed_queue = CollectionQueue::open(data_dir, FEED_QUEUE_FILE, "feed");
        let category_queue = CollectionQueue::open(data_dir, CATEGORY_QUEUE_FILE, "category");

        let remote = Arc::new(RemoteClient::from_config(config)?);
        let bus = InvalidationBus::new();

        let dispatcher = Dispatcher::new(
            db.clone(),
            entry_queue.clone(),
            Arc::clone(&remote),
            probe,
            Arc::clone(&notifier),
            bus.clone(),
        );
        let coordinator = SyncCoordinator::new(
            entry_queue,
            feed_queue,
            category_queue,
            remote,
            bus.clone(),
            notifier,
            config.drain_concurrency,
        );
        let cache = CountCache::new(db.clone());
        let cache_listener = Arc::clone(&cache).spawn_listener(&bus);

        tracing::info!(data_dir = %data_dir.display(), "Sync engine ready");
        Ok(Self {
            db,
            bus,
            dispatcher,
            coordinator,
            cache,
            cache_listener,
        })
    }

    /// The local entry-status store.
    pub fn storage(&self) -> &Database {
        &self.db
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn cache(&self) -> &Arc<CountCache> {
        &self.cache
    }

    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.cache_listener.abort();
    }
}
