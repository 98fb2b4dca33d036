mod entries;
mod schema;
mod types;

pub use schema::Database;
pub use types::{Counts, EntryRecord, EntryStatus, NewEntry, StorageError};
