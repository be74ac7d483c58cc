// 💾 Persistent Stores - key/value fingerprints and the message ledger log
//
// Two small contracts, three backends:
// - SqliteStore: WAL-mode SQLite database (default)
// - FileStore:   plain files (menu_hash_<meal>.txt + message_ids.txt)
// - MemoryStore: in-process, for tests and dry runs

pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::ledger::{LedgerEntry, LedgerEvent};

/// Persistence failures. Callers degrade rather than abort on these.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Small string values keyed by name (one fingerprint per meal type)
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Durable append-only log of ledger entries.
///
/// `read_all` returns entries in append order; that order is the only
/// notion of "most recent" the ledger relies on.
pub trait AppendLog {
    fn append(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    fn read_all(&self) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Replace the whole log (compaction, purge)
    fn overwrite_all(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError>;

    /// Audit trail hook. Backends without an audit table ignore it.
    fn record_event(&mut self, _event: &LedgerEvent) -> Result<(), StoreError> {
        Ok(())
    }
}
