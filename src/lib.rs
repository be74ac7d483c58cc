// Cardápio Bot - Core Library
// Scrapes the university cafeteria menu and keeps one live channel message per meal

pub mod menu;
pub mod normalizer;       // Raw/structured payload → canonical snapshot
pub mod change_detector;  // Fingerprints per meal type
pub mod ledger;           // Posted message ids, append + compact
pub mod publisher;        // Tick orchestration
pub mod store;            // SQLite / file / memory persistence
pub mod channel;          // Telegram + dry-run
pub mod source;           // Cafeteria site + local file
pub mod format;
pub mod scheduler;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use menu::{ItemList, MealType, MenuPayload, MenuSection, MenuSnapshot, Section};
pub use normalizer::{normalize, NormalizeRules};
pub use change_detector::{ChangeDetector, Fingerprint};
pub use ledger::{
    LedgerEntry, LedgerView, MessageLedger, PublishedMessageRecord, PurgeReport, Retirement,
};
pub use publisher::{PublishError, Publisher, TickOutcome};
pub use store::{AppendLog, FileStore, KeyValueStore, MemoryStore, SqliteStore, StoreError};
pub use channel::{Channel, ChannelError, DryRunChannel, MessageId};
pub use source::{FileMenuSource, MenuSource, SourceError};
pub use scheduler::{Job, Scheduler};
pub use config::{Config, StoreKind};

#[cfg(feature = "http")]
pub use channel::TelegramChannel;
#[cfg(feature = "http")]
pub use source::UfesMenuSource;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
