//! Core persistence logic for the structured thought assistant.
//! This crate owns the document format, its migrations and every write to it.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod schema;
pub mod service;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::document::{Document, Milestone, Model, TagCounts, Thought, DATA_VERSION};
pub use model::patch::DocumentPatch;
pub use model::validation::ValidationError;
pub use notify::{
    ChangeBus, ChangeEvent, ChangeHub, ContextBus, ContextId, DataUpdated, NullBus,
    RefreshRequired, StorageChange, Subscription,
};
pub use service::consistency::{ConsistencyReport, DocumentStats, TagMismatch};
pub use service::document_store::{
    ClearOutcome, Confirmation, DocumentStore, StoreError, StoreResult,
};
pub use service::freshness::{describe_data_age, FreshnessMonitor};
pub use storage::{
    KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore, StorageError, StorageResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
