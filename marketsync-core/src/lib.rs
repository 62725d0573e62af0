//! MarketSync Core — bulk synchronization between polars frames and a
//! relational store.
//!
//! - Live schema introspection and column reconciliation
//! - Chunked bulk writes (append, replace, fail-if-exists)
//! - Set-based bulk updates through scoped staging tables
//! - Snapshot id sequencing for external data pulls
//! - Postgres and embedded SQLite backends

pub mod config;
pub mod connector;
pub mod error;
pub mod frame;
pub mod ident;
pub mod reconcile;
pub mod schema;
pub mod snapshot;
pub mod sql;
pub mod staging;
pub mod store;
pub mod updater;
pub mod value;
pub mod writer;

pub use config::{Config, ConfigError, SyncSettings};
pub use connector::Connector;
pub use error::{StoreError, SyncError};
pub use frame::Record;
pub use ident::Ident;
pub use schema::TableDescriptor;
pub use snapshot::SnapshotId;
pub use store::{Backend, PgBackend, SqliteBackend};
pub use updater::{UpdateOutcome, UpdateReport};
pub use value::SqlValue;
pub use writer::{SkipReason, WriteMode, WriteOutcome, WriteReport};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: connectors and their outcomes can move to a
    /// worker thread.
    #[allow(dead_code)]
    fn assert_send() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Connector<PgBackend>>();
        require_send::<Connector<SqliteBackend>>();
        require_send::<SyncError>();
        require_sync::<SyncError>();
        require_send::<WriteOutcome>();
        require_sync::<UpdateOutcome>();
        require_sync::<SyncSettings>();
    }
}
