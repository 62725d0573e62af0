//! Error taxonomy for the sync engine.
//!
//! Two layers: [`StoreError`] is what a backend driver reports for a single
//! statement or load, [`SyncError`] is what an operation (one write, one
//! update, one snapshot) reports at its boundary.

use thiserror::Error;

/// Failure raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("postgres: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("bulk load stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("column '{column}' has unsupported type {type_name} (cast it in the query)")]
    UnsupportedType { column: String, type_name: String },
}

/// Operation-level failure of the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Requested columns or keys are absent from the target (or the target
    /// itself is not visible in the catalog).
    #[error("schema mismatch on '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// A chunked insert failed. Chunks before `chunk` stay committed.
    #[error(
        "write to '{table}' failed at chunk {chunk} ({rows_committed} rows already committed): {source}"
    )]
    WriteFailure {
        table: String,
        chunk: usize,
        rows_committed: usize,
        #[source]
        source: StoreError,
    },

    /// A fail-if-exists write found rows already in the target.
    #[error("target '{table}' already holds rows and the write mode is fail-if-exists")]
    TargetNotEmpty { table: String },

    /// Anything inside the update transaction failed; nothing was committed.
    #[error("bulk update of '{table}' failed: {source}")]
    UpdateFailure {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("snapshot sequencer failed: {reason}")]
    SequencerFailure { reason: String },

    #[error("query failed: {0}")]
    Query(#[source] StoreError),

    #[error("batch error: {0}")]
    Batch(#[from] polars::error::PolarsError),
}

impl SyncError {
    pub(crate) fn schema_mismatch(table: &str, detail: impl Into<String>) -> Self {
        SyncError::SchemaMismatch {
            table: table.to_string(),
            detail: detail.into(),
        }
    }
}
