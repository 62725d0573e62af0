//! Bulk writer: append, replace or fail-if-exists inserts of a batch, loaded
//! through the backend's bulk path in optional chunks.
//!
//! Each chunk commits in its own transaction. When a chunk fails the
//! remaining chunks are not attempted and the rows of earlier chunks stay
//! committed; the failure carries how far the write got.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use polars::prelude::DataFrame;
use tracing::{error, info, warn};

use crate::connector::Connector;
use crate::error::SyncError;
use crate::frame;
use crate::reconcile::{dropped_columns, reconcile_for_write};
use crate::sql;
use crate::store::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Refuse to write into a target that already holds rows.
    FailIfExists,
    /// Delete every existing row, then load the batch.
    Replace,
    Append,
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail" | "fail-if-exists" => Ok(WriteMode::FailIfExists),
            "replace" => Ok(WriteMode::Replace),
            "append" => Ok(WriteMode::Append),
            other => Err(format!(
                "unknown write mode '{other}' (expected fail, replace or append)"
            )),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteMode::FailIfExists => "fail",
            WriteMode::Replace => "replace",
            WriteMode::Append => "append",
        })
    }
}

/// Why an operation finished without touching storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No batch column exists in the target.
    NoSharedColumns,
    /// Key validation left nothing to update.
    NoUpdateColumns,
    EmptyBatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub table: String,
    pub rows_written: usize,
    pub chunks: usize,
    /// Batch columns absent from the target, left out of the write.
    pub dropped_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(WriteReport),
    Skipped(SkipReason),
}

impl WriteOutcome {
    pub fn rows_written(&self) -> usize {
        match self {
            WriteOutcome::Written(report) => report.rows_written,
            WriteOutcome::Skipped(_) => 0,
        }
    }
}

impl<B: Backend> Connector<B> {
    /// Write `batch` into `table`. Columns the target lacks are dropped; an
    /// absent target (no catalog columns) is a logged no-op.
    pub fn write(
        &mut self,
        batch: &DataFrame,
        table: &str,
        mode: WriteMode,
        chunk_size: Option<NonZeroUsize>,
    ) -> Result<WriteOutcome, SyncError> {
        let target = self.describe(table);
        let batch_columns = frame::column_names(batch);
        let table_columns = target.column_names();
        let shared = reconcile_for_write(&batch_columns, &table_columns);
        let dropped = dropped_columns(&batch_columns, &table_columns);

        if shared.is_empty() {
            warn!(table, stage = "reconcile", "no batch column exists in the target; nothing written");
            return Ok(WriteOutcome::Skipped(SkipReason::NoSharedColumns));
        }
        if !dropped.is_empty() {
            warn!(table, stage = "reconcile", dropped = ?dropped, "batch columns absent from the target are dropped");
        }
        if batch.height() == 0 && mode == WriteMode::Append {
            return Ok(WriteOutcome::Skipped(SkipReason::EmptyBatch));
        }

        let columns = target.idents_for(&shared);
        let projected = frame::project(batch, &shared)?;
        let relation = target.qualified();
        let ranges = frame::chunk_ranges(projected.height(), chunk_size);
        let chunks = ranges.len();
        let mut rows_written = 0usize;

        for (chunk, (offset, len)) in ranges.into_iter().enumerate() {
            let rows = frame::rows(&projected.slice(offset as i64, len))?;
            let first = chunk == 0;
            let loaded = self.backend.transaction(|exec| {
                if first {
                    match mode {
                        WriteMode::Replace => {
                            let cleared = exec.execute(&sql::delete_all(&relation))?;
                            info!(table, stage = "replace", rows = cleared, "cleared target");
                        }
                        WriteMode::FailIfExists => {
                            if exec.query_id(&sql::probe_rows(&relation))?.is_some() {
                                return Ok(None);
                            }
                        }
                        WriteMode::Append => {}
                    }
                }
                exec.bulk_load(&relation, &columns, &rows).map(Some)
            });

            match loaded {
                Ok(Some(_)) => rows_written += rows.len(),
                Ok(None) => {
                    warn!(table, stage = "probe", "target already holds rows");
                    return Err(SyncError::TargetNotEmpty {
                        table: table.to_string(),
                    });
                }
                Err(source) => {
                    error!(
                        table,
                        stage = "bulk_load",
                        chunk,
                        chunks,
                        rows_committed = rows_written,
                        error = %source,
                        "chunk failed; remaining chunks skipped, earlier chunks stay committed"
                    );
                    return Err(SyncError::WriteFailure {
                        table: table.to_string(),
                        chunk,
                        rows_committed: rows_written,
                        source,
                    });
                }
            }
        }

        info!(table, mode = %mode, rows = rows_written, chunks, "write complete");
        Ok(WriteOutcome::Written(WriteReport {
            table: table.to_string(),
            rows_written,
            chunks,
            dropped_columns: dropped,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_mode_parses_cli_names() {
        assert_eq!("append".parse::<WriteMode>().unwrap(), WriteMode::Append);
        assert_eq!("REPLACE".parse::<WriteMode>().unwrap(), WriteMode::Replace);
        assert_eq!("fail".parse::<WriteMode>().unwrap(), WriteMode::FailIfExists);
        assert!("upsert".parse::<WriteMode>().is_err());
    }

    #[test]
    fn skipped_outcome_writes_nothing() {
        assert_eq!(WriteOutcome::Skipped(SkipReason::EmptyBatch).rows_written(), 0);
    }
}
