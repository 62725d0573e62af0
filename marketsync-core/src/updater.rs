//! Set-based bulk update through a staging table.
//!
//! The batch is projected to keys plus update columns, de-duplicated on the
//! keys (first occurrence wins), loaded into a staging table and applied with
//! a single `UPDATE ... FROM` joined on every key. Rows without a match in the
//! target are ignored. Staging, update and drop share one transaction.

use polars::prelude::DataFrame;
use tracing::{error, info};

use crate::connector::Connector;
use crate::error::SyncError;
use crate::frame;
use crate::ident::Ident;
use crate::reconcile::split_keys;
use crate::sql;
use crate::staging::with_staging;
use crate::store::Backend;
use crate::writer::SkipReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub table: String,
    pub key_columns: Vec<String>,
    pub update_columns: Vec<String>,
    pub staged_rows: usize,
    pub duplicates_dropped: usize,
    /// Driver-reported affected rows. Diagnostic only.
    pub rows_matched: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied(UpdateReport),
    Skipped(SkipReason),
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }
}

impl<B: Backend> Connector<B> {
    /// Update `table` from `batch`, matching rows on `key_columns`. Without
    /// `update_columns` every non-key batch column the target has is updated.
    /// Keys are never updated.
    pub fn bulk_update(
        &mut self,
        batch: &DataFrame,
        table: &str,
        key_columns: &[&str],
        update_columns: Option<&[&str]>,
    ) -> Result<UpdateOutcome, SyncError> {
        let target = self.describe(table);
        if !target.is_visible() {
            return Err(SyncError::schema_mismatch(table, "target has no visible columns"));
        }

        let batch_columns = frame::column_names(batch);
        let keys: Vec<String> = key_columns.iter().map(|k| k.to_string()).collect();
        let updates: Option<Vec<String>> =
            update_columns.map(|cols| cols.iter().map(|c| c.to_string()).collect());
        let split = split_keys(
            &target.column_names(),
            &batch_columns,
            &keys,
            updates.as_deref(),
        )
        .map_err(|err| SyncError::schema_mismatch(table, err.to_string()))?;

        if split.updates.is_empty() {
            info!(table, stage = "reconcile", "no update columns left after removing keys; nothing to do");
            return Ok(UpdateOutcome::Skipped(SkipReason::NoUpdateColumns));
        }

        let projection: Vec<String> = split.keys.iter().chain(&split.updates).cloned().collect();
        let projected = frame::project(batch, &projection)?;
        let deduped = frame::dedupe_first(&projected, &split.keys)?;
        if deduped.height() == 0 {
            info!(table, stage = "dedupe", "empty batch; nothing to do");
            return Ok(UpdateOutcome::Skipped(SkipReason::EmptyBatch));
        }
        let duplicates_dropped = projected.height() - deduped.height();
        let rows = frame::rows(&deduped)?;

        let key_idents = target.idents_for(&split.keys);
        let update_idents = target.idents_for(&split.updates);
        let staged: Vec<Ident> = key_idents.iter().chain(&update_idents).cloned().collect();
        let relation = target.qualified();
        let prefix = self.settings.staging_prefix.clone();

        let matched = self.backend.transaction(|exec| {
            with_staging(exec, &target, &prefix, &staged, &rows, |exec, staging| {
                exec.execute(&sql::update_from_staging(
                    &relation,
                    staging,
                    &key_idents,
                    &update_idents,
                ))
            })
        });

        match matched {
            Ok(rows_matched) => {
                info!(
                    table,
                    staged = rows.len(),
                    duplicates_dropped,
                    rows_matched,
                    "bulk update committed"
                );
                Ok(UpdateOutcome::Applied(UpdateReport {
                    table: table.to_string(),
                    key_columns: split.keys,
                    update_columns: split.updates,
                    staged_rows: rows.len(),
                    duplicates_dropped,
                    rows_matched,
                }))
            }
            Err(source) => {
                error!(table, stage = "update", error = %source, "bulk update rolled back");
                Err(SyncError::UpdateFailure {
                    table: table.to_string(),
                    source,
                })
            }
        }
    }
}
