//! Staging of fetched frames: each non-empty pull gets a fresh snapshot id,
//! stamped on every row as `snapshot_id`, and is appended to its target.

use std::num::NonZeroUsize;

use marketsync_core::{Backend, Connector, SkipReason, SnapshotId, WriteMode, WriteOutcome};
use polars::prelude::*;
use tracing::{info, warn};

use crate::error::FeedError;

pub const SNAPSHOT_COLUMN: &str = "snapshot_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// `None` when the frame was empty and no snapshot was taken.
    pub snapshot_id: Option<SnapshotId>,
    pub outcome: WriteOutcome,
}

/// Stamp `frame` with a new snapshot id and append it to `table`.
pub fn stage_frame<B: Backend>(
    connector: &mut Connector<B>,
    mut frame: DataFrame,
    table: &str,
    chunk_size: Option<NonZeroUsize>,
) -> Result<StageReport, FeedError> {
    if frame.height() == 0 {
        warn!(table, "nothing fetched; no snapshot taken");
        return Ok(StageReport {
            snapshot_id: None,
            outcome: WriteOutcome::Skipped(SkipReason::EmptyBatch),
        });
    }

    let snapshot_id = connector.next_snapshot_id()?;
    stamp_snapshot(&mut frame, snapshot_id)?;
    let outcome = connector.write(&frame, table, WriteMode::Append, chunk_size)?;
    info!(
        table,
        snapshot_id = snapshot_id.get(),
        rows = outcome.rows_written(),
        "pull staged"
    );
    Ok(StageReport {
        snapshot_id: Some(snapshot_id),
        outcome,
    })
}

/// Set `snapshot_id` on every row, replacing any existing column.
pub fn stamp_snapshot(frame: &mut DataFrame, id: SnapshotId) -> PolarsResult<()> {
    let ids = Series::new(SNAPSHOT_COLUMN.into(), vec![id.get(); frame.height()]);
    frame.with_column(ids)?;
    Ok(())
}
