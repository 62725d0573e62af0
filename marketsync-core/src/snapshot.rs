//! Snapshot sequencer. Each logical pull of external data gets a fresh id
//! from the append-only snapshot table.

use std::fmt;

use tracing::{error, info};

use crate::connector::Connector;
use crate::error::SyncError;
use crate::ident::qualified;
use crate::sql;
use crate::store::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(i64);

impl SnapshotId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<B: Backend> Connector<B> {
    /// Insert a default row into the snapshot table and return its id.
    pub fn next_snapshot_id(&mut self) -> Result<SnapshotId, SyncError> {
        let table = qualified(self.backend.namespace(), &self.settings.snapshot_table);
        let statement = sql::insert_default_returning(&table, &self.settings.snapshot_id_column);

        let id = self
            .backend
            .transaction(|exec| exec.query_id(&statement))
            .map_err(|err| {
                error!(table = %table, error = %err, "snapshot insert failed");
                SyncError::SequencerFailure {
                    reason: err.to_string(),
                }
            })?;

        match id {
            Some(id) if id >= 0 => {
                info!(snapshot_id = id, "issued snapshot id");
                Ok(SnapshotId(id))
            }
            Some(id) => Err(SyncError::SequencerFailure {
                reason: format!("negative snapshot id {id}"),
            }),
            None => Err(SyncError::SequencerFailure {
                reason: "insert returned no id".to_string(),
            }),
        }
    }
}
