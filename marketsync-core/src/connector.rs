//! The connector: one exclusively owned store connection plus the validated
//! names the engine needs. Bulk writes live in `writer`, bulk updates in
//! `updater`, snapshot ids in `snapshot`.

use polars::prelude::DataFrame;
use tracing::warn;

use crate::config::SyncSettings;
use crate::error::{StoreError, SyncError};
use crate::frame::{self, Record};
use crate::ident::Ident;
use crate::schema::{self, TableDescriptor};
use crate::store::Backend;
use crate::updater::UpdateOutcome;
use crate::writer::{WriteMode, WriteOutcome};

pub struct Connector<B: Backend> {
    pub(crate) backend: B,
    pub(crate) settings: SyncSettings,
}

impl<B: Backend> Connector<B> {
    pub fn new(backend: B, settings: SyncSettings) -> Self {
        Self { backend, settings }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Live descriptor of `table`, or a descriptor with no columns when the
    /// catalog is unreachable (logged).
    pub fn describe(&mut self, table: &str) -> TableDescriptor {
        self.try_describe(table).unwrap_or_else(|err| {
            warn!(table, error = %err, "catalog lookup failed");
            TableDescriptor {
                namespace: self.backend.namespace().clone(),
                name: Ident::from_catalog(table),
                columns: Vec::new(),
            }
        })
    }

    pub fn try_describe(&mut self, table: &str) -> Result<TableDescriptor, StoreError> {
        let namespace = self.backend.namespace().clone();
        self.backend
            .transaction(|exec| TableDescriptor::load(exec, &namespace, table))
    }

    /// Ordered columns of `table`; empty when absent or on catalog failure.
    pub fn columns_of(&mut self, table: &str) -> Vec<String> {
        let namespace = self.backend.namespace().clone();
        self.backend
            .transaction(|exec| Ok(schema::columns_of(exec, &namespace, table)))
            .unwrap_or_else(|err| {
                warn!(table, error = %err, "could not open catalog transaction");
                Vec::new()
            })
    }

    pub fn try_columns_of(&mut self, table: &str) -> Result<Vec<String>, SyncError> {
        let namespace = self.backend.namespace().clone();
        self.backend
            .transaction(|exec| schema::try_columns_of(exec, &namespace, table))
            .map_err(SyncError::Query)
    }

    /// Run a read query and return its rows as a frame.
    pub fn query_frame(&mut self, sql: &str) -> Result<DataFrame, SyncError> {
        let result = self
            .backend
            .transaction(|exec| exec.query(sql))
            .map_err(SyncError::Query)?;
        Ok(frame::frame_from_rows(&result.columns, &result.rows)?)
    }

    /// Append one row.
    pub fn insert_record(&mut self, table: &str, record: &Record) -> Result<WriteOutcome, SyncError> {
        let batch = record.to_frame()?;
        self.write(&batch, table, WriteMode::Append, None)
    }

    /// Set `values` on the rows matching every cell of `conditions`. A column
    /// named in both is only used as a condition.
    pub fn update_record(
        &mut self,
        table: &str,
        values: &Record,
        conditions: &Record,
    ) -> Result<UpdateOutcome, SyncError> {
        let mut row = conditions.clone();
        for (column, value) in values.iter() {
            if !conditions.contains(column) {
                row.set(column, value.clone());
            }
        }
        let keys: Vec<&str> = conditions.columns().collect();
        let batch = row.to_frame()?;
        self.bulk_update(&batch, table, &keys, None)
    }

    /// Staging relations currently visible to this session.
    pub fn staging_relations(&mut self) -> Result<Vec<String>, SyncError> {
        let prefix = self.settings.staging_prefix.as_str().to_string();
        let names = self
            .backend
            .transaction(|exec| exec.temp_relations())
            .map_err(SyncError::Query)?;
        Ok(names
            .into_iter()
            .filter(|name| name.starts_with(&prefix))
            .collect())
    }
}
