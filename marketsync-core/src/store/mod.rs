//! Store backends.
//!
//! A [`Backend`] owns exactly one live connection and hands out scoped
//! transactions: the body receives an [`Executor`] bound to the open
//! transaction, the scope commits when the body returns `Ok` and rolls back on
//! every other path. The executor is unreachable outside the body, so one
//! operation can never run inside another's transaction.

pub mod pg;
pub mod sqlite;

use crate::error::StoreError;
use crate::ident::Ident;
use crate::value::SqlValue;

pub use self::pg::PgBackend;
pub use self::sqlite::SqliteBackend;

/// SQL flavour spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Namespace that holds session-local temporary tables.
    pub fn temp_namespace(self) -> &'static str {
        match self {
            Dialect::Postgres => "pg_temp",
            Dialect::Sqlite => "temp",
        }
    }
}

/// Column names plus row-major cells returned by an ad-hoc query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// Statements issued inside one open transaction.
pub trait Executor {
    fn dialect(&self) -> Dialect;

    /// Run a statement with no bound values; returns the affected row count.
    fn execute(&mut self, sql: &str) -> Result<u64, StoreError>;

    /// Column names of `namespace.table` in ordinal order. Table and
    /// namespace travel as bound parameters.
    fn catalog_columns(&mut self, namespace: &str, table: &str) -> Result<Vec<String>, StoreError>;

    /// Load `rows` into `relation` (already quoted) through the driver's
    /// batched path. Each row is positionally aligned with `columns`.
    fn bulk_load(
        &mut self,
        relation: &str,
        columns: &[Ident],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64, StoreError>;

    fn query(&mut self, sql: &str) -> Result<QueryResult, StoreError>;

    /// First column of the first returned row, read as an integer.
    fn query_id(&mut self, sql: &str) -> Result<Option<i64>, StoreError>;

    /// Session-visible temporary relation names.
    fn temp_relations(&mut self) -> Result<Vec<String>, StoreError>;
}

/// Exclusive owner of one connection.
pub trait Backend {
    fn dialect(&self) -> Dialect;

    /// Namespace (schema) that target tables live in.
    fn namespace(&self) -> &Ident;

    fn transaction<T, F>(&mut self, body: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn Executor) -> Result<T, StoreError>;
}
