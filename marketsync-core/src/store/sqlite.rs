//! Embedded SQLite backend.
//!
//! Used for local staging databases and for exercising the engine without a
//! server. Target tables live in the `main` schema; staging tables go to
//! `temp`.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use tracing::warn;

use super::{Backend, Dialect, Executor, QueryResult};
use crate::error::StoreError;
use crate::ident::{quoted_list, Ident};
use crate::value::SqlValue;

const CATALOG_COLUMNS: &str = "SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid";

const TEMP_RELATIONS: &str =
    "SELECT name FROM sqlite_temp_master WHERE type = 'table' ORDER BY name";

pub struct SqliteBackend {
    conn: Connection,
    namespace: Ident,
}

impl SqliteBackend {
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            namespace: Ident::from_catalog("main"),
        }
    }

    /// Direct access for DDL and fixtures.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Backend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn namespace(&self) -> &Ident {
        &self.namespace
    }

    fn transaction<T, F>(&mut self, body: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn Executor) -> Result<T, StoreError>,
    {
        let tx = self.conn.transaction()?;
        let outcome = body(&mut SqliteExecutor { tx: &tx });
        match outcome {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

struct SqliteExecutor<'a, 'conn> {
    tx: &'a Transaction<'conn>,
}

impl Executor for SqliteExecutor<'_, '_> {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str) -> Result<u64, StoreError> {
        Ok(self.tx.execute(sql, [])? as u64)
    }

    fn catalog_columns(&mut self, namespace: &str, table: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.tx.prepare(CATALOG_COLUMNS)?;
        let names = stmt
            .query_map(params![table, namespace], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn bulk_load(
        &mut self,
        relation: &str,
        columns: &[Ident],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64, StoreError> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {relation} ({}) VALUES ({placeholders})",
            quoted_list(columns)
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let mut loaded = 0u64;
        for row in rows {
            loaded += stmt.execute(params_from_iter(row.iter()))? as u64;
        }
        Ok(loaded)
    }

    fn query(&mut self, sql: &str) -> Result<QueryResult, StoreError> {
        let mut stmt = self.tx.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                cells.push(match row.get_ref(idx)? {
                    ValueRef::Null => SqlValue::Null,
                    ValueRef::Integer(v) => SqlValue::Int(v),
                    ValueRef::Real(v) => SqlValue::Float(v),
                    ValueRef::Text(bytes) => {
                        SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
                    }
                    ValueRef::Blob(_) => {
                        return Err(StoreError::UnsupportedType {
                            column: columns[idx].clone(),
                            type_name: "BLOB".to_string(),
                        })
                    }
                });
            }
            rows.push(cells);
        }
        Ok(QueryResult { columns, rows })
    }

    fn query_id(&mut self, sql: &str) -> Result<Option<i64>, StoreError> {
        let id = self
            .tx
            .query_row(sql, [], |row| row.get::<_, Option<i64>>(0))
            .optional()?;
        Ok(id.flatten())
    }

    fn temp_relations(&mut self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.tx.prepare(TEMP_RELATIONS)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SqliteBackend {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .connection()
            .execute_batch("CREATE TABLE quotes (symbol TEXT NOT NULL, last REAL, volume INTEGER)")
            .unwrap();
        backend
    }

    #[test]
    fn catalog_lists_columns_in_ordinal_order() {
        let mut backend = backend();
        let cols = backend
            .transaction(|exec| exec.catalog_columns("main", "quotes"))
            .unwrap();
        assert_eq!(cols, vec!["symbol", "last", "volume"]);
    }

    #[test]
    fn catalog_of_missing_table_is_empty() {
        let mut backend = backend();
        let cols = backend
            .transaction(|exec| exec.catalog_columns("main", "nope"))
            .unwrap();
        assert!(cols.is_empty());
    }

    #[test]
    fn failed_body_rolls_back() {
        let mut backend = backend();
        let result: Result<(), StoreError> = backend.transaction(|exec| {
            exec.execute("INSERT INTO quotes (symbol) VALUES ('AAPL')")?;
            exec.execute("INSERT INTO quotes (symbol) VALUES (NULL)")?;
            Ok(())
        });
        assert!(result.is_err());
        let count: i64 = backend
            .connection()
            .query_row("SELECT COUNT(*) FROM quotes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn bulk_load_and_query_round_trip_values() {
        let mut backend = backend();
        let cols = vec![
            Ident::from_catalog("symbol"),
            Ident::from_catalog("last"),
            Ident::from_catalog("volume"),
        ];
        let rows = vec![
            vec!["AAPL".into(), SqlValue::Float(191.5), SqlValue::Int(1_000)],
            vec!["MSFT".into(), SqlValue::Null, SqlValue::Int(20)],
        ];
        let loaded = backend
            .transaction(|exec| exec.bulk_load("\"main\".\"quotes\"", &cols, &rows))
            .unwrap();
        assert_eq!(loaded, 2);

        let result = backend
            .transaction(|exec| exec.query("SELECT symbol, last, volume FROM quotes ORDER BY symbol"))
            .unwrap();
        assert_eq!(result.columns, vec!["symbol", "last", "volume"]);
        assert_eq!(result.rows, rows);
    }
}
