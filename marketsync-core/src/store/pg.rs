//! Postgres backend over the synchronous `postgres` driver.
//!
//! Bulk loads stream rows through `COPY ... FROM STDIN` in text format, so
//! each value is parsed by the server according to the destination column's
//! type, the same leniency a batched INSERT of literals would give.

use std::fmt::Write as _;
use std::io::Write as _;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres::types::Type;
use postgres::{Client, Config, NoTls, Row, SimpleQueryMessage, Transaction};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{Backend, Dialect, Executor, QueryResult};
use crate::config::{ConfigError, DatabaseConfig};
use crate::error::StoreError;
use crate::ident::{quoted_list, Ident};
use crate::value::SqlValue;

const CATALOG_COLUMNS: &str = "SELECT column_name::text FROM information_schema.columns \
     WHERE table_name = $1 AND table_schema = $2 ORDER BY ordinal_position";

const TEMP_RELATIONS: &str = "SELECT relname::text FROM pg_class \
     WHERE relnamespace = pg_my_temp_schema() AND relkind = 'r' ORDER BY relname";

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("connect to postgres: {0}")]
    Driver(#[from] postgres::Error),
}

/// One exclusively owned Postgres connection bound to a schema.
pub struct PgBackend {
    client: Client,
    namespace: Ident,
}

impl PgBackend {
    /// Connect with the configured host, database and credentials.
    pub fn connect(db: &DatabaseConfig) -> Result<Self, ConnectError> {
        let (user, password) = db.credentials()?;
        let namespace = Ident::checked(&db.schema).map_err(ConfigError::from)?;
        let client = Config::new()
            .host(&db.host)
            .port(db.port)
            .dbname(&db.dbname)
            .user(user)
            .password(password)
            .connect(NoTls)?;
        info!(host = %db.host, port = db.port, dbname = %db.dbname, schema = %db.schema, "connected to postgres");
        Ok(Self { client, namespace })
    }

    /// Connect with a libpq-style connection string.
    pub fn connect_url(url: &str, schema: &str) -> Result<Self, ConnectError> {
        let namespace = Ident::checked(schema).map_err(ConfigError::from)?;
        let client = Client::connect(url, NoTls)?;
        Ok(Self { client, namespace })
    }

    pub fn from_client(client: Client, namespace: Ident) -> Self {
        Self { client, namespace }
    }

    /// Raw client, for setup work outside the sync engine.
    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}

impl Backend for PgBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn namespace(&self) -> &Ident {
        &self.namespace
    }

    fn transaction<T, F>(&mut self, body: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn Executor) -> Result<T, StoreError>,
    {
        let mut tx = self.client.transaction()?;
        let outcome = body(&mut PgExecutor { tx: &mut tx });
        match outcome {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "rollback failed; the server discards the transaction with the session");
                }
                Err(err)
            }
        }
    }
}

struct PgExecutor<'a, 'conn> {
    tx: &'a mut Transaction<'conn>,
}

impl Executor for PgExecutor<'_, '_> {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute(&mut self, sql: &str) -> Result<u64, StoreError> {
        Ok(self.tx.execute(sql, &[])?)
    }

    fn catalog_columns(&mut self, namespace: &str, table: &str) -> Result<Vec<String>, StoreError> {
        let rows = self.tx.query(CATALOG_COLUMNS, &[&table, &namespace])?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(StoreError::from))
            .collect()
    }

    fn bulk_load(
        &mut self,
        relation: &str,
        columns: &[Ident],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let statement = format!("COPY {relation} ({}) FROM STDIN", quoted_list(columns));
        let mut writer = self.tx.copy_in(statement.as_str())?;
        let mut line = String::new();
        for row in rows {
            line.clear();
            encode_copy_row(&mut line, row);
            writer.write_all(line.as_bytes())?;
        }
        Ok(writer.finish()?)
    }

    fn query(&mut self, sql: &str) -> Result<QueryResult, StoreError> {
        let statement = self.tx.prepare(sql)?;
        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let types: Vec<Type> = statement
            .columns()
            .iter()
            .map(|c| c.type_().clone())
            .collect();
        let rows = if types.iter().all(decodes_binary) {
            self.tx
                .query(&statement, &[])?
                .iter()
                .map(read_row)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            debug!(sql, "result has non-native column types; reading as text");
            self.query_text(sql, &types)?
        };
        Ok(QueryResult { columns, rows })
    }

    fn query_id(&mut self, sql: &str) -> Result<Option<i64>, StoreError> {
        let Some(row) = self.tx.query_opt(sql, &[])? else {
            return Ok(None);
        };
        match read_cell(&row, 0)? {
            SqlValue::Int(id) => Ok(Some(id)),
            SqlValue::Null => Ok(None),
            _ => Err(StoreError::UnsupportedType {
                column: row.columns()[0].name().to_string(),
                type_name: row.columns()[0].type_().name().to_string(),
            }),
        }
    }

    fn temp_relations(&mut self) -> Result<Vec<String>, StoreError> {
        let rows = self.tx.query(TEMP_RELATIONS, &[])?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(StoreError::from))
            .collect()
    }
}

impl PgExecutor<'_, '_> {
    /// Run `sql` over the simple protocol, where the server renders every
    /// value as text, and decode each cell by its column type.
    fn query_text(&mut self, sql: &str, types: &[Type]) -> Result<Vec<Vec<SqlValue>>, StoreError> {
        let mut rows = Vec::new();
        for message in self.tx.simple_query(sql)? {
            if let SimpleQueryMessage::Row(row) = message {
                let cells = types
                    .iter()
                    .enumerate()
                    .map(|(idx, ty)| Ok(parse_text_cell(ty, row.try_get(idx)?)))
                    .collect::<Result<Vec<_>, StoreError>>()?;
                rows.push(cells);
            }
        }
        Ok(rows)
    }
}

/// Types `read_cell` decodes from the binary protocol.
fn decodes_binary(ty: &Type) -> bool {
    [
        Type::BOOL,
        Type::INT2,
        Type::INT4,
        Type::INT8,
        Type::FLOAT4,
        Type::FLOAT8,
        Type::TEXT,
        Type::VARCHAR,
        Type::BPCHAR,
        Type::NAME,
        Type::DATE,
        Type::TIMESTAMP,
        Type::TIMESTAMPTZ,
    ]
    .contains(ty)
}

/// Decode one text-rendered cell. NUMERIC becomes a float; anything that
/// does not parse as its column type, or has no native mapping, stays text.
fn parse_text_cell(ty: &Type, text: Option<&str>) -> SqlValue {
    let Some(text) = text else {
        return SqlValue::Null;
    };
    let parsed = if *ty == Type::BOOL {
        match text {
            "t" => Some(SqlValue::Bool(true)),
            "f" => Some(SqlValue::Bool(false)),
            _ => None,
        }
    } else if [Type::INT2, Type::INT4, Type::INT8].contains(ty) {
        text.parse().ok().map(SqlValue::Int)
    } else if [Type::FLOAT4, Type::FLOAT8, Type::NUMERIC].contains(ty) {
        text.parse().ok().map(SqlValue::Float)
    } else if *ty == Type::DATE {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(SqlValue::Date)
    } else if *ty == Type::TIMESTAMP {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(SqlValue::Timestamp)
    } else if *ty == Type::TIMESTAMPTZ {
        DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
            .ok()
            .map(|v| SqlValue::Timestamp(v.naive_utc()))
    } else {
        None
    };
    parsed.unwrap_or_else(|| SqlValue::Text(text.to_string()))
}

fn read_row(row: &Row) -> Result<Vec<SqlValue>, StoreError> {
    (0..row.len()).map(|idx| read_cell(row, idx)).collect()
}

fn read_cell(row: &Row, idx: usize) -> Result<SqlValue, StoreError> {
    let ty = row.columns()[idx].type_();
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?
            .map(|v| SqlValue::Int(i64::from(v)))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?
            .map(|v| SqlValue::Int(i64::from(v)))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::Int)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?
            .map(|v| SqlValue::Float(f64::from(v)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::Float)
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
        row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text)
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(idx)?.map(SqlValue::Date)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(SqlValue::Timestamp)
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| SqlValue::Timestamp(v.naive_utc()))
    } else {
        return Err(StoreError::UnsupportedType {
            column: row.columns()[idx].name().to_string(),
            type_name: ty.name().to_string(),
        });
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Append one COPY text-format line (tab separated, `\N` for NULL).
pub(crate) fn encode_copy_row(out: &mut String, row: &[SqlValue]) {
    for (idx, value) in row.iter().enumerate() {
        if idx > 0 {
            out.push('\t');
        }
        match value {
            SqlValue::Null => out.push_str("\\N"),
            SqlValue::Bool(v) => out.push(if *v { 't' } else { 'f' }),
            SqlValue::Float(v) if v.is_infinite() => {
                out.push_str(if *v > 0.0 { "Infinity" } else { "-Infinity" })
            }
            SqlValue::Text(v) => escape_copy_text(out, v),
            other => {
                let _ = write!(out, "{other}");
            }
        }
    }
    out.push('\n');
}

fn escape_copy_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(row: &[SqlValue]) -> String {
        let mut out = String::new();
        encode_copy_row(&mut out, row);
        out
    }

    #[test]
    fn numeric_text_reads_as_float() {
        assert_eq!(
            parse_text_cell(&Type::NUMERIC, Some("187.2500")),
            SqlValue::Float(187.25)
        );
        assert_eq!(parse_text_cell(&Type::NUMERIC, None), SqlValue::Null);
    }

    #[test]
    fn types_without_a_mapping_read_as_text() {
        let uuid = "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";
        assert_eq!(
            parse_text_cell(&Type::UUID, Some(uuid)),
            SqlValue::Text(uuid.to_string())
        );
        assert_eq!(
            parse_text_cell(&Type::JSONB, Some(r#"{"a": 1}"#)),
            SqlValue::Text(r#"{"a": 1}"#.to_string())
        );
        assert!(!decodes_binary(&Type::NUMERIC));
        assert!(!decodes_binary(&Type::INTERVAL));
    }

    #[test]
    fn native_types_parse_from_their_text_form() {
        let ts = NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(parse_text_cell(&Type::BOOL, Some("t")), SqlValue::Bool(true));
        assert_eq!(parse_text_cell(&Type::INT8, Some("-42")), SqlValue::Int(-42));
        assert_eq!(
            parse_text_cell(&Type::TIMESTAMP, Some("2025-01-02 09:30:00")),
            SqlValue::Timestamp(ts)
        );
        assert_eq!(
            parse_text_cell(&Type::TIMESTAMPTZ, Some("2025-01-02 10:30:00+01")),
            SqlValue::Timestamp(ts)
        );
        assert_eq!(
            parse_text_cell(&Type::DATE, Some("2025-01-02")),
            SqlValue::Date(ts.date())
        );
    }

    #[test]
    fn copy_line_is_tab_separated_with_null_marker() {
        let line = encode(&[
            SqlValue::Text("AAPL".into()),
            SqlValue::Int(25),
            SqlValue::Null,
            SqlValue::Bool(true),
        ]);
        assert_eq!(line, "AAPL\t25\t\\N\tt\n");
    }

    #[test]
    fn copy_text_escapes_control_characters() {
        let line = encode(&[SqlValue::Text("a\tb\nc\\d".into())]);
        assert_eq!(line, "a\\tb\\nc\\\\d\n");
    }

    #[test]
    fn copy_text_cannot_break_out_of_its_field() {
        let line = encode(&[SqlValue::Text("x\n\\.\n".into()), SqlValue::Int(1)]);
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(line.matches('\t').count(), 1);
    }

    #[test]
    fn copy_encodes_infinities_and_temporal_values() {
        let ts = NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_milli_opt(9, 30, 0, 250)
            .unwrap();
        let line = encode(&[
            SqlValue::Float(f64::NEG_INFINITY),
            SqlValue::Timestamp(ts),
            SqlValue::Date(ts.date()),
        ]);
        assert_eq!(line, "-Infinity\t2025-01-02 09:30:00.250\t2025-01-02\n");
    }
}
