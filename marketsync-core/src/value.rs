//! Cell values exchanged with a store.
//!
//! Batches are polars frames; on their way to a store each cell becomes a
//! [`SqlValue`]. Values only ever travel as bound parameters or through the
//! bulk-load data stream, never as statement text.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::{AnyValue, TimeUnit};
use rusqlite::types::{ToSql, ToSqlOutput};
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    /// Convert one polars cell. NaN floats become NULL; types without a direct
    /// mapping fall back to their display text.
    pub fn from_any(value: &AnyValue<'_>) -> Self {
        match value {
            AnyValue::Null => SqlValue::Null,
            AnyValue::Boolean(v) => SqlValue::Bool(*v),
            AnyValue::Int8(v) => SqlValue::Int(i64::from(*v)),
            AnyValue::Int16(v) => SqlValue::Int(i64::from(*v)),
            AnyValue::Int32(v) => SqlValue::Int(i64::from(*v)),
            AnyValue::Int64(v) => SqlValue::Int(*v),
            AnyValue::UInt8(v) => SqlValue::Int(i64::from(*v)),
            AnyValue::UInt16(v) => SqlValue::Int(i64::from(*v)),
            AnyValue::UInt32(v) => SqlValue::Int(i64::from(*v)),
            AnyValue::UInt64(v) => match i64::try_from(*v) {
                Ok(v) => SqlValue::Int(v),
                Err(_) => SqlValue::Text(v.to_string()),
            },
            AnyValue::Float32(v) if v.is_nan() => SqlValue::Null,
            AnyValue::Float64(v) if v.is_nan() => SqlValue::Null,
            AnyValue::Float32(v) => SqlValue::Float(f64::from(*v)),
            AnyValue::Float64(v) => SqlValue::Float(*v),
            AnyValue::String(s) => SqlValue::Text((*s).to_string()),
            AnyValue::StringOwned(s) => SqlValue::Text(s.to_string()),
            AnyValue::Date(days) => date_from_epoch_days(*days)
                .map(SqlValue::Date)
                .unwrap_or_else(|| SqlValue::Text(days.to_string())),
            AnyValue::Datetime(raw, unit, _) => timestamp_from_epoch(*raw, *unit)
                .map(SqlValue::Timestamp)
                .unwrap_or_else(|| SqlValue::Text(raw.to_string())),
            other => SqlValue::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

pub(crate) fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    DateTime::from_timestamp(i64::from(days) * 86_400, 0).map(|dt| dt.date_naive())
}

pub(crate) fn timestamp_from_epoch(raw: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(raw)?,
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(raw)?,
        TimeUnit::Nanoseconds => DateTime::from_timestamp_nanos(raw),
    };
    Some(dt.naive_utc())
}

/// Text rendering used by the COPY stream and by mixed-type query columns.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => Ok(()),
            SqlValue::Bool(v) => write!(f, "{v}"),
            SqlValue::Int(v) => write!(f, "{v}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            SqlValue::Timestamp(v) => write!(f, "{}", v.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::from(rusqlite::types::Null),
            SqlValue::Bool(v) => ToSqlOutput::from(*v),
            SqlValue::Int(v) => ToSqlOutput::from(*v),
            SqlValue::Float(v) => ToSqlOutput::from(*v),
            SqlValue::Text(v) => ToSqlOutput::from(v.as_str()),
            SqlValue::Date(_) | SqlValue::Timestamp(_) => ToSqlOutput::from(self.to_string()),
        })
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}
