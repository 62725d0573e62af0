//! Tabular batch helpers.
//!
//! A batch is a polars `DataFrame`: named, equal-length, uniquely named
//! columns. These helpers project, de-duplicate, chunk and flatten frames into
//! rows of [`SqlValue`], and rebuild frames from rows read back from a store.

use chrono::NaiveDate;
use polars::prelude::*;
use std::num::NonZeroUsize;

use crate::value::SqlValue;

/// Column names in batch order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

/// Keep exactly `columns`, in that order.
pub fn project(df: &DataFrame, columns: &[String]) -> PolarsResult<DataFrame> {
    df.select(columns.iter().map(|c| c.as_str()))
}

/// Drop rows whose key tuple already appeared earlier; the first occurrence
/// wins and batch order is kept.
pub fn dedupe_first(df: &DataFrame, keys: &[String]) -> PolarsResult<DataFrame> {
    df.clone()
        .lazy()
        .unique_stable(
            Some(keys.iter().map(|k| k.as_str().into()).collect()),
            UniqueKeepStrategy::First,
        )
        .collect()
}

/// `(offset, len)` ranges covering `height` rows in groups of at most
/// `chunk_size`. No chunk size means a single range.
pub fn chunk_ranges(height: usize, chunk_size: Option<NonZeroUsize>) -> Vec<(usize, usize)> {
    let Some(size) = chunk_size.map(NonZeroUsize::get) else {
        return vec![(0, height)];
    };
    if height == 0 {
        return vec![(0, 0)];
    }
    (0..height)
        .step_by(size)
        .map(|offset| (offset, size.min(height - offset)))
        .collect()
}

/// Row-major copy of the frame's cells.
pub fn rows(df: &DataFrame) -> PolarsResult<Vec<Vec<SqlValue>>> {
    let columns = df.get_columns();
    let mut out = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let mut row = Vec::with_capacity(columns.len());
        for column in columns {
            row.push(SqlValue::from_any(&column.get(idx)?));
        }
        out.push(row);
    }
    Ok(out)
}

/// Rebuild a frame from row-major values. Each column's dtype follows the
/// non-null values it holds: uniform kinds keep their type, integers mixed
/// with floats widen to f64, anything else becomes text.
pub fn frame_from_rows(columns: &[String], rows: &[Vec<SqlValue>]) -> PolarsResult<DataFrame> {
    let mut built = Vec::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        let cells: Vec<&SqlValue> = rows
            .iter()
            .map(|row| row.get(idx).unwrap_or(&SqlValue::Null))
            .collect();
        built.push(Column::from(series_from_cells(name, &cells)?));
    }
    DataFrame::new(built)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Empty,
    Bool,
    Int,
    Float,
    Text,
    Date,
    Timestamp,
}

fn column_kind(cells: &[&SqlValue]) -> CellKind {
    cells.iter().fold(CellKind::Empty, |kind, cell| {
        let this = match cell {
            SqlValue::Null => return kind,
            SqlValue::Bool(_) => CellKind::Bool,
            SqlValue::Int(_) => CellKind::Int,
            SqlValue::Float(_) => CellKind::Float,
            SqlValue::Text(_) => CellKind::Text,
            SqlValue::Date(_) => CellKind::Date,
            SqlValue::Timestamp(_) => CellKind::Timestamp,
        };
        match (kind, this) {
            (CellKind::Empty, k) => k,
            (a, b) if a == b => a,
            (CellKind::Int, CellKind::Float) | (CellKind::Float, CellKind::Int) => CellKind::Float,
            _ => CellKind::Text,
        }
    })
}

fn series_from_cells(name: &str, cells: &[&SqlValue]) -> PolarsResult<Series> {
    let name = PlSmallStr::from(name);
    let series = match column_kind(cells) {
        CellKind::Empty => Series::full_null(name, cells.len(), &DataType::Null),
        CellKind::Bool => Series::new(
            name,
            cells
                .iter()
                .map(|c| match c {
                    SqlValue::Bool(v) => Some(*v),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ),
        CellKind::Int => Series::new(
            name,
            cells
                .iter()
                .map(|c| match c {
                    SqlValue::Int(v) => Some(*v),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ),
        CellKind::Float => Series::new(
            name,
            cells
                .iter()
                .map(|c| match c {
                    SqlValue::Float(v) => Some(*v),
                    SqlValue::Int(v) => Some(*v as f64),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ),
        CellKind::Date => Series::new(
            name,
            cells
                .iter()
                .map(|c| match c {
                    SqlValue::Date(d) => Some(epoch_days(*d)),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )
        .cast(&DataType::Date)?,
        CellKind::Timestamp => Series::new(
            name,
            cells
                .iter()
                .map(|c| match c {
                    SqlValue::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?,
        CellKind::Text => Series::new(
            name,
            cells
                .iter()
                .map(|c| (!c.is_null()).then(|| c.to_string()))
                .collect::<Vec<_>>(),
        ),
    };
    Ok(series)
}

fn epoch_days(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    (date - epoch).num_days() as i32
}

/// One named row, built up cell by cell. Used for single-record inserts and
/// updates, which run through the bulk paths as one-row batches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    cells: Vec<(String, SqlValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a cell, replacing an earlier value for the same column.
    pub fn with(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<SqlValue>) {
        let value = value.into();
        match self.cells.iter_mut().find(|(name, _)| name == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column.to_string(), value)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.iter().any(|(name, _)| name == column)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// A one-row frame with one column per cell.
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let columns: Vec<String> = self.columns().map(str::to_string).collect();
        let row: Vec<SqlValue> = self.cells.iter().map(|(_, v)| v.clone()).collect();
        frame_from_rows(&columns, &[row])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions() -> DataFrame {
        df!(
            "symbol" => &["AAPL", "MSFT", "AAPL"],
            "shares" => &[25i64, 5, 999],
            "note" => &["first", "only", "second"],
        )
        .unwrap()
    }

    #[test]
    fn project_keeps_requested_order() {
        let projected = project(&positions(), &["shares".into(), "symbol".into()]).unwrap();
        assert_eq!(column_names(&projected), vec!["shares", "symbol"]);
    }

    #[test]
    fn dedupe_keeps_first_occurrence_in_batch_order() {
        let deduped = dedupe_first(&positions(), &["symbol".into()]).unwrap();
        assert_eq!(deduped.height(), 2);
        let symbols = deduped.column("symbol").unwrap();
        let shares = deduped.column("shares").unwrap();
        assert_eq!(symbols.get(0).unwrap(), AnyValue::String("AAPL"));
        assert_eq!(shares.get(0).unwrap(), AnyValue::Int64(25));
        assert_eq!(symbols.get(1).unwrap(), AnyValue::String("MSFT"));
    }

    #[test]
    fn chunk_ranges_cover_every_row_once() {
        let ranges = chunk_ranges(10, NonZeroUsize::new(4));
        assert_eq!(ranges, vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(chunk_ranges(10, None), vec![(0, 10)]);
        assert_eq!(chunk_ranges(0, NonZeroUsize::new(3)), vec![(0, 0)]);
    }

    #[test]
    fn rows_are_row_major() {
        let rows = rows(&positions()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[2],
            vec![
                SqlValue::Text("AAPL".into()),
                SqlValue::Int(999),
                SqlValue::Text("second".into())
            ]
        );
    }

    #[test]
    fn frame_from_rows_infers_column_types() {
        let columns = vec!["id".to_string(), "px".to_string(), "mixed".to_string()];
        let rows = vec![
            vec![SqlValue::Int(1), SqlValue::Int(10), SqlValue::Int(1)],
            vec![SqlValue::Null, SqlValue::Float(10.5), SqlValue::Text("x".into())],
        ];
        let df = frame_from_rows(&columns, &rows).unwrap();
        assert_eq!(df.column("id").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("px").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("mixed").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("id").unwrap().null_count(), 1);
    }

    #[test]
    fn record_set_replaces_existing_cell() {
        let record = Record::new()
            .with("symbol", "AAPL")
            .with("shares", 10i64)
            .with("shares", 12i64);
        let df = record.to_frame().unwrap();
        assert_eq!(df.width(), 2);
        assert_eq!(df.column("shares").unwrap().get(0).unwrap(), AnyValue::Int64(12));
    }
}
