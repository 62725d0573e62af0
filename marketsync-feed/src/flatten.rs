//! Flattening of JSON records into frame rows.
//!
//! Nested objects become columns named by their `.`-joined key path. Arrays
//! are kept as JSON text. Columns appear in first-seen order across records;
//! a record lacking a column gets NULL there.

use marketsync_core::frame::frame_from_rows;
use marketsync_core::SqlValue;
use polars::prelude::{DataFrame, PolarsResult};
use serde_json::{Map, Value};

/// Flattened records as column names plus row-major cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRecords {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl FlatRecords {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Map<String, Value>>) -> Self {
        let mut flat = FlatRecords::default();
        for record in records {
            let mut cells = Vec::new();
            flatten_into("", record, &mut cells);
            let mut row = vec![SqlValue::Null; flat.columns.len()];
            for (name, value) in cells {
                let idx = match flat.columns.iter().position(|c| *c == name) {
                    Some(idx) => idx,
                    None => {
                        flat.columns.push(name);
                        row.push(SqlValue::Null);
                        flat.columns.len() - 1
                    }
                };
                row[idx] = value;
            }
            flat.rows.push(row);
        }
        let width = flat.columns.len();
        for row in &mut flat.rows {
            row.resize(width, SqlValue::Null);
        }
        flat
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Apply `f` to every cell of `column`, if present.
    pub fn map_column(&mut self, column: &str, f: impl Fn(SqlValue) -> SqlValue) {
        if let Some(idx) = self.columns.iter().position(|c| c == column) {
            for row in &mut self.rows {
                let cell = std::mem::replace(&mut row[idx], SqlValue::Null);
                row[idx] = f(cell);
            }
        }
    }

    /// Set `column` to `value` on every row, adding the column if needed.
    pub fn set_constant(&mut self, column: &str, value: SqlValue) {
        match self.columns.iter().position(|c| c == column) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = value.clone();
                }
            }
            None => {
                self.columns.push(column.to_string());
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            }
        }
    }

    pub fn extend(&mut self, other: FlatRecords) {
        for name in &other.columns {
            if !self.columns.contains(name) {
                self.columns.push(name.clone());
                for row in &mut self.rows {
                    row.push(SqlValue::Null);
                }
            }
        }
        for row in other.rows {
            let mut merged = vec![SqlValue::Null; self.columns.len()];
            for (name, value) in other.columns.iter().zip(row) {
                if let Some(idx) = self.columns.iter().position(|c| c == name) {
                    merged[idx] = value;
                }
            }
            self.rows.push(merged);
        }
    }

    pub fn into_frame(self) -> PolarsResult<DataFrame> {
        if self.columns.is_empty() {
            return Ok(DataFrame::empty());
        }
        frame_from_rows(&self.columns, &self.rows)
    }
}

fn flatten_into(prefix: &str, object: &Map<String, Value>, out: &mut Vec<(String, SqlValue)>) {
    for (key, value) in object {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(&name, nested, out),
            other => out.push((name, scalar(other))),
        }
    }
}

fn scalar(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Int(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Float),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn objects(value: Value) -> Vec<Map<String, Value>> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn nested_keys_are_dot_joined() {
        let records = objects(json!([
            {"symbol": "AAPL", "fundamental": {"peRatio": 31.2, "div": {"yield": 0.5}}}
        ]));
        let flat = FlatRecords::from_records(&records);
        assert_eq!(
            flat.columns,
            vec!["symbol", "fundamental.peRatio", "fundamental.div.yield"]
        );
        assert_eq!(flat.rows[0][1], SqlValue::Float(31.2));
    }

    #[test]
    fn missing_keys_become_null_and_new_keys_extend_columns() {
        let records = objects(json!([
            {"a": 1},
            {"b": "x", "a": 2}
        ]));
        let flat = FlatRecords::from_records(&records);
        assert_eq!(flat.columns, vec!["a", "b"]);
        assert_eq!(flat.rows[0], vec![SqlValue::Int(1), SqlValue::Null]);
        assert_eq!(flat.rows[1], vec![SqlValue::Int(2), SqlValue::Text("x".into())]);
    }

    #[test]
    fn arrays_are_kept_as_json_text() {
        let records = objects(json!([{"tags": [1, 2]}]));
        let flat = FlatRecords::from_records(&records);
        assert_eq!(flat.rows[0][0], SqlValue::Text("[1,2]".into()));
    }

    #[test]
    fn extend_aligns_columns_by_name() {
        let mut left = FlatRecords::from_records(&objects(json!([{"a": 1}])));
        let right = FlatRecords::from_records(&objects(json!([{"b": 2, "a": 3}])));
        left.extend(right);
        assert_eq!(left.columns, vec!["a", "b"]);
        assert_eq!(left.rows[0], vec![SqlValue::Int(1), SqlValue::Null]);
        assert_eq!(left.rows[1], vec![SqlValue::Int(3), SqlValue::Int(2)]);
    }

    #[test]
    fn empty_input_gives_an_empty_frame() {
        let frame = FlatRecords::default().into_frame().unwrap();
        assert_eq!(frame.height(), 0);
    }
}
