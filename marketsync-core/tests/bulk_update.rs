//! Integration tests for set-based bulk updates against an in-memory SQLite
//! store.
//!
//! Tests:
//! 1. Duplicate keys in a batch resolve to the first occurrence
//! 2. Applying the same batch twice leaves the same state
//! 3. A key-only batch is a no-op outcome
//! 4. Unknown keys fail before any mutation
//! 5. No staging relation survives success or failure
//! 6. A failing UPDATE rolls back and leaves the target untouched
//! 7. Composite keys match on every key at once

use marketsync_core::{
    Connector, SkipReason, SqliteBackend, SyncError, SyncSettings, UpdateOutcome,
};
use polars::prelude::*;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn connector(ddl: &str) -> Connector<SqliteBackend> {
    let backend = SqliteBackend::open_in_memory().unwrap();
    backend.connection().execute_batch(ddl).unwrap();
    Connector::new(backend, SyncSettings::default())
}

fn positions() -> Connector<SqliteBackend> {
    connector(
        "CREATE TABLE positions (symbol TEXT PRIMARY KEY, shares INTEGER NOT NULL, updated_at TEXT);
         INSERT INTO positions VALUES ('AAPL', 10, 't0'), ('MSFT', 3, 't0');",
    )
}

fn snapshot(c: &mut Connector<SqliteBackend>) -> DataFrame {
    c.query_frame("SELECT symbol, shares, updated_at FROM positions ORDER BY symbol")
        .unwrap()
}

fn cell<'a>(df: &'a DataFrame, column: &str, row: usize) -> AnyValue<'a> {
    df.column(column).unwrap().get(row).unwrap()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn first_occurrence_of_a_duplicate_key_wins() {
    let mut c = positions();
    let batch = df!(
        "symbol" => &["AAPL", "AAPL"],
        "shares" => &[25i64, 999],
        "updated_at" => &["t1", "t2"],
    )
    .unwrap();

    let outcome = c.bulk_update(&batch, "positions", &["symbol"], None).unwrap();

    let UpdateOutcome::Applied(report) = outcome else {
        panic!("expected an applied update, got {outcome:?}");
    };
    assert_eq!(report.staged_rows, 1);
    assert_eq!(report.duplicates_dropped, 1);
    assert_eq!(report.key_columns, vec!["symbol"]);
    assert_eq!(report.update_columns, vec!["shares", "updated_at"]);

    let table = snapshot(&mut c);
    assert_eq!(cell(&table, "symbol", 0), AnyValue::String("AAPL"));
    assert_eq!(cell(&table, "shares", 0), AnyValue::Int64(25));
    assert_eq!(cell(&table, "updated_at", 0), AnyValue::String("t1"));
    assert_eq!(cell(&table, "shares", 1), AnyValue::Int64(3));
}

#[test]
fn repeated_update_is_idempotent() {
    let mut c = positions();
    let batch = df!(
        "symbol" => &["MSFT", "AAPL"],
        "shares" => &[7i64, 11],
    )
    .unwrap();

    c.bulk_update(&batch, "positions", &["symbol"], None).unwrap();
    let once = snapshot(&mut c);
    c.bulk_update(&batch, "positions", &["symbol"], None).unwrap();
    let twice = snapshot(&mut c);

    assert!(once.equals_missing(&twice));
}

#[test]
fn unmatched_rows_are_not_inserted() {
    let mut c = positions();
    let batch = df!("symbol" => &["TSLA"], "shares" => &[1i64]).unwrap();

    let outcome = c.bulk_update(&batch, "positions", &["symbol"], None).unwrap();

    assert!(outcome.is_applied());
    assert_eq!(snapshot(&mut c).height(), 2);
}

#[test]
fn key_only_batch_is_a_no_op() {
    let mut c = positions();
    let before = snapshot(&mut c);
    let batch = df!("symbol" => &["AAPL"], "bogus" => &[1i64]).unwrap();

    let outcome = c.bulk_update(&batch, "positions", &["symbol"], None).unwrap();

    assert_eq!(outcome, UpdateOutcome::Skipped(SkipReason::NoUpdateColumns));
    assert!(before.equals_missing(&snapshot(&mut c)));
    assert!(c.staging_relations().unwrap().is_empty());
}

#[test]
fn explicit_update_list_never_touches_keys() {
    let mut c = positions();
    let batch = df!("symbol" => &["AAPL"], "shares" => &[42i64]).unwrap();

    let outcome = c
        .bulk_update(&batch, "positions", &["symbol"], Some(&["symbol", "shares"]))
        .unwrap();

    let UpdateOutcome::Applied(report) = outcome else {
        panic!("expected an applied update");
    };
    assert_eq!(report.update_columns, vec!["shares"]);
    assert_eq!(cell(&snapshot(&mut c), "shares", 0), AnyValue::Int64(42));
}

#[test]
fn unknown_key_is_a_schema_mismatch_without_mutation() {
    let mut c = positions();
    let before = snapshot(&mut c);
    let batch = df!("ticker" => &["AAPL"], "shares" => &[1i64]).unwrap();

    let err = c
        .bulk_update(&batch, "positions", &["ticker"], None)
        .unwrap_err();

    assert!(matches!(err, SyncError::SchemaMismatch { .. }), "got {err:?}");
    assert!(before.equals_missing(&snapshot(&mut c)));
    assert!(c.staging_relations().unwrap().is_empty());
}

#[test]
fn missing_target_is_a_schema_mismatch() {
    let mut c = positions();
    let batch = df!("symbol" => &["AAPL"], "shares" => &[1i64]).unwrap();

    let err = c.bulk_update(&batch, "nope", &["symbol"], None).unwrap_err();

    assert!(matches!(err, SyncError::SchemaMismatch { .. }));
}

#[test]
fn no_staging_relation_survives_success() {
    let mut c = positions();
    let batch = df!("symbol" => &["AAPL"], "shares" => &[5i64]).unwrap();

    c.bulk_update(&batch, "positions", &["symbol"], None).unwrap();

    assert!(c.staging_relations().unwrap().is_empty());
}

#[test]
fn failed_update_rolls_back_and_drops_staging() {
    let mut c = positions();
    let batch = df!(
        "symbol" => &["AAPL", "MSFT"],
        "shares" => &[Some(50i64), None],
    )
    .unwrap();

    let err = c
        .bulk_update(&batch, "positions", &["symbol"], None)
        .unwrap_err();

    assert!(matches!(err, SyncError::UpdateFailure { .. }), "got {err:?}");
    let table = snapshot(&mut c);
    assert_eq!(cell(&table, "shares", 0), AnyValue::Int64(10));
    assert_eq!(cell(&table, "shares", 1), AnyValue::Int64(3));
    assert!(c.staging_relations().unwrap().is_empty());
}

#[test]
fn composite_keys_match_jointly() {
    let mut c = connector(
        "CREATE TABLE holdings (account TEXT, symbol TEXT, shares INTEGER);
         INSERT INTO holdings VALUES ('a1', 'AAPL', 1), ('a2', 'AAPL', 2), ('a1', 'MSFT', 3);",
    );
    let batch = df!(
        "account" => &["a2"],
        "symbol" => &["AAPL"],
        "shares" => &[20i64],
    )
    .unwrap();

    c.bulk_update(&batch, "holdings", &["account", "symbol"], None)
        .unwrap();

    let table = c
        .query_frame("SELECT shares FROM holdings ORDER BY account, symbol")
        .unwrap();
    assert_eq!(cell(&table, "shares", 0), AnyValue::Int64(1));
    assert_eq!(cell(&table, "shares", 1), AnyValue::Int64(3));
    assert_eq!(cell(&table, "shares", 2), AnyValue::Int64(20));
}

#[test]
fn update_record_uses_conditions_as_keys() {
    let mut c = positions();
    let values = marketsync_core::Record::new()
        .with("shares", 77i64)
        .with("symbol", "IGNORED");
    let conditions = marketsync_core::Record::new().with("symbol", "MSFT");

    let outcome = c.update_record("positions", &values, &conditions).unwrap();

    assert!(outcome.is_applied());
    let table = snapshot(&mut c);
    assert_eq!(cell(&table, "symbol", 1), AnyValue::String("MSFT"));
    assert_eq!(cell(&table, "shares", 1), AnyValue::Int64(77));
}
