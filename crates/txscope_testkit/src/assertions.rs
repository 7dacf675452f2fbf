//! Row-level assertions for fixture queries.
//!
//! Expectations are `(column, value)` pairs; columns of the row that are not
//! listed are ignored.

use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::ToSql;
use txscope_core::Record;

/// Expected column values, e.g. `&[("id", &1), ("name", &"first")]`.
pub type Expected<'a> = [(&'a str, &'a dyn ToSql)];

/// Panics unless `row` holds every expected value.
#[track_caller]
pub fn assert_row_equals(row: &Record, expected: &Expected<'_>) {
    if let Err(mismatch) = check_row(row, expected) {
        panic!("{mismatch}");
    }
}

/// Panics unless at least one of `rows` holds every expected value.
#[track_caller]
pub fn assert_one_row_equals(rows: &[Record], expected: &Expected<'_>) {
    if !rows.iter().any(|row| row_matches(row, expected)) {
        panic!(
            "no row is matching the expectation {}",
            describe(expected)
        );
    }
}

pub(crate) fn row_matches(row: &Record, expected: &Expected<'_>) -> bool {
    check_row(row, expected).is_ok()
}

pub(crate) fn describe(expected: &Expected<'_>) -> String {
    let pairs: Vec<String> = expected
        .iter()
        .map(|(column, value)| format!("{column}={:?}", expected_value(column, *value)))
        .collect();
    format!("{{{}}}", pairs.join(", "))
}

fn check_row(row: &Record, expected: &Expected<'_>) -> Result<(), String> {
    for (column, value) in expected {
        let expected = expected_value(column, *value);
        let Some(actual) = row.get(column) else {
            return Err(format!("column '{column}' is not in the row"));
        };
        if *actual != expected {
            return Err(format!("column '{column}': {expected:?} != {actual:?}"));
        }
    }
    Ok(())
}

// Expectations are written by the test author, so an unconvertible value
// is a broken test rather than a mismatch.
#[track_caller]
fn expected_value(column: &str, value: &dyn ToSql) -> Value {
    match value.to_sql() {
        Ok(ToSqlOutput::Borrowed(value)) => value.into(),
        Ok(ToSqlOutput::Owned(value)) => value,
        Ok(_) => panic!("column '{column}': expected value has no plain SQL representation"),
        Err(err) => panic!("column '{column}': expected value cannot be converted: {err}"),
    }
}
