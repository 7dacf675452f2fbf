//! Untyped result rows for raw SQL queries.

use crate::error::{DataError, DataResult};
use rusqlite::types::{FromSql, Value, ValueRef};
use rusqlite::{Connection, Params};

/// One result row: column names paired with dynamically typed values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    /// Columns without a matching value read as absent.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the first column named `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|name| name == column)
            .and_then(|index| self.values.get(index))
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Converts the value of `column` into `T`.
    pub fn get_as<T: FromSql>(&self, column: &str) -> DataResult<T> {
        let value = self.get(column).ok_or_else(|| DataError::InvalidData {
            item_type: "row".to_string(),
            message: format!("no column named `{column}`"),
        })?;
        T::column_result(ValueRef::from(value)).map_err(|err| DataError::InvalidData {
            item_type: "row".to_string(),
            message: format!("column `{column}`: {err}"),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Runs `sql` and collects every row as a [`Record`].
pub fn query_records<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = stmt.query(params)?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(row.get::<_, Value>(index)?);
        }
        records.push(Record::new(columns.clone(), values));
    }

    Ok(records)
}

/// Renders a value the way item error messages display it.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Text(v) => v.clone(),
        Value::Blob(v) => format!("<{} bytes>", v.len()),
    }
}
