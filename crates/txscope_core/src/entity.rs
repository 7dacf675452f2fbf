//! Mapping contract between Rust types and table rows.
//!
//! # Responsibility
//! - Describe the table, key column and writable columns of a record type.
//! - Decode rows into values, rejecting invalid persisted state.
//!
//! # Invariants
//! - `KEY` names an integer rowid-alias column.
//! - `key()` is `None` until the value has been added to a transaction.
//! - `values()` never includes the key column.

use crate::error::DataResult;
use rusqlite::types::Value;
use rusqlite::Row;

/// A record type persisted in one table.
///
/// Fetch and delete helpers live on
/// [`EntityRepository`](crate::repo::EntityRepository); writes of single
/// values go through [`Transaction`](crate::Transaction).
pub trait Entity: Sized {
    /// Table the entity lives in.
    const TABLE: &'static str;
    /// Integer primary key column.
    const KEY: &'static str = "id";

    /// Name of the kind of item, used in error messages.
    fn item_type() -> &'static str {
        Self::TABLE
    }

    fn key(&self) -> Option<i64>;

    fn assign_key(&mut self, key: i64);

    /// Column/value pairs written on insert and update.
    fn values(&self) -> Vec<(&'static str, Value)>;

    /// Decodes one row selected with `SELECT * FROM <TABLE>`.
    fn from_row(row: &Row<'_>) -> DataResult<Self>;
}
