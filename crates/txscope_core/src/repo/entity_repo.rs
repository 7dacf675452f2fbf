//! Generic entity repository and its SQLite implementation.
//!
//! # Responsibility
//! - Provide typed fetch/count/delete operations for any `Entity`.
//! - Translate "no row" and "too many rows" into the item error taxonomy.
//!
//! # Invariants
//! - Single-row lookups never return an arbitrary row silently:
//!   zero rows is `UnknownItemError`, more than one is `DuplicateItemError`
//!   (`fetch_first` is the explicit exception).
//! - Single-row deletes are one guarded statement, so a concurrent delete
//!   between lookup and removal cannot remove a different row.

use crate::entity::Entity;
use crate::error::{DataResult, DuplicateItemError, UnknownItemError};
use crate::filter::{identifier, Filter, Order};
use crate::record::display_value;
use crate::transaction::Transaction;
use log::debug;
use rusqlite::params_from_iter;
use std::marker::PhantomData;
use uuid::Uuid;

/// Whether a single-row delete requires the row to exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Existence {
    /// Zero matching rows is an `UnknownItemError`.
    #[default]
    Required,
    /// Zero matching rows is accepted silently.
    Optional,
}

/// Repository interface for entity fetch and delete operations.
pub trait EntityRepository<E: Entity> {
    /// Number of rows matching `filter`.
    fn count(&self, filter: &Filter) -> DataResult<u64>;
    /// Every matching row; an empty result is not an error.
    fn fetch_all(&self, filter: &Filter, order: Option<&Order>) -> DataResult<Vec<E>>;
    /// The first matching row in `order` (arbitrary without one).
    fn fetch_first(&self, filter: &Filter, order: Option<&Order>) -> DataResult<E>;
    /// The only matching row.
    fn fetch_one(&self, filter: &Filter) -> DataResult<E>;
    /// The row whose key column equals `id`.
    fn fetch_by_id(&self, id: i64) -> DataResult<E>;
    /// The row whose `tag` column equals `tag`.
    fn fetch_by_tag(&self, tag: &str) -> DataResult<E>;
    /// The row whose `uuid` column holds `uuid` in hyphenated form.
    fn fetch_by_uuid(&self, uuid: Uuid) -> DataResult<E>;
    /// Deletes every matching row and returns how many were removed.
    fn delete_all(&self, filter: &Filter) -> DataResult<usize>;
    /// Deletes the only matching row. Returns whether a row was removed.
    fn delete_one(&self, filter: &Filter, existence: Existence) -> DataResult<bool>;
    fn delete_by_id(&self, id: i64, existence: Existence) -> DataResult<bool>;
    fn delete_by_tag(&self, tag: &str, existence: Existence) -> DataResult<bool>;
    fn delete_by_uuid(&self, uuid: Uuid, existence: Existence) -> DataResult<bool>;
}

/// SQLite-backed repository bound to one transaction.
pub struct SqliteEntityRepository<'t, E> {
    tx: &'t Transaction<'t>,
    _entity: PhantomData<fn() -> E>,
}

impl<'t, E: Entity> SqliteEntityRepository<'t, E> {
    pub fn new(tx: &'t Transaction<'t>) -> Self {
        Self {
            tx,
            _entity: PhantomData,
        }
    }

    fn select(&self, filter: &Filter, order: Option<&Order>, limit: Option<u32>) -> DataResult<Vec<E>> {
        self.tx.ensure_active()?;
        let table = identifier(E::TABLE)?;
        let (where_sql, bind_values) = filter.to_sql()?;

        let mut sql = format!("SELECT * FROM {table}{where_sql}");
        if let Some(order) = order {
            sql.push_str(&order.to_sql()?);
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.tx.conn().prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(E::from_row(row)?);
        }

        Ok(entities)
    }

    fn unknown_item(filter: &Filter) -> UnknownItemError {
        match filter.single_equality() {
            Some((column, value)) => {
                UnknownItemError::for_field(E::item_type(), column, display_value(value))
            }
            None => UnknownItemError::new(E::item_type()),
        }
    }

    fn duplicate_item(filter: &Filter) -> DuplicateItemError {
        match filter.single_equality() {
            Some((column, value)) => {
                DuplicateItemError::for_field(E::item_type(), column, display_value(value))
            }
            None => DuplicateItemError::new(E::item_type()),
        }
    }
}

impl<E: Entity> EntityRepository<E> for SqliteEntityRepository<'_, E> {
    fn count(&self, filter: &Filter) -> DataResult<u64> {
        self.tx.ensure_active()?;
        let table = identifier(E::TABLE)?;
        let (where_sql, bind_values) = filter.to_sql()?;

        let count: i64 = self.tx.conn().query_row(
            &format!("SELECT COUNT(*) FROM {table}{where_sql}"),
            params_from_iter(bind_values),
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn fetch_all(&self, filter: &Filter, order: Option<&Order>) -> DataResult<Vec<E>> {
        self.select(filter, order, None)
    }

    fn fetch_first(&self, filter: &Filter, order: Option<&Order>) -> DataResult<E> {
        self.select(filter, order, Some(1))?
            .pop()
            .ok_or_else(|| Self::unknown_item(filter).into())
    }

    fn fetch_one(&self, filter: &Filter) -> DataResult<E> {
        // Two rows are enough to tell "one" from "many".
        let mut entities = self.select(filter, None, Some(2))?;
        match entities.len() {
            0 => Err(Self::unknown_item(filter).into()),
            1 => Ok(entities.remove(0)),
            _ => Err(Self::duplicate_item(filter).into()),
        }
    }

    fn fetch_by_id(&self, id: i64) -> DataResult<E> {
        self.fetch_one(&Filter::all().eq(E::KEY, id))
    }

    fn fetch_by_tag(&self, tag: &str) -> DataResult<E> {
        self.fetch_one(&Filter::all().eq("tag", tag.to_string()))
    }

    fn fetch_by_uuid(&self, uuid: Uuid) -> DataResult<E> {
        self.fetch_one(&Filter::all().eq("uuid", uuid.to_string()))
    }

    fn delete_all(&self, filter: &Filter) -> DataResult<usize> {
        self.tx.ensure_active()?;
        let table = identifier(E::TABLE)?;
        let (where_sql, bind_values) = filter.to_sql()?;

        let deleted = self.tx.conn().execute(
            &format!("DELETE FROM {table}{where_sql};"),
            params_from_iter(bind_values),
        )?;
        debug!(
            "event=entity_delete_all module=repo status=ok item_type={} deleted={deleted}",
            E::item_type()
        );
        Ok(deleted)
    }

    fn delete_one(&self, filter: &Filter, existence: Existence) -> DataResult<bool> {
        self.tx.ensure_active()?;
        let table = identifier(E::TABLE)?;
        let key = identifier(E::KEY)?;
        let (where_sql, bind_values) = filter.to_sql()?;

        // Lookup and removal happen in one statement: the row is deleted only
        // while it is the single match. The filter appears once so numbered
        // placeholders bind as they do for fetches.
        let sql = format!(
            "WITH matched AS (SELECT {key} FROM {table}{where_sql})
             DELETE FROM {table}
             WHERE {key} IN (SELECT {key} FROM matched)
               AND (SELECT COUNT(*) FROM matched) = 1;"
        );
        let deleted = self.tx.conn().execute(&sql, params_from_iter(bind_values))?;

        if deleted == 1 {
            debug!(
                "event=entity_delete module=repo status=ok item_type={}",
                E::item_type()
            );
            return Ok(true);
        }

        match self.count(filter)? {
            0 if existence == Existence::Optional => Ok(false),
            0 => Err(Self::unknown_item(filter).into()),
            _ => Err(Self::duplicate_item(filter).into()),
        }
    }

    fn delete_by_id(&self, id: i64, existence: Existence) -> DataResult<bool> {
        self.delete_one(&Filter::all().eq(E::KEY, id), existence)
    }

    fn delete_by_tag(&self, tag: &str, existence: Existence) -> DataResult<bool> {
        self.delete_one(&Filter::all().eq("tag", tag.to_string()), existence)
    }

    fn delete_by_uuid(&self, uuid: Uuid, existence: Existence) -> DataResult<bool> {
        self.delete_one(&Filter::all().eq("uuid", uuid.to_string()), existence)
    }
}
