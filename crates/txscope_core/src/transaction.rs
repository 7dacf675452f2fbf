//! Exactly-once unit of work over one SQLite connection.
//!
//! # Responsibility
//! - Begin a transaction and finalize it with exactly one commit or rollback.
//! - Provide entity writes and raw parameterized SQL inside the unit of work.
//!
//! # Invariants
//! - State moves `Active -> Committed` or `Active -> RolledBack`, never back.
//! - Finalizing a finished transaction is a no-op, not an error.
//! - Data operations on a finished transaction fail with a usage error.
//! - Every write is executed immediately, so later queries in the same
//!   transaction observe it.
//! - A transaction dropped while active is rolled back.

use crate::config::TransactionMode;
use crate::entity::Entity;
use crate::error::{DataResult, UnknownItemError, UsageError};
use crate::filter::identifier;
use crate::record::{query_records, Record};
use crate::repo::{EntityRepository, SqliteEntityRepository};
use log::{debug, error, warn};
use rusqlite::types::{FromSql, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Params};
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl Display for TransactionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// A unit of work borrowed from an open connection.
///
/// Usually obtained from [`Session::begin_transaction`](crate::Session::begin_transaction)
/// or [`Session::transaction`](crate::Session::transaction).
pub struct Transaction<'conn> {
    conn: &'conn Connection,
    state: TransactionState,
    started_at: Instant,
}

impl<'conn> Transaction<'conn> {
    /// Issues `BEGIN` on `conn` with the given locking mode.
    pub fn begin(conn: &'conn Connection, mode: TransactionMode) -> DataResult<Self> {
        conn.execute_batch(mode.begin_sql())?;
        debug!("event=tx_begin module=transaction status=ok mode={mode}");
        Ok(Self {
            conn,
            state: TransactionState::Active,
            started_at: Instant::now(),
        })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Underlying connection, for rusqlite APIs not wrapped here.
    pub fn connection(&self) -> DataResult<&'conn Connection> {
        self.ensure_active()?;
        Ok(self.conn)
    }

    /// Commits if still active; no-op otherwise.
    pub fn commit(&mut self) -> DataResult<()> {
        if !self.is_active() {
            debug!(
                "event=tx_commit module=transaction status=skipped state={}",
                self.state
            );
            return Ok(());
        }

        match self.conn.execute_batch("COMMIT;") {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!(
                    "event=tx_commit module=transaction status=ok duration_ms={}",
                    self.started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=tx_commit module=transaction status=error duration_ms={} error={}",
                    self.started_at.elapsed().as_millis(),
                    err
                );
                // A failed COMMIT can leave the transaction open; close it so
                // the connection is not left mid-transaction.
                if !self.conn.is_autocommit() {
                    let _ = self.conn.execute_batch("ROLLBACK;");
                }
                self.state = TransactionState::RolledBack;
                Err(err.into())
            }
        }
    }

    /// Rolls back if still active; no-op otherwise.
    pub fn rollback(&mut self) -> DataResult<()> {
        if !self.is_active() {
            debug!(
                "event=tx_rollback module=transaction status=skipped state={}",
                self.state
            );
            return Ok(());
        }

        self.state = TransactionState::RolledBack;
        match self.conn.execute_batch("ROLLBACK;") {
            Ok(()) => {
                debug!(
                    "event=tx_rollback module=transaction status=ok duration_ms={}",
                    self.started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=tx_rollback module=transaction status=error duration_ms={} error={}",
                    self.started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Finalizes from the outcome of the work done in this transaction.
    ///
    /// `Ok` commits and `Err` rolls back; the original error wins over a
    /// rollback failure, a commit failure replaces `Ok`.
    pub fn finish<T>(mut self, result: DataResult<T>) -> DataResult<T> {
        match result {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!(
                        "event=tx_rollback module=transaction status=error cause=work_failed error={}",
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }

    /// Runs a statement with positional or named parameters.
    ///
    /// Returns the number of affected rows.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> DataResult<usize> {
        self.ensure_active()?;
        Ok(self.conn.execute(sql, params)?)
    }

    /// Runs several `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> DataResult<()> {
        self.ensure_active()?;
        Ok(self.conn.execute_batch(sql)?)
    }

    /// First column of the first result row, or `None` when there are no rows.
    pub fn scalar<T: FromSql, P: Params>(&self, sql: &str, params: P) -> DataResult<Option<T>> {
        self.ensure_active()?;
        let value = self
            .conn
            .query_row(sql, params, |row| row.get::<_, T>(0))
            .optional()?;
        Ok(value)
    }

    /// Every result row of a query.
    pub fn select<P: Params>(&self, sql: &str, params: P) -> DataResult<Vec<Record>> {
        self.ensure_active()?;
        Ok(query_records(self.conn, sql, params)?)
    }

    /// Inserts `entity` and assigns its generated key when it has none.
    pub fn add<E: Entity>(&self, entity: &mut E) -> DataResult<()> {
        self.ensure_active()?;
        let table = identifier(E::TABLE)?;

        let mut columns = Vec::new();
        let mut bind_values = Vec::new();
        if let Some(key) = entity.key() {
            columns.push(identifier(E::KEY)?);
            bind_values.push(Value::Integer(key));
        }
        for (column, value) in entity.values() {
            columns.push(identifier(column)?);
            bind_values.push(value);
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES;")
        } else {
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders});",
                columns.join(", ")
            )
        };
        self.conn.execute(&sql, params_from_iter(bind_values))?;

        let key = match entity.key() {
            Some(key) => key,
            None => {
                let key = self.conn.last_insert_rowid();
                entity.assign_key(key);
                key
            }
        };
        debug!(
            "event=entity_add module=transaction status=ok item_type={} key={key}",
            E::item_type()
        );
        Ok(())
    }

    /// Inserts every entity in order.
    pub fn add_all<E: Entity>(&self, entities: &mut [E]) -> DataResult<()> {
        for entity in entities {
            self.add(entity)?;
        }
        Ok(())
    }

    /// Writes the current column values of an already persisted entity.
    pub fn changed<E: Entity>(&self, entity: &E) -> DataResult<()> {
        self.ensure_active()?;
        let key = persisted_key(entity)?;
        let table = identifier(E::TABLE)?;
        let key_column = identifier(E::KEY)?;

        let values = entity.values();
        if values.is_empty() {
            return Ok(());
        }

        let mut assignments = Vec::with_capacity(values.len());
        let mut bind_values = Vec::with_capacity(values.len() + 1);
        for (column, value) in values {
            assignments.push(format!("{} = ?", identifier(column)?));
            bind_values.push(value);
        }
        bind_values.push(Value::Integer(key));

        let changed = self.conn.execute(
            &format!(
                "UPDATE {table} SET {} WHERE {key_column} = ?;",
                assignments.join(", ")
            ),
            params_from_iter(bind_values),
        )?;

        if changed == 0 {
            return Err(UnknownItemError::for_field(E::item_type(), E::KEY, key).into());
        }

        Ok(())
    }

    /// Deletes the row of a persisted entity in a single statement.
    pub fn delete<E: Entity>(&self, entity: &E) -> DataResult<()> {
        self.ensure_active()?;
        let key = persisted_key(entity)?;
        let table = identifier(E::TABLE)?;
        let key_column = identifier(E::KEY)?;

        let changed = self
            .conn
            .execute(&format!("DELETE FROM {table} WHERE {key_column} = ?1;"), [key])?;

        if changed == 0 {
            return Err(UnknownItemError::for_field(E::item_type(), E::KEY, key).into());
        }

        debug!(
            "event=entity_delete module=transaction status=ok item_type={} key={key}",
            E::item_type()
        );
        Ok(())
    }

    /// Reloads `entity` from its row.
    pub fn refresh<E: Entity>(&self, entity: &mut E) -> DataResult<()> {
        let key = persisted_key(entity)?;
        *entity = self.repo::<E>().fetch_by_id(key)?;
        Ok(())
    }

    /// Typed repository for `E` bound to this transaction.
    pub fn repo<E: Entity>(&self) -> SqliteEntityRepository<'_, E> {
        SqliteEntityRepository::new(self)
    }

    pub(crate) fn ensure_active(&self) -> DataResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(UsageError::TransactionFinalized { state: self.state }.into())
        }
    }

    pub(crate) fn conn(&self) -> &'conn Connection {
        self.conn
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.is_active() {
            warn!("event=tx_drop module=transaction status=rollback reason=not_finalized");
            if let Err(err) = self.rollback() {
                error!("event=tx_drop module=transaction status=error error={err}");
            }
        }
    }
}

fn persisted_key<E: Entity>(entity: &E) -> DataResult<i64> {
    entity.key().ok_or_else(|| {
        UsageError::UnpersistedEntity {
            item_type: E::item_type().to_string(),
        }
        .into()
    })
}
