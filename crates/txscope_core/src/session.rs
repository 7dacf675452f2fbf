//! Scoped connection ownership for units of work.
//!
//! # Responsibility
//! - Open a connection on `enter` and release it on `exit`/`abort`.
//! - Hand out at most one live `Transaction` at a time.
//!
//! # Invariants
//! - Entering an active session fails; so does leaving an inactive one.
//! - A transaction left open on the connection is committed by `exit` and
//!   rolled back by `abort`, exactly once.
//! - A session dropped while active is aborted.

use crate::db::{ConnectionFactory, Database};
use crate::error::{DataResult, UsageError};
use crate::transaction::Transaction;
use log::{error, info, warn};
use rusqlite::Connection;
use std::time::Instant;

/// Owner of one connection scope.
///
/// ```no_run
/// use txscope_core::{Database, DbSettings, Session};
///
/// # fn main() -> txscope_core::DataResult<()> {
/// let mut session = Session::new(Database::file("app.db", DbSettings::default()));
/// session.scope(|session| {
///     session.transaction(|t| {
///         t.execute("CREATE TABLE IF NOT EXISTS items (id INTEGER PRIMARY KEY)", [])?;
///         Ok(())
///     })
/// })?;
/// # Ok(())
/// # }
/// ```
pub struct Session<F: ConnectionFactory = Database> {
    factory: F,
    conn: Option<Connection>,
    entered_at: Option<Instant>,
}

impl<F: ConnectionFactory> Session<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            conn: None,
            entered_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.conn.is_some()
    }

    /// Opens the session connection.
    pub fn enter(&mut self) -> DataResult<()> {
        if self.conn.is_some() {
            return Err(UsageError::SessionAlreadyActive.into());
        }

        let conn = self.factory.connect()?;
        self.conn = Some(conn);
        self.entered_at = Some(Instant::now());
        info!("event=session_enter module=session status=ok");
        Ok(())
    }

    /// Leaves the session normally, committing a still-open transaction.
    pub fn exit(&mut self) -> DataResult<()> {
        self.close(true)
    }

    /// Leaves the session after a failure, rolling back a still-open transaction.
    pub fn abort(&mut self) -> DataResult<()> {
        self.close(false)
    }

    /// The session connection.
    pub fn connection(&self) -> DataResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| UsageError::SessionNotActive.into())
    }

    /// Starts the session's transaction.
    ///
    /// The returned transaction borrows the session mutably, so a second one
    /// cannot be started until it is gone.
    pub fn begin_transaction(&mut self) -> DataResult<Transaction<'_>> {
        let mode = self.factory.settings().transaction_mode;
        let conn = self.conn.as_ref().ok_or(UsageError::SessionNotActive)?;
        Transaction::begin(conn, mode)
    }

    /// Runs `work` in a new transaction, committing on `Ok` and rolling back on `Err`.
    pub fn transaction<T>(
        &mut self,
        work: impl FnOnce(&mut Transaction<'_>) -> DataResult<T>,
    ) -> DataResult<T> {
        let mut tx = self.begin_transaction()?;
        let result = work(&mut tx);
        tx.finish(result)
    }

    /// Enters the session, runs `work`, then exits on `Ok` or aborts on `Err`.
    pub fn scope<T>(&mut self, work: impl FnOnce(&mut Self) -> DataResult<T>) -> DataResult<T> {
        self.enter()?;
        let result = work(self);
        if !self.is_active() {
            return result;
        }

        match result {
            Ok(value) => {
                self.exit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = self.abort() {
                    warn!("event=session_exit module=session status=error cause=work_failed error={abort_err}");
                }
                Err(err)
            }
        }
    }

    fn close(&mut self, commit: bool) -> DataResult<()> {
        let conn = self.conn.take().ok_or(UsageError::SessionNotActive)?;
        let duration_ms = self
            .entered_at
            .take()
            .map_or(0, |entered_at| entered_at.elapsed().as_millis());
        let outcome = if commit { "commit" } else { "rollback" };

        let mut finalize_result = Ok(());
        if !conn.is_autocommit() {
            finalize_result = conn.execute_batch(if commit { "COMMIT;" } else { "ROLLBACK;" });
            if finalize_result.is_err() && !conn.is_autocommit() {
                let _ = conn.execute_batch("ROLLBACK;");
            }
        }

        let close_result = conn.close().map_err(|(_, err)| err);
        match finalize_result.and(close_result) {
            Ok(()) => {
                info!("event=session_exit module=session status=ok outcome={outcome} duration_ms={duration_ms}");
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=session_exit module=session status=error outcome={outcome} duration_ms={duration_ms} error={err}"
                );
                Err(err.into())
            }
        }
    }
}

impl<F: ConnectionFactory> Drop for Session<F> {
    fn drop(&mut self) {
        if self.is_active() {
            warn!("event=session_drop module=session status=abort reason=not_exited");
            if let Err(err) = self.abort() {
                error!("event=session_drop module=session status=error error={err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbSettings;
    use crate::db::open_db_in_memory;
    use crate::error::DataError;

    fn memory_session() -> Session<impl ConnectionFactory> {
        Session::new(|| open_db_in_memory(&DbSettings::default()))
    }

    #[test]
    fn entering_twice_fails() {
        let mut session = memory_session();
        session.enter().unwrap();
        let err = session.enter().unwrap_err();
        assert!(matches!(err, DataError::Usage(UsageError::SessionAlreadyActive)));
        assert!(session.is_active());
        session.exit().unwrap();
    }

    #[test]
    fn inactive_session_rejects_transactions_and_exit() {
        let mut session = memory_session();
        assert!(matches!(
            session.begin_transaction().err(),
            Some(DataError::Usage(UsageError::SessionNotActive))
        ));
        assert!(session.connection().is_err());
        assert!(matches!(
            session.exit().unwrap_err(),
            DataError::Usage(UsageError::SessionNotActive)
        ));
    }

    #[test]
    fn session_can_be_reentered_after_exit() {
        let mut session = memory_session();
        session.enter().unwrap();
        session.exit().unwrap();
        assert!(!session.is_active());
        session.enter().unwrap();
        assert!(session.is_active());
    }

    #[test]
    fn transaction_runner_returns_work_value() {
        let mut session = memory_session();
        session.enter().unwrap();
        let value = session
            .transaction(|t| Ok(t.scalar::<i64, _>("SELECT 41 + 1", [])?))
            .unwrap();
        assert_eq!(value, Some(42));
        assert!(session.connection().unwrap().is_autocommit());
    }

    #[test]
    fn scope_exits_on_success_and_aborts_on_failure() {
        let mut session = memory_session();
        session.scope(|s| s.connection().map(|_| ())).unwrap();
        assert!(!session.is_active());

        let err = session
            .scope(|_| -> DataResult<()> { Err(UsageError::SessionNotActive.into()) })
            .unwrap_err();
        assert!(err.is_usage());
        assert!(!session.is_active());
    }
}
