//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Apply foreign key, busy timeout and journal mode settings.
//!
//! # Invariants
//! - Returned connections have every configured pragma applied.
//! - A journal mode the database refuses is an error, not a warning.

use super::{DbError, DbResult};
use crate::config::DbSettings;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens (or creates) a SQLite database file.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>, settings: &DbSettings) -> DbResult<Connection> {
    open_with("file", settings, || Connection::open(path.as_ref()))
}

/// Opens a fresh in-memory SQLite database.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_in_memory(settings: &DbSettings) -> DbResult<Connection> {
    open_with("memory", settings, Connection::open_in_memory)
}

fn open_with(
    mode: &str,
    settings: &DbSettings,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn, settings) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &Connection, settings: &DbSettings) -> DbResult<()> {
    let foreign_keys = if settings.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))?;

    if let Some(requested) = settings.journal_mode.pragma_value() {
        let actual: String = conn.query_row(
            &format!("PRAGMA journal_mode = {requested};"),
            [],
            |row| row.get(0),
        )?;
        // In-memory databases always report "memory".
        if !actual.eq_ignore_ascii_case(requested) && actual != "memory" {
            return Err(DbError::JournalMode {
                requested: requested.to_string(),
                actual,
            });
        }
    }

    Ok(())
}
