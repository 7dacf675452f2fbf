//! SQLite connection targets and bootstrap.
//!
//! # Responsibility
//! - Name the database a session connects to (file or in-memory).
//! - Open and configure SQLite connections consistently.
//!
//! # Invariants
//! - Every connection handed out has the configured pragmas applied.
//! - In-memory targets yield a fresh, empty database per connection.

use crate::config::DbSettings;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("journal mode `{requested}` was not applied, database reports `{actual}`")]
    JournalMode { requested: String, actual: String },
}

/// Where connections for a session come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    File(PathBuf),
    Memory,
}

/// A connectable database: target plus connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    target: DbTarget,
    settings: DbSettings,
}

impl Database {
    pub fn file(path: impl AsRef<Path>, settings: DbSettings) -> Self {
        Self {
            target: DbTarget::File(path.as_ref().to_path_buf()),
            settings,
        }
    }

    pub fn in_memory(settings: DbSettings) -> Self {
        Self {
            target: DbTarget::Memory,
            settings,
        }
    }

    pub fn target(&self) -> &DbTarget {
        &self.target
    }

    pub fn settings(&self) -> &DbSettings {
        &self.settings
    }

    /// Opens a new configured connection to this database.
    pub fn connect(&self) -> DbResult<Connection> {
        match &self.target {
            DbTarget::File(path) => open_db(path, &self.settings),
            DbTarget::Memory => open_db_in_memory(&self.settings),
        }
    }
}

/// Source of connections for a `Session`.
pub trait ConnectionFactory {
    fn connect(&self) -> DbResult<Connection>;

    /// Settings used for transactions started on produced connections.
    fn settings(&self) -> DbSettings {
        DbSettings::default()
    }
}

impl ConnectionFactory for Database {
    fn connect(&self) -> DbResult<Connection> {
        Database::connect(self)
    }

    fn settings(&self) -> DbSettings {
        self.settings
    }
}

impl<F> ConnectionFactory for F
where
    F: Fn() -> DbResult<Connection>,
{
    fn connect(&self) -> DbResult<Connection> {
        self()
    }
}
