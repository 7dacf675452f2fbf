//! Scoped sessions, transactions and typed repositories over SQLite.
//!
//! A `Session` owns one connection for a unit of work; a `Transaction`
//! borrowed from it runs statements and entity operations until it is
//! committed or rolled back. Lookups that must match exactly one row report
//! `UnknownItemError` / `DuplicateItemError` instead of transport errors.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod filter;
pub mod logging;
pub mod record;
pub mod repo;
pub mod schema;
pub mod session;
pub mod transaction;

pub use config::{DbSettings, JournalMode, LogSettings, Settings, TransactionMode};
pub use db::{ConnectionFactory, Database, DbError, DbTarget};
pub use entity::Entity;
pub use error::{
    DataError, DataItemError, DataResult, DuplicateItemError, UnknownItemError, UsageError,
};
pub use filter::{Filter, Order};
pub use logging::{default_log_level, init_logging, init_logging_with, logging_status};
pub use record::Record;
pub use repo::{EntityRepository, Existence, SqliteEntityRepository};
pub use schema::{DatabaseBuilder, SchemaError, SqlExecutor};
pub use session::Session;
pub use transaction::{Transaction, TransactionState};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
