//! Runtime settings for connections, transactions and logging.
//!
//! # Responsibility
//! - Describe how every connection opened by a `Database` is configured.
//! - Load settings from JSON files with per-field defaults.
//!
//! # Invariants
//! - Missing fields fall back to `Default` values, never to zero.
//! - Settings are plain data; applying them is the job of `db::open`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db: DbSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Parses settings from a JSON document.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON settings file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

/// Per-connection SQLite tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Whether `PRAGMA foreign_keys` is switched on.
    pub foreign_keys: bool,
    pub journal_mode: JournalMode,
    /// Locking behavior of `BEGIN` for new transactions.
    pub transaction_mode: TransactionMode,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            foreign_keys: true,
            journal_mode: JournalMode::Default,
            transaction_mode: TransactionMode::Deferred,
        }
    }
}

/// SQLite journal mode requested on open.
///
/// `Default` leaves whatever mode the database file already uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    Default,
    Delete,
    Wal,
    Memory,
}

impl JournalMode {
    pub(crate) fn pragma_value(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::Delete => Some("delete"),
            Self::Wal => Some("wal"),
            Self::Memory => Some("memory"),
        }
    }
}

/// How a transaction acquires its locks when it begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    Deferred,
    Immediate,
    Exclusive,
}

impl TransactionMode {
    pub(crate) fn begin_sql(self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED;",
            Self::Immediate => "BEGIN IMMEDIATE;",
            Self::Exclusive => "BEGIN EXCLUSIVE;",
        }
    }
}

impl Display for TransactionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Deferred => "deferred",
            Self::Immediate => "immediate",
            Self::Exclusive => "exclusive",
        };
        f.write_str(name)
    }
}

/// Logging bootstrap settings consumed by `logging::init_logging_with`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    /// Absolute directory for rolling log files. `None` disables file logging.
    pub dir: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
        }
    }
}
