//! Error taxonomy shared by sessions, transactions and repositories.
//!
//! # Responsibility
//! - Classify "item" failures (zero rows / too many rows) separately from
//!   programmer usage errors and database transport errors.
//! - Keep item error messages stable so callers can surface them directly.
//!
//! # Invariants
//! - `UnknownItemError` means zero rows matched where one was expected.
//! - `DuplicateItemError` means more than one row matched where one was
//!   expected.
//! - Usage errors indicate misuse of the session/transaction lifecycle and
//!   are not expected to be handled by business logic.

use crate::db::DbError;
use crate::transaction::TransactionState;
use std::fmt::Display;
use thiserror::Error;

pub type DataResult<T> = Result<T, DataError>;

/// Top-level error for every data access operation.
#[derive(Debug, Error)]
pub enum DataError {
    #[error(transparent)]
    Item(#[from] DataItemError),
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("invalid persisted '{item_type}' data: {message}")]
    InvalidData { item_type: String, message: String },
    #[error("invalid SQL identifier `{0}`")]
    InvalidIdentifier(String),
}

impl DataError {
    /// Returns the item error when this is an unknown/duplicate item failure.
    pub fn as_item(&self) -> Option<&DataItemError> {
        match self {
            Self::Item(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_unknown_item(&self) -> bool {
        matches!(self, Self::Item(DataItemError::Unknown(_)))
    }

    pub fn is_duplicate_item(&self) -> bool {
        matches!(self, Self::Item(DataItemError::Duplicate(_)))
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

impl From<rusqlite::Error> for DataError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<UnknownItemError> for DataError {
    fn from(value: UnknownItemError) -> Self {
        Self::Item(DataItemError::Unknown(value))
    }
}

impl From<DuplicateItemError> for DataError {
    fn from(value: DuplicateItemError) -> Self {
        Self::Item(DataItemError::Duplicate(value))
    }
}

/// A lookup matched the wrong number of rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataItemError {
    #[error(transparent)]
    Unknown(#[from] UnknownItemError),
    #[error(transparent)]
    Duplicate(#[from] DuplicateItemError),
}

impl DataItemError {
    /// Kind of item the lookup was for, usually the table name.
    pub fn item_type(&self) -> &str {
        match self {
            Self::Unknown(err) => &err.item_type,
            Self::Duplicate(err) => &err.item_type,
        }
    }

    /// Column the lookup was keyed on, if known.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Unknown(err) => err.field.as_deref(),
            Self::Duplicate(err) => err.field.as_deref(),
        }
    }

    /// Rendered lookup value, if known.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Unknown(err) => err.value.as_deref(),
            Self::Duplicate(err) => err.value.as_deref(),
        }
    }
}

/// Zero rows matched where exactly one was expected.
///
/// The message is derived from `item_type`, `field` and `value` unless a
/// custom one is set with [`UnknownItemError::with_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UnknownItemError {
    pub item_type: String,
    pub field: Option<String>,
    pub value: Option<String>,
    message: String,
}

impl UnknownItemError {
    pub fn new(item_type: impl Into<String>) -> Self {
        let item_type = item_type.into();
        let message = format!("unknown '{item_type}' item");
        Self {
            item_type,
            field: None,
            value: None,
            message,
        }
    }

    /// Creates an error for a lookup on `field == value`.
    pub fn for_field(
        item_type: impl Into<String>,
        field: impl Into<String>,
        value: impl Display,
    ) -> Self {
        let item_type = item_type.into();
        let field = field.into();
        let value = value.to_string();
        let message = format!("unknown '{item_type}' item, no {field} with value '{value}'");
        Self {
            item_type,
            field: Some(field),
            value: Some(value),
            message,
        }
    }

    /// Replaces the generated message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// More than one row matched where exactly one was expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DuplicateItemError {
    pub item_type: String,
    pub field: Option<String>,
    pub value: Option<String>,
    message: String,
}

impl DuplicateItemError {
    pub fn new(item_type: impl Into<String>) -> Self {
        let item_type = item_type.into();
        let message = format!("duplicate '{item_type}' item");
        Self {
            item_type,
            field: None,
            value: None,
            message,
        }
    }

    pub fn for_field(
        item_type: impl Into<String>,
        field: impl Into<String>,
        value: impl Display,
    ) -> Self {
        let item_type = item_type.into();
        let field = field.into();
        let value = value.to_string();
        let message = format!("duplicate '{item_type}' item with value '{value}' for {field}");
        Self {
            item_type,
            field: Some(field),
            value: Some(value),
            message,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Misuse of the session/transaction lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("session is already active")]
    SessionAlreadyActive,
    #[error("not in a session context")]
    SessionNotActive,
    #[error("transaction is already {state}")]
    TransactionFinalized { state: TransactionState },
    #[error("'{item_type}' item has no key; add it to a transaction first")]
    UnpersistedEntity { item_type: String },
}
