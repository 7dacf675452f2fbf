//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the typed data access contract shared by every entity.
//! - Isolate SQLite query details from calling code.
//!
//! # Invariants
//! - Repository APIs return semantic item errors (`UnknownItemError`,
//!   `DuplicateItemError`) in addition to DB transport errors.
//! - Repositories only act through a borrowed, active transaction.

pub mod entity_repo;

pub use entity_repo::{EntityRepository, Existence, SqliteEntityRepository};
