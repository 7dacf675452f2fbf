//! Throwaway SQLite databases for integration tests.
//!
//! A [`DbFixture`] provisions a database in a temporary directory, either by
//! applying SQL feature scripts or by copying a template database, and gives
//! tests an active [`Session`](txscope_core::Session) next to a raw connection
//! for setup and verification.

mod assertions;
mod fixture;

pub use assertions::{assert_one_row_equals, assert_row_equals, Expected};
pub use fixture::{DbFixture, FixtureError, FixtureResult, FixtureSource};
