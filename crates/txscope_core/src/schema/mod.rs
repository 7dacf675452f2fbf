//! SQL script tooling: statement splitting and feature-based schema builds.
//!
//! # Responsibility
//! - Turn SQL script files into executable statements.
//! - Apply named feature scripts with their declared requirements.
//!
//! # See also
//! - `txscope_testkit::DbFixture`, which builds test databases with it.

mod builder;
mod split;

pub use builder::{DatabaseBuilder, SchemaError, SchemaResult, SqlExecutor};
pub use split::{parse_sql_headers, split_sql};
