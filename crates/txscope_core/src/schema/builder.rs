//! Dependency-aware application of SQL feature scripts.
//!
//! # Responsibility
//! - Apply `<dir>/<feature>.sql` scripts to a database on request.
//! - Resolve `-- Require: a, b` headers before applying a script.
//!
//! # Invariants
//! - Every feature is applied at most once per builder.
//! - Requirements are applied before the feature that names them.
//! - A feature that (transitively) requires itself is rejected.

use super::split::{parse_sql_headers, split_sql};
use crate::error::{DataError, DataResult};
use crate::transaction::Transaction;
use log::{error, info};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

const REQUIRE_HEADER: &str = "require";
const SCRIPT_EXTENSION: &str = "sql";

pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("dependency loop: {0}")]
    DependencyLoop(String),
    #[error("invalid feature name `{0}`")]
    InvalidFeature(String),
    #[error("failed to read SQL script `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("SQL script for feature `{feature}` failed: {source}")]
    Execute { feature: String, source: DataError },
}

/// Something that can run one SQL statement.
pub trait SqlExecutor {
    fn execute_statement(&self, sql: &str) -> DataResult<()>;
}

impl SqlExecutor for Connection {
    fn execute_statement(&self, sql: &str) -> DataResult<()> {
        Ok(self.execute_batch(sql)?)
    }
}

impl SqlExecutor for Transaction<'_> {
    fn execute_statement(&self, sql: &str) -> DataResult<()> {
        self.execute_batch(sql)
    }
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for &T {
    fn execute_statement(&self, sql: &str) -> DataResult<()> {
        (**self).execute_statement(sql)
    }
}

/// Builds a database from a directory of SQL feature scripts.
///
/// A script may declare requirements in its header:
///
/// ```sql
/// -- Require: users, groups
///
/// CREATE TABLE memberships (...);
/// ```
pub struct DatabaseBuilder<E: SqlExecutor> {
    executor: E,
    root: PathBuf,
    applied: Vec<String>,
    parsing: Vec<String>,
}

impl<E: SqlExecutor> DatabaseBuilder<E> {
    /// Creates a builder reading `<root>/<feature>.sql`. Pass `&conn` or
    /// `&tx` to keep using the executor afterwards.
    pub fn new(executor: E, root: impl AsRef<Path>) -> Self {
        Self {
            executor,
            root: root.as_ref().to_path_buf(),
            applied: Vec::new(),
            parsing: Vec::new(),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Features applied so far, in application order.
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    pub fn is_applied(&self, feature: &str) -> bool {
        self.applied.iter().any(|applied| applied == feature)
    }

    /// Applies each feature (and its requirements) that has not been applied yet.
    pub fn require<S: AsRef<str>>(&mut self, features: &[S]) -> SchemaResult<()> {
        for feature in features {
            let feature = feature.as_ref();
            if self.is_applied(feature) {
                continue;
            }
            if self.parsing.iter().any(|parsing| parsing == feature) {
                return Err(SchemaError::DependencyLoop(feature.to_string()));
            }

            self.parsing.push(feature.to_string());
            let result = self.apply_feature(feature);
            self.parsing.pop();
            result?;

            self.applied.push(feature.to_string());
        }
        Ok(())
    }

    fn apply_feature(&mut self, feature: &str) -> SchemaResult<()> {
        if feature.is_empty() || feature.contains(['/', '\\']) {
            return Err(SchemaError::InvalidFeature(feature.to_string()));
        }

        let path = self.root.join(format!("{feature}.{SCRIPT_EXTENSION}"));
        let script = std::fs::read_to_string(&path).map_err(|source| SchemaError::Read {
            path: path.clone(),
            source,
        })?;

        let headers = parse_sql_headers(&script);
        if let Some(requires) = headers.get(REQUIRE_HEADER) {
            let requirements: Vec<&str> = requires
                .split(',')
                .map(str::trim)
                .filter(|requirement| !requirement.is_empty())
                .collect();
            self.require(requirements.as_slice())?;
        }

        let started_at = Instant::now();
        let statements = split_sql(&script);
        for statement in &statements {
            if let Err(source) = self.executor.execute_statement(statement) {
                error!(
                    "event=schema_require module=schema status=error feature={feature} error={source}"
                );
                return Err(SchemaError::Execute {
                    feature: feature.to_string(),
                    source,
                });
            }
        }

        info!(
            "event=schema_require module=schema status=ok feature={feature} statements={} duration_ms={}",
            statements.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}
