//! Temporary database fixture.
//!
//! # Responsibility
//! - Provision a database file from SQL feature scripts or a template copy.
//! - Keep an active `Session` and a raw connection on that file for tests.
//!
//! # Invariants
//! - Every fixture owns a fresh temporary directory; nothing outlives it.
//! - The raw connection runs with foreign keys on.
//! - Dropping the fixture aborts the session before the files are removed.

use crate::assertions::{assert_row_equals, describe, row_matches, Expected};
use log::{error, info};
use rusqlite::{params_from_iter, Connection, Params, ToSql};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use txscope_core::db::{open_db, DbError};
use txscope_core::record::query_records;
use txscope_core::schema::{DatabaseBuilder, SchemaError};
use txscope_core::{DataError, DataResult, Database, DbSettings, Record, Session, Transaction};

const DATABASE_FILE_NAME: &str = "fixture.sqlite";

pub type FixtureResult<T> = Result<T, FixtureError>;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to create fixture directory: {0}")]
    TempDir(#[source] std::io::Error),
    #[error("failed to copy template database `{path}`: {source}")]
    Template {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("SQL database not built dynamically")]
    NotBuiltDynamically,
    #[error("got {actual} rows, expected 1")]
    RowCount { actual: usize },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Where a fixture database comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureSource {
    /// Build an empty database from `<path>/<feature>.sql` scripts, applying
    /// `requirements` on open.
    SqlDir {
        path: PathBuf,
        requirements: Vec<String>,
    },
    /// Copy an existing SQLite database file.
    Template(PathBuf),
}

impl FixtureSource {
    pub fn sql_dir<S: AsRef<str>>(path: impl Into<PathBuf>, requirements: &[S]) -> Self {
        Self::SqlDir {
            path: path.into(),
            requirements: requirements
                .iter()
                .map(|requirement| requirement.as_ref().to_string())
                .collect(),
        }
    }

    pub fn template(path: impl Into<PathBuf>) -> Self {
        Self::Template(path.into())
    }
}

enum RawAccess {
    Built(DatabaseBuilder<Connection>),
    Template(Connection),
}

/// A throwaway database plus the handles tests need to drive it.
///
/// ```no_run
/// use txscope_testkit::{DbFixture, FixtureSource};
///
/// let mut fixture = DbFixture::open(FixtureSource::sql_dir("tests/sql", &["items"])).unwrap();
/// fixture.insert("items", &[("id", &1), ("name", &"first")]).unwrap();
/// fixture.assert_only_row_equals("items", &[("name", &"first")]);
/// ```
pub struct DbFixture {
    session: Session,
    raw: RawAccess,
    database_path: PathBuf,
    _dir: TempDir,
}

impl DbFixture {
    pub fn open(source: FixtureSource) -> FixtureResult<Self> {
        let dir = tempfile::tempdir().map_err(FixtureError::TempDir)?;
        let database_path = dir.path().join(DATABASE_FILE_NAME);
        let settings = DbSettings::default();

        let raw = match &source {
            FixtureSource::Template(template) => {
                std::fs::copy(template, &database_path).map_err(|source| {
                    FixtureError::Template {
                        path: template.clone(),
                        source,
                    }
                })?;
                RawAccess::Template(open_db(&database_path, &settings)?)
            }
            FixtureSource::SqlDir { path, requirements } => {
                let conn = open_db(&database_path, &settings)?;
                let mut builder = DatabaseBuilder::new(conn, path);
                builder.require(requirements.as_slice())?;
                RawAccess::Built(builder)
            }
        };

        let mut session = Session::new(Database::file(&database_path, settings));
        session.enter()?;

        info!(
            "event=fixture_open module=testkit status=ok source={} path={}",
            source_kind(&source),
            database_path.display()
        );
        Ok(Self {
            session,
            raw,
            database_path,
            _dir: dir,
        })
    }

    /// Raw connection for setup and verification, outside the session.
    pub fn connection(&self) -> &Connection {
        match &self.raw {
            RawAccess::Built(builder) => builder.executor(),
            RawAccess::Template(conn) => conn,
        }
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Runs `work` in a session transaction; see [`Session::transaction`].
    pub fn transaction<T>(
        &mut self,
        work: impl FnOnce(&mut Transaction<'_>) -> DataResult<T>,
    ) -> DataResult<T> {
        self.session.transaction(work)
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// Applies further SQL features. Only for fixtures built from scripts.
    pub fn require<S: AsRef<str>>(&mut self, features: &[S]) -> FixtureResult<()> {
        match &mut self.raw {
            RawAccess::Built(builder) => Ok(builder.require(features)?),
            RawAccess::Template(_) => Err(FixtureError::NotBuiltDynamically),
        }
    }

    /// Runs one statement, discarding any rows it returns.
    pub fn execute_sql<P: Params>(&self, sql: &str, params: P) -> FixtureResult<()> {
        let mut stmt = self.connection().prepare(sql)?;
        let mut rows = stmt.query(params)?;
        while rows.next()?.is_some() {}
        Ok(())
    }

    pub fn select_sql<P: Params>(&self, sql: &str, params: P) -> FixtureResult<Vec<Record>> {
        Ok(query_records(self.connection(), sql, params)?)
    }

    /// Like [`select_sql`](Self::select_sql), but the query must yield exactly one row.
    pub fn select_sql_one_row<P: Params>(&self, sql: &str, params: P) -> FixtureResult<Record> {
        only_row(self.select_sql(sql, params)?)
    }

    pub fn select_all_rows(&self, table: &str) -> FixtureResult<Vec<Record>> {
        self.select_sql(&format!("SELECT * FROM {}", quote_identifier(table)), [])
    }

    /// The single row of `table`.
    pub fn select_only_row(&self, table: &str) -> FixtureResult<Record> {
        only_row(self.select_all_rows(table)?)
    }

    /// Inserts one row, e.g. `fixture.insert("items", &[("id", &1), ("name", &"x")])`.
    pub fn insert(&self, table: &str, values: &[(&str, &dyn ToSql)]) -> FixtureResult<()> {
        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table))
        } else {
            let columns: Vec<String> = values
                .iter()
                .map(|(column, _)| quote_identifier(column))
                .collect();
            let placeholders = vec!["?"; values.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                quote_identifier(table),
                columns.join(", ")
            )
        };
        self.connection()
            .execute(&sql, params_from_iter(values.iter().map(|(_, value)| value)))?;
        Ok(())
    }

    #[track_caller]
    pub fn assert_table_is_empty(&self, table: &str) {
        let rows = self.rows_for_assertion(table);
        assert!(
            rows.is_empty(),
            "table {table} contains {} rows, expected it to be empty",
            rows.len()
        );
    }

    #[track_caller]
    pub fn assert_row_count(&self, table: &str, expected: usize) {
        let rows = self.rows_for_assertion(table);
        assert_eq!(
            rows.len(),
            expected,
            "table {table} contains {} rows, expected {expected}",
            rows.len()
        );
    }

    /// Asserts that `table` has exactly one row and that it holds `expected`.
    #[track_caller]
    pub fn assert_only_row_equals(&self, table: &str, expected: &Expected<'_>) {
        let rows = self.rows_for_assertion(table);
        assert_eq!(
            rows.len(),
            1,
            "expected exactly one row in table '{table}', got {}",
            rows.len()
        );
        assert_row_equals(&rows[0], expected);
    }

    #[track_caller]
    pub fn assert_any_row_equals(&self, table: &str, expected: &Expected<'_>) {
        let rows = self.rows_for_assertion(table);
        assert!(
            rows.iter().any(|row| row_matches(row, expected)),
            "no row in table '{table}' matches {}",
            describe(expected)
        );
    }

    /// Asserts that every expectation matches a distinct row and no row is left over.
    #[track_caller]
    pub fn assert_rows_equal(&self, table: &str, expected_rows: &[&Expected<'_>]) {
        let mut remaining = self.rows_for_assertion(table);
        assert_eq!(
            remaining.len(),
            expected_rows.len(),
            "table {table} contains {} rows, expected {}",
            remaining.len(),
            expected_rows.len()
        );

        for expected in expected_rows {
            match remaining.iter().position(|row| row_matches(row, expected)) {
                Some(index) => {
                    remaining.remove(index);
                }
                None => panic!("no row matching {} found", describe(expected)),
            }
        }
    }

    #[track_caller]
    fn rows_for_assertion(&self, table: &str) -> Vec<Record> {
        match self.select_all_rows(table) {
            Ok(rows) => rows,
            Err(err) => panic!("failed to read table '{table}': {err}"),
        }
    }
}

impl Drop for DbFixture {
    fn drop(&mut self) {
        if self.session.is_active() {
            if let Err(err) = self.session.abort() {
                error!("event=fixture_drop module=testkit status=error error={err}");
            }
        }
    }
}

fn only_row(mut rows: Vec<Record>) -> FixtureResult<Record> {
    if rows.len() != 1 {
        return Err(FixtureError::RowCount { actual: rows.len() });
    }
    Ok(rows.remove(0))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn source_kind(source: &FixtureSource) -> &'static str {
    match source {
        FixtureSource::SqlDir { .. } => "sql_dir",
        FixtureSource::Template(_) => "template",
    }
}
