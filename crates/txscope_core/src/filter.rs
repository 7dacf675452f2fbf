//! Row predicates and ordering for repository queries.
//!
//! # Responsibility
//! - Build `WHERE` / `ORDER BY` fragments with positional bind values.
//! - Reject column names that are not plain SQL identifiers.
//!
//! # Invariants
//! - User-provided values are always bound, never interpolated.
//! - Conditions are combined with `AND`; an empty filter matches every row.

use crate::error::{DataError, DataResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Validates a table or column name before it is spliced into SQL.
pub(crate) fn identifier(name: &str) -> DataResult<&str> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(name)
    } else {
        Err(DataError::InvalidIdentifier(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl CompareOp {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    Null {
        column: String,
        negated: bool,
    },
    InList {
        column: String,
        values: Vec<Value>,
    },
    Raw {
        sql: String,
        values: Vec<Value>,
    },
}

/// Conjunction of row conditions.
///
/// ```
/// use txscope_core::Filter;
///
/// let filter = Filter::all().eq("name", "dup".to_string()).gt("id", 10);
/// assert!(!filter.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(column, CompareOp::Eq, value)
    }

    pub fn ne(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(column, CompareOp::Ne, value)
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(column, CompareOp::Lt, value)
    }

    pub fn le(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(column, CompareOp::Le, value)
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(column, CompareOp::Gt, value)
    }

    pub fn ge(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(column, CompareOp::Ge, value)
    }

    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.compare(column, CompareOp::Like, Value::Text(pattern.into()))
    }

    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition::Null {
            column: column.into(),
            negated: false,
        });
        self
    }

    pub fn is_not_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition::Null {
            column: column.into(),
            negated: true,
        });
        self
    }

    /// Matches rows whose `column` is one of `values`. An empty list matches nothing.
    pub fn in_list<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::InList {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Adds a raw SQL condition using `?` placeholders bound to `values`.
    pub fn raw(mut self, sql: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::Raw {
            sql: sql.into(),
            values,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn compare(mut self, column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Compare {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// The `(column, value)` pair when the filter is exactly one equality test.
    pub(crate) fn single_equality(&self) -> Option<(&str, &Value)> {
        match self.conditions.as_slice() {
            [Condition::Compare {
                column,
                op: CompareOp::Eq,
                value,
            }] => Some((column.as_str(), value)),
            _ => None,
        }
    }

    /// Renders ` WHERE ...` (or nothing) plus the values to bind, in order.
    pub(crate) fn to_sql(&self) -> DataResult<(String, Vec<Value>)> {
        if self.conditions.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let mut parts = Vec::with_capacity(self.conditions.len());
        let mut bind_values = Vec::new();
        for condition in &self.conditions {
            match condition {
                Condition::Compare { column, op, value } => {
                    parts.push(format!("{} {} ?", identifier(column)?, op.sql()));
                    bind_values.push(value.clone());
                }
                Condition::Null { column, negated } => {
                    let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
                    parts.push(format!("{} {test}", identifier(column)?));
                }
                Condition::InList { column, values } => {
                    if values.is_empty() {
                        parts.push("0 = 1".to_string());
                    } else {
                        let placeholders = vec!["?"; values.len()].join(", ");
                        parts.push(format!("{} IN ({placeholders})", identifier(column)?));
                        bind_values.extend(values.iter().cloned());
                    }
                }
                Condition::Raw { sql, values } => {
                    parts.push(format!("({sql})"));
                    bind_values.extend(values.iter().cloned());
                }
            }
        }

        Ok((format!(" WHERE {}", parts.join(" AND ")), bind_values))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Asc,
    Desc,
}

/// Ordering of query results, applied term by term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    terms: Vec<(String, Direction)>,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            terms: vec![(column.into(), Direction::Asc)],
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            terms: vec![(column.into(), Direction::Desc)],
        }
    }

    pub fn then_asc(mut self, column: impl Into<String>) -> Self {
        self.terms.push((column.into(), Direction::Asc));
        self
    }

    pub fn then_desc(mut self, column: impl Into<String>) -> Self {
        self.terms.push((column.into(), Direction::Desc));
        self
    }

    pub(crate) fn to_sql(&self) -> DataResult<String> {
        let mut parts = Vec::with_capacity(self.terms.len());
        for (column, direction) in &self.terms {
            let direction = match direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            parts.push(format!("{} {direction}", identifier(column)?));
        }
        Ok(format!(" ORDER BY {}", parts.join(", ")))
    }
}
