//! SQL script tokenizing: statement splitting and header parsing.
//!
//! # Invariants
//! - Delimiters inside single-quoted strings never end a statement.
//! - `--` comments run to the end of the line and are dropped.
//! - A `delimiter <X>` line switches the statement delimiter and is dropped.
//! - Returned statements are trimmed and never empty.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

const COMMENT_START: &str = "--";
const STRING_DELIMITER: char = '\'';
const DEFAULT_DELIMITER: &str = ";";

static DELIMITER_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*delimiter\s+(\S+)\s*$").expect("valid delimiter line regex")
});
static HEADER_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^--+\s+((?:[a-zA-Z][a-zA-Z0-9]*)(?:-[a-zA-Z][a-zA-Z0-9]*)*):\s+(.*)$")
        .expect("valid header line regex")
});

/// Splits a SQL script into its statements.
///
/// ```
/// use txscope_core::schema::split_sql;
///
/// let statements = split_sql("SELECT * FROM foo; DELETE FROM foo;");
/// assert_eq!(statements, ["SELECT * FROM foo", "DELETE FROM foo"]);
/// ```
pub fn split_sql(script: &str) -> Vec<String> {
    let mut splitter = Splitter {
        delimiter: DEFAULT_DELIMITER.to_string(),
        current: String::new(),
        in_string: false,
        statements: Vec::new(),
    };
    for line in script.split_inclusive('\n') {
        splitter.feed_line(line);
    }
    splitter.finish()
}

/// Parses the leading `-- Key: value` header block of a SQL script.
///
/// Keys are lowercased; parsing stops at the first line that is not a header.
pub fn parse_sql_headers(script: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for line in script.lines() {
        let Some(captures) = HEADER_LINE_RE.captures(line) else {
            break;
        };
        headers.insert(
            captures[1].to_ascii_lowercase(),
            captures[2].trim().to_string(),
        );
    }
    headers
}

struct Splitter {
    delimiter: String,
    current: String,
    in_string: bool,
    statements: Vec<String>,
}

impl Splitter {
    fn feed_line(&mut self, line: &str) {
        if !self.in_string {
            if let Some(captures) = DELIMITER_LINE_RE.captures(line) {
                self.delimiter = captures[1].to_string();
                return;
            }
        }

        let mut pos = 0;
        while pos < line.len() {
            let rest = &line[pos..];
            if !self.in_string && rest.starts_with(COMMENT_START) {
                // Keep tokens on either side of the comment apart.
                self.current.push('\n');
                break;
            }
            if !self.in_string && rest.starts_with(self.delimiter.as_str()) {
                self.end_statement();
                pos += self.delimiter.len();
                continue;
            }

            let Some(ch) = rest.chars().next() else {
                break;
            };
            if ch == STRING_DELIMITER {
                self.in_string = !self.in_string;
            }
            self.current.push(ch);
            pos += ch.len_utf8();
        }
    }

    fn end_statement(&mut self) {
        let statement = self.current.trim();
        if !statement.is_empty() {
            self.statements.push(statement.to_string());
        }
        self.current.clear();
    }

    fn finish(mut self) -> Vec<String> {
        self.end_statement();
        self.statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons_and_skips_empty_statements() {
        let statements = split_sql("SELECT 1;;\n  ; SELECT 2;\n");
        assert_eq!(statements, ["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn keeps_trailing_statement_without_delimiter() {
        assert_eq!(split_sql("SELECT 1; SELECT 2"), ["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn ignores_delimiters_inside_strings() {
        let statements = split_sql("INSERT INTO t VALUES ('a;b');\nINSERT INTO t VALUES ('it''s');");
        assert_eq!(
            statements,
            [
                "INSERT INTO t VALUES ('a;b')",
                "INSERT INTO t VALUES ('it''s')"
            ]
        );
    }

    #[test]
    fn strips_line_comments() {
        let statements = split_sql("-- header\nCREATE TABLE t (id INTEGER); -- trailing\nSELECT * -- inline\nFROM t;");
        assert_eq!(statements, ["CREATE TABLE t (id INTEGER)", "SELECT * \nFROM t"]);
    }

    #[test]
    fn comment_markers_inside_strings_are_kept() {
        let statements = split_sql("SELECT '--not a comment';");
        assert_eq!(statements, ["SELECT '--not a comment'"]);
    }

    #[test]
    fn delimiter_lines_switch_the_delimiter() {
        let script = "DELIMITER //\nCREATE TRIGGER t1 AFTER INSERT ON a BEGIN\n  DELETE FROM b;\nEND//\ndelimiter ;\nSELECT 1;";
        let statements = split_sql(script);
        assert_eq!(
            statements,
            [
                "CREATE TRIGGER t1 AFTER INSERT ON a BEGIN\n  DELETE FROM b;\nEND",
                "SELECT 1"
            ]
        );
    }

    #[test]
    fn headers_are_parsed_until_first_non_header_line() {
        let script = "-- Require: items, users\n--- Owner-Team: storage\n\n-- Late: ignored\nSELECT 1;";
        let headers = parse_sql_headers(script);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["require"], "items, users");
        assert_eq!(headers["owner-team"], "storage");
    }

    #[test]
    fn script_without_headers_has_none() {
        assert!(parse_sql_headers("CREATE TABLE t (id INTEGER);").is_empty());
    }
}
