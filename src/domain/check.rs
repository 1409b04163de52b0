//! Submissions and check specifications.
//!
//! A check spec is the verb-specific reference data a submission is judged against.
//! This module only parses and composes SQL; nothing here talks to a database.

use crate::app::errors::ServiceError;
use crate::infra::config::SelectCheckMode;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Select,
    Insert,
    Update,
    Delete,
}

impl FromStr for CommandType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "select" => Ok(Self::Select),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(ServiceError::invalid_check_command(format!(
                "unknown command type '{}' (expected select, insert, update or delete)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// The student's side of a grading request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub command: CommandType,
    pub code: String,
}

impl Submission {
    pub fn new(command: CommandType, code: &str) -> Self {
        Self {
            command,
            code: normalize_sql(code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckSpec {
    /// The student result must match the result of `reference`.
    Select { reference: String },
    /// After the student statement runs, `check` must return no rows.
    Delete { check: String },
    /// After the student statement runs, `query` must return exactly `expected` rows.
    RowCount { expected: i64, query: String },
}

impl CheckSpec {
    /// Parses the raw check text attached to a test case.
    ///
    /// UPDATE and INSERT checks are two-part: the first line is the expected row count,
    /// the rest is the query whose rows are counted.
    pub fn parse(command: CommandType, text: &str) -> Result<Self, ServiceError> {
        let text = text.replace('\r', "");
        match command {
            CommandType::Select => Ok(Self::Select {
                reference: non_empty(&text, "reference query")?,
            }),
            CommandType::Delete => Ok(Self::Delete {
                check: non_empty(&text, "check query")?,
            }),
            CommandType::Update | CommandType::Insert => {
                let trimmed = text.trim_start();
                let (first, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
                let expected = first.trim().parse::<i64>().map_err(|_| {
                    ServiceError::invalid_check_command(format!(
                        "first line must be the expected row count, got '{}'",
                        first.trim()
                    ))
                })?;
                if expected < 0 {
                    return Err(ServiceError::invalid_check_command(format!(
                        "expected row count must not be negative, got {}",
                        expected
                    )));
                }
                Ok(Self::RowCount {
                    expected,
                    query: non_empty(rest, "row count query")?,
                })
            }
        }
    }
}

fn non_empty(text: &str, what: &str) -> Result<String, ServiceError> {
    let sql = normalize_sql(text);
    if sql.is_empty() {
        return Err(ServiceError::invalid_check_command(format!("{} is empty", what)));
    }
    Ok(sql)
}

/// Strips editor artefacts so a statement can be embedded in a larger query:
/// carriage returns, surrounding whitespace, trailing semicolons and a trailing
/// `--` comment (which may hide a semicolon in front of it).
pub fn normalize_sql(sql: &str) -> String {
    let sql = sql.replace('\r', "");
    let mut s = sql.trim();
    loop {
        if let Some(stripped) = s.strip_suffix(';') {
            s = stripped.trim_end();
        } else if let Some(start) = trailing_line_comment(s) {
            s = s[..start].trim_end();
        } else {
            break;
        }
    }
    s.to_string()
}

/// Byte offset of a `--` comment running to the end of `sql`. Quoted literals,
/// quoted identifiers and block comments are skipped.
fn trailing_line_comment(sql: &str) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let start = i;
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Some(start);
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    None
}

/// `SELECT` yielding TRUE when the student result passes against the reference.
///
/// In `Subset` mode only `student EXCEPT reference` is checked: reference rows the
/// student misses go unnoticed. Embedded queries end with a newline so that a comment
/// left in them cannot swallow the closing parenthesis.
pub fn select_check_sql(student: &str, reference: &str, mode: SelectCheckMode) -> String {
    match mode {
        SelectCheckMode::Subset => format!(
            "SELECT NOT EXISTS (({student}\n) EXCEPT ({reference}\n)) AS passed",
            student = student,
            reference = reference
        ),
        SelectCheckMode::Symmetric => format!(
            "SELECT NOT EXISTS (({student}\n) EXCEPT ({reference}\n)) \
             AND NOT EXISTS (({reference}\n) EXCEPT ({student}\n)) AS passed",
            student = student,
            reference = reference
        ),
    }
}

/// `SELECT` yielding TRUE when `check` returns no rows.
pub fn empty_check_sql(check: &str) -> String {
    format!("SELECT NOT EXISTS ({}\n) AS passed", check)
}

pub fn row_count_sql(query: &str) -> String {
    format!("SELECT COUNT(*) FROM ({}\n) AS check_result", query)
}
