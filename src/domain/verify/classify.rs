//! Classification of execution failures into test-case diagnostics.

/// SQLSTATE `query_canceled`, raised when `statement_timeout` expires.
pub const QUERY_CANCELED: &str = "57014";
/// SQLSTATE `syntax_error`; Postgres reports EXCEPT column-count mismatches with it.
pub const SYNTAX_ERROR: &str = "42601";
/// SQLSTATE `datatype_mismatch`; EXCEPT column-type mismatches.
pub const DATATYPE_MISMATCH: &str = "42804";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The statement ran past the statement timeout.
    Timeout,
    /// Student and reference results have different shapes and cannot be set-compared.
    Incomparable(String),
    /// Any other error reported by the server for the submitted SQL.
    Sql(String),
    /// The connection itself failed (I/O, protocol, TLS).
    Environment(String),
}

/// Classifies a server error from its SQLSTATE and message.
pub fn classify_database_error(code: Option<&str>, message: &str) -> Failure {
    match code {
        Some(QUERY_CANCELED) if message.contains("statement timeout") => Failure::Timeout,
        Some(SYNTAX_ERROR) | Some(DATATYPE_MISMATCH) if message.contains("EXCEPT") => {
            Failure::Incomparable(message.to_string())
        }
        _ => Failure::Sql(message.to_string()),
    }
}

pub fn classify_failure(err: &sqlx::Error) -> Failure {
    match err {
        sqlx::Error::Database(db) => classify_database_error(db.code().as_deref(), db.message()),
        sqlx::Error::RowNotFound => Failure::Sql("check query returned no rows".to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
            Failure::Sql(err.to_string())
        }
        other => Failure::Environment(other.to_string()),
    }
}
