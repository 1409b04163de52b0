//! Inspection executor ("debug"): ad-hoc SQL against a sandbox, always rolled back.

use crate::app::errors::ServiceError;
use crate::domain::check::normalize_sql;
use crate::domain::inspect::{Cell, DebugFormat, DebugResult, Execution};
use crate::domain::sandbox::SandboxName;
use crate::domain::verify::{classify_failure, Failure};
use crate::infra::provisioner::{ConnectionProvisioner, Mode, Role, StatementError};
use sqlx::postgres::{PgConnection, PgRow, PgValueFormat};
use sqlx::{Column, Executor, Row, Statement, TypeInfo, ValueRef};
use std::sync::Arc;

#[derive(Clone)]
pub struct Inspector {
    provisioner: Arc<ConnectionProvisioner>,
}

impl Inspector {
    pub fn new(provisioner: Arc<ConnectionProvisioner>) -> Self {
        Self { provisioner }
    }

    /// Runs one statement and reports what it produced. Failures land in `error`.
    #[tracing::instrument(skip(self, code), fields(sandbox = %sandbox))]
    pub async fn debug(
        &self,
        sandbox: &SandboxName,
        code: &str,
        format: DebugFormat,
    ) -> DebugResult {
        match self.execute(sandbox, &normalize_sql(code)).await {
            Ok(execution) => execution.into_result(sandbox.logical(), format),
            Err(e) => {
                tracing::debug!(error = %e.summary(), "debug query failed");
                DebugResult::failed(sandbox.logical(), e.summary())
            }
        }
    }

    async fn execute(&self, sandbox: &SandboxName, code: &str) -> Result<Execution, ServiceError> {
        let mut session = self
            .provisioner
            .acquire(Role::Runner, Some(sandbox.physical()), Mode::Transactional)
            .await
            .map_err(ServiceError::connection)?;

        let timeout_ms = self.provisioner.statement_timeout().as_millis();
        let result = self.run_statement(session.conn(), code).await;
        let execution = match result {
            Ok(execution) => Ok(execution),
            Err(StatementError::Sql(err)) => Err(execution_error(&err, timeout_ms)),
            Err(StatementError::Deadline(_)) => {
                drop(session);
                return Err(ServiceError::execution(format!(
                    "statement timed out after {} ms",
                    timeout_ms
                )));
            }
        };

        // ROLLBACK is accepted even when the statement left the transaction aborted.
        if let Err(e) = session.release().await {
            tracing::warn!(error = %e, "rollback after debug query failed; connection dropped");
        }
        execution
    }

    async fn run_statement(
        &self,
        conn: &mut PgConnection,
        code: &str,
    ) -> Result<Execution, StatementError> {
        let statement = self.provisioner.bounded((&mut *conn).prepare(code)).await?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        if columns.is_empty() {
            let done = self
                .provisioner
                .bounded(statement.query().execute(&mut *conn))
                .await?;
            return Ok(Execution::Command {
                rows_affected: done.rows_affected(),
            });
        }

        let rows = self
            .provisioner
            .bounded(statement.query().fetch_all(&mut *conn))
            .await?;
        let mut rendered = Vec::with_capacity(rows.len());
        for row in &rows {
            rendered.push(render_row(row)?);
        }
        Ok(Execution::Rows {
            columns,
            rows: rendered,
        })
    }
}

fn execution_error(err: &sqlx::Error, timeout_ms: u128) -> ServiceError {
    match classify_failure(err) {
        Failure::Timeout => {
            ServiceError::execution(format!("statement timed out after {} ms", timeout_ms))
        }
        Failure::Incomparable(msg) | Failure::Sql(msg) | Failure::Environment(msg) => {
            ServiceError::execution(msg)
        }
    }
}

fn render_row(row: &PgRow) -> Result<Vec<Cell>, sqlx::Error> {
    (0..row.len()).map(|i| render_cell(row, i)).collect()
}

/// Renders one value the way `psql` would print it. Types without a decoder here are
/// shown as `<type>` rather than failing the whole query.
fn render_cell(row: &PgRow, idx: usize) -> Result<Cell, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(None);
    }
    let type_name = raw.type_info().name().to_string();

    use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    let text = match type_name.as_str() {
        "BOOL" => {
            if row.try_get::<bool, _>(idx)? {
                "t".to_string()
            } else {
                "f".to_string()
            }
        }
        "INT2" => row.try_get::<i16, _>(idx)?.to_string(),
        "INT4" => row.try_get::<i32, _>(idx)?.to_string(),
        "INT8" => row.try_get::<i64, _>(idx)?.to_string(),
        "OID" => row.try_get::<sqlx::postgres::types::Oid, _>(idx)?.0.to_string(),
        "FLOAT4" => row.try_get::<f32, _>(idx)?.to_string(),
        "FLOAT8" => row.try_get::<f64, _>(idx)?.to_string(),
        "NUMERIC" => numeric_text(row, idx)?,
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => {
            row.try_get_unchecked::<String, _>(idx)?
        }
        "DATE" => row.try_get::<NaiveDate, _>(idx)?.to_string(),
        "TIME" => row.try_get::<NaiveTime, _>(idx)?.to_string(),
        "TIMESTAMP" => row.try_get::<NaiveDateTime, _>(idx)?.to_string(),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(idx)?
            .format("%Y-%m-%d %H:%M:%S%.f%:z")
            .to_string(),
        "JSON" | "JSONB" => row.try_get::<serde_json::Value, _>(idx)?.to_string(),
        "UUID" => row.try_get::<sqlx::types::Uuid, _>(idx)?.to_string(),
        "BYTEA" => format!("\\x{}", hex::encode(row.try_get::<Vec<u8>, _>(idx)?)),
        "INT4[]" => array_literal(row.try_get::<Vec<Option<i32>>, _>(idx)?),
        "INT8[]" => array_literal(row.try_get::<Vec<Option<i64>>, _>(idx)?),
        "TEXT[]" | "VARCHAR[]" => array_literal(row.try_get::<Vec<Option<String>>, _>(idx)?),
        other => format!("<{}>", other.to_lowercase()),
    };
    Ok(Some(text))
}

/// NUMERIC keeps the column's display scale (`12.50`, not `12.5000`). The decoded
/// `BigDecimal` only knows the base-10000 digits, so the scale is read from the header.
fn numeric_text(row: &PgRow, idx: usize) -> Result<String, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.format() == PgValueFormat::Text {
        return raw.as_str().map(str::to_string).map_err(sqlx::Error::Decode);
    }
    let bytes = raw.as_bytes().map_err(sqlx::Error::Decode)?;
    match numeric_header(bytes) {
        Some(NumericHeader::Special(text)) => Ok(text.to_string()),
        Some(NumericHeader::Finite { scale }) => Ok(row
            .try_get::<sqlx::types::BigDecimal, _>(idx)?
            .with_scale(i64::from(scale))
            .to_string()),
        None => Ok(row.try_get::<sqlx::types::BigDecimal, _>(idx)?.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericHeader {
    Finite { scale: u16 },
    Special(&'static str),
}

/// Binary NUMERIC starts with `ndigits`, `weight`, `sign` and `dscale`, two bytes each.
fn numeric_header(bytes: &[u8]) -> Option<NumericHeader> {
    let word = |at: usize| Some(u16::from_be_bytes([*bytes.get(at)?, *bytes.get(at + 1)?]));
    let sign = word(4)?;
    let scale = word(6)?;
    Some(match sign {
        0xC000 => NumericHeader::Special("NaN"),
        0xD000 => NumericHeader::Special("Infinity"),
        0xF000 => NumericHeader::Special("-Infinity"),
        _ => NumericHeader::Finite { scale },
    })
}

fn array_literal<T: ToString>(items: Vec<Option<T>>) -> String {
    let inner = items
        .into_iter()
        .map(|v| v.map(|v| v.to_string()).unwrap_or_else(|| "NULL".to_string()))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", inner)
}
