//! Query verification engine.
//!
//! Each verification opens a rollback-only session on the sandbox, runs the student
//! statement together with the verb-specific check, and rolls back. A mutation made by
//! a submission therefore never outlives the check that observed it.
//!
//! Student SQL goes through the extended query protocol, which accepts exactly one
//! statement. That keeps a trailing `COMMIT` from ending the rollback-only transaction.

use crate::app::errors::ServiceError;
use crate::domain::check::{empty_check_sql, row_count_sql, select_check_sql, CheckSpec};
use crate::domain::sandbox::SandboxName;
use crate::domain::verify::{classify_failure, Failure, VerificationOutcome};
use crate::infra::config::SelectCheckMode;
use crate::infra::provisioner::{ConnectionProvisioner, Mode, Role, StatementError};
use sqlx::postgres::PgConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct QueryVerifier {
    provisioner: Arc<ConnectionProvisioner>,
    select_mode: SelectCheckMode,
}

impl QueryVerifier {
    pub fn new(provisioner: Arc<ConnectionProvisioner>, select_mode: SelectCheckMode) -> Self {
        Self {
            provisioner,
            select_mode,
        }
    }

    pub fn select_mode(&self) -> SelectCheckMode {
        self.select_mode
    }

    /// Verifies `student_sql` against `spec` inside `sandbox`.
    ///
    /// A failed check, a SQL error in the submission, a timeout or an incomparable
    /// SELECT are all reported through the outcome. Only failing to reach the sandbox
    /// at all is an error.
    #[tracing::instrument(skip(self, student_sql, spec), fields(sandbox = %sandbox))]
    pub async fn verify(
        &self,
        sandbox: &SandboxName,
        student_sql: &str,
        spec: &CheckSpec,
    ) -> Result<VerificationOutcome, ServiceError> {
        let mut session = self
            .provisioner
            .acquire(Role::Runner, Some(sandbox.physical()), Mode::Transactional)
            .await
            .map_err(ServiceError::connection)?;

        let result = self.run_check(session.conn(), student_sql, spec).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(StatementError::Sql(err)) => self.failure_outcome(&err, spec),
            Err(StatementError::Deadline(deadline)) => {
                // The session is mid-statement; dropping it closes the socket and the
                // server aborts the transaction.
                drop(session);
                tracing::warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "verification timed out on the client"
                );
                return Ok(self.timeout_outcome());
            }
        };

        if let Err(e) = session.release().await {
            tracing::warn!(error = %e, "rollback after verification failed; connection dropped");
        }
        tracing::debug!(status = ?outcome.status, "verification finished");
        Ok(outcome)
    }

    /// Runs the submission and its check. Every statement is bounded on its own.
    async fn run_check(
        &self,
        conn: &mut PgConnection,
        student_sql: &str,
        spec: &CheckSpec,
    ) -> Result<VerificationOutcome, StatementError> {
        match spec {
            CheckSpec::Select { reference } => {
                let sql = select_check_sql(student_sql, reference, self.select_mode);
                tracing::debug!(%sql, "select check");
                let passed: bool = self
                    .provisioner
                    .bounded(sqlx::query_scalar(&sql).fetch_one(&mut *conn))
                    .await?;
                Ok(verdict(passed, None))
            }
            CheckSpec::Delete { check } => {
                self.provisioner
                    .bounded(sqlx::query(student_sql).execute(&mut *conn))
                    .await?;
                let passed: bool = self
                    .provisioner
                    .bounded(sqlx::query_scalar(&empty_check_sql(check)).fetch_one(&mut *conn))
                    .await?;
                Ok(verdict(
                    passed,
                    Some("rows that should have been deleted are still present".to_string()),
                ))
            }
            CheckSpec::RowCount { expected, query } => {
                self.provisioner
                    .bounded(sqlx::query(student_sql).execute(&mut *conn))
                    .await?;
                let actual: i64 = self
                    .provisioner
                    .bounded(sqlx::query_scalar(&row_count_sql(query)).fetch_one(&mut *conn))
                    .await?;
                Ok(verdict(
                    actual == *expected,
                    Some(format!("expected {} row(s), found {}", expected, actual)),
                ))
            }
        }
    }

    fn failure_outcome(&self, err: &sqlx::Error, spec: &CheckSpec) -> VerificationOutcome {
        match classify_failure(err) {
            Failure::Timeout => self.timeout_outcome(),
            Failure::Incomparable(msg) if matches!(spec, CheckSpec::Select { .. }) => {
                VerificationOutcome::errored(ServiceError::check(msg).summary())
            }
            Failure::Incomparable(msg) | Failure::Sql(msg) => VerificationOutcome::errored(msg),
            Failure::Environment(msg) => {
                tracing::warn!(error = %msg, "connection failed during verification");
                VerificationOutcome::errored(ServiceError::execution(msg).summary())
            }
        }
    }

    fn timeout_outcome(&self) -> VerificationOutcome {
        VerificationOutcome::errored(format!(
            "statement timed out after {} ms",
            self.provisioner.statement_timeout().as_millis()
        ))
    }
}

fn verdict(passed: bool, diagnostic: Option<String>) -> VerificationOutcome {
    if passed {
        VerificationOutcome::passed()
    } else {
        VerificationOutcome::failed(diagnostic)
    }
}
