//! The Sandbox Grading Service.
//!
//! This is the single entry point the transport layer talks to. It owns no state
//! between calls: every operation opens its own connection(s) through the shared
//! provisioner and closes them before returning.
//!
//! It is responsible for:
//! 1.  Managing sandbox databases (create from dump, delete, status).
//! 2.  Grading submissions against check specs (`testing`).
//! 3.  Running ad-hoc inspection queries (`debug`).

use crate::app::errors::ServiceError;
use crate::app::inspector::Inspector;
use crate::app::lifecycle::SandboxLifecycle;
use crate::app::orchestrator::TestSuiteRunner;
use crate::app::verifier::QueryVerifier;
use crate::domain::check::{CommandType, Submission};
use crate::domain::inspect::{DebugFormat, DebugResult};
use crate::domain::sandbox::{DbStatus, SandboxName, StatusRecord};
use crate::domain::verify::TestSuiteResult;
use crate::infra::config::SandboxConfig;
use crate::infra::dump_loader::{DumpLoader, PgToolsLoader};
use crate::infra::provisioner::{ConnectionProvisioner, Mode, Role};
use std::sync::Arc;

pub struct SandboxService {
    config: Arc<SandboxConfig>,
    provisioner: Arc<ConnectionProvisioner>,
    lifecycle: SandboxLifecycle,
    inspector: Inspector,
    runner: TestSuiteRunner,
}

impl SandboxService {
    /// Creates the service with the Postgres client tools as dump loader.
    pub fn new(config: SandboxConfig) -> Self {
        let loader = Arc::new(PgToolsLoader::new(&config));
        Self::with_loader(config, loader)
    }

    /// Creates the service with a caller-supplied dump loader.
    pub fn with_loader(config: SandboxConfig, loader: Arc<dyn DumpLoader>) -> Self {
        let provisioner = Arc::new(ConnectionProvisioner::new(&config));
        let lifecycle = SandboxLifecycle::new(&config, provisioner.clone(), loader);
        let verifier = QueryVerifier::new(provisioner.clone(), config.select_check);
        let runner = TestSuiteRunner::new(verifier, config.parallel_cases);
        let inspector = Inspector::new(provisioner.clone());
        Self {
            config: Arc::new(config),
            provisioner,
            lifecycle,
            inspector,
            runner,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn sandbox(&self, name: &str) -> Result<SandboxName, ServiceError> {
        SandboxName::new(name, &self.config.db_prefix)
    }

    /// Round-trips `SELECT 1` over an admin connection.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        let mut session = self
            .provisioner
            .acquire(Role::Admin, None, Mode::Autocommit)
            .await
            .map_err(ServiceError::connection)?;
        sqlx::query("SELECT 1")
            .execute(session.conn())
            .await
            .map_err(ServiceError::connection)?;
        session.release().await.map_err(ServiceError::connection)
    }

    pub async fn status(&self, name: &str) -> Result<StatusRecord, ServiceError> {
        let sandbox = self.sandbox(name)?;
        self.lifecycle.status(&sandbox).await
    }

    pub async fn status_all(&self) -> Result<Vec<StatusRecord>, ServiceError> {
        self.lifecycle.status_all().await
    }

    /// Recreates the sandbox from `dump_file` and reports it as active.
    pub async fn create(&self, name: &str, dump_file: &str) -> Result<StatusRecord, ServiceError> {
        let sandbox = self.sandbox(name)?;
        self.lifecycle.create(&sandbox, dump_file).await?;
        Ok(StatusRecord::new(&sandbox, DbStatus::Active))
    }

    pub async fn delete(&self, name: &str) -> Result<StatusRecord, ServiceError> {
        let sandbox = self.sandbox(name)?;
        self.lifecycle.delete(&sandbox).await?;
        Ok(StatusRecord::new(&sandbox, DbStatus::NotExists))
    }

    /// Executes `code` against the sandbox and rolls back. Never fails: problems,
    /// including an invalid sandbox name, are reported in the result's `error` field.
    pub async fn debug(&self, name: &str, code: &str, format: DebugFormat) -> DebugResult {
        match self.sandbox(name) {
            Ok(sandbox) => self.inspector.debug(&sandbox, code, format).await,
            Err(e) => DebugResult::failed(name, e.summary()),
        }
    }

    /// Grades `code` (a statement of kind `command`) against every check text in `cases`.
    pub async fn testing(
        &self,
        name: &str,
        code: &str,
        command: CommandType,
        cases: Vec<String>,
    ) -> Result<TestSuiteResult, ServiceError> {
        let sandbox = self.sandbox(name)?;
        let submission = Submission::new(command, code);
        self.runner.run(&sandbox, &submission, cases).await
    }
}
