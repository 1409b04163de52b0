//! Sandbox database lifecycle: create (from a dump), delete, status.
//!
//! All DDL runs on an admin connection in autocommit mode, because Postgres refuses
//! CREATE/DROP DATABASE inside a transaction block. Catalog lookups bind the physical
//! name as a parameter; DDL only ever splices quoted identifiers.

use crate::app::errors::ServiceError;
use crate::domain::sandbox::{quote_ident, DbStatus, SandboxName, StatusRecord};
use crate::infra::config::SandboxConfig;
use crate::infra::dump_loader::DumpLoader;
use crate::infra::provisioner::{ConnectionProvisioner, Mode, Role};
use sqlx::{Executor, Row};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub struct SandboxLifecycle {
    provisioner: Arc<ConnectionProvisioner>,
    loader: Arc<dyn DumpLoader>,
    dump_dir: PathBuf,
    prefix: String,
    owner: String,
    runner_user: Option<String>,
    drop_on_load_failure: bool,
}

impl SandboxLifecycle {
    pub fn new(
        config: &SandboxConfig,
        provisioner: Arc<ConnectionProvisioner>,
        loader: Arc<dyn DumpLoader>,
    ) -> Self {
        let runner_user =
            (config.runner.user != config.admin.user).then(|| config.runner.user.clone());
        Self {
            provisioner,
            loader,
            dump_dir: config.dump_dir.clone(),
            prefix: config.db_prefix.clone(),
            owner: config.db_owner.clone(),
            runner_user,
            drop_on_load_failure: config.drop_on_load_failure,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Reports whether the sandbox exists. "Not found" is a normal result, not an error.
    #[tracing::instrument(skip(self), fields(sandbox = %name))]
    pub async fn status(&self, name: &SandboxName) -> Result<StatusRecord, ServiceError> {
        let mut session = self
            .provisioner
            .acquire(Role::Admin, None, Mode::Autocommit)
            .await
            .map_err(ServiceError::status_check)?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(name.physical())
                .fetch_one(session.conn())
                .await
                .map_err(ServiceError::status_check)?;
        release(session).await;

        let status = if exists {
            DbStatus::Active
        } else {
            DbStatus::NotExists
        };
        Ok(StatusRecord::new(name, status))
    }

    /// Lists every prefixed database on the server. Order follows the catalog and is not stable.
    #[tracing::instrument(skip(self))]
    pub async fn status_all(&self) -> Result<Vec<StatusRecord>, ServiceError> {
        let mut session = self
            .provisioner
            .acquire(Role::Admin, None, Mode::Autocommit)
            .await
            .map_err(ServiceError::status_check)?;

        let rows = sqlx::query(
            "SELECT datname FROM pg_database \
             WHERE NOT datistemplate AND left(datname, length($1)) = $1",
        )
        .bind(&self.prefix)
        .fetch_all(session.conn())
        .await
        .map_err(ServiceError::status_check)?;
        release(session).await;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let datname: String = row.try_get("datname").map_err(ServiceError::status_check)?;
            if let Some(name) = SandboxName::from_physical(&datname, &self.prefix) {
                records.push(StatusRecord::new(&name, DbStatus::Active));
            }
        }
        Ok(records)
    }

    /// (Re)creates the sandbox and loads `dump_file` into it.
    ///
    /// The dump file is resolved before anything is dropped, so a typo never destroys an
    /// existing sandbox. If the load fails after the database was created, the empty
    /// database is left in place unless `drop_on_load_failure` is set; either way the
    /// call fails and can simply be retried.
    #[tracing::instrument(skip(self), fields(sandbox = %name))]
    pub async fn create(&self, name: &SandboxName, dump_file: &str) -> Result<(), ServiceError> {
        let dump = resolve_dump_path(&self.dump_dir, dump_file)?;
        match tokio::fs::metadata(&dump).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                return Err(ServiceError::file_not_found(format!(
                    "{} does not exist in {}",
                    dump_file,
                    self.dump_dir.display()
                )))
            }
        }

        let mut session = self
            .provisioner
            .acquire(Role::Admin, None, Mode::Autocommit)
            .await
            .map_err(ServiceError::creation)?;
        session
            .conn()
            .execute(format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", name.quoted()).as_str())
            .await
            .map_err(ServiceError::creation)?;
        session
            .conn()
            .execute(
                format!(
                    "CREATE DATABASE {} OWNER {}",
                    name.quoted(),
                    quote_ident(&self.owner)
                )
                .as_str(),
            )
            .await
            .map_err(ServiceError::creation)?;
        release(session).await;
        tracing::info!(database = name.physical(), "sandbox database created");

        if let Err(e) = self.populate(name, &dump).await {
            tracing::error!(error = %e.summary(), "loading sandbox failed");
            if self.drop_on_load_failure {
                if let Err(drop_err) = self.drop_database(name).await {
                    tracing::warn!(
                        error = %drop_err.summary(),
                        "could not drop half-created sandbox"
                    );
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn populate(&self, name: &SandboxName, dump: &Path) -> Result<(), ServiceError> {
        let report = self
            .loader
            .load(name.physical(), dump)
            .await
            .map_err(|e| ServiceError::creation(format!("{:#}", e)))?;
        tracing::info!(
            tool = report.tool,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "dump loaded"
        );
        if !report.stderr.trim().is_empty() {
            tracing::debug!(stderr = %report.stderr, "dump loader output");
        }
        if let Some(runner) = &self.runner_user {
            self.grant_runner_access(name, runner).await?;
        }
        Ok(())
    }

    /// Lets the least-privilege runner role read and modify the sandbox's tables.
    async fn grant_runner_access(
        &self,
        name: &SandboxName,
        runner: &str,
    ) -> Result<(), ServiceError> {
        let runner = quote_ident(runner);
        let mut session = self
            .provisioner
            .acquire(Role::Admin, Some(name.physical()), Mode::Autocommit)
            .await
            .map_err(ServiceError::creation)?;
        let statements = [
            format!("GRANT CONNECT ON DATABASE {} TO {}", name.quoted(), runner),
            format!("GRANT USAGE ON SCHEMA public TO {}", runner),
            format!(
                "GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO {}",
                runner
            ),
            format!("GRANT USAGE, SELECT ON ALL SEQUENCES IN SCHEMA public TO {}", runner),
        ];
        for sql in &statements {
            session
                .conn()
                .execute(sql.as_str())
                .await
                .map_err(ServiceError::creation)?;
        }
        release(session).await;
        Ok(())
    }

    /// Drops the sandbox, disconnecting any open sessions. Dropping an absent sandbox succeeds.
    #[tracing::instrument(skip(self), fields(sandbox = %name))]
    pub async fn delete(&self, name: &SandboxName) -> Result<(), ServiceError> {
        self.drop_database(name).await?;
        tracing::info!(database = name.physical(), "sandbox database dropped");
        Ok(())
    }

    async fn drop_database(&self, name: &SandboxName) -> Result<(), ServiceError> {
        let mut session = self
            .provisioner
            .acquire(Role::Admin, None, Mode::Autocommit)
            .await
            .map_err(ServiceError::deletion)?;
        session
            .conn()
            .execute(format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", name.quoted()).as_str())
            .await
            .map_err(ServiceError::deletion)?;
        release(session).await;
        Ok(())
    }
}

/// Closing can only fail once the work is done; the socket is gone either way.
async fn release(session: crate::infra::provisioner::Session) {
    if let Err(e) = session.release().await {
        tracing::warn!(error = %e, "failed to close admin session cleanly");
    }
}

/// Resolves `file` inside `dir`. Absolute paths and any `..`/root components are refused
/// so a request can only reach files under the dump directory.
pub fn resolve_dump_path(dir: &Path, file: &str) -> Result<PathBuf, ServiceError> {
    let rel = Path::new(file.trim());
    if rel.as_os_str().is_empty() {
        return Err(ServiceError::file_not_found("dump file name is empty"));
    }
    if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(ServiceError::file_not_found(format!(
            "{} is outside the dump directory",
            file
        )));
    }
    Ok(dir.join(rel))
}
