//! Shared setup for the integration tests.
//!
//! The tests talk to a real Postgres server configured through the usual `SANDBOX_*`
//! variables (a `.env` file works too). When `SANDBOX_PG_HOST` is not set they print a
//! notice and return early instead of failing.

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use sql_sandbox_grader::infra::dump_loader::{DumpLoader, LoadReport};
use sql_sandbox_grader::infra::provisioner::{ConnectionProvisioner, Mode, Role};
use sql_sandbox_grader::{SandboxConfig, SandboxService};
use sqlx::Executor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const STUDENTS_DUMP: &str = "students.sql";

pub const STUDENTS_SQL: &str = "\
CREATE TABLE students (
    id integer PRIMARY KEY,
    name text NOT NULL,
    grade integer NOT NULL,
    nickname text
);
INSERT INTO students (id, name, grade, nickname) VALUES
    (1, 'Ann', 5, 'annie'),
    (2, 'Bob', 4, NULL),
    (3, 'Cid', 3, NULL),
    (4, 'Dee', 2, 'dee');
";

pub struct Fixture {
    pub service: SandboxService,
    pub config: SandboxConfig,
    /// Keeps the dump directory alive for the duration of the test.
    pub dumps: TempDir,
}

/// Reads the environment config, or returns `None` when no test database is configured.
pub fn test_config() -> Option<SandboxConfig> {
    dotenv::dotenv().ok();
    if std::env::var("SANDBOX_PG_HOST").is_err() {
        println!("SANDBOX_PG_HOST is not set; skipping Postgres integration test");
        return None;
    }
    let mut config = SandboxConfig::from_env().expect("SANDBOX_* variables must be valid");
    config.statement_timeout = Duration::from_millis(3_000);
    Some(config)
}

/// A temporary dump directory holding the `students` fixture.
pub fn dump_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(STUDENTS_DUMP), STUDENTS_SQL).expect("write dump fixture");
    dir
}

/// Service wired to a loader that replays SQL scripts over a plain connection, so the
/// tests do not depend on `psql` being installed.
pub fn fixture() -> Option<Fixture> {
    fixture_with(|_| {})
}

pub fn fixture_with(adjust: impl FnOnce(&mut SandboxConfig)) -> Option<Fixture> {
    let mut config = test_config()?;
    let dumps = dump_dir();
    config.dump_dir = dumps.path().to_path_buf();
    adjust(&mut config);
    let loader = Arc::new(ScriptLoader::new(&config));
    Some(Fixture {
        service: SandboxService::with_loader(config.clone(), loader),
        config,
        dumps,
    })
}

/// (Re)creates `name` from the students fixture.
pub async fn students_sandbox(fx: &Fixture, name: &str) {
    fx.service
        .create(name, STUDENTS_DUMP)
        .await
        .expect("create students sandbox");
}

/// Replays a plain SQL script through the simple query protocol.
pub struct ScriptLoader {
    provisioner: ConnectionProvisioner,
}

impl ScriptLoader {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            provisioner: ConnectionProvisioner::new(config),
        }
    }
}

#[async_trait]
impl DumpLoader for ScriptLoader {
    async fn load(&self, database: &str, dump: &Path) -> anyhow::Result<LoadReport> {
        let started = Instant::now();
        let script = tokio::fs::read_to_string(dump).await?;
        let mut session = self
            .provisioner
            .acquire(Role::Admin, Some(database), Mode::Autocommit)
            .await?;
        session.conn().execute(script.as_str()).await?;
        session.release().await?;
        Ok(LoadReport {
            tool: "script",
            stdout: String::new(),
            stderr: String::new(),
            elapsed: started.elapsed(),
        })
    }
}

/// Always fails, like `psql` hitting an error in the middle of a dump.
pub struct FailingLoader;

#[async_trait]
impl DumpLoader for FailingLoader {
    async fn load(&self, _database: &str, _dump: &Path) -> anyhow::Result<LoadReport> {
        Err(anyhow!("psql exited with status 3: ERROR:  relation \"missing\" does not exist"))
    }
}
