//! Loading dump files into a freshly created sandbox.
//!
//! Plain SQL dumps are streamed into `psql`, custom-format archives go through
//! `pg_restore`. Both run as scoped child processes with captured output, a hard
//! timeout (the child is killed on expiry) and exit-code reporting.

use crate::infra::config::SandboxConfig;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    /// SQL script, replayed with `psql`.
    Plain,
    /// `pg_dump -Fc` archive, replayed with `pg_restore`.
    Custom,
}

impl DumpFormat {
    pub fn detect(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("dump") | Some("backup") | Some("custom") => DumpFormat::Custom,
            _ => DumpFormat::Plain,
        }
    }

    pub fn tool(&self) -> &'static str {
        match self {
            DumpFormat::Plain => "psql",
            DumpFormat::Custom => "pg_restore",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub tool: &'static str,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

#[async_trait]
pub trait DumpLoader: Send + Sync {
    /// Replays `dump` into the (already existing, empty) database `database`.
    async fn load(&self, database: &str, dump: &Path) -> anyhow::Result<LoadReport>;
}

/// Loads dumps with the Postgres client tools found on `PATH`.
#[derive(Debug, Clone)]
pub struct PgToolsLoader {
    host: String,
    port: u16,
    user: String,
    password: String,
    ssl: bool,
    timeout: Duration,
}

impl PgToolsLoader {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user: config.admin.user.clone(),
            password: config.admin.password.clone(),
            ssl: config.ssl,
            timeout: config.load_timeout,
        }
    }

    /// Builds the child process. Nothing is spawned here.
    pub fn command(&self, format: DumpFormat, database: &str, dump: &Path) -> Command {
        let mut cmd = Command::new(format.tool());
        cmd.arg("--host")
            .arg(&self.host)
            .arg("--port")
            .arg(self.port.to_string())
            .arg("--username")
            .arg(&self.user)
            .arg("--no-password")
            .arg("--dbname")
            .arg(database)
            .arg("--single-transaction");
        match format {
            DumpFormat::Plain => {
                cmd.args(["--no-psqlrc", "--quiet", "--set", "ON_ERROR_STOP=1"]);
            }
            DumpFormat::Custom => {
                cmd.args(["--no-owner", "--no-privileges", "--exit-on-error"])
                    .arg(dump);
            }
        }
        cmd.env("PGPASSWORD", &self.password)
            .env("PGSSLMODE", if self.ssl { "require" } else { "prefer" })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl DumpLoader for PgToolsLoader {
    async fn load(&self, database: &str, dump: &Path) -> anyhow::Result<LoadReport> {
        let format = DumpFormat::detect(dump);
        let mut cmd = self.command(format, database, dump);
        match format {
            DumpFormat::Plain => {
                let file = tokio::fs::File::open(dump)
                    .await
                    .with_context(|| format!("failed to open dump file {}", dump.display()))?
                    .into_std()
                    .await;
                cmd.stdin(Stdio::from(file));
            }
            DumpFormat::Custom => {
                cmd.stdin(Stdio::null());
            }
        }

        let started = Instant::now();
        let child = cmd
            .spawn()
            .with_context(|| format!("failed to start {}", format.tool()))?;

        // On timeout the future owning the child is dropped, and kill_on_drop reaps it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                anyhow!(
                    "{} did not finish within {}s and was killed",
                    format.tool(),
                    self.timeout.as_secs()
                )
            })?
            .with_context(|| format!("failed to wait for {}", format.tool()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            tracing::debug!(tool = format.tool(), database, "dump loaded");
            Ok(LoadReport {
                tool: format.tool(),
                stdout,
                stderr,
                elapsed: started.elapsed(),
            })
        } else {
            Err(anyhow!(
                "{} failed (exit {}): {}",
                format.tool(),
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr_tail(&stderr)
            ))
        }
    }
}

/// Last few non-empty lines of a tool's stderr; the first error is usually near the end.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return "no error output".to_string();
    }
    lines[lines.len().saturating_sub(5)..].join("\n")
}
