//! Connection provisioning.
//!
//! Every operation opens its own connection and gives it back before returning; nothing
//! is pooled or shared between calls. A [`Session`] owns the connection, so dropping it
//! on an early return or a cancelled future closes the socket and the server discards
//! any open transaction.

use crate::infra::config::{Credentials, SandboxConfig};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{ConnectOptions, Connection, Executor};
use std::future::Future;
use std::time::Duration;

/// Which login a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Catalog reads and CREATE/DROP DATABASE.
    Admin,
    /// Running submissions and inspection queries.
    Runner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Each statement commits on its own. Required for CREATE/DROP DATABASE, which
    /// Postgres refuses inside a transaction block.
    Autocommit,
    /// Everything runs inside one transaction that is only ever rolled back.
    Transactional,
}

/// Extra time on top of the statement timeout before the client gives up on the server.
const CLIENT_GRACE: Duration = Duration::from_secs(2);

/// Failure of a single statement awaited through [`ConnectionProvisioner::bounded`].
#[derive(Debug, thiserror::Error)]
pub enum StatementError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
    /// The server did not answer in time. The connection is in an unknown state and
    /// must be dropped, not reused.
    #[error("no answer from the server within {} ms", .0.as_millis())]
    Deadline(Duration),
}

#[derive(Debug, Clone)]
pub struct ConnectionProvisioner {
    host: String,
    port: u16,
    ssl: bool,
    admin: Credentials,
    runner: Credentials,
    admin_database: String,
    statement_timeout: Duration,
}

impl ConnectionProvisioner {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            ssl: config.ssl,
            admin: config.admin.clone(),
            runner: config.runner.clone(),
            admin_database: config.admin_database.clone(),
            statement_timeout: config.statement_timeout,
        }
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    /// Upper bound for one statement on the client side: the server-side timeout plus a
    /// grace period.
    pub fn execution_deadline(&self) -> Duration {
        self.statement_timeout + CLIENT_GRACE
    }

    /// Awaits one statement, giving up once [`Self::execution_deadline`] has passed.
    /// Each statement of a multi-step check gets its own deadline, just as the server
    /// applies `statement_timeout` per statement.
    pub async fn bounded<T, F>(&self, statement: F) -> Result<T, StatementError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        let deadline = self.execution_deadline();
        match tokio::time::timeout(deadline, statement).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StatementError::Deadline(deadline)),
        }
    }

    pub fn credentials(&self, role: Role) -> &Credentials {
        match role {
            Role::Admin => &self.admin,
            Role::Runner => &self.runner,
        }
    }

    /// Connection options for `role`, targeting `database` (the maintenance database when `None`).
    pub fn connect_options(&self, role: Role, database: Option<&str>) -> PgConnectOptions {
        let creds = self.credentials(role);
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&creds.user)
            .password(&creds.password)
            .database(database.unwrap_or(&self.admin_database))
            .ssl_mode(if self.ssl {
                PgSslMode::Require
            } else {
                PgSslMode::Prefer
            })
            .application_name("sql-sandbox-grader")
            .options([(
                "statement_timeout",
                self.statement_timeout.as_millis().to_string(),
            )])
    }

    /// Opens a session. In `Transactional` mode a transaction is already open when this returns.
    pub async fn acquire(
        &self,
        role: Role,
        database: Option<&str>,
        mode: Mode,
    ) -> Result<Session, sqlx::Error> {
        let mut conn = self.connect_options(role, database).connect().await?;
        if mode == Mode::Transactional {
            conn.execute("BEGIN").await?;
        }
        tracing::debug!(
            ?role,
            ?mode,
            database = database.unwrap_or(&self.admin_database),
            "session acquired"
        );
        Ok(Session { conn, mode })
    }
}

/// A scoped connection. Call [`Session::release`] on the normal path; dropping it
/// instead closes the socket, which also discards an open transaction.
pub struct Session {
    conn: PgConnection,
    mode: Mode,
}

impl Session {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Rolls back (in `Transactional` mode) and closes the connection.
    pub async fn release(mut self) -> Result<(), sqlx::Error> {
        if self.mode == Mode::Transactional {
            self.conn.execute("ROLLBACK").await?;
        }
        self.conn.close().await
    }
}
