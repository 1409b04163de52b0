//! Centralized configuration (environment variables + defaults).
//!
//! The config is read once at process start and passed by value into every component;
//! nothing in the library reads the environment after that.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}' (expected {expected})")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// How a SELECT submission is compared with the reference query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectCheckMode {
    /// Every student row must appear in the reference result (`student EXCEPT reference`).
    /// Rows only the reference produces are not detected.
    #[default]
    Subset,
    /// Both set differences must be empty.
    Symmetric,
}

/// Login used for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub host: String,
    pub port: u16,
    /// Administrative login: catalog reads, CREATE/DROP DATABASE, dump loading.
    pub admin: Credentials,
    /// Login used to run submissions and inspection queries.
    pub runner: Credentials,
    /// Maintenance database the admin connection attaches to.
    pub admin_database: String,
    pub ssl: bool,
    pub db_prefix: String,
    /// Role that owns freshly created sandboxes.
    pub db_owner: String,
    pub dump_dir: PathBuf,
    pub statement_timeout: Duration,
    pub load_timeout: Duration,
    pub select_check: SelectCheckMode,
    pub parallel_cases: bool,
    pub drop_on_load_failure: bool,
    pub debug: bool,
    pub bind_addr: SocketAddr,
}

impl SandboxConfig {
    /// Builds the config from process environment (after loading `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` is a thin wrapper around this.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let admin = Credentials {
            user: required("SANDBOX_PG_USER")?,
            password: required("SANDBOX_PG_PASSWORD")?,
        };
        let runner = match get("SANDBOX_RUNNER_USER") {
            Some(user) => Credentials {
                user,
                password: get("SANDBOX_RUNNER_PASSWORD").unwrap_or_default(),
            },
            None => admin.clone(),
        };

        let select_check = match get("SANDBOX_SELECT_CHECK").as_deref() {
            None => SelectCheckMode::default(),
            Some(v) => match v.trim().to_lowercase().as_str() {
                "subset" => SelectCheckMode::Subset,
                "symmetric" => SelectCheckMode::Symmetric,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "SANDBOX_SELECT_CHECK",
                        value: v.to_string(),
                        expected: "'subset' or 'symmetric'",
                    })
                }
            },
        };

        let dump_dir = get("SANDBOX_DUMP_DIR").unwrap_or_else(|| "./backup".to_string());
        let dump_dir = PathBuf::from(shellexpand::tilde(&dump_dir).to_string());

        Ok(Self {
            host: required("SANDBOX_PG_HOST")?,
            port: parse_or("SANDBOX_PG_PORT", get("SANDBOX_PG_PORT"), 5432, "a port number")?,
            db_owner: get("SANDBOX_DB_OWNER").unwrap_or_else(|| admin.user.clone()),
            admin,
            runner,
            admin_database: get("SANDBOX_PG_ADMIN_DB").unwrap_or_else(|| "postgres".to_string()),
            ssl: parse_flag("SANDBOX_PG_SSL", get("SANDBOX_PG_SSL"))?,
            db_prefix: get("SANDBOX_DB_PREFIX").unwrap_or_else(|| "sandbox_".to_string()),
            dump_dir,
            statement_timeout: Duration::from_millis(parse_or(
                "SANDBOX_STATEMENT_TIMEOUT_MS",
                get("SANDBOX_STATEMENT_TIMEOUT_MS"),
                5_000u64,
                "milliseconds",
            )?),
            load_timeout: Duration::from_secs(parse_or(
                "SANDBOX_LOAD_TIMEOUT_SECS",
                get("SANDBOX_LOAD_TIMEOUT_SECS"),
                120u64,
                "seconds",
            )?),
            select_check,
            parallel_cases: parse_flag("SANDBOX_PARALLEL_CASES", get("SANDBOX_PARALLEL_CASES"))?,
            drop_on_load_failure: parse_flag(
                "SANDBOX_DROP_ON_LOAD_FAILURE",
                get("SANDBOX_DROP_ON_LOAD_FAILURE"),
            )?,
            debug: parse_flag("SANDBOX_DEBUG", get("SANDBOX_DEBUG"))?,
            bind_addr: parse_or(
                "BIND_ADDR",
                get("BIND_ADDR"),
                SocketAddr::from(([0, 0, 0, 0], 3000)),
                "a socket address such as 0.0.0.0:3000",
            )?,
        })
    }

    /// Default `tracing` filter directive when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "sql_sandbox_grader=debug,tower_http=debug,info"
        } else {
            "info"
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            name,
            value: v,
            expected,
        }),
    }
}

fn parse_flag(name: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(|v| v.trim().to_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name,
                value: v.clone(),
                expected: "a boolean",
            }),
        },
    }
}
