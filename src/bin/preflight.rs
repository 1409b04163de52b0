use sql_sandbox_grader::infra::config::SandboxConfig;
use sql_sandbox_grader::infra::provisioner::{ConnectionProvisioner, Mode, Role};

/// `WITH (FORCE)` on DROP DATABASE needs this server major version.
const MIN_SERVER_MAJOR: u32 = 13;

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: cargo run --bin preflight\n\
         \n\
         Requires env vars (or a .env file):\n\
           SANDBOX_PG_HOST, SANDBOX_PG_USER, SANDBOX_PG_PASSWORD\n\
         Optional:\n\
           SANDBOX_PG_PORT, SANDBOX_PG_ADMIN_DB, SANDBOX_RUNNER_USER, SANDBOX_RUNNER_PASSWORD,\n\
           SANDBOX_DUMP_DIR, SANDBOX_DB_PREFIX, ...\n"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        usage_and_exit();
    }

    // Force-read config (nice error messages if missing)
    let config = SandboxConfig::from_env()?;

    println!("> Preflight:");
    println!("  SANDBOX_PG_HOST={}:{}", config.host, config.port);
    println!("  SANDBOX_PG_USER={}", config.admin.user);
    println!("  SANDBOX_DB_PREFIX={}", config.db_prefix);
    println!("  SANDBOX_DUMP_DIR={}", config.dump_dir.display());

    let provisioner = ConnectionProvisioner::new(&config);

    // Admin connectivity + server version
    let mut admin = provisioner
        .acquire(Role::Admin, None, Mode::Autocommit)
        .await
        .map_err(|e| {
            anyhow::anyhow!("Admin connection to {} failed: {}", config.admin_database, e)
        })?;
    let version: String = sqlx::query_scalar("SHOW server_version")
        .fetch_one(admin.conn())
        .await?;
    admin.release().await?;
    println!("  Server version: {}", version);
    match server_major(&version) {
        Some(major) if major >= MIN_SERVER_MAJOR => {}
        Some(major) => {
            return Err(anyhow::anyhow!(
                "Postgres {} is too old; sandbox recreation needs {} or newer",
                major,
                MIN_SERVER_MAJOR
            ))
        }
        None => {
            eprintln!("  Warning: could not parse server version; DROP ... WITH (FORCE) needs 13+.")
        }
    }

    // Runner connectivity
    if config.runner.user == config.admin.user {
        println!("  Runner role: same as admin ({}).", config.admin.user);
    } else {
        let runner = provisioner
            .acquire(Role::Runner, None, Mode::Autocommit)
            .await
            .map_err(|e| {
                anyhow::anyhow!("Runner role {} cannot connect: {}", config.runner.user, e)
            })?;
        runner.release().await?;
        println!("  Runner role {} can connect.", config.runner.user);
    }

    // Dump directory
    match tokio::fs::metadata(&config.dump_dir).await {
        Ok(meta) if meta.is_dir() => println!("  Dump directory exists."),
        _ => {
            return Err(anyhow::anyhow!(
                "Dump directory {} does not exist",
                config.dump_dir.display()
            ))
        }
    }

    // Client tools used by the dump loader
    for tool in ["psql", "pg_restore"] {
        let output = tokio::process::Command::new(tool)
            .arg("--version")
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("{} is not on PATH: {}", tool, e))?;
        println!("  {}", String::from_utf8_lossy(&output.stdout).trim());
    }

    println!("> Preflight OK.");
    Ok(())
}

/// Parses the major version out of `SHOW server_version` output such as `16.2 (Debian 16.2-1)`.
fn server_major(version: &str) -> Option<u32> {
    version
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}
