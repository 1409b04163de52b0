// src/bin/api_server.rs

use sql_sandbox_grader::transport;
use sql_sandbox_grader::{SandboxConfig, SandboxService};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SandboxConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        host = %config.host,
        port = config.port,
        prefix = %config.db_prefix,
        dump_dir = %config.dump_dir.display(),
        statement_timeout_ms = config.statement_timeout.as_millis() as u64,
        select_check = ?config.select_check,
        parallel_cases = config.parallel_cases,
        "configuration loaded"
    );

    // --- Service Initialization ---
    let bind_addr = config.bind_addr;
    let service = Arc::new(SandboxService::new(config));
    match service.ping().await {
        Ok(()) => tracing::info!("Postgres reachable"),
        // Not fatal: /health reports it and every request retries the connection.
        Err(e) => tracing::warn!(error = %e.summary(), "Postgres not reachable at startup"),
    }
    let app_state = transport::http::AppState { service };

    // --- API Server Initialization ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = transport::http::create_router(app_state)
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "API server listening");
    tracing::info!("Swagger UI available at http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("shutdown signal received, draining in-flight requests"),
                Err(e) => {
                    tracing::warn!(error = %e, "cannot listen for Ctrl+C; running until killed");
                    std::future::pending::<()>().await
                }
            }
        })
        .await?;

    tracing::info!("graceful shutdown complete");
    Ok(())
}
