use crate::domain::sandbox::StatusRecord;
use crate::transport::http::handlers::common::{service_error, ApiError};
use crate::transport::http::types::AppState;
use axum::extract::{Path, State};
use axum::Json;

#[utoipa::path(
    get,
    path = "/status/",
    responses(
        (status = 200, description = "Every sandbox on the server", body = Vec<StatusRecord>),
        (status = 500, description = "Catalog could not be read", body = ErrorResponse)
    )
)]
pub async fn status_all_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<StatusRecord>>, ApiError> {
    state.service.status_all().await.map(Json).map_err(service_error)
}

#[utoipa::path(
    get,
    path = "/status/{name}/",
    params(
        ("name" = String, Path, description = "Logical sandbox name")
    ),
    responses(
        (status = 200, description = "Sandbox status (`active` or `not exists`)",
            body = StatusRecord),
        (status = 400, description = "Invalid sandbox name", body = ErrorResponse),
        (status = 500, description = "Catalog could not be read", body = ErrorResponse)
    )
)]
pub async fn status_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StatusRecord>, ApiError> {
    state.service.status(&name).await.map(Json).map_err(service_error)
}
