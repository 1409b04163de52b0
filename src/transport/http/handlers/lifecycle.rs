use crate::domain::sandbox::StatusRecord;
use crate::transport::http::handlers::common::{service_error, ApiError};
use crate::transport::http::types::{json_422, AppState, CreateRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;

#[utoipa::path(
    post,
    path = "/create/",
    request_body = CreateRequest,
    responses(
        (status = 200, description = "Sandbox (re)created and loaded", body = StatusRecord),
        (status = 400, description = "Invalid sandbox name", body = ErrorResponse),
        (status = 404, description = "Dump file not found", body = ErrorResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)",
            body = ErrorResponse),
        (status = 500, description = "Creation or dump load failed", body = ErrorResponse)
    )
)]
pub async fn create_handler(
    State(state): State<AppState>,
    request: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Json<StatusRecord>, ApiError> {
    let Json(request) =
        request.map_err(|e| json_422(e, r#"{"name": "...", "filename": "..."}"#))?;

    state
        .service
        .create(&request.name, &request.filename)
        .await
        .map(Json)
        .map_err(service_error)
}

#[utoipa::path(
    post,
    path = "/delete/{name}/",
    params(
        ("name" = String, Path, description = "Logical sandbox name")
    ),
    responses(
        (status = 200, description = "Sandbox dropped (or was already absent)",
            body = StatusRecord),
        (status = 400, description = "Invalid sandbox name", body = ErrorResponse),
        (status = 500, description = "Drop failed", body = ErrorResponse)
    )
)]
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StatusRecord>, ApiError> {
    state.service.delete(&name).await.map(Json).map_err(service_error)
}
