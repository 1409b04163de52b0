use crate::transport::http::handlers::common::ApiError;
use crate::transport::http::types::{json_422, AppState, DebugRequest, DebugResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

/// Always answers 200 once the body parses: SQL and sandbox problems are reported in `error`.
#[utoipa::path(
    post,
    path = "/debug/",
    request_body = DebugRequest,
    responses(
        (status = 200, description = "Statement executed and rolled back, or the failure",
            body = DebugResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)",
            body = ErrorResponse)
    )
)]
pub async fn debug_handler(
    State(state): State<AppState>,
    request: Result<Json<DebugRequest>, JsonRejection>,
) -> Result<Json<DebugResponse>, ApiError> {
    let Json(request) = request
        .map_err(|e| json_422(e, r#"{"name": "...", "code": "...", "format": "tabular|array"}"#))?;

    let result = state
        .service
        .debug(&request.name, &request.code, request.format)
        .await;
    Ok(Json(DebugResponse {
        columns: result.columns,
        rows_affected: result.rows_affected,
        result: result.result,
        error: result.error,
    }))
}
