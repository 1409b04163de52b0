use crate::app::ServiceError;
use crate::transport::http::types::ErrorResponse;
use axum::http::StatusCode;
use axum::Json;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Maps a service failure onto an HTTP status and the `{ error, details }` envelope.
pub fn service_error(err: ServiceError) -> ApiError {
    let status = match &err {
        ServiceError::InvalidName { .. } | ServiceError::InvalidCheckCommand { .. } => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::FileNotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err.summary(), "request failed");
    } else {
        tracing::debug!(error = %err.summary(), "request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.message(),
            details: err.details().map(str::to_string),
        }),
    )
}
