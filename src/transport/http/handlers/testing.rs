use crate::domain::check::CommandType;
use crate::domain::verify::TestSuiteResult;
use crate::transport::http::handlers::common::{service_error, ApiError};
use crate::transport::http::types::{json_422, AppState, TestingRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

const TESTING_BODY: &str =
    r#"{"name": "...", "code": "...", "request_type": "select", "tests": [{"data_in": "..."}]}"#;

#[utoipa::path(
    post,
    path = "/testing/",
    request_body = TestingRequest,
    responses(
        (status = 200, description = "Per-case verdicts and totals", body = TestSuiteResult),
        (status = 400, description = "Invalid sandbox name, command type or check text",
            body = ErrorResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)",
            body = ErrorResponse),
        (status = 500, description = "Sandbox unreachable", body = ErrorResponse)
    )
)]
pub async fn testing_handler(
    State(state): State<AppState>,
    request: Result<Json<TestingRequest>, JsonRejection>,
) -> Result<Json<TestSuiteResult>, ApiError> {
    let Json(request) = request.map_err(|e| json_422(e, TESTING_BODY))?;

    let command = request
        .request_type
        .parse::<CommandType>()
        .map_err(service_error)?;
    let cases = request.tests.into_iter().map(|t| t.data_in).collect();

    state
        .service
        .testing(&request.name, &request.code, command, cases)
        .await
        .map(Json)
        .map_err(service_error)
}
