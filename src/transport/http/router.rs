use crate::domain::check::CommandType;
use crate::domain::inspect::{DebugFormat, DebugOutput};
use crate::domain::sandbox::{DbStatus, StatusRecord};
use crate::domain::verify::{CaseStatus, TestCaseResult, TestSuiteResult};
use crate::transport::http::handlers::{debug, health, lifecycle, status, testing};
use crate::transport::http::types::{
    CreateRequest, DebugRequest, DebugResponse, ErrorResponse, TestInput, TestingRequest,
};
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        status::status_all_handler,
        status::status_handler,
        lifecycle::create_handler,
        lifecycle::delete_handler,
        debug::debug_handler,
        testing::testing_handler
    ),
    components(schemas(
        ErrorResponse,
        StatusRecord,
        DbStatus,
        CreateRequest,
        DebugRequest,
        DebugResponse,
        DebugFormat,
        DebugOutput,
        TestingRequest,
        TestInput,
        CommandType,
        TestSuiteResult,
        TestCaseResult,
        CaseStatus
    ))
)]
#[allow(dead_code)]
pub struct ApiDoc;

pub fn create_router(app_state: crate::transport::http::types::AppState) -> Router {
    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route("/status/", get(status::status_all_handler))
        .route("/status/:name/", get(status::status_handler))
        .route("/create/", post(lifecycle::create_handler))
        .route("/delete/:name/", post(lifecycle::delete_handler))
        .route("/debug/", post(debug::debug_handler))
        .route("/testing/", post(testing::testing_handler))
        .with_state(app_state)
}
