use crate::app::SandboxService;
use crate::domain::inspect::{DebugFormat, DebugOutput};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SandboxService>,
}

/// Envelope for every non-2xx response.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct CreateRequest {
    /// Logical sandbox name (letters, digits, underscores).
    pub name: String,
    /// Dump file name, relative to the server's dump directory.
    pub filename: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct DebugRequest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub format: DebugFormat,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct DebugResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    pub result: Option<DebugOutput>,
    pub error: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct TestInput {
    /// Check spec text for one case; its meaning depends on `request_type`.
    pub data_in: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct TestingRequest {
    pub name: String,
    pub code: String,
    /// One of `select`, `insert`, `update`, `delete` (case-insensitive).
    pub request_type: String,
    pub tests: Vec<TestInput>,
}

pub fn json_422(err: JsonRejection, expected: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error: "Invalid JSON body".to_string(),
            details: Some(format!("{} (expected: {})", err, expected)),
        }),
    )
}
