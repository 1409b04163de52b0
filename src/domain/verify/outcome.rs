use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Terminal state of a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// The check held.
    Passed,
    /// Everything executed but the check did not hold.
    Failed,
    /// The student statement or the check itself could not be executed
    /// (SQL error, timeout, incomparable result shapes).
    Errored,
}

/// Result of verifying one submission against one check spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub status: CaseStatus,
    pub error: Option<String>,
}

impl VerificationOutcome {
    pub fn passed() -> Self {
        Self {
            status: CaseStatus::Passed,
            error: None,
        }
    }

    pub fn failed(diagnostic: Option<String>) -> Self {
        Self {
            status: CaseStatus::Failed,
            error: diagnostic,
        }
    }

    pub fn errored(diagnostic: impl Into<String>) -> Self {
        Self {
            status: CaseStatus::Errored,
            error: Some(diagnostic.into()),
        }
    }

    pub fn ok(&self) -> bool {
        self.status == CaseStatus::Passed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TestCaseResult {
    /// The raw check text this case was graded against.
    pub data_in: String,
    pub ok: bool,
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl TestCaseResult {
    pub fn new(data_in: String, outcome: VerificationOutcome, elapsed_ms: u64) -> Self {
        Self {
            data_in,
            ok: outcome.ok(),
            status: outcome.status,
            error: outcome.error,
            elapsed_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TestSuiteResult {
    pub name: String,
    pub tests: Vec<TestCaseResult>,
    pub num: usize,
    pub num_ok: usize,
    pub ok: bool,
    #[schema(value_type = String, format = DateTime)]
    pub checked_at: DateTime<Utc>,
}

impl TestSuiteResult {
    /// Aggregates per-case results; the suite passes only when every case passed.
    pub fn from_cases(name: &str, tests: Vec<TestCaseResult>) -> Self {
        let num = tests.len();
        let num_ok = tests.iter().filter(|t| t.ok).count();
        Self {
            name: name.to_string(),
            tests,
            num,
            num_ok,
            ok: num_ok == num,
            checked_at: Utc::now(),
        }
    }
}
