//! Verification results and database-error classification.

pub mod classify;
pub mod outcome;

pub use classify::{classify_failure, Failure};
pub use outcome::{CaseStatus, TestCaseResult, TestSuiteResult, VerificationOutcome};
