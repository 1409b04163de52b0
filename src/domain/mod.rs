//! Pure domain types: sandbox naming, check specs, verification and inspection results.

pub mod check;
pub mod inspect;
pub mod sandbox;
pub mod verify;

pub use check::{CheckSpec, CommandType, Submission};
pub use inspect::{DebugFormat, DebugOutput, DebugResult};
pub use sandbox::{DbStatus, SandboxName, StatusRecord};
pub use verify::{CaseStatus, TestCaseResult, TestSuiteResult, VerificationOutcome};
