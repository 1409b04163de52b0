pub mod app;
pub mod domain;
pub mod infra;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::{SandboxService, ServiceError};
pub use domain::{CommandType, DebugFormat, DebugResult, StatusRecord, TestSuiteResult};
pub use infra::SandboxConfig;
