//! Service error taxonomy.
//!
//! Every variant renders a fixed, human-readable message and may carry a `details`
//! payload (usually the underlying database or subprocess error text). The HTTP layer
//! turns these into `{ "error": message, "details": details }` envelopes.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceError {
    #[error("Failed to create the sandbox database")]
    Creation { details: Option<String> },

    #[error("Failed to delete the sandbox database")]
    Deletion { details: Option<String> },

    #[error("Failed to check the sandbox database status")]
    StatusCheck { details: Option<String> },

    #[error("Dump file not found")]
    FileNotFound { details: Option<String> },

    #[error("Invalid check command")]
    InvalidCheckCommand { details: Option<String> },

    #[error("Student and reference queries cannot be compared")]
    Check { details: Option<String> },

    #[error("Query execution failed")]
    Execution { details: Option<String> },

    #[error("Invalid sandbox name")]
    InvalidName { details: Option<String> },

    #[error("Could not connect to the sandbox database")]
    Connection { details: Option<String> },
}

impl ServiceError {
    pub fn creation(details: impl ToString) -> Self {
        Self::Creation {
            details: Some(details.to_string()),
        }
    }

    pub fn deletion(details: impl ToString) -> Self {
        Self::Deletion {
            details: Some(details.to_string()),
        }
    }

    pub fn status_check(details: impl ToString) -> Self {
        Self::StatusCheck {
            details: Some(details.to_string()),
        }
    }

    pub fn file_not_found(details: impl ToString) -> Self {
        Self::FileNotFound {
            details: Some(details.to_string()),
        }
    }

    pub fn invalid_check_command(details: impl ToString) -> Self {
        Self::InvalidCheckCommand {
            details: Some(details.to_string()),
        }
    }

    pub fn check(details: impl ToString) -> Self {
        Self::Check {
            details: Some(details.to_string()),
        }
    }

    pub fn execution(details: impl ToString) -> Self {
        Self::Execution {
            details: Some(details.to_string()),
        }
    }

    pub fn invalid_name(details: impl ToString) -> Self {
        Self::InvalidName {
            details: Some(details.to_string()),
        }
    }

    pub fn connection(details: impl ToString) -> Self {
        Self::Connection {
            details: Some(details.to_string()),
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Creation { details }
            | Self::Deletion { details }
            | Self::StatusCheck { details }
            | Self::FileNotFound { details }
            | Self::InvalidCheckCommand { details }
            | Self::Check { details }
            | Self::Execution { details }
            | Self::InvalidName { details }
            | Self::Connection { details } => details.as_deref(),
        }
    }

    /// One-line rendering (`message: details`) used where only a single string fits,
    /// e.g. the `error` field of a test case or a debug result.
    pub fn summary(&self) -> String {
        match self.details() {
            Some(d) if !d.is_empty() => format!("{}: {}", self, d),
            _ => self.to_string(),
        }
    }
}
