//! Sandbox naming and status records.
//!
//! A sandbox is addressed by a caller-chosen logical name. The physical Postgres
//! database is always `<prefix><logical>`; only names carrying the prefix are ever
//! listed, created or dropped, so unrelated databases on a shared server stay untouched.

use crate::app::errors::ServiceError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Postgres truncates identifiers longer than this (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxName {
    logical: String,
    physical: String,
}

impl SandboxName {
    /// Validates a logical name and maps it to its physical database name.
    ///
    /// Names are folded to lower case so that `Algebra` and `algebra` address the same
    /// sandbox, matching how Postgres folds unquoted identifiers.
    pub fn new(logical: &str, prefix: &str) -> Result<Self, ServiceError> {
        let logical = logical.trim().to_lowercase();
        if !validate_ident(&logical) {
            return Err(ServiceError::invalid_name(format!(
                "'{}' must start with a letter or underscore \
                 and contain only letters, digits and underscores",
                logical
            )));
        }
        let physical = format!("{}{}", prefix, logical);
        if physical.len() > MAX_IDENTIFIER_LEN {
            return Err(ServiceError::invalid_name(format!(
                "'{}' is too long ({} bytes including the prefix, at most {})",
                logical,
                physical.len(),
                MAX_IDENTIFIER_LEN
            )));
        }
        Ok(Self { logical, physical })
    }

    /// Recovers a sandbox from a catalog entry. Returns `None` for databases without the prefix.
    pub fn from_physical(physical: &str, prefix: &str) -> Option<Self> {
        let logical = physical.strip_prefix(prefix)?;
        if logical.is_empty() {
            return None;
        }
        Some(Self {
            logical: logical.to_string(),
            physical: physical.to_string(),
        })
    }

    pub fn logical(&self) -> &str {
        &self.logical
    }

    pub fn physical(&self) -> &str {
        &self.physical
    }

    /// The physical name as a quoted SQL identifier, safe to splice into DDL.
    pub fn quoted(&self) -> String {
        quote_ident(&self.physical)
    }
}

impl std::fmt::Display for SandboxName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.logical)
    }
}

pub fn validate_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double-quotes an identifier, doubling any embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum DbStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "not exists")]
    NotExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusRecord {
    pub name: String,
    pub status: DbStatus,
}

impl StatusRecord {
    pub fn new(name: &SandboxName, status: DbStatus) -> Self {
        Self {
            name: name.logical().to_string(),
            status,
        }
    }
}
