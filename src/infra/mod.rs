//! Process-level plumbing: configuration, Postgres connections, dump loading.

pub mod config;
pub mod dump_loader;
pub mod provisioner;

pub use config::{SandboxConfig, SelectCheckMode};
pub use dump_loader::{DumpFormat, DumpLoader, PgToolsLoader};
pub use provisioner::{ConnectionProvisioner, Mode, Role, Session, StatementError};
