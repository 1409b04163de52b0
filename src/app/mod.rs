//! Service objects built on the domain types and the infra layer.

pub mod errors;
pub mod inspector;
pub mod lifecycle;
pub mod orchestrator;
pub mod sandbox_service;
pub mod verifier;

pub use errors::ServiceError;
pub use sandbox_service::SandboxService;
