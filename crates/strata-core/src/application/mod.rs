//! Application layer for Strata.
//!
//! This layer contains:
//! - **Services**: The stack orchestration [`Engine`] and its collaborators
//! - **Ports**: Interface definitions (traits) for external dependencies
//! - **Errors**: Application-specific error types
//!
//! The application layer coordinates the domain layer. Naming, hashing,
//! diffing and parameter rules all live in `crate::domain`.

pub mod error;
pub mod ports;
pub mod services;

// Re-export main services
pub use services::{
    BuildRequest, BuilderRegistry, Engine, EngineOptions, OutputsStore, ResourceKind, Resolved,
    StackBuilder, StateLayout,
};

// Re-export port traits (for adapter implementation)
pub use ports::{
    CloudFormation, ConfirmationPort, Filesystem, ModelResolver, ModelValue, Reporter,
    SessionProvider,
};

pub use error::ApplicationError;
