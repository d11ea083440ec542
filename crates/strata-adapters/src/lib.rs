//! Infrastructure adapters for Strata.
//!
//! This crate implements the ports defined in `strata-core::application::ports`
//! and the manifest plumbing that feeds the engine. It contains all external
//! dependencies and I/O operations.

pub mod builders;
pub mod confirm;
pub mod filesystem;
pub mod manifest;
pub mod model;
pub mod provider;
pub mod reporter;

// Re-export commonly used adapters
pub use builders::{TemplateFileBuilder, default_registry};
pub use confirm::{AutoConfirm, ScriptedConfirm};
pub use filesystem::{LocalFilesystem, MemoryFilesystem};
pub use manifest::Manifest;
pub use model::YamlModel;
pub use provider::{MemoryCloudFormation, ProviderOp, StaticSessions};
pub use reporter::RecordingReporter;
