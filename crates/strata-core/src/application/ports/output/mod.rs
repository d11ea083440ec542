//! Driven (output) ports - implemented by infrastructure.
//!
//! These traits define what the engine needs from external systems.
//! The `strata-adapters` crate provides implementations.

mod cloudformation;

pub use cloudformation::{
    CloudFormation, CreateStackInput, ProviderError, ProviderErrorKind, SessionProvider,
    StackDescription, StackEvent, StackOutput, SubmitOutcome, UpdateStackInput, Waiter,
};
#[cfg(test)]
pub use cloudformation::{MockCloudFormation, MockSessionProvider};

use crate::domain::Reference;
use crate::error::StrataResult;
use std::path::Path;

/// Port for filesystem operations on build and applied state.
///
/// Implemented by:
/// - `strata_adapters::filesystem::LocalFilesystem` (production)
/// - `strata_adapters::filesystem::MemoryFilesystem` (testing)
#[cfg_attr(test, mockall::automock)]
pub trait Filesystem: Send + Sync {
    /// Read a file. A missing file is `Ok(None)`.
    fn read_to_string(&self, path: &Path) -> StrataResult<Option<String>>;

    /// Write content to a file, creating parent directories.
    fn write_file(&self, path: &Path, content: &str) -> StrataResult<()>;

    /// Check if path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Remove a file. Returns `false` if it did not exist.
    fn remove_file(&self, path: &Path) -> StrataResult<bool>;

    /// Copy a file, creating the destination's parent directories.
    fn copy_file(&self, from: &Path, to: &Path) -> StrataResult<()>;

    /// Create a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> StrataResult<()>;
}

/// Port for yes/no confirmation.
///
/// Implemented by:
/// - `strata_adapters::confirm::AutoConfirm` (`--yes` and tests)
/// - `strata_adapters::confirm::ScriptedConfirm` (tests)
/// - `strata_cli::confirm::TerminalConfirm` (interactive)
#[cfg_attr(test, mockall::automock)]
pub trait ConfirmationPort: Send + Sync {
    /// Ask `question`. An empty answer picks `default_yes`.
    fn confirm(&self, question: &str, default_yes: bool) -> StrataResult<bool>;
}

/// What a reference resolves to in the project model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValue {
    /// A scalar, already rendered as a string (account ids included).
    Scalar(String),
    /// A model object (mapping or sequence).
    Node,
}

/// Port for project model lookups.
///
/// Implemented by:
/// - `strata_adapters::model::YamlModel`
#[cfg_attr(test, mockall::automock)]
pub trait ModelResolver: Send + Sync {
    /// Navigate the model by the reference's path.
    fn resolve(&self, reference: &Reference) -> StrataResult<Option<ModelValue>>;
}

/// Port for operator-facing output.
///
/// Implemented by:
/// - `strata_cli::output::OutputManager` (terminal)
/// - `strata_adapters::reporter::RecordingReporter` (testing)
#[cfg_attr(test, mockall::automock)]
pub trait Reporter: Send + Sync {
    /// Emit one line.
    fn emit(&self, line: &str);
}
