//! Application layer errors.
//!
//! These errors represent failures in orchestration: provider calls, applied
//! state, confirmation. Business rule violations are `DomainError` from
//! `crate::domain`.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::{GroupId, StackId};
use crate::error::ErrorCategory;

/// Errors that occur during stack orchestration.
#[derive(Debug, Error, Clone)]
pub enum ApplicationError {
    /// An upstream stack was described for its outputs but does not exist.
    #[error("Stack does not exist: {stack}{message}")]
    StackDoesNotExist { stack: String, message: String },

    /// A requested output key is not present on the live stack.
    #[error("Stack output '{key}' is missing from {stack}{message}")]
    StackOutputMissing {
        stack: String,
        key: String,
        message: String,
    },

    /// The provider rejected the template.
    #[error("Validation Error: {message}\nStack: {stack}\nTemplate: {}", .template.display())]
    TemplateValidation {
        stack: String,
        template: PathBuf,
        message: String,
    },

    /// A waiter reported a terminal failure.
    #[error("Waiter Error: {stack}{message}")]
    Waiter { stack: String, message: String },

    /// A confirmation prompt was answered negatively.
    #[error("Aborted run.")]
    UserAbort,

    /// Any provider failure that is not recovered locally.
    #[error("Provider error for {stack}: {message}")]
    Provider { stack: String, message: String },

    /// A reference resolved to nothing.
    #[error("Unable to locate value for ref: {reference}{context}")]
    UnresolvedReference { reference: String, context: String },

    /// A pre or post hook returned an error.
    #[error("Hook '{hook}' failed for {stack}: {reason}")]
    HookFailed {
        hook: String,
        stack: String,
        reason: String,
    },

    /// Filesystem operation failed.
    #[error("Filesystem error at {path}: {reason}")]
    FilesystemError { path: PathBuf, reason: String },

    /// An applied-state or outputs file could not be read or written as YAML.
    #[error("Serialization error at {path}: {reason}")]
    Serialization { path: PathBuf, reason: String },

    /// A manifest names a resource kind no builder is registered for.
    #[error("No builder registered for resource kind '{kind}'")]
    BuilderNotRegistered { kind: String },

    #[error("Unknown stack id {id}")]
    UnknownStack { id: StackId },

    #[error("Unknown stack group id {id}")]
    UnknownGroup { id: GroupId },

    /// Store access failed (lock poisoned, etc.).
    #[error("Outputs store error")]
    StoreLockError,
}

impl ApplicationError {
    /// Get user-actionable suggestions.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::StackDoesNotExist { stack, .. } => vec![
                format!("'{}' depends on outputs from a stack that does not exist yet", stack),
                "Provision the upstream stack first".into(),
            ],
            Self::StackOutputMissing { .. } => vec![
                "Output registrations are missing for the template".into(),
                "The template does not have the corresponding Outputs entry".into(),
                "The stack has not been provisioned yet".into(),
            ],
            Self::TemplateValidation { template, .. } => vec![
                format!("Inspect the generated template: {}", template.display()),
            ],
            Self::UnresolvedReference { reference, .. } => vec![
                format!("Check that '{}' exists in the project model", reference),
                "References to stack outputs need the upstream stack registered first".into(),
            ],
            Self::FilesystemError { path, .. } => vec![
                format!("Failed to access: {}", path.display()),
                "Check that you have write permissions".into(),
            ],
            Self::Serialization { path, .. } => vec![
                format!("The file may be corrupt: {}", path.display()),
                "Remove it and run again with --nocache".into(),
            ],
            Self::BuilderNotRegistered { kind } => vec![
                format!("Resource kind '{}' has no builder in this build", kind),
                "Supported kinds: template-file".into(),
            ],
            Self::StoreLockError => vec![
                "The outputs store is locked".into(),
                "Try again in a moment".into(),
            ],
            _ => vec!["Check the error details above".into()],
        }
    }

    /// Get error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UserAbort => ErrorCategory::Aborted,
            Self::StackDoesNotExist { .. }
            | Self::UnresolvedReference { .. }
            | Self::UnknownStack { .. }
            | Self::UnknownGroup { .. } => ErrorCategory::NotFound,
            Self::StackOutputMissing { .. }
            | Self::TemplateValidation { .. }
            | Self::BuilderNotRegistered { .. } => ErrorCategory::Validation,
            Self::Waiter { .. }
            | Self::Provider { .. }
            | Self::HookFailed { .. }
            | Self::FilesystemError { .. }
            | Self::Serialization { .. }
            | Self::StoreLockError => ErrorCategory::Internal,
        }
    }
}
