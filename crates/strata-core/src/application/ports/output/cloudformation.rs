//! Provider (CloudFormation) and session ports.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{ParameterRecord, StackStatus, Tag};
use crate::error::StrataResult;

/// Classification of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Credentials expired; refresh the session and retry.
    ExpiredToken,
    /// Throttled; sleep and retry.
    RateExceeded,
    /// `ValidationError: Stack with id X does not exist`.
    DoesNotExist,
    /// `No updates are to be performed.`
    NoUpdates,
    /// The stack is still cleaning up after an update.
    CleanupInProgress,
    /// Any other `ValidationError`.
    Validation,
    Other,
}

const EXPIRED_TOKEN_TEXT: &str = "The security token included in the request is expired";

/// An error returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn expired_token() -> Self {
        Self::new("ExpiredToken", EXPIRED_TOKEN_TEXT)
    }

    pub fn rate_exceeded() -> Self {
        Self::new("Throttling", "Rate exceeded")
    }

    pub fn does_not_exist(stack_name: &str) -> Self {
        Self::new(
            "ValidationError",
            format!("Stack with id {stack_name} does not exist"),
        )
    }

    pub fn kind(&self) -> ProviderErrorKind {
        if self.code == "ExpiredToken" || self.message.contains(EXPIRED_TOKEN_TEXT) {
            return ProviderErrorKind::ExpiredToken;
        }
        if self.message.ends_with("Rate exceeded") {
            return ProviderErrorKind::RateExceeded;
        }
        if self.code != "ValidationError" {
            return ProviderErrorKind::Other;
        }
        if self.message.ends_with("does not exist") {
            ProviderErrorKind::DoesNotExist
        } else if self.message.ends_with("No updates are to be performed.") {
            ProviderErrorKind::NoUpdates
        } else if self
            .message
            .ends_with("is in UPDATE_COMPLETE_CLEANUP_IN_PROGRESS state and can not be updated.")
        {
            ProviderErrorKind::CleanupInProgress
        } else {
            ProviderErrorKind::Validation
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Result of submitting a create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted; carries the provider stack id.
    Submitted(String),
    /// Nothing to change.
    NoChange,
    /// The stack is already settling from a previous update.
    AlreadyInProgress,
    Error(ProviderError),
}

impl SubmitOutcome {
    /// Classify a provider error returned from a submission.
    pub fn from_provider_error(err: ProviderError) -> Self {
        match err.kind() {
            ProviderErrorKind::NoUpdates => Self::NoChange,
            ProviderErrorKind::CleanupInProgress => Self::AlreadyInProgress,
            _ => Self::Error(err),
        }
    }
}

impl From<Result<String, ProviderError>> for SubmitOutcome {
    fn from(result: Result<String, ProviderError>) -> Self {
        match result {
            Ok(stack_id) => Self::Submitted(stack_id),
            Err(err) => Self::from_provider_error(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
}

/// The subset of `DescribeStacks` the engine reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDescription {
    pub stack_id: String,
    pub status: StackStatus,
    pub termination_protection: bool,
    /// `None` when the provider reports no `Outputs` section.
    pub outputs: Option<Vec<StackOutput>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEvent {
    pub logical_resource_id: String,
    pub resource_status: String,
    pub resource_status_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waiter {
    StackCreateComplete,
    StackUpdateComplete,
    StackDeleteComplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStackInput {
    pub stack_name: String,
    pub template_body: String,
    pub parameters: Vec<ParameterRecord>,
    pub disable_rollback: bool,
    pub capabilities: Vec<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStackInput {
    pub stack_name: String,
    pub template_body: String,
    pub parameters: Vec<ParameterRecord>,
    pub capabilities: Vec<String>,
    pub tags: Vec<Tag>,
}

/// Port for the provider's stack API.
///
/// Implemented by:
/// - `strata_adapters::provider::MemoryCloudFormation` (simulator)
#[cfg_attr(test, mockall::automock)]
pub trait CloudFormation: Send + Sync {
    fn describe_stack(&self, stack_name: &str) -> Result<StackDescription, ProviderError>;

    /// Events newest first.
    fn describe_stack_events(&self, stack_name: &str) -> Result<Vec<StackEvent>, ProviderError>;

    fn validate_template(&self, template_body: &str) -> Result<(), ProviderError>;

    fn create_stack(&self, input: &CreateStackInput) -> SubmitOutcome;

    fn update_stack(&self, input: &UpdateStackInput) -> SubmitOutcome;

    fn delete_stack(&self, stack_name: &str) -> Result<(), ProviderError>;

    fn update_termination_protection(
        &self,
        stack_name: &str,
        enabled: bool,
    ) -> Result<(), ProviderError>;

    /// Block until the waiter's terminal state, or fail.
    fn wait(&self, waiter: Waiter, stack_name: &str) -> Result<(), ProviderError>;
}

/// Port for credential sessions.
///
/// Implemented by:
/// - `strata_adapters::provider::StaticSessions`
#[cfg_attr(test, mockall::automock)]
pub trait SessionProvider: Send + Sync {
    /// A client for `(account, region)`. `force` requests a fresh session.
    fn client(
        &self,
        account: &str,
        region: &str,
        force: bool,
    ) -> StrataResult<Arc<dyn CloudFormation>>;
}
