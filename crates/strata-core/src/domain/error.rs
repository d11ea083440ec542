// ============================================================================
// domain/error.rs - STACK DOMAIN ERRORS
// ============================================================================

use thiserror::Error;

/// Root domain error type.
///
/// All errors are:
/// - Cloneable (for retry logic)
/// - Categorizable (for CLI display)
/// - Actionable (provides suggestions)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    #[error("Not a reference: '{raw}'")]
    InvalidReference { raw: String },

    #[error("Invalid paco.sub expression: {reason}\npaco.sub '{payload}'")]
    InvalidSubExpression { reason: String, payload: String },

    #[error("Invalid stack name '{name}': must begin with a letter")]
    InvalidStackName { name: String },

    #[error("Parameter '{key}' could not be cast to a template value: {type_name}")]
    UnsupportedParameterValue { key: String, type_name: String },

    #[error("<environment> tag exists but no environment found: {reference}")]
    MissingEnvironment { reference: String },

    #[error("Cannot have mixed Stacks and non-Stacks in the list: {reference}")]
    MixedListParameter { reference: String },

    #[error("Stack Output key is unset for parameter '{key}'")]
    MissingOutputKey { key: String },

    // ========================================================================
    // Constraint Violations
    // ========================================================================
    #[error("Required field missing: {field}")]
    MissingRequiredField { field: &'static str },

    #[error("Stack group '{group}' cannot contain itself")]
    GroupCycle { group: String },
}

impl DomainError {
    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidReference { raw } => vec![
                format!("'{}' does not start with 'paco.ref '", raw),
                "References look like: paco.ref netenv.mynet.dev.network.vpc.id".into(),
            ],
            Self::InvalidSubExpression { .. } => vec![
                "paco.sub payloads must be single-quoted on one line".into(),
                "Each payload needs at least one ${paco.ref ...} hole".into(),
            ],
            Self::InvalidStackName { name } => vec![
                format!("Sanitized stack name: {}", name),
                "Give the group or template an aws_name that starts with a letter".into(),
            ],
            Self::UnsupportedParameterValue { .. } => vec![
                "Parameter values must be booleans, integers, strings or lists of those".into(),
            ],
            Self::MissingEnvironment { .. } => vec![
                "Only stacks that belong to an environment can use <environment>".into(),
            ],
            Self::MixedListParameter { .. } => vec![
                "All references in a list parameter must resolve to stacks, or all to values"
                    .into(),
            ],
            _ => vec!["See documentation for more details".into()],
        }
    }

    /// Error category for CLI display styling.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidReference { .. }
            | Self::InvalidSubExpression { .. }
            | Self::InvalidStackName { .. }
            | Self::UnsupportedParameterValue { .. }
            | Self::MissingEnvironment { .. }
            | Self::MixedListParameter { .. }
            | Self::MissingOutputKey { .. } => ErrorCategory::Validation,
            Self::MissingRequiredField { .. } | Self::GroupCycle { .. } => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Internal,
}
