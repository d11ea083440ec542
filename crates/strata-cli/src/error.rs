//! CLI errors and their exit codes.
//!
//! Every failure that reaches `main` is a [`CliError`]. Core errors keep
//! their own message and suggestions; the CLI adds the exit code and the
//! rendering.

use std::error::Error as _;
use std::fmt::Write as _;

use owo_colors::OwoColorize;
use thiserror::Error;

use strata_core::error::{ErrorCategory as CoreCategory, StrataError};

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A config key is unknown or the config cannot be serialised.
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Engine, builder or manifest failure.
    #[error("{0}")]
    Core(#[from] StrataError),

    /// The provider state could not be loaded.
    #[error("Provider error: {message}")]
    Provider { message: String },

    #[error("I/O error: {message}")]
    IoError {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<std::io::Error> for CliError {
    fn from(source: std::io::Error) -> Self {
        Self::IoError {
            message: source.to_string(),
            source,
        }
    }
}

/// How a failure is classified for the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// A confirmation prompt was declined.
    Aborted,
    UserError,
    NotFound,
    Configuration,
    /// Internal, I/O or provider failure.
    Internal,
}

impl ExitKind {
    pub fn code(self) -> u8 {
        match self {
            Self::Aborted => 1,
            Self::UserError => 2,
            Self::NotFound => 3,
            Self::Configuration => 4,
            Self::Internal => 5,
        }
    }
}

impl From<CoreCategory> for ExitKind {
    fn from(category: CoreCategory) -> Self {
        match category {
            CoreCategory::Validation => Self::UserError,
            CoreCategory::NotFound => Self::NotFound,
            CoreCategory::Configuration => Self::Configuration,
            CoreCategory::Aborted => Self::Aborted,
            CoreCategory::Internal => Self::Internal,
        }
    }
}

impl CliError {
    pub fn kind(&self) -> ExitKind {
        match self {
            Self::InvalidInput { .. } => ExitKind::UserError,
            Self::ConfigError { .. } => ExitKind::Configuration,
            Self::Core(core) => core.category().into(),
            Self::Provider { .. } | Self::IoError { .. } => ExitKind::Internal,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().code()
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidInput { .. } => vec!["Use --help for usage information".into()],
            Self::ConfigError { .. } => vec![
                "Run 'strata config path' to locate the config file".into(),
                "Run 'strata config list' to see the effective values".into(),
            ],
            Self::Core(core) if core.is_user_abort() => Vec::new(),
            Self::Core(core) => core.suggestions(),
            Self::Provider { .. } => {
                vec!["Check that engine.provider_state names a readable JSON file".into()]
            }
            Self::IoError { .. } => vec!["Check file permissions".into()],
        }
    }

    /// The message, its causes when `verbose`, and suggestions.
    pub fn render(&self, verbose: bool, color: bool) -> String {
        let paint = |text: &str, style: Style| -> String {
            if !color {
                return text.to_owned();
            }
            match style {
                Style::Error => text.red().bold().to_string(),
                Style::Cause => text.dimmed().to_string(),
                Style::Heading => text.yellow().bold().to_string(),
            }
        };

        let mut out = String::new();
        let _ = writeln!(out, "\n{} {self}", paint("Error:", Style::Error));
        if verbose {
            let mut cause = self.source();
            while let Some(err) = cause {
                let _ = writeln!(out, "  {}", paint(&format!("Caused by: {err}"), Style::Cause));
                cause = err.source();
            }
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            let _ = writeln!(out, "\n{}", paint("Suggestions:", Style::Heading));
            for s in &suggestions {
                let _ = writeln!(out, "  {s}");
            }
        }
        if !verbose && self.source().is_some() {
            let _ = writeln!(out, "\n{}", paint("Use -v for the full cause chain.", Style::Cause));
        }
        out
    }
}

#[derive(Clone, Copy)]
enum Style {
    Error,
    Cause,
    Heading,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use strata_core::application::ApplicationError;

    fn core(err: ApplicationError) -> CliError {
        CliError::Core(err.into())
    }

    // ========================================================================
    // Exit codes
    // ========================================================================

    #[test]
    fn declined_prompt_exits_1() {
        assert_eq!(core(ApplicationError::UserAbort).exit_code(), 1);
    }

    #[test]
    fn validation_failures_exit_2() {
        let err = core(ApplicationError::BuilderNotRegistered {
            kind: "alb".into(),
        });
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            CliError::InvalidInput {
                message: "x".into()
            }
            .exit_code(),
            2
        );
    }

    #[test]
    fn missing_stack_exits_3() {
        let err = core(ApplicationError::StackDoesNotExist {
            stack: "ne-dev-vpc".into(),
            message: String::new(),
        });
        assert_eq!(err.kind(), ExitKind::NotFound);
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn configuration_exits_4() {
        let manifest = CliError::Core(StrataError::Configuration {
            message: "Manifest not found: /p/strata.yaml".into(),
        });
        assert_eq!(manifest.exit_code(), 4);
    }

    #[test]
    fn provider_and_io_exit_5() {
        let provider = CliError::Provider {
            message: "bad state".into(),
        };
        let io: CliError = io::Error::other("disk").into();
        assert_eq!(provider.exit_code(), 5);
        assert_eq!(io.exit_code(), 5);
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    #[test]
    fn plain_render_has_message_and_suggestions() {
        let err = CliError::ConfigError {
            message: "unknown key".into(),
            source: None,
        };
        let text = err.render(false, false);
        assert!(text.contains("Error: Configuration error: unknown key"));
        assert!(text.contains("Suggestions:"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn causes_only_when_verbose() {
        let err = CliError::IoError {
            message: "reading manifest".into(),
            source: io::Error::other("disk on fire"),
        };
        assert!(!err.render(false, false).contains("disk on fire"));
        assert!(err.render(false, false).contains("Use -v"));
        assert!(err.render(true, false).contains("Caused by: disk on fire"));
    }

    #[test]
    fn abort_renders_without_suggestions() {
        let text = core(ApplicationError::UserAbort).render(false, false);
        assert!(text.contains("Aborted run."));
        assert!(!text.contains("Suggestions:"));
    }
}
