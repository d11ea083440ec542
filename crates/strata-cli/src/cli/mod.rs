//! CLI argument definitions using the clap derive API.
//!
//! This module is the *only* place that knows about argument names, aliases,
//! help text, and value enums. No business logic lives here.

use clap::{Args, Parser, Subcommand, ValueEnum};

pub mod global;
pub use global::GlobalArgs;

/// Scope that selects every stack in the project.
pub const PROJECT_SCOPE: &str = "project";

const REF_PREFIX: &str = "paco.ref ";

// ── Top-level CLI ─────────────────────────────────────────────────────────────

/// Main CLI entry-point.
#[derive(Debug, Parser)]
#[command(
    name    = "strata",
    bin_name = "strata",
    version  = env!("CARGO_PKG_VERSION"),
    author   = env!("CARGO_PKG_AUTHORS"),
    about    = "Multi-account CloudFormation stack orchestration",
    long_about = "Strata validates, provisions and deletes the CloudFormation stacks \
                  described by a project manifest, in dependency order.",
    after_help = "EXAMPLES:\n\
        \x20 strata validate project\n\
        \x20 strata provision netenv.mynet.dev\n\
        \x20 strata -y provision 'paco.ref netenv.mynet.dev' network\n\
        \x20 strata delete netenv.mynet.dev.applications.app\n\
        \x20 strata completions bash > /usr/share/bash-completion/completions/strata",
    arg_required_else_help = true,
    subcommand_required    = true,
)]
pub struct Cli {
    /// Flags available on every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

// ── Subcommands ───────────────────────────────────────────────────────────────

/// All available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate templates and diff them against the applied state.
    #[command(
        about = "Validate stacks against the provider and applied state",
        after_help = "EXAMPLES:\n\
            \x20 strata validate project\n\
            \x20 strata validate netenv.mynet.dev network"
    )]
    Validate(RunArgs),

    /// Create or update stacks.
    #[command(
        visible_alias = "apply",
        about = "Create or update stacks",
        after_help = "EXAMPLES:\n\
            \x20 strata provision project\n\
            \x20 strata --nocache provision netenv.mynet.dev"
    )]
    Provision(RunArgs),

    /// Delete stacks in reverse order.
    #[command(
        about = "Delete stacks",
        after_help = "EXAMPLES:\n\
            \x20 strata delete netenv.mynet.dev.applications.app"
    )]
    Delete(RunArgs),

    /// Generate shell completion scripts.
    #[command(
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n\
            \x20 strata completions bash > ~/.local/share/bash-completion/completions/strata\n\
            \x20 strata completions zsh  > ~/.zfunc/_strata\n\
            \x20 strata completions fish > ~/.config/fish/completions/strata.fish"
    )]
    Completions(CompletionsArgs),

    /// Inspect the Strata configuration.
    #[command(
        about = "Configuration inspection",
        subcommand,
        after_help = "EXAMPLES:\n\
            \x20 strata config get engine.home\n\
            \x20 strata config list\n\
            \x20 strata config path"
    )]
    Config(ConfigCommands),
}

// ── validate / provision / delete ─────────────────────────────────────────────

/// Selects the stacks a pass runs on.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Dotted reference, optionally prefixed with `paco.ref `. `project`
    /// selects everything.
    #[arg(value_name = "SCOPE", help = "Reference to run on, or 'project'")]
    pub scope: String,

    /// Further dotted suffix appended to the scope.
    #[arg(value_name = "FILTER", help = "Narrow the scope further")]
    pub filter: Option<String>,
}

impl RunArgs {
    /// The stack filter prefix, or `None` to run on every stack.
    pub fn filter_prefix(&self) -> Option<String> {
        let scope = self.scope.trim();
        let scope = scope.strip_prefix(REF_PREFIX).unwrap_or(scope).trim();
        let filter = self
            .filter
            .as_deref()
            .map(|f| f.trim().trim_matches('.'))
            .filter(|f| !f.is_empty());

        let scope = (scope != PROJECT_SCOPE && !scope.is_empty()).then_some(scope);
        match (scope, filter) {
            (None, None) => None,
            (Some(scope), None) => Some(scope.to_string()),
            (None, Some(filter)) => Some(filter.to_string()),
            (Some(scope), Some(filter)) => Some(format!("{scope}.{filter}")),
        }
    }
}

// ── completions ───────────────────────────────────────────────────────────────

/// Arguments for `strata completions`.
#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum, help = "Shell to generate completions for")]
    pub shell: Shell,
}

/// Supported shells for completion generation.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ── config subcommands ────────────────────────────────────────────────────────

/// Subcommands for `strata config`.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the value of a configuration key.
    Get {
        /// Dotted key path, e.g. `engine.home`.
        key: String,
    },
    /// Print all configuration values.
    List,
    /// Print the path to the default configuration file.
    Path,
}

// ── tests ─────────────────────────────────────────────────────────────────────
