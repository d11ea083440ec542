//! Flags accepted before or after any subcommand.

use std::path::PathBuf;

use clap::{ArgAction, Args};

#[derive(Debug, Default, Args)]
pub struct GlobalArgs {
    /// More diagnostics: -v info, -vv debug, -vvv trace.
    ///
    /// Any -v also prints the Init, Wait and Done action lines.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Errors only; the CLI's own messages are suppressed.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Plain output without ANSI colour.
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Read configuration from FILE instead of the platform config dir.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Project home; overrides `engine.home`.
    #[arg(short = 'H', long, global = true, env = "STRATA_HOME", value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Answer yes to every confirmation.
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Ignore the stack cache and inspect every stack.
    #[arg(long, global = true)]
    pub nocache: bool,

    /// Print only stacks that change.
    #[arg(long, global = true)]
    pub quiet_changes_only: bool,

    /// Report removed resources and resource type changes in template diffs.
    #[arg(long, global = true)]
    pub warn: bool,

    /// Skip the parameter and template change confirmations.
    #[arg(long, global = true)]
    pub disable_validation: bool,
}
