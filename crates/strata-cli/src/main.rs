//! # Strata CLI
//!
//! Validates, provisions and deletes the CloudFormation stacks described by
//! a project manifest.
//!
//! Exit codes: 0 success, 1 declined confirmation, 2 usage or validation
//! error, 3 not found, 4 configuration error, 5 internal or provider error.

use std::io::IsTerminal as _;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    cli::{Cli, Commands, RunArgs},
    commands::run::Pass,
    config::AppConfig,
    error::{CliError, CliResult, ExitKind},
    logging::init_logging,
    output::OutputManager,
};

mod cli;
mod commands;
mod config;
mod confirm;
mod error;
mod logging;
mod output;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version also land here, on stdout.
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(ExitKind::UserError.code())
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = init_logging(&cli.global) {
        eprintln!("{e:#}");
        return ExitCode::from(ExitKind::Internal.code());
    }
    debug!(verbose = cli.global.verbose, yes = cli.global.yes, "Arguments parsed");

    let config = match AppConfig::load(cli.global.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Configuration failed to load");
            eprintln!("Error: {e:#}");
            return ExitCode::from(ExitKind::Configuration.code());
        }
    };

    let output = OutputManager::new(&cli.global, &config);
    let verbose = cli.global.verbose > 0;
    let color =
        !cli.global.no_color && !config.output.no_color && std::io::stderr().is_terminal();
    match dispatch(cli, &config, &output) {
        Ok(()) => {
            info!("Done");
            ExitCode::SUCCESS
        }
        Err(err) => report(&err, verbose, color),
    }
}

#[instrument(skip_all)]
fn dispatch(cli: Cli, config: &AppConfig, output: &OutputManager) -> CliResult<()> {
    let global = &cli.global;
    let run = |pass: Pass, args: RunArgs| commands::run::execute(pass, args, global, config, output);
    match cli.command {
        Commands::Validate(args) => run(Pass::Validate, args),
        Commands::Provision(args) => run(Pass::Provision, args),
        Commands::Delete(args) => run(Pass::Delete, args),
        Commands::Completions(args) => commands::completions::execute(args),
        Commands::Config(cmd) => commands::config::execute(cmd, config, output),
    }
}

/// Log the failure, print it to stderr and pick the exit code.
fn report(err: &CliError, verbose: bool, color: bool) -> ExitCode {
    let kind = err.kind();
    match kind {
        ExitKind::Aborted | ExitKind::UserError | ExitKind::NotFound => {
            warn!(?kind, error = %err, "Command failed");
        }
        ExitKind::Configuration | ExitKind::Internal => {
            error!(?kind, error = %err, "Command failed");
        }
    }
    eprint!("{}", err.render(verbose, color));
    ExitCode::from(kind.code())
}
