//! Diagnostics subscriber.
//!
//! Only the binary installs a subscriber; the library crates emit events.
//! Diagnostics go to stderr so stdout carries only the action lines.
//! `RUST_LOG` replaces the filter built from `-v` / `-q`.

use std::io::{self, IsTerminal as _};

use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::cli::GlobalArgs;

const CRATES: [&str; 3] = ["strata", "strata_core", "strata_adapters"];

/// Install the global subscriber. Call once, before the first event.
pub fn init_logging(args: &GlobalArgs) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => workspace_filter(level_for(args))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!args.no_color && io::stderr().is_terminal())
        .with_target(args.verbose >= 2)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Cannot install tracing subscriber: {e}"))
}

/// `-q` wins over `-v`; each `-v` raises the level one step from WARN.
fn level_for(args: &GlobalArgs) -> LevelFilter {
    if args.quiet {
        return LevelFilter::ERROR;
    }
    match args.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// `level` for the workspace crates, nothing from dependencies.
fn workspace_filter(level: LevelFilter) -> anyhow::Result<EnvFilter> {
    CRATES.iter().try_fold(EnvFilter::new("off"), |filter, krate| {
        Ok(filter.add_directive(format!("{krate}={level}").parse()?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(verbose: u8, quiet: bool) -> GlobalArgs {
        GlobalArgs {
            verbose,
            quiet,
            ..GlobalArgs::default()
        }
    }

    #[test]
    fn verbosity_steps_up_from_warn() {
        assert_eq!(level_for(&args(0, false)), LevelFilter::WARN);
        assert_eq!(level_for(&args(1, false)), LevelFilter::INFO);
        assert_eq!(level_for(&args(2, false)), LevelFilter::DEBUG);
        assert_eq!(level_for(&args(7, false)), LevelFilter::TRACE);
    }

    #[test]
    fn quiet_overrides_verbose() {
        assert_eq!(level_for(&args(3, true)), LevelFilter::ERROR);
    }

    #[test]
    fn workspace_filter_names_every_crate() {
        let filter = workspace_filter(LevelFilter::DEBUG).unwrap().to_string();
        for krate in CRATES {
            assert!(filter.contains(&format!("{krate}=debug")), "{filter}");
        }
    }
}
