//! `strata validate|provision|delete`: load the manifest, build the engine
//! and run one pass over the selected stacks.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, instrument};

use strata_adapters::{
    AutoConfirm, LocalFilesystem, Manifest, MemoryCloudFormation, StaticSessions, default_registry,
};
use strata_core::{
    application::{Engine, EngineOptions, ports::ConfirmationPort},
    error::StrataResult,
};

use crate::{
    cli::{GlobalArgs, RunArgs},
    config::AppConfig,
    confirm::TerminalConfirm,
    error::{CliError, CliResult},
    output::OutputManager,
};

/// The pass to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Validate,
    Provision,
    Delete,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validate => write!(f, "Validate"),
            Self::Provision => write!(f, "Provision"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

#[instrument(skip_all, fields(pass = %pass, scope = %args.scope))]
pub fn execute(
    pass: Pass,
    args: RunArgs,
    global: &GlobalArgs,
    config: &AppConfig,
    output: &OutputManager,
) -> CliResult<()> {
    if args.scope.trim().is_empty() {
        return Err(CliError::InvalidInput {
            message: "scope must be a reference or 'project'".into(),
        });
    }

    let home = global.home.clone().unwrap_or_else(|| config.engine.home.clone());
    let home = std::path::absolute(&home).map_err(|source| CliError::IoError {
        message: format!("Cannot resolve project home {}", home.display()),
        source,
    })?;
    let manifest_path = AppConfig::under_home(&home, &config.engine.manifest);
    let state_path = AppConfig::under_home(&home, &config.engine.provider_state);

    let fs = LocalFilesystem::new();
    let manifest = Manifest::load(&fs, &manifest_path)?;
    let provider =
        MemoryCloudFormation::with_state_file(&state_path).map_err(|e| CliError::Provider {
            message: e.to_string(),
        })?;
    let confirm: Box<dyn ConfirmationPort> = if global.yes {
        Box::new(AutoConfirm)
    } else {
        Box::new(TerminalConfirm)
    };

    let mut engine = Engine::new(
        engine_options(home, global, config),
        Box::new(fs),
        Box::new(StaticSessions::new(provider)),
        confirm,
        Box::new(output.clone()),
        Box::new(manifest.model()),
    );
    let stacks = manifest.register(&mut engine, &default_registry())?;
    let filter = args.filter_prefix();
    engine.set_filter(filter.as_deref());
    info!(stacks = stacks.len(), filter = ?filter, "Engine ready");

    // Outputs gathered before a failure are still written.
    let result = run_pass(&mut engine, pass, &manifest_path);
    let flushed = engine.finish();
    result?;
    flushed?;

    output.success(&format!("{pass} complete"))?;
    Ok(())
}

// ----- Internal Helpers -----

fn run_pass(engine: &mut Engine, pass: Pass, manifest_path: &std::path::Path) -> StrataResult<()> {
    match pass {
        Pass::Validate => engine.validate(),
        Pass::Provision => {
            engine.confirm_model_changes(manifest_path)?;
            engine.provision()?;
            engine.apply_model_file(manifest_path)
        }
        Pass::Delete => engine.delete(),
    }
}

fn engine_options(home: PathBuf, global: &GlobalArgs, config: &AppConfig) -> EngineOptions {
    EngineOptions {
        home,
        nocache: global.nocache,
        verbose: global.verbose > 0,
        quiet_changes_only: global.quiet_changes_only,
        warn: global.warn,
        disable_validation: global.disable_validation,
        throttle_delay: Duration::from_millis(config.engine.throttle_delay_ms),
        template_size_warning: config.engine.template_size_warning,
    }
}
