//! Output management and formatting.
//!
//! [`OutputManager`] writes the CLI's own messages and is also the engine's
//! [`Reporter`]: action lines, diffs and warnings arrive through
//! [`Reporter::emit`] and are styled by their leading token.

use std::io;

use console::Term;
use owo_colors::OwoColorize;
use tracing::warn;

use strata_core::application::ports::Reporter;

use crate::cli::GlobalArgs;
use crate::config::AppConfig;

/// Manages CLI output based on configuration.
#[derive(Debug, Clone)]
pub struct OutputManager {
    quiet: bool,
    no_color: bool,
    term: Term,
}

impl OutputManager {
    /// Build an `OutputManager` from parsed CLI flags and loaded config.
    pub fn new(args: &GlobalArgs, config: &AppConfig) -> Self {
        let term = Term::stdout();
        Self {
            quiet: args.quiet,
            no_color: args.no_color || config.output.no_color || !term.is_term(),
            term,
        }
    }

    // ── Public write methods ───────────────────────────────────────────────

    /// Generic message; suppressed in quiet mode.
    pub fn print(&self, msg: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.term.write_line(msg)
    }

    /// Success indicator: `✓ <msg>`.
    pub fn success(&self, msg: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let line = if self.no_color {
            format!("\u{2713} {msg}")
        } else {
            format!("{} {}", "\u{2713}".green().bold(), msg.green())
        };
        self.term.write_line(&line)
    }

    /// Bold cyan header line.
    pub fn header(&self, text: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let line = if self.no_color {
            text.to_owned()
        } else {
            text.cyan().bold().to_string()
        };
        self.term.write_line(&line)
    }

    // ── Internal Helpers ──────────────────────────────────────────────────

    fn style(&self, line: &str) -> String {
        if self.no_color {
            return line.to_owned();
        }
        match LineKind::of(line) {
            LineKind::Warning => line.yellow().to_string(),
            LineKind::Failure => line.red().bold().to_string(),
            LineKind::Heading => line.cyan().bold().to_string(),
            LineKind::Plain => line.to_owned(),
        }
    }
}

/// Engine output ignores `--quiet`.
impl Reporter for OutputManager {
    fn emit(&self, line: &str) {
        if let Err(e) = self.term.write_line(&self.style(line)) {
            warn!(error = %e, "Failed to write engine output");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Warning,
    Failure,
    Heading,
    Plain,
}

impl LineKind {
    fn of(line: &str) -> Self {
        let second = line.split('|').nth(1).map(str::trim);
        if line.starts_with("WARNING") {
            Self::Warning
        } else if line.starts_with("Aborted") || line.contains("FAILED") {
            Self::Failure
        } else if second == Some("Account") {
            Self::Heading
        } else {
            Self::Plain
        }
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_manager(quiet: bool, no_color: bool) -> OutputManager {
        let args = GlobalArgs {
            quiet,
            no_color,
            ..GlobalArgs::default()
        };
        OutputManager::new(&args, &AppConfig::default())
    }

    #[test]
    fn quiet_suppresses_print() {
        let out = make_manager(true, true);
        assert!(out.print("hello").is_ok());
    }

    #[test]
    fn config_can_disable_color() {
        let mut config = AppConfig::default();
        config.output.no_color = true;
        let out = OutputManager::new(&GlobalArgs::default(), &config);
        assert_eq!(out.style("Aborted run."), "Aborted run.");
    }

    #[test]
    fn plain_style_leaves_lines_untouched() {
        let out = make_manager(false, true);
        let line = "WARNING: Resource Vpc removed";
        assert_eq!(out.style(line), line);
    }

    #[test]
    fn classifies_engine_lines() {
        assert_eq!(LineKind::of("WARNING: Resource Vpc removed"), LineKind::Warning);
        assert_eq!(LineKind::of("Aborted run."), LineKind::Failure);
        assert_eq!(
            LineKind::of("Stack Status: CREATE_FAILED"),
            LineKind::Failure
        );
        assert_eq!(
            LineKind::of("Provision  | Account            | Action                 | Stack Name"),
            LineKind::Heading
        );
        assert_eq!(
            LineKind::of("Provision | dev                | Create                 | ne-dev-vpc"),
            LineKind::Plain
        );
    }

    #[test]
    fn emit_never_panics_without_a_terminal() {
        make_manager(true, true).emit("Provision | dev | Create | ne-dev-vpc");
    }
}
