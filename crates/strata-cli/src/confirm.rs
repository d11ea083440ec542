//! Terminal confirmation prompts.

use std::io::{self, BufRead, IsTerminal as _, Write as _};

use tracing::debug;

use strata_core::{application::ports::ConfirmationPort, error::StrataError, error::StrataResult};

/// Asks on the terminal. Uses `dialoguer` when stdin is a TTY and the
/// `interactive` feature is on, otherwise reads a line from stdin. End of
/// input takes the default answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

impl ConfirmationPort for TerminalConfirm {
    fn confirm(&self, question: &str, default_yes: bool) -> StrataResult<bool> {
        let answer = if cfg!(feature = "interactive") && io::stdin().is_terminal() {
            interactive(question, default_yes)?
        } else {
            line_prompt(question, default_yes, &mut io::stdin().lock())?
        };
        debug!(question, answer, "Confirmation answered");
        Ok(answer)
    }
}

// ----- Internal Helpers -----

#[cfg(feature = "interactive")]
fn interactive(question: &str, default_yes: bool) -> StrataResult<bool> {
    dialoguer::Confirm::new()
        .with_prompt(question)
        .default(default_yes)
        .interact()
        .map_err(|e| StrataError::Internal {
            message: format!("Prompt failed: {e}"),
        })
}

#[cfg(not(feature = "interactive"))]
fn interactive(question: &str, default_yes: bool) -> StrataResult<bool> {
    line_prompt(question, default_yes, &mut io::stdin().lock())
}

fn line_prompt(question: &str, default_yes: bool, input: &mut dyn BufRead) -> StrataResult<bool> {
    let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
    loop {
        eprint!("{question} {hint} ");
        let _ = io::stderr().flush();

        let mut line = String::new();
        let read = input.read_line(&mut line).map_err(|e| StrataError::Internal {
            message: format!("Cannot read answer: {e}"),
        })?;
        if read == 0 {
            eprintln!();
            return Ok(default_yes);
        }
        match parse_answer(&line, default_yes) {
            Some(answer) => return Ok(answer),
            None => eprintln!("Please answer 'y' or 'n'."),
        }
    }
}

fn parse_answer(line: &str, default_yes: bool) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => Some(default_yes),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}
