//! Non-interactive confirmation adapters.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::debug;

use strata_core::{
    application::{ApplicationError, ports::ConfirmationPort},
    error::StrataResult,
};

/// Answers yes to every question. Backs `--yes`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl ConfirmationPort for AutoConfirm {
    fn confirm(&self, question: &str, _default_yes: bool) -> StrataResult<bool> {
        debug!(question, "Auto-confirmed");
        Ok(true)
    }
}

/// Replays a fixed list of answers and records every question asked.
/// Once the answers run out, the question's default is used. Clones share
/// the same script.
#[derive(Debug, Default, Clone)]
pub struct ScriptedConfirm {
    answers: Arc<Mutex<VecDeque<bool>>>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into_iter().collect())),
            asked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Questions asked so far, oldest first.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|q| q.clone()).unwrap_or_default()
    }

    /// Answers not yet consumed.
    pub fn remaining(&self) -> usize {
        self.answers.lock().map(|a| a.len()).unwrap_or_default()
    }
}

impl ConfirmationPort for ScriptedConfirm {
    fn confirm(&self, question: &str, default_yes: bool) -> StrataResult<bool> {
        self.asked
            .lock()
            .map_err(|_| ApplicationError::StoreLockError)?
            .push(question.to_string());
        let answer = self
            .answers
            .lock()
            .map_err(|_| ApplicationError::StoreLockError)?
            .pop_front()
            .unwrap_or(default_yes);
        debug!(question, answer, "Scripted answer");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_answers_then_defaults() {
        let confirm = ScriptedConfirm::new([false, true]);
        assert!(!confirm.confirm("first?", true).unwrap());
        assert!(confirm.confirm("second?", false).unwrap());
        assert!(!confirm.confirm("third?", false).unwrap());
        assert_eq!(confirm.asked(), vec!["first?", "second?", "third?"]);
        assert_eq!(confirm.remaining(), 0);
    }

    #[test]
    fn auto_confirm_ignores_default() {
        assert!(AutoConfirm.confirm("Destroy?", false).unwrap());
    }
}
