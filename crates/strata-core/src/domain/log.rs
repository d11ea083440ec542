//! Column-formatted action lines: `| Provision | dev | Create | stack-name`.

/// Widths of every column except the last.
pub const COLUMN_WIDTHS: [usize; 3] = [10, 19, 23];

const BARS: &str = "| ";

/// Format `columns` into one action line.
///
/// Columns stop at the first empty one. Every column except the last is
/// truncated or padded to its width; the last is written in full.
pub fn format_action_col(columns: &[&str]) -> String {
    let cols: Vec<&str> = columns
        .iter()
        .copied()
        .take_while(|c| !c.is_empty())
        .collect();

    let mut line = String::new();
    for (idx, col) in cols.iter().enumerate() {
        line.push_str(BARS);
        if idx + 1 == cols.len() {
            line.push_str(col);
        } else {
            let width = COLUMN_WIDTHS.get(idx).copied().unwrap_or(col.len());
            let cell: String = col.chars().take(width).collect();
            line.push_str(&format!("{cell:<width$} "));
        }
    }
    line
}

/// Which action lines are shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogPolicy {
    pub verbose: bool,
    pub quiet_changes_only: bool,
}

impl LogPolicy {
    /// Filter on the first column: `Init` and `Skipping` need verbose.
    pub fn shows_action(&self, action: &str) -> bool {
        self.verbose || !matches!(action, "Init" | "Skipping")
    }

    /// Filter on the stack-action column.
    pub fn shows_stack_action(&self, stack_action: &str) -> bool {
        if self.quiet_changes_only
            && matches!(
                stack_action,
                "Protected" | "Disabled" | "Cache" | "Wait" | "Done"
            )
        {
            return false;
        }
        self.verbose || !matches!(stack_action, "Wait" | "Done")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_and_separates_columns() {
        let line = format_action_col(&["Provision", "dev", "Create", "ne-app-web"]);
        assert_eq!(
            line,
            format!(
                "| {:<10} | {:<19} | {:<23} | ne-app-web",
                "Provision", "dev", "Create"
            )
        );
    }

    #[test]
    fn truncates_long_columns() {
        let line = format_action_col(&["ProvisionXYZ", "x"]);
        assert!(line.starts_with("| ProvisionX | x"));
    }

    #[test]
    fn stops_at_first_empty_column() {
        assert_eq!(format_action_col(&["Init", "", "ignored"]), "| Init");
    }

    #[test]
    fn policy_suppresses_noise() {
        let quiet = LogPolicy {
            verbose: false,
            quiet_changes_only: true,
        };
        assert!(!quiet.shows_stack_action("Cache"));
        assert!(!quiet.shows_stack_action("Protected"));
        assert!(quiet.shows_stack_action("Create"));

        let normal = LogPolicy::default();
        assert!(normal.shows_stack_action("Cache"));
        assert!(!normal.shows_stack_action("Wait"));
        assert!(!normal.shows_action("Init"));

        let verbose = LogPolicy {
            verbose: true,
            quiet_changes_only: false,
        };
        assert!(verbose.shows_stack_action("Done"));
        assert!(verbose.shows_action("Skipping"));
    }
}
