//! Change confirmation against the applied copies of parameters, templates
//! and the project manifest.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_yaml::Value;
use tracing::{debug, instrument};

use crate::{
    application::ApplicationError,
    domain::{ParameterRecord, StackId, advisories, deep_diff, diff},
    error::StrataResult,
};

use super::Engine;

const SEPARATOR: &str = "--------------------------------------------------------";
const STATUS_COL: usize = 12;

impl Engine {
    /// Show parameter changes against the applied `.parameters` file and ask
    /// for confirmation. Parameters submitted with `UsePreviousValue` are
    /// ignored.
    pub fn confirm_parameter_changes(
        &mut self,
        id: StackId,
        records: &[ParameterRecord],
    ) -> StrataResult<()> {
        if self.options.disable_validation {
            return Ok(());
        }
        let paths = self.stack_paths(id)?;
        let Some(text) = self.fs.read_to_string(&paths.applied_parameters)? else {
            return Ok(());
        };
        let mut applied: Vec<ParameterRecord> = if text.trim().is_empty() {
            Vec::new()
        } else {
            serde_yaml::from_str(&text).map_err(|e| ApplicationError::Serialization {
                path: paths.applied_parameters.clone(),
                reason: e.to_string(),
            })?
        };

        let changed = records.len() != applied.len()
            || records.iter().filter(|new| !new.use_previous_value).any(|new| {
                applied
                    .iter()
                    .find(|old| old.parameter_key == new.parameter_key)
                    != Some(new)
            });
        if !changed {
            debug!(stack = %id, "Parameters unchanged");
            return Ok(());
        }

        let (name, config_ref) = {
            let s = self.stack(id)?;
            (s.name().to_string(), s.template.config_ref.clone())
        };
        self.emit(SEPARATOR);
        self.emit(&format!(
            "Confirm changes to Parameters for CloudFormation Stack: {name}"
        ));
        self.emit("");
        self.emit(&name);
        if self.options.verbose {
            self.emit("");
            self.emit(&format!("Model: {config_ref}"));
            self.emit(&format!("Template:  {}", paths.build.display()));
            self.emit(&format!("Applied template:  {}", paths.applied.display()));
            self.emit(&format!(
                "Applied parameters:  {}",
                paths.applied_parameters.display()
            ));
        }
        self.emit("");

        let width = records
            .iter()
            .filter(|r| self.options.verbose || !applied.contains(r))
            .map(|r| r.parameter_key.len())
            .max()
            .unwrap_or(0);

        for new in records.iter().filter(|r| !r.use_previous_value) {
            if let Some(pos) = applied.iter().position(|old| old == new) {
                applied.remove(pos);
                if self.options.verbose {
                    let value = format!(": {}", new.value_or_empty());
                    self.emit(&param_row("Unchanged", &new.parameter_key, width, &value));
                }
                continue;
            }
            match applied
                .iter()
                .position(|old| old.parameter_key == new.parameter_key)
            {
                Some(pos) => {
                    let old = applied.remove(pos);
                    let key = &new.parameter_key;
                    let old_value = format!("old: {}", old.value_or_empty());
                    let new_value = format!("new: {}", new.value_or_empty());
                    self.emit(&param_row("Changed", key, width, &old_value));
                    self.emit(&param_row("Changed", key, width, &new_value));
                    if key == "UserDataScript" {
                        let old_value = format!("old: {}", decode(old.value_or_empty()));
                        let new_value = format!("new: {}", decode(new.value_or_empty()));
                        self.emit(&param_row("Decoded", key, width, &old_value));
                        self.emit(&param_row("Decoded", key, width, &new_value));
                    }
                }
                None => {
                    let value = format!(": {}", new.value_or_empty());
                    self.emit(&param_row("New Param", &new.parameter_key, width, &value));
                }
            }
        }

        for old in applied
            .iter()
            .filter(|old| !records.iter().any(|r| r.parameter_key == old.parameter_key))
        {
            self.emit(&format!(
                "Removed Parameter: {} = {}",
                old.parameter_key,
                old.value_or_empty()
            ));
        }

        self.emit(SEPARATOR);
        self.emit(&format!("Stack: {name}"));
        self.emit("");
        self.ask_acceptable()
    }

    /// Show template changes against the applied copy and ask for
    /// confirmation. With `warn`, advisory warnings precede the prompt.
    #[instrument(skip_all, fields(stack = %id))]
    pub fn confirm_template_changes(&mut self, id: StackId) -> StrataResult<()> {
        if self.options.disable_validation {
            return Ok(());
        }
        let (name, config_ref, enabled, change_protected) = {
            let s = self.stack(id)?;
            (
                s.name().to_string(),
                s.template.config_ref.clone(),
                s.enabled(),
                s.change_protected,
            )
        };
        if !enabled || change_protected {
            return Ok(());
        }

        let paths = self.stack_paths(id)?;
        let Some(applied) = self.read_yaml(&paths.applied)? else {
            return Ok(());
        };
        let Some(current) = self.read_yaml(&paths.build)? else {
            return Ok(());
        };
        let changes = deep_diff(&applied, &current);
        if changes.is_empty() {
            return Ok(());
        }

        self.emit(SEPARATOR);
        self.emit(&format!(
            "Confirm template changes to CloudFormation Stack: {name}"
        ));
        self.emit("");
        self.emit(&name);
        if self.options.verbose {
            self.emit("");
            self.emit(&format!("model: {config_ref}"));
            self.emit(&format!("file: {}", paths.build.display()));
            self.emit(&format!("applied file: {}", paths.applied.display()));
        }
        for line in diff::render(&changes) {
            self.emit(&line);
        }
        self.emit("");
        self.emit(SEPARATOR);
        self.emit(&format!("Stack: {name}"));
        self.emit("");

        if self.options.warn {
            for warning in advisories(&changes) {
                self.emit("");
                self.emit(&warning);
            }
        }
        self.ask_acceptable()
    }

    /// Show changes to the project manifest since the last successful run
    /// and ask for confirmation.
    pub fn confirm_model_changes(&mut self, manifest: &Path) -> StrataResult<()> {
        if self.options.disable_validation {
            return Ok(());
        }
        let applied_path = self.layout.applied_model(self.layout.short(manifest));
        let Some(applied) = self.read_yaml(&applied_path)? else {
            return Ok(());
        };
        let current = self.read_yaml(manifest)?.unwrap_or(Value::Null);
        let changes = deep_diff(&applied, &current);
        if changes.is_empty() {
            return Ok(());
        }

        self.emit(SEPARATOR);
        self.emit("Confirm project changes from previous YAML file:");
        self.emit("");
        self.emit(&manifest.display().to_string());
        if self.options.verbose {
            self.emit("");
            self.emit(&format!("applied file: {}", applied_path.display()));
        }
        for line in diff::render(&changes) {
            self.emit(&line);
        }
        self.emit(SEPARATOR);
        self.ask_acceptable()
    }

    /// Record the manifest as applied.
    pub fn apply_model_file(&mut self, manifest: &Path) -> StrataResult<()> {
        let applied_path = self.layout.applied_model(self.layout.short(manifest));
        self.fs.copy_file(manifest, &applied_path)
    }

    // ----- Internal Helpers -----

    fn ask_acceptable(&mut self) -> StrataResult<()> {
        if self.confirm.confirm("Are these changes acceptable?", false)? {
            self.emit("");
            return Ok(());
        }
        self.emit("Aborted run.");
        Err(ApplicationError::UserAbort.into())
    }

    fn read_yaml(&self, path: &Path) -> StrataResult<Option<Value>> {
        let Some(text) = self.fs.read_to_string(path)? else {
            return Ok(None);
        };
        serde_yaml::from_str(&text)
            .map(Some)
            .map_err(|e| {
                ApplicationError::Serialization {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
                .into()
            })
    }
}

fn param_row(status: &str, key: &str, width: usize, value: &str) -> String {
    format!("  | {status:<STATUS_COL$} | {key:<width$} | {value}")
}

fn decode(value: &str) -> String {
    match STANDARD.decode(value) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => value.to_string(),
    }
}
