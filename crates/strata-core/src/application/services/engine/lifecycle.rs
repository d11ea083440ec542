//! Single-stack lifecycle: template generation, validation, provisioning,
//! deletion, waiting and the applied-state cache.

use std::path::PathBuf;

use serde_yaml::{Mapping, Value};
use tracing::{info, instrument, warn};

use crate::{
    application::{
        ApplicationError,
        ports::{
            CreateStackInput, ProviderError, ProviderErrorKind, SubmitOutcome, UpdateStackInput,
            Waiter,
        },
    },
    domain::{
        CacheInputs, HookTiming, Parameter, ParameterEntry, ParameterMode, ParameterRecord,
        Reference, StackAction, StackId, StackStatus, cache_id, merge_mappings, output_dict, sub,
    },
    error::{StrataError, StrataResult},
};

use super::Engine;

/// Hard provider limit on inline template bodies.
const TEMPLATE_SIZE_LIMIT: usize = 51_200;

/// Every file a stack owns.
#[derive(Debug, Clone)]
pub(super) struct StackPaths {
    pub build: PathBuf,
    pub cache: PathBuf,
    pub output: PathBuf,
    pub applied: PathBuf,
    pub applied_parameters: PathBuf,
}

impl Engine {
    // ========================================================================
    // Template
    // ========================================================================

    /// Resolve `paco.sub` expressions and write the template to the build
    /// directory.
    #[instrument(skip_all, fields(stack = %id))]
    pub fn generate_template(&mut self, id: StackId) -> StrataResult<String> {
        let (raw, tokens, name) = {
            let s = self.stack(id)?;
            (s.template.body.clone(), self.tokens(id)?, s.name().to_string())
        };

        let rendered = sub::apply(&raw, &tokens, |reference: &Reference| {
            self.resolve_value(reference)
                .map_err(|e| with_stack_context(e, &name))
        })?;

        let paths = self.stack_paths(id)?;
        self.fs.write_file(&paths.build, &rendered)?;

        let size = rendered.len();
        if size >= self.options.template_size_warning {
            warn!(stack = %name, size, "Template is approaching the size limit");
            self.emit(&format!(
                "WARNING: Template is reaching size limit of {TEMPLATE_SIZE_LIMIT} bytes: Current size: {size} bytes "
            ));
            self.emit(&format!("template: {}", paths.build.display()));
        }

        self.rendered.insert(id, rendered.clone());
        Ok(rendered)
    }

    // ========================================================================
    // Validate
    // ========================================================================

    /// Validate the template with the provider and confirm template changes
    /// against the applied copy.
    #[instrument(skip_all, fields(stack = %id))]
    pub fn validate_stack(&mut self, id: StackId) -> StrataResult<()> {
        let paths = self.stack_paths(id)?;
        let short = self.layout.short(&paths.build).display().to_string();
        let (account, enabled, change_protected) = {
            let s = self.stack(id)?;
            (s.account.clone(), s.enabled(), s.change_protected)
        };

        if !enabled || change_protected {
            let verb = if enabled { "Protected" } else { "Disabled" };
            if !self.options.quiet_changes_only {
                self.log_cols("Validate", &account, verb, &short);
            }
            return Ok(());
        }

        let body = self.generate_template(id)?;
        let verb = if self.fs.exists(&paths.applied) {
            "Template"
        } else {
            "Template:new"
        };
        self.log_cols("Validate", &account, verb, &short);

        match self.call(id, |cf, _| cf.validate_template(&body))? {
            Ok(()) => {}
            Err(e) if e.code == "ValidationError" => {
                return Err(ApplicationError::TemplateValidation {
                    stack: self.stack(id)?.name().to_string(),
                    template: paths.build,
                    message: e.message,
                }
                .into());
            }
            Err(e) => return Err(self.provider_error(id, e.to_string())?),
        }

        self.confirm_template_changes(id)
    }

    // ========================================================================
    // Provision
    // ========================================================================

    /// Generate the template, skip when cached, otherwise create or update
    /// depending on the live status.
    #[instrument(skip_all, fields(stack = %id))]
    pub fn provision_stack(&mut self, id: StackId) -> StrataResult<()> {
        self.generate_template(id)?;

        if self.is_stack_cached(id)? {
            let verb = if self.stack(id)?.change_protected {
                "Protected"
            } else {
                "Cache"
            };
            self.log_action(id, "Provision", verb, None)?;
            return Ok(());
        }

        let mut status = self.get_status(id)?;
        if status.is_failed() {
            self.recover_failed(id, status)?;
            status = self.get_status(id)?;
        }

        if status == StackStatus::DoesNotExist {
            self.create_stack(id)
        } else if status.is_complete() {
            self.update_stack(id)
        } else if status.is_creating() {
            self.log_action(id, "Provision", "Create", None)?;
            self.stack_mut(id)?.action = Some(StackAction::Create);
            Ok(())
        } else if status.is_deleting() {
            self.log_action(id, "Delete", "Stack", None)?;
            self.stack_mut(id)?.action = Some(StackAction::Delete);
            Ok(())
        } else if status.is_updating() {
            self.log_action(id, "Provision", "Update", None)?;
            self.stack_mut(id)?.action = Some(StackAction::Update);
            Ok(())
        } else {
            self.log_action(id, "Provision", "Error", None)?;
            let message = self.stack_error_message(id, "", false)?;
            Err(self.provider_error(id, message)?)
        }
    }

    /// Submit a create. Disabled and update-only stacks are skipped.
    pub fn create_stack(&mut self, id: StackId) -> StrataResult<()> {
        let (enabled, update_only) = {
            let s = self.stack(id)?;
            (s.enabled(), s.template.update_only)
        };
        if !enabled {
            return self.log_action(id, "Provision", "Disabled", None);
        }
        if update_only {
            return self.log_action(id, "Skipping", "Create", Some("update only"));
        }

        self.stack_mut(id)?.action = Some(StackAction::Create);
        self.log_action(id, "Provision", "Create", None)?;

        let parameters = match self.generate_stack_parameters(id, ParameterMode::Create) {
            Ok(parameters) => parameters,
            Err(e) => return Err(self.parameter_error(id, e)?),
        };
        self.run_hooks(id, StackAction::Create, HookTiming::Pre)?;

        let input = {
            let s = self.stack(id)?;
            CreateStackInput {
                stack_name: s.name().to_string(),
                template_body: self.template_body(id)?,
                parameters,
                disable_rollback: true,
                capabilities: s.template.capabilities.clone(),
                tags: s.tags.cf_list(),
            }
        };
        let outcome = self.call(id, |cf, _| submitted(cf.create_stack(&input)))?;
        match outcome {
            Ok(SubmitOutcome::Submitted(stack_id)) => {
                info!(stack = %input.stack_name, %stack_id, "Create submitted");
                self.stack_mut(id)?.stack_id = Some(stack_id);
            }
            Ok(_) => {}
            Err(e) => {
                let message = self.stack_error_message(id, &format!("{e}\n"), false)?;
                return Err(self.provider_error(id, message)?);
            }
        }

        self.set_termination_protection(id, true)
    }

    /// Confirm parameter and template changes, then submit an update.
    /// Change-protected stacks are skipped.
    pub fn update_stack(&mut self, id: StackId) -> StrataResult<()> {
        if self.stack(id)?.change_protected {
            return self.log_action(id, "Provision", "Protected", None);
        }
        self.stack_mut(id)?.action = Some(StackAction::Update);

        let parameters = self.generate_stack_parameters(id, ParameterMode::Update)?;
        self.confirm_parameter_changes(id, &parameters)?;
        self.confirm_template_changes(id)?;
        self.log_action(id, "Provision", "Update", None)?;
        self.run_hooks(id, StackAction::Update, HookTiming::Pre)?;

        let input = {
            let s = self.stack(id)?;
            UpdateStackInput {
                stack_name: s.name().to_string(),
                template_body: self.template_body(id)?,
                parameters,
                capabilities: s.template.capabilities.clone(),
                tags: s.tags.cf_list(),
            }
        };
        match self.call(id, |cf, _| submitted(cf.update_stack(&input)))? {
            Ok(SubmitOutcome::Submitted(stack_id)) => {
                info!(stack = %input.stack_name, %stack_id, "Update submitted");
                self.stack_mut(id)?.stack_id = Some(stack_id);
            }
            Ok(_) => {
                self.log_action(id, "Provision", "Done", None)?;
                self.stack_success(id)?;
            }
            Err(e) => {
                let mut message = self.stack_error_message(id, "", false)?;
                message.push_str(&format!("{}: {}\n", e.code, e.message));
                return Err(self.provider_error(id, message)?);
            }
        }

        if self.stack(id)?.live_termination_protection == Some(false) {
            self.set_termination_protection(id, true)?;
        }
        Ok(())
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Submit a delete. Change-protected stacks are skipped; stacks with
    /// termination protection need a second confirmation.
    pub fn delete_stack(&mut self, id: StackId) -> StrataResult<()> {
        if self.stack(id)?.change_protected {
            return self.log_action(id, "Delete", "Protected", None);
        }
        let status = self.get_status(id)?;
        self.stack_mut(id)?.action = Some(StackAction::Delete);

        if status.is_exists() {
            let (name, termination_protection) = {
                let s = self.stack(id)?;
                (s.name().to_string(), s.termination_protection)
            };
            if termination_protection {
                self.emit("");
                self.emit("This Stack has Termination Protection enabled!");
                self.emit(&format!("Stack Name: {name}"));
                if !self.confirm.confirm("Destroy this stack forever?", false)? {
                    self.emit("Destruction aborted. Allowing stack to exist.");
                    self.stack_mut(id)?.action = None;
                    return Ok(());
                }
            }
            if !status.is_deleting() {
                self.set_termination_protection(id, false)?;
            }
        }

        self.log_action(id, "Delete", "Stack", None)?;
        self.run_hooks(id, StackAction::Delete, HookTiming::Pre)?;

        if status.is_exists() {
            if let Err(e) = self.call(id, |cf, name| cf.delete_stack(name))? {
                let message = self.stack_error_message(id, &format!("{e}\n"), false)?;
                return Err(self.provider_error(id, message)?);
            }
            if self.stack(id)?.wait_for_delete {
                self.wait_for_complete(id)?;
            }
        }
        Ok(())
    }

    /// Remove the applied and build state, then delete the stack.
    pub fn delete_applied_stack(&mut self, id: StackId) -> StrataResult<()> {
        if self.stack(id)?.change_protected {
            return self.log_action(id, "Delete", "Protected", None);
        }
        let paths = self.stack_paths(id)?;

        for (kind, stage, path) in [
            ("Template", "Applied", &paths.applied),
            ("Parameters", "Applied", &paths.applied_parameters),
            ("Template", "Build", &paths.build),
        ] {
            if self.options.verbose {
                let short = self.layout.short(path).display().to_string();
                self.log_cols("Delete", kind, stage, &short);
            }
            self.fs.remove_file(path)?;
        }

        self.delete_stack(id)?;

        for (stage, path) in [("Cache", &paths.cache), ("Outputs", &paths.output)] {
            let short = self.layout.short(path).display().to_string();
            self.log_cols("Delete", "Stack", stage, &short);
            self.fs.remove_file(path)?;
        }
        Ok(())
    }

    // ========================================================================
    // Wait
    // ========================================================================

    /// Wait for the in-flight action to settle, then record success and run
    /// post hooks.
    #[instrument(skip_all, fields(stack = %id))]
    pub fn wait_for_complete(&mut self, id: StackId) -> StrataResult<()> {
        loop {
            let Some(action) = self.stack(id)?.action else {
                return Ok(());
            };
            let status = self.get_status(id)?;

            let (waiter, action_name) = if status.is_updating() {
                (Some(Waiter::StackUpdateComplete), "Provision")
            } else if status.is_creating() {
                (Some(Waiter::StackCreateComplete), "Provision")
            } else if status.is_deleting() {
                (Some(Waiter::StackDeleteComplete), "Delete")
            } else if status.is_complete() || !status.is_exists() {
                (None, "Provision")
            } else {
                let message = self.stack_error_message(id, "", true)?;
                return Err(ApplicationError::Waiter {
                    stack: self.stack(id)?.name().to_string(),
                    message,
                }
                .into());
            };

            if let Some(waiter) = waiter {
                self.log_action(id, action_name, "Wait", None)?;
                let (account, region, name) = {
                    let s = self.stack(id)?;
                    (s.account.clone(), s.region.clone(), s.name().to_string())
                };
                let client = self.client(&account, &region)?;
                match client.wait(waiter, &name) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ProviderErrorKind::ExpiredToken => {
                        self.handle_token_expired(id)?;
                        continue;
                    }
                    Err(e) => {
                        self.log_action(id, action_name, "Error", None)?;
                        let message =
                            self.stack_error_message(id, &format!("Waiter Error:  {e}\n"), false)?;
                        return Err(ApplicationError::Waiter {
                            stack: name,
                            message,
                        }
                        .into());
                    }
                }
                self.log_action(id, action_name, "Done", None)?;
            }

            if status.is_exists() {
                self.stack_success(id)?;
            }
            return self.run_hooks(id, action, HookTiming::Post);
        }
    }

    // ========================================================================
    // Applied-state cache
    // ========================================================================

    /// Cache id of the stack as it would be provisioned now, or `None` if
    /// the build template is not on disk.
    pub fn gen_cache_id(&mut self, id: StackId) -> StrataResult<Option<String>> {
        let paths = self.stack_paths(id)?;
        let Some(body) = self.fs.read_to_string(&paths.build)? else {
            return Ok(None);
        };
        let values: Vec<String> = self
            .materialize_parameters(id)?
            .into_iter()
            .map(|p| p.value)
            .collect();

        let s = self.stack(id)?;
        let tags_id = s.tags.cache_id();
        let hooks_id = s.hooks.cache_id(s.name());
        Ok(Some(cache_id(&CacheInputs {
            template_body: &body,
            parameter_values: &values,
            tags_id: &tags_id,
            hooks_id: &hooks_id,
            termination_protection: s.termination_protection,
        })))
    }

    /// True if the on-disk cache id matches. A hit marks the stack cached
    /// and loads its last outputs.
    pub fn is_stack_cached(&mut self, id: StackId) -> StrataResult<bool> {
        let (do_not_cache, dependency_group, file_id) = {
            let s = self.stack(id)?;
            (
                s.do_not_cache,
                s.dependency_group,
                s.template_file_id.clone(),
            )
        };

        if self.options.nocache || do_not_cache {
            if !dependency_group {
                return Ok(false);
            }
            if self.get_status(id)? == StackStatus::DoesNotExist {
                return Ok(false);
            }
            if file_id.is_some_and(|f| !f.starts_with("parent-")) {
                return Ok(false);
            }
        }

        let new_id = match self.gen_cache_id(id) {
            Ok(Some(new_id)) => new_id,
            Ok(None) => return Ok(false),
            Err(StrataError::Application(
                ApplicationError::StackDoesNotExist { .. }
                | ApplicationError::StackOutputMissing { .. },
            )) => return Ok(false),
            Err(e) => return Err(e),
        };

        let paths = self.stack_paths(id)?;
        let on_disk = self.fs.read_to_string(&paths.cache)?;
        if on_disk.as_deref().map(str::trim_end) != Some(new_id.as_str()) {
            return Ok(false);
        }

        let outputs = match self.fs.read_to_string(&paths.output)? {
            Some(text) => Some(parse_mapping(&paths.output, &text)?),
            None => None,
        };
        let s = self.stack_mut(id)?;
        s.cached = true;
        if outputs.is_some() {
            s.output_config_dict = outputs;
        }
        Ok(true)
    }

    /// Record a successful create or update: cache id, outputs, applied
    /// template and applied parameters.
    pub fn stack_success(&mut self, id: StackId) -> StrataResult<()> {
        if self.stack(id)?.action == Some(StackAction::Delete) {
            return Ok(());
        }
        let paths = self.stack_paths(id)?;

        if let Some(new_id) = self.gen_cache_id(id)? {
            self.fs.write_file(&paths.cache, &new_id)?;
        }

        self.save_stack_outputs(id, &paths)?;

        if self.fs.exists(&paths.build) {
            self.fs.copy_file(&paths.build, &paths.applied)?;
        }

        let records = self.generate_stack_parameters(id, ParameterMode::Create)?;
        let text = serde_yaml::to_string(&records).map_err(|e| ApplicationError::Serialization {
            path: paths.applied_parameters.clone(),
            reason: e.to_string(),
        })?;
        self.fs.write_file(&paths.applied_parameters, &text)
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// The parameter list submitted for `mode`, one entry per parameter in
    /// insertion order.
    pub fn generate_stack_parameters(
        &mut self,
        id: StackId,
        mode: ParameterMode,
    ) -> StrataResult<Vec<ParameterRecord>> {
        Ok(self
            .materialize_parameters(id)?
            .iter()
            .map(|p| ParameterRecord::from_parameter(p, mode))
            .collect())
    }

    // ----- Internal Helpers -----

    pub(super) fn stack_paths(&self, id: StackId) -> StrataResult<StackPaths> {
        let s = self.stack(id)?;
        let stem = s.file_stem();
        Ok(StackPaths {
            build: self.layout.build_template(&s.account, &s.region, &stem),
            cache: self.layout.cache_file(&s.account, &s.region, &stem),
            output: self.layout.output_file(&s.account, &s.region, &stem),
            applied: self.layout.applied_template(&s.account, &s.region, &stem),
            applied_parameters: self.layout.applied_parameters(&s.account, &s.region, &stem),
        })
    }

    /// Read every output-backed parameter's value.
    fn materialize_parameters(&mut self, id: StackId) -> StrataResult<Vec<Parameter>> {
        let entries: Vec<ParameterEntry> = self.stack(id)?.parameters.iter().cloned().collect();
        let mut parameters = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                ParameterEntry::Literal(parameter) => parameters.push(parameter),
                ParameterEntry::Output(param) => {
                    let mut values = Vec::new();
                    for (upstream, key) in param.lookups() {
                        values.push(self.get_outputs_value(upstream, key)?);
                    }
                    parameters.push(param.to_parameter(values.join(",")));
                }
            }
        }
        Ok(parameters)
    }

    fn save_stack_outputs(&mut self, id: StackId, paths: &StackPaths) -> StrataResult<()> {
        let configs = self.stack(id)?.output_configs.clone();
        let mut outputs = Mapping::new();
        for config in configs {
            let value = self.get_outputs_value(id, &config.key)?;
            merge_mappings(&mut outputs, output_dict(&config.config_ref, &value));
        }

        let text = serde_yaml::to_string(&outputs).map_err(|e| ApplicationError::Serialization {
            path: paths.output.clone(),
            reason: e.to_string(),
        })?;
        self.fs.write_file(&paths.output, &text)?;
        self.outputs.add(self.fs.as_ref(), &outputs)?;
        self.stack_mut(id)?.output_config_dict = Some(outputs);
        Ok(())
    }

    fn run_hooks(&mut self, id: StackId, action: StackAction, timing: HookTiming) -> StrataResult<()> {
        let (name, hooks) = {
            let s = self.stack(id)?;
            (s.name().to_string(), s.hooks.bucket(action, timing).to_vec())
        };
        for hook in hooks {
            let line = format!("{}: {}: {}", hook.name, timing, action);
            self.log_action(id, "Run", "Hook", Some(line.as_str()))?;
            hook.invoke(&name)
                .map_err(|reason| ApplicationError::HookFailed {
                    hook: hook.name.clone(),
                    stack: name.clone(),
                    reason,
                })?;
        }
        Ok(())
    }

    fn template_body(&self, id: StackId) -> StrataResult<String> {
        match self.rendered.get(&id) {
            Some(body) => Ok(body.clone()),
            None => {
                let paths = self.stack_paths(id)?;
                Ok(self.fs.read_to_string(&paths.build)?.unwrap_or_default())
            }
        }
    }

    fn set_termination_protection(&mut self, id: StackId, enabled: bool) -> StrataResult<()> {
        match self.call(id, |cf, name| cf.update_termination_protection(name, enabled))? {
            Ok(()) => {
                self.stack_mut(id)?.live_termination_protection = Some(enabled);
                Ok(())
            }
            Err(e) => Err(self.provider_error(id, e.to_string())?),
        }
    }

    /// A failed stack is reported and, once confirmed, deleted.
    fn recover_failed(&mut self, id: StackId, status: StackStatus) -> StrataResult<()> {
        self.emit("--------------------------------------------------------");
        self.log_action(id, "Provision", "Failed", None)?;
        self.emit(&format!("The stack is in a '{status}' state."));
        let message = self.stack_error_message(id, "", true)?;
        for line in message.lines() {
            self.emit(line);
        }
        self.emit("--------------------------------------------------------");

        if self.confirm.confirm("Delete it?", true)? {
            self.delete_applied_stack(id)?;
            self.wait_for_complete(id)?;
            // The build template was removed with the applied state.
            if let Some(body) = self.rendered.get(&id).cloned() {
                let paths = self.stack_paths(id)?;
                self.fs.write_file(&paths.build, &body)?;
            }
            Ok(())
        } else {
            self.log_action(id, "Provision", "Aborted", None)?;
            Err(ApplicationError::UserAbort.into())
        }
    }

    /// Annotate output lookup failures raised while generating parameters.
    fn parameter_error(&mut self, id: StackId, err: StrataError) -> StrataResult<StrataError> {
        match err {
            StrataError::Application(ApplicationError::StackDoesNotExist { stack, message }) => {
                self.log_action(id, "Provision", "Error", None)?;
                let name = self.stack(id)?.name().to_string();
                Ok(ApplicationError::StackDoesNotExist {
                    stack,
                    message: format!(
                        "{message}\nError generating stack parameters for template\nStack: {name}\nError: Depends on StackOutputs from a stack that does not yet exist.\n"
                    ),
                }
                .into())
            }
            other => Ok(other),
        }
    }
}

/// Map a submission outcome so provider errors flow through the retry loop.
fn submitted(outcome: SubmitOutcome) -> Result<SubmitOutcome, ProviderError> {
    match outcome {
        SubmitOutcome::Error(e) => Err(e),
        other => Ok(other),
    }
}

fn with_stack_context(err: StrataError, stack: &str) -> StrataError {
    match err {
        StrataError::Application(ApplicationError::UnresolvedReference { reference, context }) => {
            ApplicationError::UnresolvedReference {
                reference,
                context: format!("{context}\nStack: {stack}"),
            }
            .into()
        }
        other => other,
    }
}

pub(super) fn parse_mapping(path: &std::path::Path, text: &str) -> StrataResult<Mapping> {
    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Mapping(map)) => Ok(map),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(ApplicationError::Serialization {
            path: path.to_path_buf(),
            reason: "expected a mapping".into(),
        }
        .into()),
        Err(e) => Err(ApplicationError::Serialization {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()),
    }
}
