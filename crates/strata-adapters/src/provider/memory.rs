//! In-process CloudFormation simulator.
//!
//! Stacks move through `*_IN_PROGRESS` on submission and settle when a
//! waiter is called, the way the real service settles between a submit and
//! its waiter. Outputs are taken from the template's `Outputs` section
//! (value `<stack>-<Key>`) unless a test pins them with
//! [`MemoryCloudFormation::set_outputs`].
//!
//! State is shared between clones. With a state file the stack table is
//! loaded on construction and written back after every mutation, so
//! separate CLI runs see each other's stacks.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use strata_core::{
    application::ports::{
        CloudFormation, CreateStackInput, ProviderError, StackDescription, StackEvent,
        StackOutput, SubmitOutcome, UpdateStackInput, Waiter,
    },
    domain::{ParameterRecord, StackStatus, Tag},
};

/// Provider operations, for scripting failures and inspecting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOp {
    DescribeStack,
    DescribeStackEvents,
    ValidateTemplate,
    CreateStack,
    UpdateStack,
    DeleteStack,
    UpdateTerminationProtection,
    Wait,
}

impl ProviderOp {
    /// True for calls that change provider state.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::CreateStack
                | Self::UpdateStack
                | Self::DeleteStack
                | Self::UpdateTerminationProtection
        )
    }
}

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub op: ProviderOp,
    pub account: String,
    pub region: String,
    /// Stack name, or empty for template validation.
    pub stack: String,
    /// Parameters of a create or update.
    pub parameters: Vec<ParameterRecord>,
}

/// A simulated stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStack {
    pub stack_id: String,
    pub status: StackStatus,
    #[serde(default)]
    pub termination_protection: bool,
    #[serde(default)]
    pub template_body: String,
    #[serde(default)]
    pub parameters: Vec<ParameterRecord>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub outputs: Vec<StackOutput>,
    /// Newest first.
    #[serde(default)]
    pub events: Vec<StackEvent>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    /// Keyed by `<account>/<region>/<stack name>`.
    stacks: BTreeMap<String, SimStack>,
    #[serde(skip)]
    pinned_outputs: HashMap<String, Vec<StackOutput>>,
    #[serde(skip)]
    failures: HashMap<ProviderOp, VecDeque<ProviderError>>,
    #[serde(skip)]
    calls: Vec<ProviderCall>,
}

/// The simulator handle. [`Self::scoped`] binds it to an account and region.
#[derive(Debug, Clone)]
pub struct MemoryCloudFormation {
    state: Arc<RwLock<State>>,
    state_file: Option<PathBuf>,
    account: String,
    region: String,
}

impl Default for MemoryCloudFormation {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloudFormation {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            state_file: None,
            account: String::new(),
            region: String::new(),
        }
    }

    /// Load the stack table from `path` if it exists and persist to it.
    pub fn with_state_file(path: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<State>(&text).map_err(|e| {
                internal(format!("Invalid provider state {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State::default(),
            Err(e) => {
                return Err(internal(format!(
                    "Cannot read provider state {}: {e}",
                    path.display()
                )));
            }
        };
        debug!(path = %path.display(), stacks = state.stacks.len(), "Provider state loaded");
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            state_file: Some(path),
            account: String::new(),
            region: String::new(),
        })
    }

    /// A client for one account and region sharing this simulator's state.
    pub fn scoped(&self, account: &str, region: &str) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_file: self.state_file.clone(),
            account: account.to_string(),
            region: region.to_string(),
        }
    }

    // ========================================================================
    // Scripting and inspection
    // ========================================================================

    /// Fail the next call of `op` with `error`. Queued errors are used in
    /// order.
    pub fn fail_next(&self, op: ProviderOp, error: ProviderError) {
        if let Ok(mut state) = self.state.write() {
            state.failures.entry(op).or_default().push_back(error);
        }
    }

    /// Insert or replace a stack.
    pub fn put_stack(&self, account: &str, region: &str, name: &str, stack: SimStack) {
        if let Ok(mut state) = self.state.write() {
            state.stacks.insert(key(account, region, name), stack);
        }
    }

    /// A stack in `status` with no template.
    pub fn seed(&self, account: &str, region: &str, name: &str, status: StackStatus) {
        self.put_stack(
            account,
            region,
            name,
            SimStack {
                stack_id: stack_arn(account, region, name),
                status,
                termination_protection: false,
                template_body: String::new(),
                parameters: Vec::new(),
                tags: Vec::new(),
                outputs: Vec::new(),
                events: Vec::new(),
            },
        );
    }

    pub fn set_status(&self, account: &str, region: &str, name: &str, status: StackStatus) {
        if let Ok(mut state) = self.state.write()
            && let Some(stack) = state.stacks.get_mut(&key(account, region, name))
        {
            stack.status = status;
        }
    }

    /// Pin a stack's outputs. They replace template-derived outputs now and
    /// on every later create or update.
    pub fn set_outputs(&self, account: &str, region: &str, name: &str, outputs: &[(&str, &str)]) {
        let outputs: Vec<StackOutput> = outputs
            .iter()
            .map(|(k, v)| StackOutput {
                key: (*k).to_string(),
                value: (*v).to_string(),
            })
            .collect();
        if let Ok(mut state) = self.state.write() {
            let id = key(account, region, name);
            if let Some(stack) = state.stacks.get_mut(&id) {
                stack.outputs = outputs.clone();
            }
            state.pinned_outputs.insert(id, outputs);
        }
    }

    /// Prepend a resource event.
    pub fn add_event(&self, account: &str, region: &str, name: &str, event: StackEvent) {
        if let Ok(mut state) = self.state.write()
            && let Some(stack) = state.stacks.get_mut(&key(account, region, name))
        {
            stack.events.insert(0, event);
        }
    }

    pub fn stack(&self, account: &str, region: &str, name: &str) -> Option<SimStack> {
        self.state
            .read()
            .ok()?
            .stacks
            .get(&key(account, region, name))
            .cloned()
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state
            .read()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    pub fn calls_of(&self, op: ProviderOp) -> Vec<ProviderCall> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut state) = self.state.write() {
            state.calls.clear();
        }
    }

    // ----- Internal Helpers -----

    /// Record the call and pop a scripted failure, if any.
    fn begin(
        &self,
        state: &mut State,
        op: ProviderOp,
        stack: &str,
        parameters: &[ParameterRecord],
    ) -> Result<(), ProviderError> {
        state.calls.push(ProviderCall {
            op,
            account: self.account.clone(),
            region: self.region.clone(),
            stack: stack.to_string(),
            parameters: parameters.to_vec(),
        });
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => {
                debug!(?op, stack, %error, "Scripted provider failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, ProviderError> {
        self.state
            .write()
            .map_err(|_| internal("Provider state lock poisoned".into()))
    }

    fn persist(&self, state: &State) -> Result<(), ProviderError> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(state)
            .map_err(|e| internal(format!("Cannot encode provider state: {e}")))?;
        write_state(path, &text)
    }

    fn key(&self, name: &str) -> String {
        key(&self.account, &self.region, name)
    }

    fn outputs_for(&self, state: &State, name: &str, body: &str) -> Vec<StackOutput> {
        if let Some(pinned) = state.pinned_outputs.get(&self.key(name)) {
            return pinned.clone();
        }
        template_outputs(name, body)
    }
}

impl CloudFormation for MemoryCloudFormation {
    fn describe_stack(&self, stack_name: &str) -> Result<StackDescription, ProviderError> {
        let mut state = self.write()?;
        self.begin(&mut state, ProviderOp::DescribeStack, stack_name, &[])?;
        let stack = live(&state, &self.key(stack_name))
            .ok_or_else(|| ProviderError::does_not_exist(stack_name))?;
        Ok(StackDescription {
            stack_id: stack.stack_id.clone(),
            status: stack.status,
            termination_protection: stack.termination_protection,
            outputs: (!stack.outputs.is_empty()).then(|| stack.outputs.clone()),
        })
    }

    fn describe_stack_events(&self, stack_name: &str) -> Result<Vec<StackEvent>, ProviderError> {
        let mut state = self.write()?;
        self.begin(&mut state, ProviderOp::DescribeStackEvents, stack_name, &[])?;
        live(&state, &self.key(stack_name))
            .map(|s| s.events.clone())
            .ok_or_else(|| ProviderError::does_not_exist(stack_name))
    }

    fn validate_template(&self, template_body: &str) -> Result<(), ProviderError> {
        let mut state = self.write()?;
        self.begin(&mut state, ProviderOp::ValidateTemplate, "", &[])?;
        match serde_yaml::from_str::<Value>(template_body) {
            Ok(Value::Mapping(_)) => Ok(()),
            Ok(_) => Err(ProviderError::new(
                "ValidationError",
                "Template format error: template must be a mapping",
            )),
            Err(e) => Err(ProviderError::new(
                "ValidationError",
                format!("Template format error: {e}"),
            )),
        }
    }

    fn create_stack(&self, input: &CreateStackInput) -> SubmitOutcome {
        let result = (|| -> Result<String, ProviderError> {
            let mut state = self.write()?;
            let name = &input.stack_name;
            self.begin(&mut state, ProviderOp::CreateStack, name, &input.parameters)?;
            if live(&state, &self.key(name)).is_some() {
                return Err(ProviderError::new(
                    "AlreadyExistsException",
                    format!("Stack [{name}] already exists"),
                ));
            }
            let stack_id = format!(
                "{}/{}",
                stack_arn(&self.account, &self.region, name),
                Uuid::new_v4()
            );
            let stack = SimStack {
                stack_id: stack_id.clone(),
                status: StackStatus::CreateInProgress,
                termination_protection: false,
                template_body: input.template_body.clone(),
                parameters: input.parameters.clone(),
                tags: input.tags.clone(),
                outputs: self.outputs_for(&state, name, &input.template_body),
                events: vec![event(name, "CREATE_IN_PROGRESS")],
            };
            state.stacks.insert(self.key(name), stack);
            self.persist(&state)?;
            Ok(stack_id)
        })();
        SubmitOutcome::from(result)
    }

    fn update_stack(&self, input: &UpdateStackInput) -> SubmitOutcome {
        let result = (|| -> Result<String, ProviderError> {
            let mut state = self.write()?;
            let name = &input.stack_name;
            self.begin(&mut state, ProviderOp::UpdateStack, name, &input.parameters)?;
            let id = self.key(name);
            let outputs = self.outputs_for(&state, name, &input.template_body);
            let stack = state
                .stacks
                .get_mut(&id)
                .filter(|s| s.status != StackStatus::DeleteComplete)
                .ok_or_else(|| ProviderError::does_not_exist(name))?;

            if stack.status == StackStatus::UpdateCompleteCleanupInProgress {
                return Err(ProviderError::new(
                    "ValidationError",
                    format!(
                        "Stack:{} is in UPDATE_COMPLETE_CLEANUP_IN_PROGRESS state and can not be updated.",
                        stack.stack_id
                    ),
                ));
            }

            let parameters = merge_previous(&stack.parameters, &input.parameters);
            if stack.template_body == input.template_body
                && stack.parameters == parameters
                && stack.tags == input.tags
            {
                return Err(ProviderError::new(
                    "ValidationError",
                    "No updates are to be performed.",
                ));
            }

            stack.template_body = input.template_body.clone();
            stack.parameters = parameters;
            stack.tags = input.tags.clone();
            stack.outputs = outputs;
            stack.status = StackStatus::UpdateInProgress;
            stack.events.insert(0, event(name, "UPDATE_IN_PROGRESS"));
            let stack_id = stack.stack_id.clone();
            self.persist(&state)?;
            Ok(stack_id)
        })();
        SubmitOutcome::from(result)
    }

    fn delete_stack(&self, stack_name: &str) -> Result<(), ProviderError> {
        let mut state = self.write()?;
        self.begin(&mut state, ProviderOp::DeleteStack, stack_name, &[])?;
        let id = self.key(stack_name);
        let Some(stack) = state
            .stacks
            .get_mut(&id)
            .filter(|s| s.status != StackStatus::DeleteComplete)
        else {
            return Ok(());
        };
        if stack.termination_protection {
            return Err(ProviderError::new(
                "ValidationError",
                format!(
                    "Stack [{stack_name}] cannot be deleted while TerminationProtection is enabled"
                ),
            ));
        }
        stack.status = StackStatus::DeleteInProgress;
        stack.events.insert(0, event(stack_name, "DELETE_IN_PROGRESS"));
        self.persist(&state)
    }

    fn update_termination_protection(
        &self,
        stack_name: &str,
        enabled: bool,
    ) -> Result<(), ProviderError> {
        let mut state = self.write()?;
        self.begin(
            &mut state,
            ProviderOp::UpdateTerminationProtection,
            stack_name,
            &[],
        )?;
        let id = self.key(stack_name);
        let stack = state
            .stacks
            .get_mut(&id)
            .filter(|s| s.status != StackStatus::DeleteComplete)
            .ok_or_else(|| ProviderError::does_not_exist(stack_name))?;
        stack.termination_protection = enabled;
        self.persist(&state)
    }

    fn wait(&self, waiter: Waiter, stack_name: &str) -> Result<(), ProviderError> {
        let mut state = self.write()?;
        self.begin(&mut state, ProviderOp::Wait, stack_name, &[])?;
        let id = self.key(stack_name);

        let Some(stack) = state.stacks.get_mut(&id) else {
            return match waiter {
                Waiter::StackDeleteComplete => Ok(()),
                _ => Err(ProviderError::does_not_exist(stack_name)),
            };
        };

        let settled = match (waiter, stack.status) {
            (Waiter::StackCreateComplete, StackStatus::CreateInProgress) => {
                Some(StackStatus::CreateComplete)
            }
            (Waiter::StackUpdateComplete, StackStatus::UpdateInProgress)
            | (Waiter::StackUpdateComplete, StackStatus::UpdateCompleteCleanupInProgress) => {
                Some(StackStatus::UpdateComplete)
            }
            (Waiter::StackDeleteComplete, StackStatus::DeleteInProgress) => {
                Some(StackStatus::DeleteComplete)
            }
            (Waiter::StackCreateComplete, StackStatus::CreateComplete)
            | (Waiter::StackUpdateComplete, StackStatus::UpdateComplete)
            | (Waiter::StackDeleteComplete, StackStatus::DeleteComplete) => None,
            (_, status) => {
                return Err(ProviderError::new(
                    "WaiterError",
                    format!(
                        "Waiter {waiter:?} failed: Waiter encountered a terminal failure state: {status}"
                    ),
                ));
            }
        };

        if let Some(status) = settled {
            stack.status = status;
            stack.events.insert(0, event(stack_name, status.as_str()));
        }
        if stack.status == StackStatus::DeleteComplete {
            state.stacks.remove(&id);
        }
        self.persist(&state)
    }
}

fn key(account: &str, region: &str, name: &str) -> String {
    format!("{account}/{region}/{name}")
}

fn stack_arn(account: &str, region: &str, name: &str) -> String {
    format!("arn:aws:cloudformation:{region}:{account}:stack/{name}")
}

fn internal(message: String) -> ProviderError {
    ProviderError::new("InternalFailure", message)
}

fn live<'a>(state: &'a State, id: &str) -> Option<&'a SimStack> {
    state
        .stacks
        .get(id)
        .filter(|s| s.status != StackStatus::DeleteComplete)
}

fn event(name: &str, status: &str) -> StackEvent {
    StackEvent {
        logical_resource_id: name.to_string(),
        resource_status: status.to_string(),
        resource_status_reason: String::new(),
    }
}

/// Values for `UsePreviousValue` entries come from the live parameters.
fn merge_previous(live: &[ParameterRecord], submitted: &[ParameterRecord]) -> Vec<ParameterRecord> {
    submitted
        .iter()
        .map(|p| {
            if !p.use_previous_value {
                return p.clone();
            }
            live.iter()
                .find(|l| l.parameter_key == p.parameter_key)
                .cloned()
                .unwrap_or_else(|| p.clone())
        })
        .collect()
}

fn template_outputs(name: &str, body: &str) -> Vec<StackOutput> {
    let Ok(Value::Mapping(doc)) = serde_yaml::from_str::<Value>(body) else {
        return Vec::new();
    };
    let Some(Value::Mapping(outputs)) = doc.get("Outputs") else {
        return Vec::new();
    };
    outputs
        .keys()
        .filter_map(Value::as_str)
        .map(|k| StackOutput {
            key: k.to_string(),
            value: format!("{name}-{k}"),
        })
        .collect()
}

fn write_state(path: &Path, text: &str) -> Result<(), ProviderError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            warn!(path = %parent.display(), error = %e, "Cannot create provider state directory");
            internal(format!("Cannot create {}: {e}", parent.display()))
        })?;
    }
    std::fs::write(path, text)
        .map_err(|e| internal(format!("Cannot write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::application::ports::ProviderErrorKind;

    fn create(cf: &MemoryCloudFormation, name: &str, body: &str) -> SubmitOutcome {
        cf.create_stack(&CreateStackInput {
            stack_name: name.into(),
            template_body: body.into(),
            parameters: Vec::new(),
            disable_rollback: true,
            capabilities: Vec::new(),
            tags: Vec::new(),
        })
    }

    fn update(cf: &MemoryCloudFormation, name: &str, body: &str) -> SubmitOutcome {
        cf.update_stack(&UpdateStackInput {
            stack_name: name.into(),
            template_body: body.into(),
            parameters: Vec::new(),
            capabilities: Vec::new(),
            tags: Vec::new(),
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    #[test]
    fn create_settles_on_wait() {
        let cf = MemoryCloudFormation::new().scoped("dev", "us-west-2");
        assert!(matches!(create(&cf, "s", "Resources: {}"), SubmitOutcome::Submitted(_)));
        assert_eq!(
            cf.describe_stack("s").unwrap().status,
            StackStatus::CreateInProgress
        );

        cf.wait(Waiter::StackCreateComplete, "s").unwrap();
        assert_eq!(
            cf.describe_stack("s").unwrap().status,
            StackStatus::CreateComplete
        );
    }

    #[test]
    fn identical_update_is_no_change() {
        let cf = MemoryCloudFormation::new().scoped("dev", "us-west-2");
        create(&cf, "s", "Resources: {}");
        cf.wait(Waiter::StackCreateComplete, "s").unwrap();

        assert_eq!(update(&cf, "s", "Resources: {}"), SubmitOutcome::NoChange);
        assert!(matches!(
            update(&cf, "s", "Resources: {A: {Type: X}}"),
            SubmitOutcome::Submitted(_)
        ));
    }

    #[test]
    fn cleanup_in_progress_is_already_in_progress() {
        let cf = MemoryCloudFormation::new().scoped("dev", "us-west-2");
        cf.seed("dev", "us-west-2", "s", StackStatus::UpdateCompleteCleanupInProgress);
        assert_eq!(
            update(&cf, "s", "Resources: {}"),
            SubmitOutcome::AlreadyInProgress
        );
    }

    #[test]
    fn delete_removes_the_stack_after_wait() {
        let cf = MemoryCloudFormation::new().scoped("dev", "us-west-2");
        cf.seed("dev", "us-west-2", "s", StackStatus::CreateComplete);
        cf.delete_stack("s").unwrap();
        cf.wait(Waiter::StackDeleteComplete, "s").unwrap();

        let err = cf.describe_stack("s").unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::DoesNotExist);
    }

    #[test]
    fn termination_protection_blocks_delete() {
        let cf = MemoryCloudFormation::new().scoped("dev", "us-west-2");
        cf.seed("dev", "us-west-2", "s", StackStatus::CreateComplete);
        cf.update_termination_protection("s", true).unwrap();
        assert!(cf.delete_stack("s").is_err());
    }

    #[test]
    fn outputs_come_from_template_unless_pinned() {
        let cf = MemoryCloudFormation::new().scoped("dev", "us-west-2");
        create(&cf, "s", "Outputs:\n  BucketName:\n    Value: x\n");
        let outputs = cf.describe_stack("s").unwrap().outputs.unwrap();
        assert_eq!(outputs[0].value, "s-BucketName");

        cf.set_outputs("dev", "us-west-2", "s", &[("BucketName", "my-bucket")]);
        let outputs = cf.describe_stack("s").unwrap().outputs.unwrap();
        assert_eq!(outputs[0].value, "my-bucket");
    }

    // ========================================================================
    // Scripting and persistence
    // ========================================================================

    #[test]
    fn scripted_failures_are_used_once_in_order() {
        let cf = MemoryCloudFormation::new().scoped("dev", "us-west-2");
        cf.seed("dev", "us-west-2", "s", StackStatus::CreateComplete);
        cf.fail_next(ProviderOp::DescribeStack, ProviderError::expired_token());

        assert_eq!(
            cf.describe_stack("s").unwrap_err().kind(),
            ProviderErrorKind::ExpiredToken
        );
        assert!(cf.describe_stack("s").is_ok());
        assert_eq!(cf.calls_of(ProviderOp::DescribeStack).len(), 2);
    }

    #[test]
    fn state_file_round_trips_between_instances() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("provider.json");

        let first = MemoryCloudFormation::with_state_file(&path)
            .unwrap()
            .scoped("dev", "us-west-2");
        create(&first, "s", "Resources: {}");
        first.wait(Waiter::StackCreateComplete, "s").unwrap();

        let second = MemoryCloudFormation::with_state_file(&path)
            .unwrap()
            .scoped("dev", "us-west-2");
        assert_eq!(
            second.describe_stack("s").unwrap().status,
            StackStatus::CreateComplete
        );
    }

    #[test]
    fn accounts_are_isolated() {
        let cf = MemoryCloudFormation::new();
        cf.seed("dev", "us-west-2", "s", StackStatus::CreateComplete);
        assert!(cf.scoped("prod", "us-west-2").describe_stack("s").is_err());
        assert!(cf.scoped("dev", "us-west-2").describe_stack("s").is_ok());
    }
}
