//! The stack orchestration engine.
//!
//! [`Engine`] owns the stack and group arenas, the provider client cache and
//! the outputs store. It is constructed once at CLI entry and threaded
//! through every operation; nothing about a run lives in global state.
//!
//! The implementation is split by concern:
//! - `provider`: client cache, credential refresh, throttling, describe
//! - `lifecycle`: single-stack validate / provision / create / update / delete / wait
//! - `confirm`: parameter, template and model change confirmation
//! - `scheduler`: group passes and the group state file

mod confirm;
mod lifecycle;
mod provider;
mod scheduler;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_yaml::Value;
use tracing::{debug, info, instrument};

use crate::{
    application::{
        ApplicationError,
        ports::{
            CloudFormation, ConfirmationPort, Filesystem, ModelResolver, ModelValue, Reporter,
            SessionProvider,
        },
    },
    domain::{
        DomainError, GroupId, LogPolicy, Member, NewStack, Parameter, ParameterEntry, Reference,
        Stack, StackGroup, StackHooks, StackId, StackOrder, StackOutputParam, TokenContext,
        format_action_col, is_ref, marshal_list,
    },
    error::{StrataError, StrataResult},
};

use super::{layout::StateLayout, outputs_store::OutputsStore};

/// Run-wide switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub home: PathBuf,
    pub nocache: bool,
    pub verbose: bool,
    pub quiet_changes_only: bool,
    /// Emit advisory warnings during template diffs.
    pub warn: bool,
    /// Skip parameter and template diff confirmation.
    pub disable_validation: bool,
    pub throttle_delay: Duration,
    /// Templates at or above this many bytes trigger a size warning.
    pub template_size_warning: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            home: PathBuf::from("."),
            nocache: false,
            verbose: false,
            quiet_changes_only: false,
            warn: false,
            disable_validation: false,
            throttle_delay: Duration::from_secs(1),
            template_size_warning: 41_200,
        }
    }
}

/// What a reference resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A registered stack; the value must be read from its outputs.
    Stack {
        stack: StackId,
        output_key: Option<String>,
    },
    Scalar(String),
    /// A model object that is neither a scalar nor owned by a stack.
    Node,
}

type ClientKey = (String, String);

/// The stack orchestration engine.
pub struct Engine {
    options: EngineOptions,
    layout: StateLayout,
    policy: LogPolicy,

    fs: Box<dyn Filesystem>,
    sessions: Box<dyn SessionProvider>,
    confirm: Box<dyn ConfirmationPort>,
    reporter: Box<dyn Reporter>,
    model: Box<dyn ModelResolver>,

    outputs: OutputsStore,
    stacks: Vec<Stack>,
    groups: Vec<StackGroup>,
    roots: Vec<GroupId>,
    /// Rendered template bodies from the last `generate_template`.
    rendered: HashMap<StackId, String>,

    clients: HashMap<ClientKey, Arc<dyn CloudFormation>>,
    expired: HashSet<ClientKey>,
    pending_header: Option<&'static str>,
}

impl Engine {
    /// Create an engine with the given adapters.
    pub fn new(
        options: EngineOptions,
        fs: Box<dyn Filesystem>,
        sessions: Box<dyn SessionProvider>,
        confirm: Box<dyn ConfirmationPort>,
        reporter: Box<dyn Reporter>,
        model: Box<dyn ModelResolver>,
    ) -> Self {
        let layout = StateLayout::new(options.home.clone());
        let policy = LogPolicy {
            verbose: options.verbose,
            quiet_changes_only: options.quiet_changes_only,
        };
        Self {
            outputs: OutputsStore::new(layout.clone()),
            options,
            layout,
            policy,
            fs,
            sessions,
            confirm,
            reporter,
            model,
            stacks: Vec::new(),
            groups: Vec::new(),
            roots: Vec::new(),
            rendered: HashMap::new(),
            clients: HashMap::new(),
            expired: HashSet::new(),
            pending_header: None,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn filesystem(&self) -> &dyn Filesystem {
        self.fs.as_ref()
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    pub fn roots(&self) -> &[GroupId] {
        &self.roots
    }

    pub fn stack(&self, id: StackId) -> StrataResult<&Stack> {
        self.stacks
            .get(id.0)
            .ok_or_else(|| ApplicationError::UnknownStack { id }.into())
    }

    pub fn group(&self, id: GroupId) -> StrataResult<&StackGroup> {
        self.groups
            .get(id.0)
            .ok_or_else(|| ApplicationError::UnknownGroup { id }.into())
    }

    /// The rendered body from the last template generation.
    pub fn rendered_template(&self, id: StackId) -> Option<&str> {
        self.rendered.get(&id).map(String::as_str)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Add a group, nested under `parent` or as a new root.
    pub fn add_group(
        &mut self,
        name: &str,
        aws_name: &str,
        controller_aws_name: &str,
        parent: Option<GroupId>,
    ) -> StrataResult<GroupId> {
        let id = GroupId(self.groups.len());
        let mut group = StackGroup::new(id, name, aws_name, controller_aws_name);
        if let Some(parent) = parent {
            group.filter = self.group(parent)?.filter.clone();
            self.group_mut(parent)?
                .add_member(Member::Group(id), &[StackOrder::Provision])?;
        } else {
            self.roots.push(id);
        }
        debug!(group = %id, name, aws_name, "Group added");
        self.groups.push(group);
        Ok(id)
    }

    /// Construct a stack and register it in `group` under its orders.
    #[instrument(skip_all, fields(group = %group, template = %spec.template.aws_name))]
    pub fn add_stack(&mut self, group: GroupId, spec: NewStack) -> StrataResult<StackId> {
        let id = StackId(self.stacks.len());
        let group_aws_name = self.group(group)?.full_aws_name();
        let stack = Stack::new(id, group, &group_aws_name, spec)?;
        let orders = stack.orders.clone();
        self.group_mut(group)?
            .add_member(Member::Stack(id), &orders)?;

        info!(stack = stack.name(), "Stack registered");
        self.stacks.push(stack);
        self.log_hooks(id, None)?;
        Ok(id)
    }

    /// Merge extra hooks into a stack.
    pub fn add_hooks(&mut self, stack: StackId, hooks: StackHooks) -> StrataResult<()> {
        let added: Vec<String> = hooks
            .iter()
            .map(|h| format!("{}: {}: {}", h.name, h.action, h.timing))
            .collect();
        self.stack_mut(stack)?.hooks.merge(hooks);
        self.log_hooks(stack, Some(added))
    }

    /// Bind a model reference to one of the stack's template outputs.
    pub fn register_output(
        &mut self,
        stack: StackId,
        config_ref: &str,
        output_key: &str,
    ) -> StrataResult<()> {
        let config_ref = Reference::from_path(config_ref)?.path();
        self.stack_mut(stack)?.register_output(config_ref, output_key);
        Ok(())
    }

    /// Make `stack` depend on `dependency`. Both join a dependency group and
    /// the dependency's files gain a `parent-<name>` id.
    pub fn set_dependency(
        &mut self,
        stack: StackId,
        dependency: StackId,
        name: &str,
    ) -> StrataResult<()> {
        {
            let dependent = self.stack_mut(stack)?;
            dependent.dependency_stack = Some(dependency);
            dependent.dependency_group = true;
        }
        let upstream = self.stack_mut(dependency)?;
        if upstream.dependency_stack.is_none() {
            upstream.set_template_file_id(format!("parent-{name}"));
            upstream.dependency_group = true;
        }
        Ok(())
    }

    /// Restrict every group to a subtree of the model.
    pub fn set_filter(&mut self, prefix: Option<&str>) {
        for group in &mut self.groups {
            group.set_filter(prefix);
        }
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Set a parameter from a scalar, a list of scalars or a `paco.ref`.
    ///
    /// A reference that resolves to a stack becomes a [`StackOutputParam`].
    /// Re-setting a key replaces the earlier entry.
    pub fn set_parameter(
        &mut self,
        stack: StackId,
        key: &str,
        value: &Value,
        ignore_changes: bool,
    ) -> StrataResult<()> {
        let entry: ParameterEntry = match value {
            Value::String(raw) if is_ref(raw) => {
                let reference = self.parse_in_context(stack, raw)?;
                match self.resolve(&reference)? {
                    Resolved::Scalar(v) => Parameter::new(key, v)
                        .ignore_changes(ignore_changes)
                        .into(),
                    Resolved::Stack {
                        stack: upstream,
                        output_key,
                    } => {
                        if !self.stack(stack)?.enabled() && !self.stack(upstream)?.enabled() {
                            debug!(key, "Both stacks disabled, parameter skipped");
                            return Ok(());
                        }
                        let mut param = StackOutputParam::new(key);
                        param.ignore_changes = ignore_changes;
                        param.add_stack_output(upstream, output_key)?;
                        param.into()
                    }
                    Resolved::Node => return Err(not_a_value(&reference)),
                }
            }
            Value::Sequence(items) => Parameter::new(key, marshal_list(key, items)?)
                .ignore_changes(ignore_changes)
                .into(),
            scalar => Parameter::from_value(key, scalar)?
                .ignore_changes(ignore_changes)
                .into(),
        };
        self.stack_mut(stack)?.parameters.set(entry);
        Ok(())
    }

    /// Set a parameter from a list of references that all resolve to stacks
    /// or all resolve to scalars. `attr` is appended to every reference.
    pub fn set_list_parameter(
        &mut self,
        stack: StackId,
        key: &str,
        refs: &[String],
        attr: Option<&str>,
        ignore_changes: bool,
    ) -> StrataResult<()> {
        let mut scalars = Vec::new();
        let mut outputs = StackOutputParam::new(key);
        outputs.ignore_changes = ignore_changes;
        let mut upstream_enabled = false;

        for raw in refs {
            let mut reference = self.parse_in_context(stack, raw)?;
            if let Some(attr) = attr {
                reference = reference.join(attr)?;
            }
            match self.resolve(&reference)? {
                Resolved::Scalar(v) => scalars.push(v),
                Resolved::Stack {
                    stack: upstream,
                    output_key,
                } => {
                    upstream_enabled |= self.stack(upstream)?.enabled();
                    outputs.add_stack_output(upstream, output_key)?;
                }
                Resolved::Node => return Err(not_a_value(&reference)),
            }
        }

        let entry: ParameterEntry = match (scalars.is_empty(), outputs.entries.is_empty()) {
            (false, false) => {
                return Err(DomainError::MixedListParameter {
                    reference: key.to_string(),
                }
                .into());
            }
            (true, false) => {
                if !self.stack(stack)?.enabled() && !upstream_enabled {
                    debug!(key, "Both stacks disabled, parameter skipped");
                    return Ok(());
                }
                outputs.into()
            }
            _ => Parameter::new(key, scalars.join(","))
                .ignore_changes(ignore_changes)
                .into(),
        };
        self.stack_mut(stack)?.parameters.set(entry);
        Ok(())
    }

    // ========================================================================
    // Reference resolution
    // ========================================================================

    /// Search every group, depth first, for the stack owning `reference`.
    pub fn get_stack_from_ref(&self, reference: &Reference) -> Option<StackId> {
        self.roots
            .iter()
            .find_map(|&root| self.find_stack_in(root, reference))
    }

    /// Resolve a reference against registered stacks, the model and the
    /// outputs store, in that order.
    pub fn resolve(&self, reference: &Reference) -> StrataResult<Resolved> {
        let path = reference.path();

        // 1. A stack that registered an output for exactly this path
        if let Some(stack) = self
            .stacks
            .iter()
            .find(|s| s.in_location_of(reference) && s.output_key_for(&path).is_some())
        {
            return Ok(Resolved::Stack {
                stack: stack.id,
                output_key: stack.output_key_for(&path).map(str::to_string),
            });
        }

        // 2. The project model, then 3. the owning stack
        let model_value = self.model.resolve(reference)?;
        if let Some(ModelValue::Scalar(value)) = &model_value {
            return Ok(Resolved::Scalar(value.clone()));
        }
        if let Some(id) = self.get_stack_from_ref(reference) {
            return Ok(Resolved::Stack {
                stack: id,
                output_key: self.stack(id)?.output_key_for(&path).map(str::to_string),
            });
        }
        if model_value == Some(ModelValue::Node) {
            return Ok(Resolved::Node);
        }

        // 4. Outputs of stacks provisioned in earlier runs
        if let Some(value) = self.outputs.lookup(self.fs.as_ref(), reference)? {
            return Ok(Resolved::Scalar(value));
        }

        Err(ApplicationError::UnresolvedReference {
            reference: reference.raw().to_string(),
            context: String::new(),
        }
        .into())
    }

    /// Resolve a reference all the way to a string, reading live outputs
    /// for stack references.
    pub fn resolve_value(&mut self, reference: &Reference) -> StrataResult<String> {
        match self.resolve(reference)? {
            Resolved::Scalar(value) => Ok(value),
            Resolved::Stack {
                stack,
                output_key: Some(key),
            } => self.get_outputs_value(stack, &key),
            Resolved::Stack {
                stack,
                output_key: None,
            } => Err(ApplicationError::UnresolvedReference {
                reference: reference.raw().to_string(),
                context: format!(
                    "\nStack {} has no output registered for this reference",
                    self.stack(stack)?.name()
                ),
            }
            .into()),
            Resolved::Node => Err(not_a_value(reference)),
        }
    }

    /// Flush the outputs store. Call once at the end of a run.
    pub fn finish(&self) -> StrataResult<()> {
        self.outputs.flush(self.fs.as_ref())
    }

    // ----- Internal Helpers -----

    fn stack_mut(&mut self, id: StackId) -> StrataResult<&mut Stack> {
        self.stacks
            .get_mut(id.0)
            .ok_or_else(|| ApplicationError::UnknownStack { id }.into())
    }

    fn group_mut(&mut self, id: GroupId) -> StrataResult<&mut StackGroup> {
        self.groups
            .get_mut(id.0)
            .ok_or_else(|| ApplicationError::UnknownGroup { id }.into())
    }

    fn find_stack_in(&self, group: GroupId, reference: &Reference) -> Option<StackId> {
        let group = self.groups.get(group.0)?;
        group.members.iter().find_map(|member| match *member {
            Member::Group(nested) => self.find_stack_in(nested, reference),
            Member::Stack(id) => self
                .stacks
                .get(id.0)
                .filter(|s| s.owns_ref(reference))
                .map(|s| s.id),
        })
    }

    /// Expand substitution tokens for the stack's context, then parse.
    fn parse_in_context(&self, stack: StackId, raw: &str) -> StrataResult<Reference> {
        let tokens = self.tokens(stack)?;
        let expanded = tokens.substitute(raw)?;
        Ok(Reference::parse(&expanded)?)
    }

    fn tokens(&self, stack: StackId) -> StrataResult<TokenContext> {
        let s = self.stack(stack)?;
        Ok(TokenContext::new(s.account.clone(), s.region.clone())
            .with_environment(s.template.environment.clone()))
    }

    fn log_hooks(&mut self, stack: StackId, only: Option<Vec<String>>) -> StrataResult<()> {
        let s = self.stack(stack)?;
        if !s.enabled() {
            return Ok(());
        }
        let lines = only.unwrap_or_else(|| {
            s.hooks
                .iter()
                .map(|h| format!("{}: {}: {}", h.name, h.action, h.timing))
                .collect()
        });
        for line in lines {
            self.log_action(stack, "Init", "Hook", Some(line.as_str()))?;
        }
        Ok(())
    }

    /// Emit a stack action line, honoring the quiet and verbose filters.
    fn log_action(
        &mut self,
        stack: StackId,
        action: &str,
        stack_action: &str,
        message: Option<&str>,
    ) -> StrataResult<()> {
        if !self.policy.shows_stack_action(stack_action) {
            return Ok(());
        }
        let s = self.stack(stack)?;
        let mut stack_message = format!("{}{}", s.name(), s.log_suffix());
        if let Some(message) = message {
            stack_message.push_str(": ");
            stack_message.push_str(message);
        }
        let account = s.account.clone();
        self.log_cols(action, &account, stack_action, &stack_message);
        Ok(())
    }

    /// Emit a raw column line, honoring the verbose filter on `action`.
    fn log_cols(&mut self, action: &str, account: &str, stack_action: &str, message: &str) {
        if !self.policy.shows_action(action) {
            return;
        }
        if let Some(header) = self.pending_header.take() {
            self.reporter
                .emit(&format_action_col(&[header, "Account", "Action", "Stack Name"]));
        }
        self.reporter
            .emit(&format_action_col(&[action, account, stack_action, message]));
    }

    fn emit(&self, line: &str) {
        self.reporter.emit(line);
    }
}

fn not_a_value(reference: &Reference) -> StrataError {
    ApplicationError::UnresolvedReference {
        reference: reference.raw().to_string(),
        context: "\nThe reference names a model object, not a value".into(),
    }
    .into()
}

#[cfg(test)]
mod tests;
