//! The [`Stack`] entity.
//!
//! A stack is one provider template instance in one account and region.
//! Stacks live in the engine's arena and refer to each other by
//! [`StackId`]; they never hold pointers to their group or to other stacks.

use std::collections::HashMap;
use std::fmt;

use serde_yaml::Mapping;

use super::{
    DomainError, ParameterSet, Reference, StackAction, StackHooks, StackOrder, StackStatus,
    StackTags,
};

/// Arena index of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackId(pub usize);

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack#{}", self.0)
    }
}

/// Arena index of a stack group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// The template a builder attaches to a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTemplate {
    pub aws_name: String,
    /// Body before `paco.sub` processing.
    pub body: String,
    pub enabled: bool,
    pub update_only: bool,
    pub capabilities: Vec<String>,
    /// Model reference path used for subtree filtering.
    pub config_ref: String,
    /// Name of the enclosing environment, if any.
    pub environment: Option<String>,
}

impl StackTemplate {
    pub fn new(aws_name: impl Into<String>, config_ref: impl Into<String>) -> Self {
        Self {
            aws_name: aws_name.into(),
            body: String::new(),
            enabled: true,
            update_only: false,
            capabilities: Vec::new(),
            config_ref: config_ref.into(),
            environment: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Binds a model reference to one of the stack's template outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutputConfig {
    pub config_ref: String,
    pub key: String,
}

/// Construction input for a stack.
#[derive(Debug, Clone)]
pub struct NewStack {
    pub resource_ref: String,
    pub support_ref_ext: Option<String>,
    pub account: String,
    pub region: String,
    pub template: StackTemplate,
    pub suffix: Option<String>,
    pub tags: StackTags,
    pub hooks: StackHooks,
    /// `None` registers the default `[Provision, Wait]`.
    pub orders: Option<Vec<StackOrder>>,
    pub change_protected: bool,
    pub termination_protection: bool,
    pub do_not_cache: bool,
    pub singleton: bool,
    pub wait_for_delete: bool,
}

impl NewStack {
    pub fn new(
        resource_ref: impl Into<String>,
        account: impl Into<String>,
        region: impl Into<String>,
        template: StackTemplate,
    ) -> Self {
        Self {
            resource_ref: resource_ref.into(),
            support_ref_ext: None,
            account: account.into(),
            region: region.into(),
            template,
            suffix: None,
            tags: StackTags::new(),
            hooks: StackHooks::new(),
            orders: None,
            change_protected: false,
            termination_protection: false,
            do_not_cache: false,
            singleton: false,
            wait_for_delete: false,
        }
    }
}

/// A provider stack and its lifecycle state.
#[derive(Debug, Clone)]
pub struct Stack {
    pub id: StackId,
    pub group: GroupId,
    name: String,
    pub resource_ref: String,
    pub support_ref_ext: Option<String>,
    pub account: String,
    pub region: String,
    pub template: StackTemplate,
    pub stack_suffix: Option<String>,
    pub template_file_id: Option<String>,
    pub parameters: ParameterSet,
    pub tags: StackTags,
    pub hooks: StackHooks,
    pub orders: Vec<StackOrder>,
    pub output_configs: Vec<StackOutputConfig>,

    pub status: StackStatus,
    pub stack_id: Option<String>,
    pub termination_protection: bool,
    /// Provider-side termination protection as last described.
    pub live_termination_protection: Option<bool>,
    pub change_protected: bool,
    pub do_not_cache: bool,
    pub singleton: bool,
    pub wait_for_delete: bool,
    pub cached: bool,
    pub action: Option<StackAction>,
    pub outputs_value_cache: HashMap<String, String>,
    pub output_config_dict: Option<Mapping>,

    pub dependency_stack: Option<StackId>,
    pub dependency_group: bool,
}

impl Stack {
    /// Build a stack. Fails if the sanitized name does not start with a
    /// letter.
    pub fn new(
        id: StackId,
        group: GroupId,
        group_aws_name: &str,
        spec: NewStack,
    ) -> Result<Self, DomainError> {
        if spec.template.aws_name.is_empty() {
            return Err(DomainError::MissingRequiredField {
                field: "template.aws_name",
            });
        }
        if spec.region.is_empty() {
            return Err(DomainError::MissingRequiredField { field: "region" });
        }
        let name = stack_name(
            group_aws_name,
            &spec.template.aws_name,
            spec.suffix.as_deref(),
        )?;

        let mut tags = StackTags::managed();
        for tag in spec.tags.cf_list() {
            tags.add(tag.key, tag.value);
        }
        let mut hooks = spec.hooks;
        hooks.bind(id);

        Ok(Self {
            id,
            group,
            name,
            resource_ref: spec.resource_ref,
            support_ref_ext: spec.support_ref_ext,
            account: spec.account,
            region: spec.region,
            template: spec.template,
            stack_suffix: spec.suffix,
            template_file_id: None,
            parameters: ParameterSet::new(),
            tags,
            hooks,
            orders: spec
                .orders
                .unwrap_or_else(|| vec![StackOrder::Provision, StackOrder::Wait]),
            output_configs: Vec::new(),
            status: StackStatus::None,
            stack_id: None,
            termination_protection: spec.termination_protection,
            live_termination_protection: None,
            change_protected: spec.change_protected,
            do_not_cache: spec.do_not_cache,
            singleton: spec.singleton,
            wait_for_delete: spec.wait_for_delete,
            cached: false,
            action: None,
            outputs_value_cache: HashMap::new(),
            output_config_dict: None,
            dependency_stack: None,
            dependency_group: false,
        })
    }

    /// Provider stack name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.template.enabled
    }

    /// File stem for the build and applied files.
    pub fn file_stem(&self) -> String {
        match &self.template_file_id {
            Some(id) => format!("{}-{}", self.name, id),
            None => self.name.clone(),
        }
    }

    /// Reference path of the resource, or of the support resource.
    pub fn stack_ref(&self) -> String {
        match &self.support_ref_ext {
            Some(ext) => format!("{}.{}", self.resource_ref, ext),
            None => self.resource_ref.clone(),
        }
    }

    /// True if `path` names this stack or something beneath it.
    /// True if `reference` points at this stack or below it, and its
    /// account and region overrides, when set, name this stack's.
    pub fn owns_ref(&self, reference: &Reference) -> bool {
        let stack_ref = self.stack_ref();
        !stack_ref.is_empty() && reference.is_under(&stack_ref) && self.in_location_of(reference)
    }

    pub fn in_location_of(&self, reference: &Reference) -> bool {
        reference.account().is_none_or(|a| a == self.account)
            && reference.region().is_none_or(|r| r == self.region)
    }

    pub fn register_output(&mut self, config_ref: impl Into<String>, key: impl Into<String>) {
        self.output_configs.push(StackOutputConfig {
            config_ref: config_ref.into(),
            key: key.into(),
        });
    }

    /// Output key registered for an exact reference path.
    pub fn output_key_for(&self, path: &str) -> Option<&str> {
        self.output_configs
            .iter()
            .find(|c| c.config_ref == path)
            .map(|c| c.key.as_str())
    }

    pub fn set_template_file_id(&mut self, file_id: impl Into<String>) {
        self.template_file_id = Some(file_id.into());
    }

    /// The `: dependency group: <id>` suffix used in action lines.
    pub fn log_suffix(&self) -> String {
        self.template_file_id
            .as_ref()
            .map(|id| format!(": dependency group: {id}"))
            .unwrap_or_default()
    }
}

/// Join, sanitize and check a stack name.
pub fn stack_name(
    group_aws_name: &str,
    template_aws_name: &str,
    suffix: Option<&str>,
) -> Result<String, DomainError> {
    let mut name = format!("{group_aws_name}-{template_aws_name}");
    if let Some(suffix) = suffix {
        name.push('-');
        name.push_str(suffix);
    }

    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    if !sanitized.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(DomainError::InvalidStackName { name: sanitized });
    }
    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> NewStack {
        NewStack::new(
            "netenv.mynet.dev.us-west-2.applications.app.groups.web.resources.alb",
            "dev",
            "us-west-2",
            StackTemplate::new("ALB", "netenv.mynet.dev"),
        )
    }

    #[test]
    fn name_is_joined_and_sanitized() {
        assert_eq!(
            stack_name("ne-mynet-dev", "App_web.alb", Some("v2")).unwrap(),
            "ne-mynet-dev-App-web-alb-v2"
        );
        assert_eq!(stack_name("a", "b", None).unwrap(), "a-b");
    }

    #[test]
    fn name_must_start_with_letter() {
        assert!(matches!(
            stack_name("9lives", "x", None),
            Err(DomainError::InvalidStackName { .. })
        ));
        assert!(stack_name("_x", "y", None).is_err());
    }

    #[test]
    fn names_only_contain_safe_characters() {
        let name = stack_name("team ünï", "t/e.m:p", Some("s s")).unwrap();
        assert!(name.starts_with("team-"));
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn new_stack_defaults() {
        let stack = Stack::new(StackId(3), GroupId(0), "ne-dev", spec()).unwrap();
        assert_eq!(stack.name(), "ne-dev-ALB");
        assert_eq!(stack.orders, vec![StackOrder::Provision, StackOrder::Wait]);
        assert_eq!(stack.tags.get("Paco-Stack"), Some("true"));
        assert_eq!(stack.status, StackStatus::None);
        assert!(stack.enabled());
    }

    #[test]
    fn region_and_template_name_are_required() {
        let mut s = spec();
        s.region.clear();
        assert!(matches!(
            Stack::new(StackId(0), GroupId(0), "g", s),
            Err(DomainError::MissingRequiredField { field: "region" })
        ));
    }

    #[test]
    fn file_stem_includes_template_file_id() {
        let mut stack = Stack::new(StackId(0), GroupId(0), "ne-dev", spec()).unwrap();
        assert_eq!(stack.file_stem(), "ne-dev-ALB");
        stack.set_template_file_id("parent-kms");
        assert_eq!(stack.file_stem(), "ne-dev-ALB-parent-kms");
        assert_eq!(stack.log_suffix(), ": dependency group: parent-kms");
    }

    #[test]
    fn stack_ref_and_ownership() {
        let mut s = spec();
        s.resource_ref = "app.web".into();
        s.support_ref_ext = Some("alarms".into());
        let stack = Stack::new(StackId(0), GroupId(0), "g", s).unwrap();
        assert_eq!(stack.stack_ref(), "app.web.alarms");
        let owns = |path: &str| stack.owns_ref(&Reference::from_path(path).unwrap());
        assert!(owns("app.web.alarms"));
        assert!(owns("app.web.alarms.arn"));
        assert!(!owns("app.web.alarmsx"));
        assert!(!owns("app.web"));
    }

    #[test]
    fn location_overrides_narrow_ownership() {
        let mut s = spec();
        s.resource_ref = "app.web".into();
        let stack = Stack::new(StackId(0), GroupId(0), "g", s).unwrap();
        let r = Reference::from_path("app.web.arn").unwrap();
        let region = stack.region.clone();
        assert!(stack.owns_ref(&r.clone().with_region(region)));
        assert!(!stack.owns_ref(&r.clone().with_region("eu-north-1")));
        assert!(!stack.owns_ref(&r.with_account("prod")));
    }

    #[test]
    fn output_key_lookup_is_exact() {
        let mut stack = Stack::new(StackId(0), GroupId(0), "g", spec()).unwrap();
        stack.register_output("upstream.name", "BucketName");
        assert_eq!(stack.output_key_for("upstream.name"), Some("BucketName"));
        assert_eq!(stack.output_key_for("upstream"), None);
    }
}
