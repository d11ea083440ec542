//! Builder for stacks whose template is a file (or inline body) in the
//! project.

use std::path::PathBuf;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::{debug, instrument};

use strata_core::{
    application::services::{BuildRequest, Engine, ResourceKind, StackBuilder},
    domain::{NewStack, Reference, StackId, StackOrder, StackTemplate},
    error::{StrataError, StrataResult},
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateEntry {
    /// Dispatch key, already consumed by the registry.
    #[serde(default, rename = "kind")]
    _kind: Option<ResourceKind>,
    config_ref: String,
    aws_name: String,
    /// Reference the stack owns for output lookups. Defaults to `config_ref`.
    #[serde(default)]
    resource_ref: Option<String>,
    #[serde(default)]
    template: Option<PathBuf>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    suffix: Option<String>,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    parameters: Mapping,
    #[serde(default)]
    ignore_changes: Vec<String>,
    #[serde(default)]
    list_parameters: Vec<ListParameterEntry>,
    #[serde(default)]
    outputs: Vec<OutputEntry>,
    #[serde(default)]
    tags: Mapping,
    #[serde(default)]
    orders: Option<Vec<StackOrder>>,
    #[serde(default)]
    dependency: Option<DependencyEntry>,
    #[serde(default = "enabled_default")]
    enabled: bool,
    #[serde(default)]
    update_only: bool,
    #[serde(default)]
    change_protected: bool,
    #[serde(default)]
    termination_protection: bool,
    #[serde(default)]
    do_not_cache: bool,
    #[serde(default)]
    singleton: bool,
    #[serde(default)]
    wait_for_delete: bool,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    environment: Option<String>,
}

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListParameterEntry {
    key: String,
    refs: Vec<String>,
    #[serde(default)]
    attr: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputEntry {
    #[serde(rename = "ref")]
    reference: String,
    key: String,
}

/// Makes this stack depend on an earlier one.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DependencyEntry {
    #[serde(rename = "ref")]
    reference: String,
    name: String,
}

/// Registers one stack per entry from a template file or an inline `body`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateFileBuilder;

impl StackBuilder for TemplateFileBuilder {
    #[instrument(skip_all, fields(group = %request.group))]
    fn build(&self, engine: &mut Engine, request: &BuildRequest) -> StrataResult<Vec<StackId>> {
        let entry: TemplateEntry =
            serde_yaml::from_value(request.entry.clone()).map_err(|e| invalid("stack entry", e))?;
        let body = read_body(engine, &entry)?;

        let mut template = StackTemplate::new(&entry.aws_name, &entry.config_ref).with_body(body);
        template.enabled = entry.enabled;
        template.update_only = entry.update_only;
        template.capabilities = entry.capabilities.clone();
        template.environment = entry.environment.clone();

        let resource_ref = entry.resource_ref.as_deref().unwrap_or(&entry.config_ref);
        let resource_ref = Reference::from_path(resource_ref)?.path();
        let mut spec = NewStack::new(
            resource_ref,
            entry.account.as_deref().unwrap_or(&request.account),
            entry.region.as_deref().unwrap_or(&request.region),
            template,
        );
        spec.suffix = entry.suffix.clone();
        spec.orders = entry.orders.clone();
        spec.change_protected = entry.change_protected;
        spec.termination_protection = entry.termination_protection;
        spec.do_not_cache = entry.do_not_cache;
        spec.singleton = entry.singleton;
        spec.wait_for_delete = entry.wait_for_delete;
        for (key, value) in &entry.tags {
            spec.tags.add(scalar_key(key, "tag")?, scalar_string(value));
        }

        let id = engine.add_stack(request.group, spec)?;

        for output in &entry.outputs {
            engine.register_output(id, &output.reference, &output.key)?;
        }
        if let Some(dep) = &entry.dependency {
            let reference = Reference::from_path(&dep.reference)?;
            let upstream =
                engine
                    .get_stack_from_ref(&reference)
                    .ok_or_else(|| StrataError::Configuration {
                        message: format!(
                            "Dependency '{}' of {} names no registered stack",
                            dep.reference, entry.aws_name
                        ),
                    })?;
            engine.set_dependency(id, upstream, &dep.name)?;
        }
        for (key, value) in &entry.parameters {
            let key = scalar_key(key, "parameter")?;
            let ignore = entry.ignore_changes.iter().any(|k| k == key);
            engine.set_parameter(id, key, value, ignore)?;
        }
        for list in &entry.list_parameters {
            let ignore = entry.ignore_changes.contains(&list.key);
            engine.set_list_parameter(id, &list.key, &list.refs, list.attr.as_deref(), ignore)?;
        }

        debug!(stack = %id, aws_name = %entry.aws_name, "Template stack built");
        Ok(vec![id])
    }
}

// ----- Internal Helpers -----

fn read_body(engine: &Engine, entry: &TemplateEntry) -> StrataResult<String> {
    match (&entry.template, &entry.body) {
        (Some(_), Some(_)) => Err(StrataError::Configuration {
            message: format!("{}: set either 'template' or 'body', not both", entry.aws_name),
        }),
        (None, None) => Err(StrataError::Configuration {
            message: format!("{}: one of 'template' or 'body' is required", entry.aws_name),
        }),
        (None, Some(body)) => Ok(body.clone()),
        (Some(path), None) => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                engine.layout().home().join(path)
            };
            engine
                .filesystem()
                .read_to_string(&path)?
                .ok_or_else(|| StrataError::Configuration {
                    message: format!("Template file not found: {}", path.display()),
                })
        }
    }
}

fn scalar_key<'a>(key: &'a Value, what: &str) -> StrataResult<&'a str> {
    key.as_str().ok_or_else(|| StrataError::Configuration {
        message: format!("{what} keys must be strings, got {key:?}"),
    })
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn invalid(what: &str, e: serde_yaml::Error) -> StrataError {
    StrataError::Configuration {
        message: format!("Invalid {what}: {e}"),
    }
}
