//! Stack parameters.
//!
//! Two variants: a literal [`Parameter`] and a [`StackOutputParam`] whose
//! value is read from one or more upstream stacks' outputs at generation
//! time. [`ParameterSet`] keeps them ordered and de-duplicated by key.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::{DomainError, StackId};

/// Cast a scalar to the string form the provider expects.
///
/// Booleans render as `true`/`false`, integers as decimal strings, strings
/// pass through. Anything else is an error.
pub fn marshal_value(key: &str, value: &Value) -> Result<String, DomainError> {
    match value {
        Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        other => Err(DomainError::UnsupportedParameterValue {
            key: key.to_string(),
            type_name: type_name(other).to_string(),
        }),
    }
}

/// Marshal every element and join with `,`.
pub fn marshal_list(key: &str, values: &[Value]) -> Result<String, DomainError> {
    let items = values
        .iter()
        .map(|v| marshal_value(key, v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items.join(","))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

// ── Parameter ───────────────────────────────────────────────────────────────

/// A literal parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: String,
    pub value: String,
    pub use_previous: bool,
    pub resolved_value: String,
    pub ignore_changes: bool,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            use_previous: false,
            resolved_value: String::new(),
            ignore_changes: false,
        }
    }

    /// Build from a YAML scalar using the marshaling rules.
    pub fn from_value(key: impl Into<String>, value: &Value) -> Result<Self, DomainError> {
        let key = key.into();
        let value = marshal_value(&key, value)?;
        Ok(Self::new(key, value))
    }

    pub fn ignore_changes(mut self, ignore: bool) -> Self {
        self.ignore_changes = ignore;
        self
    }
}

// ── StackOutputParam ────────────────────────────────────────────────────────

/// One upstream stack and the output keys read from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    pub stack: StackId,
    /// Never empty.
    pub output_keys: Vec<String>,
}

/// A parameter whose value comes from upstream stack outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutputParam {
    pub key: String,
    pub entries: Vec<OutputEntry>,
    pub ignore_changes: bool,
}

impl StackOutputParam {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entries: Vec::new(),
            ignore_changes: false,
        }
    }

    /// Shorthand for a single upstream output.
    pub fn single(
        key: impl Into<String>,
        stack: StackId,
        output_key: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let mut param = Self::new(key);
        param.add_stack_output(stack, Some(output_key.into()))?;
        Ok(param)
    }

    /// Find the entry for `stack` and append to it, or insert a new entry.
    pub fn add_stack_output(
        &mut self,
        stack: StackId,
        output_key: Option<String>,
    ) -> Result<(), DomainError> {
        let output_key = output_key.ok_or_else(|| DomainError::MissingOutputKey {
            key: self.key.clone(),
        })?;

        match self.entries.iter_mut().find(|e| e.stack == stack) {
            Some(entry) => entry.output_keys.push(output_key),
            None => self.entries.push(OutputEntry {
                stack,
                output_keys: vec![output_key],
            }),
        }
        Ok(())
    }

    /// Every (stack, output key) pair in order.
    pub fn lookups(&self) -> impl Iterator<Item = (StackId, &str)> {
        self.entries
            .iter()
            .flat_map(|e| e.output_keys.iter().map(move |k| (e.stack, k.as_str())))
    }

    /// Materialize into a literal parameter once output values are known.
    pub fn to_parameter(&self, value: String) -> Parameter {
        Parameter::new(self.key.clone(), value).ignore_changes(self.ignore_changes)
    }
}

// ── ParameterEntry / ParameterSet ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterEntry {
    Literal(Parameter),
    Output(StackOutputParam),
}

impl ParameterEntry {
    pub fn key(&self) -> &str {
        match self {
            Self::Literal(p) => &p.key,
            Self::Output(p) => &p.key,
        }
    }
}

impl From<Parameter> for ParameterEntry {
    fn from(p: Parameter) -> Self {
        Self::Literal(p)
    }
}

impl From<StackOutputParam> for ParameterEntry {
    fn from(p: StackOutputParam) -> Self {
        Self::Output(p)
    }
}

/// Ordered parameters, de-duplicated by key. Re-setting a key replaces the
/// earlier entry in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    entries: Vec<ParameterEntry>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, entry: impl Into<ParameterEntry>) {
        let entry = entry.into();
        match self.entries.iter_mut().find(|e| e.key() == entry.key()) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParameterEntry> {
        self.entries.iter().find(|e| e.key() == key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParameterEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Provider wire format ────────────────────────────────────────────────────

/// Which submission a parameter list is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterMode {
    Create,
    Update,
}

/// One entry of a submitted or applied parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterRecord {
    pub parameter_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_value: Option<String>,
    #[serde(default)]
    pub use_previous_value: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_value: Option<String>,
}

impl ParameterRecord {
    /// Render a materialized parameter for the given submission.
    ///
    /// For updates, `ignore_changes` parameters carry only the key and
    /// `UsePreviousValue: true`.
    pub fn from_parameter(parameter: &Parameter, mode: ParameterMode) -> Self {
        if mode == ParameterMode::Update && parameter.ignore_changes {
            return Self {
                parameter_key: parameter.key.clone(),
                parameter_value: None,
                use_previous_value: true,
                resolved_value: None,
            };
        }
        Self {
            parameter_key: parameter.key.clone(),
            parameter_value: Some(parameter.value.clone()),
            use_previous_value: parameter.use_previous,
            resolved_value: Some(parameter.resolved_value.clone()),
        }
    }

    pub fn value_or_empty(&self) -> &str {
        self.parameter_value.as_deref().unwrap_or_default()
    }
}
