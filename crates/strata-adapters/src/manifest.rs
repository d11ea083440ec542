//! Project manifest (`strata.yaml`) loading and registration.
//!
//! The manifest names the accounts, a free-form model tree that `paco.ref`
//! navigates, and a tree of stack groups. Registration walks the groups in
//! file order and hands every stack entry to the builder for its kind, so
//! a stack must be listed after any stack its parameters reference.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, info, instrument};

use strata_core::{
    application::{
        ApplicationError,
        ports::Filesystem,
        services::{BuildRequest, BuilderRegistry, Engine, ResourceKind},
    },
    domain::{GroupId, StackId},
    error::{StrataError, StrataResult},
};

use crate::model::YamlModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountEntry>,
    #[serde(default)]
    pub model: Value,
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account_id: String,
}

/// A stack group. Nested groups inherit `account` and `region`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupEntry {
    pub name: String,
    pub aws_name: String,
    /// AWS name of the controlling scope, prefixed to stack names.
    #[serde(default)]
    pub controller: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
    /// Raw stack entries; each builder parses the fields it knows.
    #[serde(default)]
    pub stacks: Vec<Value>,
}

impl Manifest {
    /// Parse manifest text. `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path) -> StrataResult<Self> {
        serde_yaml::from_str(text).map_err(|e| {
            ApplicationError::Serialization {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn load(fs: &dyn Filesystem, path: &Path) -> StrataResult<Self> {
        let text = fs
            .read_to_string(path)?
            .ok_or_else(|| StrataError::Configuration {
                message: format!("Manifest not found: {}", path.display()),
            })?;
        let manifest = Self::parse(&text, path)?;
        debug!(path = %path.display(), groups = manifest.groups.len(), "Manifest loaded");
        Ok(manifest)
    }

    /// Account name to account id.
    pub fn account_ids(&self) -> BTreeMap<String, String> {
        self.accounts
            .iter()
            .map(|(name, entry)| (name.clone(), entry.account_id.clone()))
            .collect()
    }

    /// The model resolver for this manifest.
    pub fn model(&self) -> YamlModel {
        YamlModel::new(self.model.clone(), self.account_ids())
    }

    /// Register every group and stack on `engine`. Returns the stacks in
    /// registration order.
    #[instrument(skip_all, fields(manifest = %self.name))]
    pub fn register(
        &self,
        engine: &mut Engine,
        registry: &BuilderRegistry,
    ) -> StrataResult<Vec<StackId>> {
        let mut stacks = Vec::new();
        for group in &self.groups {
            self.register_group(engine, registry, group, None, None, &mut stacks)?;
        }
        info!(stacks = stacks.len(), "Manifest registered");
        Ok(stacks)
    }

    // ----- Internal Helpers -----

    fn register_group(
        &self,
        engine: &mut Engine,
        registry: &BuilderRegistry,
        entry: &GroupEntry,
        parent: Option<GroupId>,
        inherited: Option<(&str, &str)>,
        stacks: &mut Vec<StackId>,
    ) -> StrataResult<()> {
        let account = entry
            .account
            .as_deref()
            .or(inherited.map(|(a, _)| a))
            .ok_or_else(|| missing_field(&entry.name, "account"))?;
        let region = entry
            .region
            .as_deref()
            .or(inherited.map(|(_, r)| r))
            .ok_or_else(|| missing_field(&entry.name, "region"))?;
        if !self.accounts.is_empty() && !self.accounts.contains_key(account) {
            return Err(StrataError::Configuration {
                message: format!("Group '{}' names unknown account '{account}'", entry.name),
            });
        }

        let group = engine.add_group(&entry.name, &entry.aws_name, &entry.controller, parent)?;
        for raw in &entry.stacks {
            let request = BuildRequest {
                kind: entry_kind(raw)?,
                group,
                account: account.to_string(),
                region: region.to_string(),
                entry: raw.clone(),
            };
            stacks.extend(registry.build(engine, &request)?);
        }
        for nested in &entry.groups {
            self.register_group(
                engine,
                registry,
                nested,
                Some(group),
                Some((account, region)),
                stacks,
            )?;
        }
        Ok(())
    }
}

/// Default manifest path under `home` when none is configured.
pub fn default_path(home: &Path) -> PathBuf {
    home.join("strata.yaml")
}

fn entry_kind(entry: &Value) -> StrataResult<ResourceKind> {
    match entry.get("kind") {
        None => Ok(ResourceKind::TemplateFile),
        Some(kind) => serde_yaml::from_value(kind.clone()).map_err(|e| StrataError::Configuration {
            message: format!("Unknown resource kind {kind:?}: {e}"),
        }),
    }
}

fn missing_field(group: &str, field: &str) -> StrataError {
    StrataError::Configuration {
        message: format!("Group '{group}' has no {field} and none is inherited"),
    }
}
