//! Project model lookups over a YAML tree.

use std::collections::BTreeMap;

use serde_yaml::Value;
use tracing::trace;

use strata_core::{
    application::ports::{ModelResolver, ModelValue},
    domain::Reference,
    error::StrataResult,
};

/// Resolves references against the manifest's `model` tree.
///
/// `accounts.<name>` is answered from the account table. Any other path
/// walks the tree: scalars resolve to their string form, mappings and
/// sequences are model objects, and a missing segment is `None`.
#[derive(Debug, Clone, Default)]
pub struct YamlModel {
    model: Value,
    accounts: BTreeMap<String, String>,
}

impl YamlModel {
    pub fn new(model: Value, accounts: BTreeMap<String, String>) -> Self {
        Self { model, accounts }
    }

    fn walk(&self, parts: &[String]) -> Option<&Value> {
        parts.iter().try_fold(&self.model, |node, part| match node {
            Value::Mapping(map) => map.get(part.as_str()),
            Value::Sequence(seq) => part.parse::<usize>().ok().and_then(|i| seq.get(i)),
            _ => None,
        })
    }
}

impl ModelResolver for YamlModel {
    fn resolve(&self, reference: &Reference) -> StrataResult<Option<ModelValue>> {
        if let [root, name] = reference.parts()
            && root == "accounts"
        {
            return Ok(self
                .accounts
                .get(name)
                .map(|id| ModelValue::Scalar(id.clone())));
        }

        let value = match self.walk(reference.parts()) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(ModelValue::Scalar(s.clone())),
            Some(Value::Number(n)) => Some(ModelValue::Scalar(n.to_string())),
            Some(Value::Bool(b)) => Some(ModelValue::Scalar(b.to_string())),
            Some(Value::Tagged(tagged)) => match &tagged.value {
                Value::String(s) => Some(ModelValue::Scalar(s.clone())),
                _ => Some(ModelValue::Node),
            },
            Some(Value::Mapping(_) | Value::Sequence(_)) => Some(ModelValue::Node),
        };
        trace!(reference = %reference, found = value.is_some(), "Model lookup");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> YamlModel {
        let tree: Value = serde_yaml::from_str(
            r#"
netenv:
  ne:
    dev:
      cidr: 10.0.0.0/16
      size: 3
      network:
        vpc:
          enable_dns: true
      zones: [a, b]
"#,
        )
        .unwrap();
        let accounts = BTreeMap::from([("dev".to_string(), "123456789012".to_string())]);
        YamlModel::new(tree, accounts)
    }

    fn resolve(path: &str) -> Option<ModelValue> {
        model()
            .resolve(&Reference::from_path(path).unwrap())
            .unwrap()
    }

    #[test]
    fn scalars_resolve_to_strings() {
        assert_eq!(
            resolve("netenv.ne.dev.cidr"),
            Some(ModelValue::Scalar("10.0.0.0/16".into()))
        );
        assert_eq!(resolve("netenv.ne.dev.size"), Some(ModelValue::Scalar("3".into())));
        assert_eq!(resolve("netenv.ne.dev.zones.1"), Some(ModelValue::Scalar("b".into())));
    }

    #[test]
    fn objects_are_nodes() {
        assert_eq!(resolve("netenv.ne.dev.network.vpc"), Some(ModelValue::Node));
    }

    #[test]
    fn accounts_resolve_to_ids() {
        assert_eq!(
            resolve("accounts.dev"),
            Some(ModelValue::Scalar("123456789012".into()))
        );
        assert_eq!(resolve("accounts.prod"), None);
    }

    #[test]
    fn missing_paths_are_none() {
        assert_eq!(resolve("netenv.ne.prod"), None);
        assert_eq!(resolve("netenv.ne.dev.cidr.x"), None);
    }
}
