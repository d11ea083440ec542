use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use super::cache::md5_hex;

/// Marker tag attached to every managed stack.
pub const MARKER_TAG: (&str, &str) = ("Paco-Stack", "true");

/// A provider tag entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Insertion-ordered tag map. Re-adding a key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTags {
    tags: Vec<(String, String)>,
}

impl StackTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags with the marker tag already present.
    pub fn managed() -> Self {
        let mut tags = Self::new();
        tags.add(MARKER_TAG.0, MARKER_TAG.1);
        tags
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.tags.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Render to the provider's `[{Key, Value}]` list.
    pub fn cf_list(&self) -> Vec<Tag> {
        self.tags
            .iter()
            .map(|(key, value)| Tag {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }

    /// md5 of the YAML rendering of the tag map.
    pub fn cache_id(&self) -> String {
        let mapping: Mapping = self
            .tags
            .iter()
            .map(|(k, v)| (Value::from(k.as_str()), Value::from(v.as_str())))
            .collect();
        // A mapping of strings always serializes.
        let rendered = serde_yaml::to_string(&mapping).unwrap_or_default();
        md5_hex(rendered.as_bytes())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StackTags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Self::new();
        for (k, v) in iter {
            tags.add(k, v);
        }
        tags
    }
}
