//! Nested output dictionaries shared through the outputs store.
//!
//! A stack output bound to `a.b.c` is stored as `{a: {b: {c: {__name__: v}}}}`
//! so that lookups can walk the reference path.

use serde_yaml::{Mapping, Value};

/// Reserved leaf key holding an output value.
pub const OUTPUT_LEAF: &str = "__name__";

/// Build the nested dictionary for one output.
pub fn output_dict(config_ref: &str, value: &str) -> Mapping {
    let mut node = Mapping::new();
    node.insert(Value::from(OUTPUT_LEAF), Value::from(value));
    for part in config_ref.rsplit('.') {
        let mut parent = Mapping::new();
        parent.insert(Value::from(part), Value::Mapping(node));
        node = parent;
    }
    node
}

/// Recursive merge where `incoming` wins on conflicts and sibling keys of
/// `base` are preserved.
pub fn merge_mappings(base: &mut Mapping, incoming: Mapping) {
    for (key, value) in incoming {
        match value {
            Value::Mapping(new) => {
                if let Some(Value::Mapping(existing)) = base.get_mut(&key) {
                    merge_mappings(existing, new);
                } else {
                    base.insert(key, Value::Mapping(new));
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

/// Walk `path` segments and return the `__name__` leaf, if any.
pub fn lookup_leaf<'a>(root: &'a Mapping, path: &[String]) -> Option<&'a str> {
    let mut node = root;
    for part in path {
        node = node.get(part.as_str())?.as_mapping()?;
    }
    node.get(OUTPUT_LEAF)?.as_str()
}
