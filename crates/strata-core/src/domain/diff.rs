//! Structural diff of two YAML documents, rendered for change confirmation.

use serde_yaml::Value;

/// Template sections whose leading path segment is folded into a header.
const ROOT_SECTIONS: [&str; 3] = ["Parameters", "Resources", "Outputs"];

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Changed {
        path: Vec<String>,
        old: Value,
        new: Value,
    },
    Added {
        path: Vec<String>,
        value: Value,
    },
    Removed {
        path: Vec<String>,
        value: Value,
    },
}

impl Change {
    pub fn path(&self) -> &[String] {
        match self {
            Self::Changed { path, .. } | Self::Added { path, .. } | Self::Removed { path, .. } => {
                path
            }
        }
    }
}

/// Deep diff of `old` against `new`. Sequences are compared by index.
pub fn deep_diff(old: &Value, new: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    walk(old, new, &mut Vec::new(), &mut changes);
    changes
}

fn walk(old: &Value, new: &Value, path: &mut Vec<String>, out: &mut Vec<Change>) {
    match (old, new) {
        (Value::Mapping(a), Value::Mapping(b)) => {
            for (key, old_value) in a {
                path.push(key_str(key));
                match b.get(key) {
                    Some(new_value) => walk(old_value, new_value, path, out),
                    None => out.push(Change::Removed {
                        path: path.clone(),
                        value: old_value.clone(),
                    }),
                }
                path.pop();
            }
            for (key, new_value) in b {
                if !a.contains_key(key) {
                    path.push(key_str(key));
                    out.push(Change::Added {
                        path: path.clone(),
                        value: new_value.clone(),
                    });
                    path.pop();
                }
            }
        }
        (Value::Sequence(a), Value::Sequence(b)) => {
            for idx in 0..a.len().max(b.len()) {
                path.push(idx.to_string());
                match (a.get(idx), b.get(idx)) {
                    (Some(x), Some(y)) => walk(x, y, path, out),
                    (Some(x), None) => out.push(Change::Removed {
                        path: path.clone(),
                        value: x.clone(),
                    }),
                    (None, Some(y)) => out.push(Change::Added {
                        path: path.clone(),
                        value: y.clone(),
                    }),
                    (None, None) => {}
                }
                path.pop();
            }
        }
        (Value::Tagged(a), Value::Tagged(b)) if a.tag == b.tag => {
            walk(&a.value, &b.value, path, out);
        }
        _ if old != new => out.push(Change::Changed {
            path: path.clone(),
            old: old.clone(),
            new: new.clone(),
        }),
        _ => {}
    }
}

fn key_str(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => scalar_str(other),
    }
}

/// Inline rendering of a scalar; collections fall back to flow YAML.
pub fn scalar_str(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

// ── Rendering ───────────────────────────────────────────────────────────────

/// Render `changes` as the `ooo Changed` / `--- Removed` / `+++ Added`
/// report. Returns one string per output line.
pub fn render(changes: &[Change]) -> Vec<String> {
    let mut lines = Vec::new();

    let changed: Vec<_> = changes
        .iter()
        .filter(|c| matches!(c, Change::Changed { .. }))
        .collect();
    let removed: Vec<_> = changes
        .iter()
        .filter(|c| matches!(c, Change::Removed { .. }))
        .collect();
    let added: Vec<_> = changes
        .iter()
        .filter(|c| matches!(c, Change::Added { .. }))
        .collect();

    for (title, fence, section) in [
        ("ooo Changed", "ooo", changed),
        ("--- Removed", "---", removed),
        ("+++ Added", "+++", added),
    ] {
        if section.is_empty() {
            continue;
        }
        lines.push(String::new());
        lines.push(title.to_string());
        render_section(&section, &mut lines);
        lines.push(fence.to_string());
    }
    lines
}

fn render_section(section: &[&Change], lines: &mut Vec<String>) {
    let mut last_root: Option<&str> = None;
    for change in section {
        let path = change.path();
        let mut node = path.join(".");
        if let Some(root) = ROOT_SECTIONS
            .iter()
            .find(|root| path.len() > 1 && path[0] == **root)
        {
            node = path[1..].join(".");
            if last_root != Some(*root) {
                lines.push(format!("{root}:"));
            }
            last_root = Some(*root);
        }

        match change {
            Change::Changed { old, new, .. } => {
                lines.push(format!("  {node}:"));
                lines.push(format!("    old: {}", scalar_str(old)));
                lines.push(format!("    new: {}", scalar_str(new)));
            }
            Change::Added { value, .. } | Change::Removed { value, .. } => {
                render_value(&node, value, lines);
            }
        }
        lines.push(String::new());
    }
}

fn render_value(node: &str, value: &Value, lines: &mut Vec<String>) {
    match value {
        Value::Mapping(_) | Value::Sequence(_) | Value::Tagged(_) => {
            lines.push(format!("  {node}:"));
            let yaml = serde_yaml::to_string(value).unwrap_or_default();
            lines.extend(yaml.lines().map(|l| format!("      {l}")));
        }
        scalar => lines.push(format!("  {node}: {}", scalar_str(scalar))),
    }
}

/// Advisory warnings for changes with surprising consequences: removed
/// resources and resources whose `Type` changed.
pub fn advisories(changes: &[Change]) -> Vec<String> {
    changes
        .iter()
        .filter_map(|change| match change {
            Change::Removed { path, .. } if path.len() == 2 && path[0] == "Resources" => Some(
                format!("WARNING: Resource '{}' will be deleted.", path[1]),
            ),
            Change::Changed { path, old, new }
                if path.len() == 3 && path[0] == "Resources" && path[2] == "Type" =>
            {
                Some(format!(
                    "WARNING: Resource '{}' changes Type from {} to {} and will be replaced.",
                    path[1],
                    scalar_str(old),
                    scalar_str(new)
                ))
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn identical_documents_have_no_changes() {
        let doc = yaml("Resources: {Foo: {Type: AWS::X}}");
        assert!(deep_diff(&doc, &doc).is_empty());
    }

    #[test]
    fn detects_changed_added_removed() {
        let old = yaml("Resources: {Foo: {Type: AWS::X, Properties: {A: 1}}, Gone: {Type: AWS::Y}}");
        let new = yaml("Resources: {Foo: {Type: AWS::X, Properties: {A: 2}}, New: {Type: AWS::Z}}");
        let changes = deep_diff(&old, &new);

        assert_eq!(changes.len(), 3);
        assert!(changes.iter().any(|c| matches!(c,
            Change::Changed { path, .. } if path.join(".") == "Resources.Foo.Properties.A")));
        assert!(changes.iter().any(|c| matches!(c,
            Change::Removed { path, .. } if path.join(".") == "Resources.Gone")));
        assert!(changes.iter().any(|c| matches!(c,
            Change::Added { path, .. } if path.join(".") == "Resources.New")));
    }

    #[test]
    fn sequences_compare_by_index() {
        let changes = deep_diff(&yaml("L: [a, b]"), &yaml("L: [a, c, d]"));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path(), ["L", "1"]);
        assert!(matches!(changes[1], Change::Added { .. }));
    }

    #[test]
    fn render_strips_section_prefix_and_prints_old_new() {
        let changes = deep_diff(
            &yaml("Resources: {Foo: {Properties: {A: 1}}}"),
            &yaml("Resources: {Foo: {Properties: {A: 2}}}"),
        );
        let lines = render(&changes);
        assert!(lines.contains(&"ooo Changed".to_string()));
        assert!(lines.contains(&"Resources:".to_string()));
        assert!(lines.contains(&"  Foo.Properties.A:".to_string()));
        assert!(lines.contains(&"    old: 1".to_string()));
        assert!(lines.contains(&"    new: 2".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("ooo"));
    }

    #[test]
    fn render_prints_section_header_once() {
        let changes = deep_diff(
            &yaml("Outputs: {A: 1, B: 1}"),
            &yaml("Outputs: {A: 2, B: 2}"),
        );
        let lines = render(&changes);
        assert_eq!(lines.iter().filter(|l| *l == "Outputs:").count(), 1);
    }

    #[test]
    fn advisories_flag_deletes_and_type_changes() {
        let changes = deep_diff(
            &yaml("Resources: {A: {Type: AWS::X}, B: {Type: AWS::Y}}"),
            &yaml("Resources: {A: {Type: AWS::Z}}"),
        );
        let warnings = advisories(&changes);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.starts_with("WARNING: ")));
    }
}
