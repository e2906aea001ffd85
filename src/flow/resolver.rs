// SPDX-License-Identifier: MIT

//! Template resolution for node fields
//!
//! A field whose whole value is `{{outputs.step.key}}` is replaced with the
//! value found at that path in the state's output log, immediately before the
//! node runs. Templates embedded in a longer string are left as they are.

use serde_json::Value;

use super::error::{FlowError, Result};
use super::nodes::Node;
use super::script::values::normalize_index;
use super::state::{State, OUTPUTS_KEY};

const TEMPLATE_OPEN: &str = "{{";
const TEMPLATE_CLOSE: &str = "}}";

/// Path segments of a whole-field template, or `None` if `text` is not one
///
/// Only the exact form `{{a.b.c}}` counts; surrounding or inner whitespace
/// makes the field plain text.
pub fn template_path(text: &str) -> Option<Vec<&str>> {
    let inner = text
        .strip_prefix(TEMPLATE_OPEN)?
        .strip_suffix(TEMPLATE_CLOSE)?;
    if inner.is_empty()
        || inner.contains(char::is_whitespace)
        || inner.contains(TEMPLATE_OPEN)
        || inner.contains(TEMPLATE_CLOSE)
    {
        return None;
    }
    Some(inner.split('.').collect())
}

/// Walk `segments` through the output log
///
/// A leading `outputs` segment is optional. Mapping levels are indexed by
/// key, sequence levels by integer position (negative counts from the end).
pub fn lookup<'s>(state: &'s State, segments: &[&str]) -> Result<&'s Value> {
    let rest = match segments.split_first() {
        Some((first, rest)) if *first == OUTPUTS_KEY => rest,
        _ => segments,
    };

    let mut current = state
        .outputs()
        .ok_or_else(|| FlowError::path_not_found(OUTPUTS_KEY, ""))?;
    let mut consumed = vec![OUTPUTS_KEY];

    for segment in rest {
        current = step(current, segment)
            .ok_or_else(|| FlowError::path_not_found(*segment, consumed.join(".")))?;
        consumed.push(segment);
    }
    Ok(current)
}

fn step<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => {
            let index: i64 = segment.parse().ok()?;
            normalize_index(index, items.len()).and_then(|i| items.get(i))
        }
        _ => None,
    }
}

/// Replace template references in the node's resolvable fields
///
/// Single pass: a substituted value is never scanned again.
pub fn resolve(node: &mut dyn Node, state: &State) -> Result<()> {
    let node_name = node.name().to_string();

    for &field in node.resolvable_fields() {
        let Some(value) = node.field_mut(field) else {
            continue;
        };
        let Value::String(text) = &*value else {
            continue;
        };
        if !text.contains(TEMPLATE_OPEN) {
            continue;
        }

        match template_path(text) {
            Some(segments) => {
                let resolved = lookup(state, &segments)?.clone();
                log::debug!(
                    "Resolved {}.{} from '{}'",
                    node_name,
                    field,
                    segments.join(".")
                );
                *value = resolved;
            }
            None => {
                log::debug!(
                    "{}.{} holds an embedded template, leaving it unresolved",
                    node_name,
                    field
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct FieldNode {
        input: Value,
        other: Value,
    }

    #[async_trait]
    impl Node for FieldNode {
        fn name(&self) -> &str {
            "fields"
        }

        fn resolvable_fields(&self) -> &'static [&'static str] {
            &["input", "other"]
        }

        fn field_mut(&mut self, field: &str) -> Option<&mut Value> {
            match field {
                "input" => Some(&mut self.input),
                "other" => Some(&mut self.other),
                _ => None,
            }
        }

        async fn run(&self, _state: &State) -> Result<Value> {
            Ok(self.input.clone())
        }
    }

    fn field_node(input: Value) -> FieldNode {
        FieldNode {
            input,
            other: json!("plain"),
        }
    }

    fn state() -> State {
        State::from_value(json!({
            "outputs": {
                "x": {"count": 2, "tags": ["a", "b"]},
                "rows": [{"y": 10}, {"y": 20}]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_template_path() {
        assert_eq!(template_path("{{outputs.x}}"), Some(vec!["outputs", "x"]));
        assert_eq!(template_path(" {{ a.b }} "), None);
        assert_eq!(template_path("{{a. b}}"), None);
        assert_eq!(template_path("value is {{outputs.x}}"), None);
        assert_eq!(template_path("{{}}"), None);
        assert_eq!(template_path("{{a}} and {{b}}"), None);
    }

    #[test]
    fn test_resolves_exact_value_and_type() {
        let mut node = field_node(json!("{{outputs.x}}"));
        resolve(&mut node, &state()).unwrap();
        assert_eq!(node.input, json!({"count": 2, "tags": ["a", "b"]}));
        assert_eq!(node.other, json!("plain"));
    }

    #[test]
    fn test_index_then_key() {
        let mut node = field_node(json!("{{outputs.rows.1.y}}"));
        resolve(&mut node, &state()).unwrap();
        assert_eq!(node.input, json!(20));

        let mut node = field_node(json!("{{rows.-1.y}}"));
        resolve(&mut node, &state()).unwrap();
        assert_eq!(node.input, json!(20));
    }

    #[test]
    fn test_missing_segment() {
        let mut node = field_node(json!("{{outputs.x.missing.deeper}}"));
        let err = resolve(&mut node, &state()).unwrap_err();
        match err {
            FlowError::PathNotFound { segment, path } => {
                assert_eq!(segment, "missing");
                assert_eq!(path, "outputs.x");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(node.input, json!("{{outputs.x.missing.deeper}}"));
    }

    #[test]
    fn test_index_out_of_range() {
        let mut node = field_node(json!("{{outputs.rows.5}}"));
        assert!(matches!(
            resolve(&mut node, &state()),
            Err(FlowError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_no_outputs_yet() {
        let mut node = field_node(json!("{{outputs.x}}"));
        let err = resolve(&mut node, &State::empty()).unwrap_err();
        assert!(matches!(err, FlowError::PathNotFound { segment, .. } if segment == "outputs"));
    }

    #[test]
    fn test_embedded_template_passes_through() {
        let mut node = field_node(json!("count: {{outputs.x.count}}"));
        resolve(&mut node, &state()).unwrap();
        assert_eq!(node.input, json!("count: {{outputs.x.count}}"));

        let mut node = field_node(json!(" {{ outputs.x.count }} "));
        resolve(&mut node, &state()).unwrap();
        assert_eq!(node.input, json!(" {{ outputs.x.count }} "));
    }

    #[test]
    fn test_single_pass() {
        let state = State::from_value(json!({
            "outputs": {"a": "{{outputs.b}}", "b": 1}
        }))
        .unwrap();
        let mut node = field_node(json!("{{outputs.a}}"));
        resolve(&mut node, &state).unwrap();
        assert_eq!(node.input, json!("{{outputs.b}}"));
    }
}
