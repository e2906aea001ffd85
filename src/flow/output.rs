// SPDX-License-Identifier: MIT

//! Output merge algebra
//!
//! Combines two output entries into one ordered sequence. A bare value is
//! treated as a one-element sequence, then `left ++ right` is returned.
//! Duplicates are kept, order is left-then-right, and the operation is
//! associative, so folding contributions in any grouping gives the same log
//! as long as the caller keeps their left/right orientation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{FlowError, Result};

/// Fixed configuration for a merge
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MergeOptions {
    /// Keep only the most recent `max_len` entries of the combined sequence
    #[serde(default)]
    pub max_len: Option<usize>,
}

impl MergeOptions {
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
        }
    }
}

/// Result of calling [`add_outputs`]
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// Both sides were given and combined
    Merged(Value),
    /// Neither side was given; complete later with both
    Partial(OutputMerger),
}

impl MergeOutcome {
    /// Unwrap a merged value, failing if the merge was only partially applied
    pub fn into_value(self) -> Result<Value> {
        match self {
            MergeOutcome::Merged(v) => Ok(v),
            MergeOutcome::Partial(_) => Err(FlowError::Other(
                "merge was partially applied; no value to take".to_string(),
            )),
        }
    }
}

/// A merge with its options fixed, waiting for both sides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputMerger {
    options: MergeOptions,
}

impl OutputMerger {
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Combine `left` and `right` into one sequence
    pub fn merge(&self, left: Value, right: Value) -> Value {
        let mut combined = into_sequence(left);
        combined.extend(into_sequence(right));

        if let Some(max_len) = self.options.max_len {
            if combined.len() > max_len {
                let excess = combined.len() - max_len;
                combined.drain(..excess);
            }
        }

        Value::Array(combined)
    }

    /// Turn the merger into a plain two-argument function, e.g. for folds
    pub fn into_fn(self) -> impl Fn(Value, Value) -> Value + Send + Sync + Clone {
        move |left, right| self.merge(left, right)
    }
}

fn into_sequence(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Merge two outputs with default options
///
/// Both sides given: returns the combined sequence. Neither given: returns a
/// partially applied merger. Exactly one given: `InvalidArgument`.
pub fn add_outputs(left: Option<Value>, right: Option<Value>) -> Result<MergeOutcome> {
    add_outputs_with(left, right, MergeOptions::default())
}

/// Merge two outputs with fixed options
pub fn add_outputs_with(
    left: Option<Value>,
    right: Option<Value>,
    options: MergeOptions,
) -> Result<MergeOutcome> {
    let merger = OutputMerger::new(options);
    match (left, right) {
        (Some(l), Some(r)) => Ok(MergeOutcome::Merged(merger.merge(l, r))),
        (Some(l), None) => Err(FlowError::invalid_argument("left", l)),
        (None, Some(r)) => Err(FlowError::invalid_argument("right", r)),
        (None, None) => Ok(MergeOutcome::Partial(merger)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn merge(left: Value, right: Value) -> Value {
        add_outputs(Some(left), Some(right))
            .unwrap()
            .into_value()
            .unwrap()
    }

    #[test]
    fn test_two_scalars_become_pair() {
        assert_eq!(merge(json!(1), json!(2)), json!([1, 2]));
        assert_eq!(merge(json!("a"), json!({"k": 1})), json!(["a", {"k": 1}]));
    }

    #[test]
    fn test_sequences_concatenate() {
        assert_eq!(merge(json!([1, 2]), json!([3])), json!([1, 2, 3]));
        assert_eq!(merge(json!([]), json!([1])), json!([1]));
    }

    #[test]
    fn test_mixed_value_and_sequence() {
        assert_eq!(merge(json!([1, 2]), json!(3)), json!([1, 2, 3]));
        assert_eq!(merge(json!(0), json!([1, 2])), json!([0, 1, 2]));
    }

    #[test]
    fn test_duplicates_preserved() {
        assert_eq!(merge(json!([1, 1]), json!(1)), json!([1, 1, 1]));
    }

    #[test]
    fn test_null_is_a_value() {
        assert_eq!(merge(json!(null), json!(1)), json!([null, 1]));
    }

    #[test]
    fn test_only_left_is_invalid() {
        let err = add_outputs(Some(json!(7)), None).unwrap_err();
        match err {
            FlowError::InvalidArgument { side, value } => {
                assert_eq!(side, "left");
                assert_eq!(value, "7");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_only_right_is_invalid() {
        let err = add_outputs(None, Some(json!("x"))).unwrap_err();
        assert!(matches!(err, FlowError::InvalidArgument { ref side, .. } if side == "right"));
    }

    #[test]
    fn test_neither_side_returns_partial() {
        let outcome = add_outputs_with(None, None, MergeOptions::with_max_len(2)).unwrap();
        let merger = match outcome {
            MergeOutcome::Partial(m) => m,
            MergeOutcome::Merged(v) => panic!("expected partial, got {v}"),
        };
        assert_eq!(merger.options().max_len, Some(2));
        assert_eq!(merger.merge(json!([1, 2]), json!(3)), json!([2, 3]));
    }

    #[test]
    fn test_partial_as_fold_step() {
        let merge_fn = OutputMerger::default().into_fn();
        let folded = vec![json!(2), json!([3, 4]), json!(5)]
            .into_iter()
            .fold(json!([1]), |acc, v| merge_fn(acc, v));
        assert_eq!(folded, json!([1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_associative() {
        let cases = vec![
            (json!(1), json!(2), json!(3)),
            (json!([1]), json!(2), json!([3, 4])),
            (json!([]), json!([]), json!(1)),
            (json!({"a": 1}), json!([{"b": 2}]), json!("c")),
        ];
        for (a, b, c) in cases {
            let left = merge(merge(a.clone(), b.clone()), c.clone());
            let right = merge(a, merge(b, c));
            assert_eq!(left, right);
        }
    }

    #[test]
    fn test_associative_with_max_len() {
        let merger = OutputMerger::new(MergeOptions::with_max_len(3));
        let (a, b, c) = (json!([1, 2]), json!([3, 4]), json!(5));
        let left = merger.merge(merger.merge(a.clone(), b.clone()), c.clone());
        let right = merger.merge(a, merger.merge(b, c));
        assert_eq!(left, right);
        assert_eq!(left, json!([3, 4, 5]));
    }

    #[test]
    fn test_options_deserialize() {
        let opts: MergeOptions = serde_yaml::from_str("max_len: 4").unwrap();
        assert_eq!(opts, MergeOptions::with_max_len(4));
        let opts: MergeOptions = serde_yaml::from_str("{}").unwrap();
        assert_eq!(opts.max_len, None);
    }
}
