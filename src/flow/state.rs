// SPDX-License-Identifier: MIT

//! Runtime state shared by every node invocation in one workflow run

use serde_json::{Map, Value};

use super::error::{FlowError, Result};
use super::output::OutputMerger;

/// Reserved key holding the per-node output log
pub const OUTPUTS_KEY: &str = "outputs";

/// Shared workflow state
///
/// A mapping from string keys to values. The reserved `outputs` key maps each
/// node name to its most recent result, or to the accumulated sequence once
/// more than one contribution has targeted the same name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    fields: Map<String, Value>,
    merger: OutputMerger,
}

impl State {
    /// Create an empty State
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a State pre-seeded from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self {
                fields,
                merger: OutputMerger::default(),
            }),
            Value::Null => Ok(Self::empty()),
            other => Err(FlowError::invalid_argument("state", other)),
        }
    }

    /// Use a specific merger when folding results into `outputs`
    pub fn with_merger(mut self, merger: OutputMerger) -> Self {
        self.merger = merger;
        self
    }

    /// Get a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a top-level field, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// The output log, if any node has written to it yet
    pub fn outputs(&self) -> Option<&Value> {
        self.fields.get(OUTPUTS_KEY)
    }

    /// Output entry for one node
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs().and_then(|o| o.get(name))
    }

    /// Fold a wrapped node result (`{"outputs": {name: value}}`) into the state
    ///
    /// Existing output slots are combined with the new value through the
    /// merge algebra (existing on the left). A sequence-shaped `outputs` log
    /// gets the whole `{name: value}` mapping appended instead. Any other
    /// top-level key in the update overwrites.
    pub fn apply(&mut self, update: Value) -> Result<()> {
        let Value::Object(update) = update else {
            return Err(FlowError::invalid_argument("update", update));
        };

        for (key, value) in update {
            if key != OUTPUTS_KEY {
                self.fields.insert(key, value);
                continue;
            }

            if !value.is_object() {
                return Err(FlowError::invalid_argument(OUTPUTS_KEY, value));
            }

            let merged = match self.fields.remove(OUTPUTS_KEY) {
                None | Some(Value::Null) => value,
                Some(Value::Object(mut log)) => {
                    if let Value::Object(entries) = value {
                        for (name, result) in entries {
                            let entry = match log.remove(&name) {
                                Some(existing) => self.merger.merge(existing, result),
                                None => result,
                            };
                            log.insert(name, entry);
                        }
                    }
                    Value::Object(log)
                }
                Some(existing) => self.merger.merge(existing, Value::Array(vec![value])),
            };
            self.fields.insert(key, merged);
        }

        Ok(())
    }

    /// Convert state to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Get all top-level field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}
