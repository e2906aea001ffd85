// SPDX-License-Identifier: MIT

//! Node execution contract
//!
//! Every node kind implements [`Node`]. The shared lifecycle lives once in
//! [`invoke`]: resolve templates, run, then wrap the result as
//! `{"outputs": {name: result}}` for the caller to fold into the state.
//!
//! Node kinds:
//! - `CodeNode` - runs a sandboxed code fragment against the state

mod code;

pub use code::CodeNode;

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::error::Result;
use super::resolver;
use super::state::{State, OUTPUTS_KEY};

/// Core trait for all node kinds
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique name; the key the result is stored under in `outputs`
    fn name(&self) -> &str;

    /// Fields that may hold `{{path}}` templates
    fn resolvable_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Mutable access to a resolvable field by name
    fn field_mut(&mut self, _field: &str) -> Option<&mut Value> {
        None
    }

    /// Node-specific logic, run after its fields are resolved
    async fn run(&self, state: &State) -> Result<Value>;
}

/// Where an invocation currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Resolving,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Created => "created",
            Phase::Resolving => "resolving",
            Phase::Running => "running",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn enter(node: &str, phase: Phase) {
    log::debug!("Node {} -> {}", node, phase);
}

/// Resolve, run and wrap one node
///
/// Errors from either step are returned unchanged. Nothing is written to
/// `state`; folding the wrapped result is left to the caller.
pub async fn invoke(node: &mut dyn Node, state: &State) -> Result<Value> {
    let name = node.name().to_string();
    enter(&name, Phase::Created);

    enter(&name, Phase::Resolving);
    if let Err(e) = resolver::resolve(node, state) {
        enter(&name, Phase::Failed);
        return Err(e);
    }

    enter(&name, Phase::Running);
    let result = match node.run(state).await {
        Ok(result) => result,
        Err(e) => {
            enter(&name, Phase::Failed);
            return Err(e);
        }
    };
    enter(&name, Phase::Completed);

    Ok(wrap(name, result))
}

/// `{"outputs": {name: result}}`
pub fn wrap(name: impl Into<String>, result: Value) -> Value {
    let mut entry = Map::new();
    entry.insert(name.into(), result);
    let mut wrapped = Map::new();
    wrapped.insert(OUTPUTS_KEY.to_string(), Value::Object(entry));
    Value::Object(wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::error::FlowError;
    use serde_json::json;

    /// Echoes its `input` field, or fails when asked to
    struct EchoNode {
        name: String,
        input: Value,
        fail: bool,
    }

    impl EchoNode {
        fn new(name: &str, input: Value) -> Self {
            Self {
                name: name.to_string(),
                input,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Node for EchoNode {
        fn name(&self) -> &str {
            &self.name
        }

        fn resolvable_fields(&self) -> &'static [&'static str] {
            &["input"]
        }

        fn field_mut(&mut self, field: &str) -> Option<&mut Value> {
            (field == "input").then_some(&mut self.input)
        }

        async fn run(&self, _state: &State) -> Result<Value> {
            if self.fail {
                return Err(FlowError::Other("echo failed".to_string()));
            }
            Ok(self.input.clone())
        }
    }

    #[tokio::test]
    async fn test_invoke_wraps_result() {
        let mut node = EchoNode::new("echo", json!(3));
        let wrapped = invoke(&mut node, &State::empty()).await.unwrap();
        assert_eq!(wrapped, json!({"outputs": {"echo": 3}}));
    }

    #[tokio::test]
    async fn test_invoke_resolves_against_current_state() {
        let mut state = State::empty();
        state.apply(json!({"outputs": {"first": [1, 2]}})).unwrap();

        let mut node = EchoNode::new("second", json!("{{outputs.first.-1}}"));
        let wrapped = invoke(&mut node, &state).await.unwrap();
        assert_eq!(wrapped, json!({"outputs": {"second": 2}}));
    }

    #[tokio::test]
    async fn test_invoke_propagates_errors() {
        let mut node = EchoNode::new("echo", json!("{{outputs.missing}}"));
        let err = invoke(&mut node, &State::empty()).await.unwrap_err();
        assert!(matches!(err, FlowError::PathNotFound { .. }));

        let mut node = EchoNode::new("echo", json!(1));
        node.fail = true;
        let err = invoke(&mut node, &State::empty()).await.unwrap_err();
        assert_eq!(err.to_string(), "echo failed");
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("n", json!(null)), json!({"outputs": {"n": null}}));
    }
}
