// SPDX-License-Identifier: MIT

//! Minimal in-order orchestrator
//!
//! Invokes nodes in the order given and folds each wrapped result into the
//! state. Dependency analysis is the caller's job: a node can only reference
//! outputs of nodes listed before it.
//!
//! Under the continue policy a failure is recorded as `errors.<name>` in the
//! state. The top-level `errors` key belongs to the runner.

use futures::future::join_all;
use serde_json::{Map, Value};

use crate::flow::config::ErrorPolicy;
use crate::flow::error::Result;
use crate::flow::nodes::{invoke, Node};
use crate::flow::state::State;

/// State key holding the errors of failed nodes, by node name
pub const ERRORS_KEY: &str = "errors";

/// Runs a sequence of nodes against one state
#[derive(Debug, Clone, Default)]
pub struct WorkflowRunner {
    policy: ErrorPolicy,
}

impl WorkflowRunner {
    pub fn new(policy: ErrorPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Invoke each node in turn; every node sees the results of those before it
    pub async fn run(&self, nodes: &mut [Box<dyn Node>], mut state: State) -> Result<State> {
        log::info!("Running {} nodes sequentially", nodes.len());

        for node in nodes.iter_mut() {
            let name = node.name().to_string();
            log::info!("Executing node: {}", name);
            let outcome = invoke(node.as_mut(), &state).await;
            self.fold(&mut state, &name, outcome)?;
        }
        Ok(state)
    }

    /// Invoke all nodes against one snapshot of the state, then fold their
    /// results in listed order
    ///
    /// Only suitable for nodes that do not reference each other's outputs.
    pub async fn run_concurrent(
        &self,
        nodes: &mut [Box<dyn Node>],
        mut state: State,
    ) -> Result<State> {
        log::info!("Running {} nodes concurrently", nodes.len());

        let snapshot = &state.clone();
        let results = join_all(nodes.iter_mut().map(|node| async move {
            let name = node.name().to_string();
            let outcome = invoke(node.as_mut(), snapshot).await;
            (name, outcome)
        }))
        .await;

        for (name, outcome) in results {
            self.fold(&mut state, &name, outcome)?;
        }
        Ok(state)
    }

    fn fold(&self, state: &mut State, name: &str, outcome: Result<Value>) -> Result<()> {
        match outcome {
            Ok(wrapped) => {
                state.apply(wrapped)?;
                log::info!("Node {} completed", name);
                Ok(())
            }
            Err(e) => match self.policy {
                ErrorPolicy::Abort => {
                    log::error!("Node {} failed, aborting: {}", name, e);
                    Err(e)
                }
                ErrorPolicy::Continue => {
                    log::error!("Node {} failed: {}", name, e);
                    record_error(state, name, e.to_string());
                    Ok(())
                }
            },
        }
    }
}

fn record_error(state: &mut State, name: &str, message: String) {
    let mut errors = match state.get(ERRORS_KEY) {
        Some(Value::Object(errors)) => errors.clone(),
        Some(other) => {
            log::warn!(
                "Replacing non-mapping '{}' state entry ({}) to record node errors",
                ERRORS_KEY,
                other
            );
            Map::new()
        }
        None => Map::new(),
    };
    errors.insert(name.to_string(), Value::String(message));
    state.insert(ERRORS_KEY, Value::Object(errors));
}

/// Recorded error of a node that failed under the continue policy
pub fn node_error<'s>(state: &'s State, name: &str) -> Option<&'s str> {
    state.get(ERRORS_KEY)?.get(name)?.as_str()
}

/// Nodes whose failures were recorded in `state` under the continue policy
pub fn failed_nodes(state: &State) -> Vec<&str> {
    match state.get(ERRORS_KEY) {
        Some(Value::Object(errors)) => errors.keys().map(String::as_str).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::error::FlowError;
    use crate::flow::nodes::CodeNode;
    use serde_json::json;

    fn code(name: &str, source: &str) -> Box<dyn Node> {
        Box::new(CodeNode::with_default_sandbox(name, source))
    }

    #[tokio::test]
    async fn test_sequential_chain() {
        let mut nodes = vec![
            code("a", "return 20"),
            code("b", "return state['outputs']['a'] + 1"),
            code("c", "return state['outputs']['b'] * 2"),
        ];
        let state = WorkflowRunner::default()
            .run(&mut nodes, State::empty())
            .await
            .unwrap();
        assert_eq!(
            state.to_json(),
            json!({"outputs": {"a": 20, "b": 21, "c": 42}})
        );
    }

    #[tokio::test]
    async fn test_repeated_name_accumulates() {
        let mut nodes = vec![code("n", "return 1"), code("n", "return 2")];
        let state = WorkflowRunner::default()
            .run(&mut nodes, State::empty())
            .await
            .unwrap();
        assert_eq!(state.output("n"), Some(&json!([1, 2])));
    }

    #[tokio::test]
    async fn test_abort_policy() {
        let mut nodes = vec![code("ok", "return 1"), code("bad", "return missing")];
        let err = WorkflowRunner::new(ErrorPolicy::Abort)
            .run(&mut nodes, State::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::FragmentExecution { node, .. } if node == "bad"));
    }

    #[tokio::test]
    async fn test_continue_policy() {
        let mut nodes = vec![
            code("bad", "return missing"),
            code("after", "return 5"),
        ];
        let state = WorkflowRunner::new(ErrorPolicy::Continue)
            .run(&mut nodes, State::empty())
            .await
            .unwrap();
        assert_eq!(state.output("after"), Some(&json!(5)));
        assert!(state.output("bad").is_none());
        assert!(node_error(&state, "bad").is_some_and(|e| e.contains("missing")));
        assert_eq!(failed_nodes(&state), vec!["bad"]);
    }

    #[tokio::test]
    async fn test_user_keys_are_not_failures() {
        let seeded = State::from_value(json!({
            "outputs": {},
            "parse.error": "seeded by the caller",
        }))
        .unwrap();
        let mut nodes = vec![code("ok", "return 1")];
        let state = WorkflowRunner::new(ErrorPolicy::Continue)
            .run(&mut nodes, seeded)
            .await
            .unwrap();
        assert!(failed_nodes(&state).is_empty());
        assert_eq!(state.get("parse.error"), Some(&json!("seeded by the caller")));
    }

    #[tokio::test]
    async fn test_errors_accumulate_per_node() {
        let seeded = State::from_value(json!({"errors": "not a mapping"})).unwrap();
        let mut nodes = vec![
            code("first", "return nope"),
            code("second", "return 1 / 0"),
        ];
        let state = WorkflowRunner::new(ErrorPolicy::Continue)
            .run(&mut nodes, seeded)
            .await
            .unwrap();
        assert_eq!(failed_nodes(&state), vec!["first", "second"]);
        assert!(node_error(&state, "second").is_some_and(|e| e.contains("ZeroDivision")));
    }

    #[tokio::test]
    async fn test_concurrent_uses_snapshot() {
        let seeded = State::from_value(json!({"outputs": {"seed": 10}})).unwrap();
        let mut nodes = vec![
            code("x", "return state['outputs']['seed'] + 1"),
            code("y", "return len(state['outputs'])"),
        ];
        let state = WorkflowRunner::default()
            .run_concurrent(&mut nodes, seeded)
            .await
            .unwrap();
        assert_eq!(state.output("x"), Some(&json!(11)));
        assert_eq!(state.output("y"), Some(&json!(1)));
        assert!(failed_nodes(&state).is_empty());
    }
}
