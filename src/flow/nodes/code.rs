// SPDX-License-Identifier: MIT

//! Dynamic code node

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::Node;
use crate::flow::error::{FlowError, Result};
use crate::flow::script::Sandbox;
use crate::flow::state::State;

const CODE_FIELD: &str = "code";

/// Runs a code fragment against a copy of the state
///
/// The fragment reports its result with `return <expr>` or by assigning
/// `result`. Finishing without one is a `NoResult` error; any failure inside
/// the fragment surfaces as `FragmentExecution`.
pub struct CodeNode {
    name: String,
    code: Value,
    sandbox: Arc<Sandbox>,
}

impl CodeNode {
    pub fn new(name: impl Into<String>, code: impl Into<String>, sandbox: Arc<Sandbox>) -> Self {
        Self {
            name: name.into(),
            code: Value::String(code.into()),
            sandbox,
        }
    }

    /// Code node with a default sandbox
    pub fn with_default_sandbox(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(name, code, Arc::new(Sandbox::default()))
    }

    /// Current fragment text, after any template resolution
    pub fn code(&self) -> &Value {
        &self.code
    }
}

#[async_trait]
impl Node for CodeNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolvable_fields(&self) -> &'static [&'static str] {
        &[CODE_FIELD]
    }

    fn field_mut(&mut self, field: &str) -> Option<&mut Value> {
        (field == CODE_FIELD).then_some(&mut self.code)
    }

    async fn run(&self, state: &State) -> Result<Value> {
        let source = self.code.as_str().ok_or_else(|| FlowError::InvalidField {
            node: self.name.clone(),
            field: CODE_FIELD.to_string(),
            message: format!("expected source text, got {}", self.code),
        })?;

        log::debug!("Running fragment for node {}", self.name);
        match self.sandbox.execute(source, state.to_json()) {
            Ok(Some(Value::Null)) | Ok(None) => Err(FlowError::NoResult {
                node: self.name.clone(),
            }),
            Ok(Some(result)) => Ok(result),
            Err(e) => {
                log::warn!("Fragment in node {} failed: {}", self.name, e);
                Err(FlowError::fragment(&self.name, e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::config::SandboxConfig;
    use crate::flow::nodes::invoke;
    use serde_json::json;

    #[tokio::test]
    async fn test_return_literal() {
        let mut node = CodeNode::with_default_sandbox("code", "return 3");
        let wrapped = invoke(&mut node, &State::empty()).await.unwrap();
        assert_eq!(wrapped, json!({"outputs": {"code": 3}}));
    }

    #[tokio::test]
    async fn test_no_result() {
        let node = CodeNode::with_default_sandbox("code", "x = 1; y = 2; return None");
        let err = node.run(&State::empty()).await.unwrap_err();
        assert!(matches!(err, FlowError::NoResult { node } if node == "code"));

        let node = CodeNode::with_default_sandbox("code", "x = 1\ny = 2");
        assert!(matches!(
            node.run(&State::empty()).await,
            Err(FlowError::NoResult { .. })
        ));
    }

    #[tokio::test]
    async fn test_reads_state() {
        let state = State::from_value(json!({
            "outputs": [{"x": 1, "y": 2}, {"x": 2, "y": 3}]
        }))
        .unwrap();
        let code = r#"
x = state["outputs"][-1]["x"]
y = state["outputs"][-1]["y"]
a = x * 2
b = y + 1
result = a + b
return result
"#;
        let node = CodeNode::with_default_sandbox("code", code);
        assert_eq!(node.run(&state).await.unwrap(), json!(8));
    }

    #[tokio::test]
    async fn test_fragment_error_leaves_state_unchanged() {
        let state = State::from_value(json!({"outputs": {"a": 1}})).unwrap();
        let before = state.clone();

        let node = CodeNode::with_default_sandbox(
            "code",
            "state['outputs']['a'] = 2\nresult = undefined_var\nreturn result",
        );
        let err = node.run(&state).await.unwrap_err();
        match err {
            FlowError::FragmentExecution { node, message } => {
                assert_eq!(node, "code");
                assert!(message.contains("undefined_var"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_import_math() {
        let node = CodeNode::with_default_sandbox(
            "code",
            "import math\nresult = math.pi\nreturn result",
        );
        assert_eq!(
            node.run(&State::empty()).await.unwrap(),
            json!(3.141592653589793)
        );
    }

    #[tokio::test]
    async fn test_restricted_modules() {
        let sandbox = Arc::new(Sandbox::new(SandboxConfig {
            modules: vec![],
            ..SandboxConfig::default()
        }));
        let node = CodeNode::new("code", "import math\nreturn 1", sandbox);
        assert!(matches!(
            node.run(&State::empty()).await,
            Err(FlowError::FragmentExecution { .. })
        ));
    }

    #[tokio::test]
    async fn test_code_from_template() {
        let state = State::from_value(json!({
            "outputs": {"writer": "return 40 + 2"}
        }))
        .unwrap();
        let mut node = CodeNode::with_default_sandbox("runner", "{{outputs.writer}}");
        let wrapped = invoke(&mut node, &state).await.unwrap();
        assert_eq!(wrapped, json!({"outputs": {"runner": 42}}));

        let mut node = CodeNode::with_default_sandbox("bad", "{{outputs.count}}");
        let state = State::from_value(json!({"outputs": {"count": 5}})).unwrap();
        assert!(matches!(
            invoke(&mut node, &state).await,
            Err(FlowError::InvalidField { .. })
        ));
    }

    #[tokio::test]
    async fn test_long_operator_chain_is_a_fragment_error() {
        let node =
            CodeNode::with_default_sandbox("chain", format!("return {}1", "1 + ".repeat(20000)));
        match node.run(&State::empty()).await {
            Err(FlowError::FragmentExecution { node, message }) => {
                assert_eq!(node, "chain");
                assert!(message.contains("nested"), "unexpected message: {message}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_loop_over_outputs() {
        let state = State::from_value(json!({
            "outputs": {"a": 1, "b": 2, "c": 3}
        }))
        .unwrap();
        let code = r#"
total = 0
for name in state["outputs"]:
    if name != "b":
        total += state["outputs"][name]
return total
"#;
        let node = CodeNode::with_default_sandbox("sum", code);
        assert_eq!(node.run(&state).await.unwrap(), json!(4));
    }
}
