// SPDX-License-Identifier: MIT

//! Node factory - constructs nodes from definitions

use std::collections::HashSet;
use std::sync::Arc;

use super::types::{NodeDefinition, WorkflowDefinition};
use crate::flow::config::SandboxConfig;
use crate::flow::error::{FlowError, Result};
use crate::flow::nodes::{CodeNode, Node};
use crate::flow::output::OutputMerger;
use crate::flow::script::Sandbox;
use crate::flow::state::State;

/// Nodes and seeded state ready to hand to a runner
pub struct Workflow {
    pub name: String,
    pub nodes: Vec<Box<dyn Node>>,
    pub state: State,
}

/// Factory for creating nodes from definitions
///
/// All code nodes built by one factory share its sandbox.
pub struct NodeFactory {
    sandbox: Arc<Sandbox>,
}

impl NodeFactory {
    pub fn new(config: &SandboxConfig) -> Self {
        Self::with_sandbox(Arc::new(Sandbox::new(config.clone())))
    }

    /// Use a prepared sandbox, e.g. one with extra modules registered
    pub fn with_sandbox(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }

    /// Build a node from a NodeDefinition
    pub fn build(&self, def: &NodeDefinition) -> Result<Box<dyn Node>> {
        log::debug!("Building node '{}' of kind '{}'", def.name, def.kind);

        match def.kind.as_str() {
            "code" => {
                let code = def.code.as_deref().ok_or_else(|| FlowError::InvalidField {
                    node: def.name.clone(),
                    field: "code".to_string(),
                    message: "code nodes need a 'code' field".to_string(),
                })?;
                Ok(Box::new(CodeNode::new(
                    def.name.clone(),
                    code,
                    Arc::clone(&self.sandbox),
                )))
            }
            other => Err(FlowError::UnknownNode(other.to_string())),
        }
    }

    /// Build every node of a workflow and seed its state
    pub fn build_workflow(&self, def: &WorkflowDefinition) -> Result<Workflow> {
        let mut seen = HashSet::new();
        for node in &def.nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(FlowError::config(format!(
                    "duplicate node name '{}' in workflow '{}'",
                    node.name, def.name
                )));
            }
        }

        let nodes = def
            .nodes
            .iter()
            .map(|n| self.build(n))
            .collect::<Result<Vec<_>>>()?;

        let state = State::from_value(def.state.clone().unwrap_or_default())?
            .with_merger(OutputMerger::new(def.merge.clone()));

        log::info!(
            "Built workflow '{}' with {} nodes",
            def.name,
            nodes.len()
        );
        Ok(Workflow {
            name: def.name.clone(),
            nodes,
            state,
        })
    }
}

impl Default for NodeFactory {
    fn default() -> Self {
        Self::new(&SandboxConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::workflow::loader::WorkflowLoader;
    use serde_json::json;

    fn node(name: &str, kind: &str, code: Option<&str>) -> NodeDefinition {
        NodeDefinition {
            name: name.to_string(),
            kind: kind.to_string(),
            code: code.map(String::from),
        }
    }

    #[test]
    fn test_build_code_node() {
        let built = NodeFactory::default()
            .build(&node("c", "code", Some("return 1")))
            .unwrap();
        assert_eq!(built.name(), "c");
        assert_eq!(built.resolvable_fields(), &["code"]);
    }

    #[test]
    fn test_unknown_kind() {
        let err = NodeFactory::default()
            .build(&node("c", "llm", None))
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::UnknownNode(kind) if kind == "llm"));
    }

    #[test]
    fn test_missing_code() {
        let err = NodeFactory::default()
            .build(&node("c", "code", None))
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::InvalidField { .. }));
    }

    #[test]
    fn test_build_workflow() {
        let def = WorkflowLoader::parse_yaml(
            r#"
name: Seeded
state:
  outputs:
    seed: 1
merge:
  max_len: 3
nodes:
  - name: a
    kind: code
    code: "return 1"
"#,
        )
        .unwrap();
        let workflow = NodeFactory::default().build_workflow(&def).unwrap();
        assert_eq!(workflow.name, "Seeded");
        assert_eq!(workflow.nodes.len(), 1);
        assert_eq!(workflow.state.output("seed"), Some(&json!(1)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let def = WorkflowDefinition {
            name: "dup".to_string(),
            description: String::new(),
            state: None,
            merge: Default::default(),
            nodes: vec![
                node("a", "code", Some("return 1")),
                node("a", "code", Some("return 2")),
            ],
        };
        assert!(matches!(
            NodeFactory::default().build_workflow(&def),
            Err(FlowError::Config(_))
        ));
    }

    #[test]
    fn test_non_mapping_state_rejected() {
        let def = WorkflowDefinition {
            name: "bad".to_string(),
            description: String::new(),
            state: Some(json!([1, 2])),
            merge: Default::default(),
            nodes: vec![],
        };
        assert!(matches!(
            NodeFactory::default().build_workflow(&def),
            Err(FlowError::InvalidArgument { .. })
        ));
    }
}
