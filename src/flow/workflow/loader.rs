// SPDX-License-Identifier: MIT

//! Workflow loader - YAML file loading and parsing

use std::fs;
use std::path::Path;

use super::types::WorkflowDefinition;
use crate::flow::error::Result;

/// Loads workflow definitions from YAML files
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow definition from a YAML file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowDefinition> {
        let path = path.as_ref();
        log::info!("Loading workflow from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition> {
        let def: WorkflowDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::error::FlowError;
    use serde_json::json;

    #[test]
    fn test_parse_workflow() {
        let yaml = r#"
name: Doubler
description: "Doubles a seeded value"
state:
  outputs:
    seed: 21
merge:
  max_len: 10
nodes:
  - name: double
    kind: code
    code: |
      x = state["outputs"]["seed"]
      return x * 2
  - name: echo
    kind: code
    code: "{{outputs.double}}"
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.name, "Doubler");
        assert_eq!(def.state, Some(json!({"outputs": {"seed": 21}})));
        assert_eq!(def.merge.max_len, Some(10));
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.nodes[0].kind, "code");
        assert!(def.nodes[0].code.as_deref().unwrap().contains("x * 2"));
        assert_eq!(def.nodes[1].code.as_deref(), Some("{{outputs.double}}"));
    }

    #[test]
    fn test_parse_minimal_workflow() {
        let yaml = r#"
name: Empty
nodes: []
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        assert!(def.description.is_empty());
        assert!(def.state.is_none());
        assert!(def.merge.max_len.is_none());
        assert!(def.nodes.is_empty());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = WorkflowLoader::parse_yaml("name: [unclosed").unwrap_err();
        assert!(matches!(err, FlowError::Yaml(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = WorkflowLoader::new()
            .load_workflow("/nonexistent/workflow.yaml")
            .unwrap_err();
        assert!(matches!(err, FlowError::Io(_)));
    }
}
