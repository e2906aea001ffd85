// SPDX-License-Identifier: MIT

//! YAML schema types for workflow definitions
//!
//! ```yaml
//! name: Doubler
//! description: "Doubles a seeded value"
//! state:
//!   outputs:
//!     seed: 21
//! nodes:
//!   - name: double
//!     kind: code
//!     code: |
//!       return state["outputs"]["seed"] * 2
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flow::output::MergeOptions;

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Initial state; must be a mapping when present
    #[serde(default)]
    pub state: Option<Value>,
    /// Options for folding results into `outputs`
    #[serde(default)]
    pub merge: MergeOptions,
    /// Nodes, in the order they are invoked
    pub nodes: Vec<NodeDefinition>,
}

/// A node in a workflow
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeDefinition {
    /// Unique node name, also its key under `outputs`
    pub name: String,
    /// Node kind; `code` is the only kind
    pub kind: String,
    /// Fragment source for `code` nodes; may be a `{{path}}` template
    #[serde(default)]
    pub code: Option<String>,
}
