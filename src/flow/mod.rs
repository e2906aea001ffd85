// SPDX-License-Identifier: MIT

//! Node execution and state-merge core
//!
//! - `state` - shared workflow state and its output log
//! - `output` - the merge algebra used to fold results into the log
//! - `resolver` - `{{path}}` template resolution for node fields
//! - `nodes` - the node contract and the code node
//! - `script` - the sandboxed fragment language run by code nodes
//! - `workflow` - YAML definitions, node factory and runner

pub mod config;
pub mod error;
pub mod nodes;
pub mod output;
pub mod resolver;
pub mod script;
pub mod state;
pub mod workflow;

pub use config::{ErrorPolicy, FlowConfig, SandboxConfig};
pub use error::{FlowError, Result};
pub use nodes::{invoke, CodeNode, Node};
pub use output::{add_outputs, add_outputs_with, MergeOptions, MergeOutcome, OutputMerger};
pub use state::State;
