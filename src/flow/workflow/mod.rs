// SPDX-License-Identifier: MIT

//! Workflow definitions, node construction and a simple runner

pub mod factory;
pub mod loader;
pub mod runner;
pub mod types;

pub use factory::{NodeFactory, Workflow};
pub use loader::WorkflowLoader;
pub use runner::WorkflowRunner;
pub use types::{NodeDefinition, WorkflowDefinition};
