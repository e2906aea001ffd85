// SPDX-License-Identifier: MIT

//! Typed error handling for aic-flow
//!
//! Every failure the core can report to an orchestrator is a `FlowError`.
//! None of them are retried or swallowed inside the core.

use thiserror::Error;

/// Top-level error type for aic-flow
#[derive(Debug, Error)]
pub enum FlowError {
    /// Malformed merge call: exactly one side was supplied
    #[error(
        "Must specify non-null arguments for both 'left' and 'right'. Only received: '{side}' with value: {value}."
    )]
    InvalidArgument { side: String, value: String },

    /// A template reference could not be resolved against the state
    #[error("Path segment '{segment}' not found (resolved so far: '{path}')")]
    PathNotFound { segment: String, path: String },

    /// A code fragment finished without producing a result
    #[error("Node '{node}' produced no result")]
    NoResult { node: String },

    /// A code fragment failed internally
    #[error("Fragment in node '{node}' failed: {message}")]
    FragmentExecution { node: String, message: String },

    /// A node configuration field holds a value of the wrong shape
    #[error("Field '{field}' of node '{node}' is invalid: {message}")]
    InvalidField {
        node: String,
        field: String,
        message: String,
    },

    /// Unknown node kind in a workflow definition
    #[error("Unknown node kind: {0}")]
    UnknownNode(String),

    /// Configuration errors (bad env vars, invalid config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, FlowError>;

impl FlowError {
    /// Create an invalid argument error naming the side that was supplied
    pub fn invalid_argument(side: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidArgument {
            side: side.into(),
            value: value.to_string(),
        }
    }

    /// Create a path lookup error
    pub fn path_not_found(segment: impl Into<String>, path: impl Into<String>) -> Self {
        Self::PathNotFound {
            segment: segment.into(),
            path: path.into(),
        }
    }

    /// Create a fragment execution error
    pub fn fragment(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FragmentExecution {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<&str> for FlowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for FlowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
