// SPDX-License-Identifier: MIT

//! Runtime configuration
//!
//! Loaded from YAML, with environment overrides:
//!
//! ```yaml
//! sandbox:
//!   max_steps: 100000
//!   max_depth: 64
//!   modules: [math, json]
//! runner:
//!   on_error: abort
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{FlowError, Result};

pub const ENV_MAX_STEPS: &str = "AIC_FLOW_MAX_STEPS";
pub const ENV_MAX_DEPTH: &str = "AIC_FLOW_MAX_DEPTH";
pub const ENV_MODULES: &str = "AIC_FLOW_MODULES";
pub const ENV_ON_ERROR: &str = "AIC_FLOW_ON_ERROR";

/// Limits and capabilities granted to code fragments
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Evaluation steps one fragment run may take
    pub max_steps: u64,
    /// Deepest syntax nesting the parser accepts; blocks, brackets and
    /// every folded operator count one level
    pub max_depth: usize,
    /// Modules a fragment may import
    pub modules: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            max_depth: 64,
            modules: vec!["math".to_string(), "json".to_string()],
        }
    }
}

/// What the runner does when a node fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Stop and return the error; state is left as it was before the node
    #[default]
    Abort,
    /// Log the error, record it under `errors.<node>` and carry on
    Continue,
}

impl std::str::FromStr for ErrorPolicy {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(ErrorPolicy::Abort),
            "continue" => Ok(ErrorPolicy::Continue),
            other => Err(FlowError::config(format!(
                "unknown error policy '{}', expected 'abort' or 'continue'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub on_error: ErrorPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowConfig {
    pub sandbox: SandboxConfig,
    pub runner: RunnerConfig,
}

impl FlowConfig {
    /// Read a YAML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    pub fn parse_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `AIC_FLOW_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_STEPS) {
            self.sandbox.max_steps = raw.trim().parse().map_err(|_| {
                FlowError::config(format!("{} must be an integer, got '{}'", ENV_MAX_STEPS, raw))
            })?;
        }
        if let Some(raw) = lookup(ENV_MAX_DEPTH) {
            self.sandbox.max_depth = raw.trim().parse().map_err(|_| {
                FlowError::config(format!("{} must be an integer, got '{}'", ENV_MAX_DEPTH, raw))
            })?;
        }
        if let Some(raw) = lookup(ENV_MODULES) {
            self.sandbox.modules = raw
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(raw) = lookup(ENV_ON_ERROR) {
            self.runner.on_error = raw.parse()?;
        }
        log::debug!("Effective config: {:?}", self);
        Ok(())
    }
}
