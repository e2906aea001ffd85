// SPDX-License-Identifier: MIT

//! Sandboxed code fragments
//!
//! A small Python-flavoured language evaluated over JSON values: assignments,
//! `if`/`for`/`while` blocks and expressions. Fragments see a copy of the
//! workflow state bound to `state`, may import allow-listed modules, and
//! report their result through `return <expr>` or a binding named `result`.
//! Nothing outside the fragment's own scope can be reached. Every run is
//! bounded by a step budget, a syntax depth limit and caps on the size of
//! the values it builds.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod modules;
pub mod parser;
pub mod values;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub use ast::Program;
pub use error::{ScriptError, ScriptResult};
pub use evaluator::{Interpreter, RESULT_SLOT, STATE_BINDING};
pub use modules::{JsonModule, MathModule, Module};
pub use parser::{parse, parse_with_depth};

use crate::flow::config::SandboxConfig;

/// Executes fragments under a fixed set of limits and modules
pub struct Sandbox {
    config: SandboxConfig,
    modules: HashMap<String, Arc<dyn Module>>,
}

impl Sandbox {
    /// Create a sandbox with the built-in `math` and `json` modules registered
    pub fn new(config: SandboxConfig) -> Self {
        let mut sandbox = Self {
            config,
            modules: HashMap::new(),
        };
        sandbox.register(Arc::new(MathModule));
        sandbox.register(Arc::new(JsonModule));
        sandbox
    }

    /// Make a module importable, subject to the allow-list
    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// A module fragments may import, if it is registered and allowed
    pub fn module(&self, name: &str) -> Option<Arc<dyn Module>> {
        if !self.config.modules.iter().any(|m| m == name) {
            return None;
        }
        self.modules.get(name).cloned()
    }

    pub fn compile(&self, source: &str) -> ScriptResult<Program> {
        parse_with_depth(source, self.config.max_depth)
    }

    /// Parse and run a fragment against `state`
    ///
    /// Returns `Ok(None)` when the fragment never filled its result slot.
    pub fn execute(&self, source: &str, state: Value) -> ScriptResult<Option<Value>> {
        let program = self.compile(source)?;
        let interpreter = Interpreter::new(self, state);
        let result = interpreter.run(&program);
        log::trace!("Fragment finished: {:?}", result);
        result
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<&String> = self.modules.keys().collect();
        modules.sort();
        f.debug_struct("Sandbox")
            .field("config", &self.config)
            .field("modules", &modules)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Greeting;

    impl Module for Greeting {
        fn name(&self) -> &str {
            "greeting"
        }

        fn attribute(&self, name: &str) -> Option<Value> {
            (name == "word").then(|| json!("hello"))
        }

        fn call(&self, function: &str, args: &[Value]) -> ScriptResult<Value> {
            match function {
                "shout" => Ok(json!(format!(
                    "{}!",
                    args.first().and_then(Value::as_str).unwrap_or_default()
                ))),
                _ => Err(ScriptError::Attribute(function.to_string())),
            }
        }
    }

    #[test]
    fn test_execute() {
        let sandbox = Sandbox::default();
        assert_eq!(sandbox.execute("return 3", json!({})).unwrap(), Some(json!(3)));
        assert_eq!(
            sandbox
                .execute("return state['n'] + 1", json!({"n": 1}))
                .unwrap(),
            Some(json!(2))
        );
    }

    #[test]
    fn test_registered_module_needs_allow_list() {
        let mut sandbox = Sandbox::default();
        sandbox.register(Arc::new(Greeting));
        assert!(matches!(
            sandbox.execute("import greeting", json!({})),
            Err(ScriptError::Import(_))
        ));

        let mut config = SandboxConfig::default();
        config.modules.push("greeting".to_string());
        let mut sandbox = Sandbox::new(config);
        sandbox.register(Arc::new(Greeting));
        assert_eq!(
            sandbox
                .execute("import greeting\nreturn greeting.shout(greeting.word)", json!({}))
                .unwrap(),
            Some(json!("hello!"))
        );
    }

    #[test]
    fn test_syntax_error() {
        let sandbox = Sandbox::default();
        assert!(matches!(
            sandbox.execute("x = = 1", json!({})),
            Err(ScriptError::Syntax { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let sandbox = Sandbox::new(SandboxConfig {
            max_depth: 4,
            ..SandboxConfig::default()
        });
        let deep = format!("return {}1{}", "(".repeat(10), ")".repeat(10));
        assert!(matches!(
            sandbox.execute(&deep, json!({})),
            Err(ScriptError::Syntax { .. })
        ));
    }

    #[test]
    fn test_chain_depth_follows_config() {
        let chain = format!("return {}1", "1 + ".repeat(20));
        assert_eq!(Sandbox::default().execute(&chain, json!({})).unwrap(), Some(json!(21)));

        let sandbox = Sandbox::new(SandboxConfig {
            max_depth: 8,
            ..SandboxConfig::default()
        });
        assert!(matches!(
            sandbox.execute(&chain, json!({})),
            Err(ScriptError::Syntax { .. })
        ));
    }
}
