// SPDX-License-Identifier: MIT

//! Importable library modules
//!
//! A fragment can only `import` modules that are both registered with its
//! sandbox and named in the sandbox allow-list.

use serde_json::Value;

use super::error::{ScriptError, ScriptResult};
use super::values::{float_value, number, Num};

/// A library module a fragment can import
pub trait Module: Send + Sync {
    /// Name used in `import <name>`
    fn name(&self) -> &str;

    /// Look up a constant, e.g. `math.pi`
    fn attribute(&self, name: &str) -> Option<Value>;

    /// Call a function, e.g. `math.sqrt(2)`
    fn call(&self, function: &str, args: &[Value]) -> ScriptResult<Value>;
}

fn arity(module: &str, function: &str, args: &[Value], expected: usize) -> ScriptResult<()> {
    if args.len() != expected {
        return Err(ScriptError::type_error(format!(
            "{}.{}() takes {} argument(s) ({} given)",
            module,
            function,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn no_function(module: &str, function: &str) -> ScriptError {
    ScriptError::Attribute(format!(
        "module '{}' has no attribute '{}'",
        module, function
    ))
}

/// Floating point math
pub struct MathModule;

impl MathModule {
    fn unary(&self, function: &str, args: &[Value], f: fn(f64) -> f64) -> ScriptResult<Value> {
        arity("math", function, args, 1)?;
        let x = number(&args[0], function)?.as_f64();
        float_value(f(x))
    }

    fn to_int(&self, function: &str, args: &[Value], f: fn(f64) -> f64) -> ScriptResult<Value> {
        arity("math", function, args, 1)?;
        match number(&args[0], function)? {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(x) => {
                let rounded = f(x);
                if !rounded.is_finite() || rounded.abs() >= i64::MAX as f64 {
                    return Err(ScriptError::Overflow(format!(
                        "cannot convert {} to integer",
                        x
                    )));
                }
                Ok(Value::from(rounded as i64))
            }
        }
    }

    fn domain_checked(
        &self,
        function: &str,
        args: &[Value],
        valid: fn(f64) -> bool,
        f: fn(f64) -> f64,
    ) -> ScriptResult<Value> {
        arity("math", function, args, 1)?;
        let x = number(&args[0], function)?.as_f64();
        if !valid(x) {
            return Err(ScriptError::value_error("math domain error"));
        }
        float_value(f(x))
    }
}

impl Module for MathModule {
    fn name(&self) -> &str {
        "math"
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        let value = match name {
            "pi" => std::f64::consts::PI,
            "e" => std::f64::consts::E,
            "tau" => std::f64::consts::TAU,
            _ => return None,
        };
        float_value(value).ok()
    }

    fn call(&self, function: &str, args: &[Value]) -> ScriptResult<Value> {
        match function {
            "sqrt" => self.domain_checked(function, args, |x| x >= 0.0, f64::sqrt),
            "log" => match args.len() {
                2 => {
                    let x = number(&args[0], function)?.as_f64();
                    let base = number(&args[1], function)?.as_f64();
                    if x <= 0.0 || base <= 0.0 || base == 1.0 {
                        return Err(ScriptError::value_error("math domain error"));
                    }
                    float_value(x.ln() / base.ln())
                }
                _ => self.domain_checked(function, args, |x| x > 0.0, f64::ln),
            },
            "log10" => self.domain_checked(function, args, |x| x > 0.0, f64::log10),
            "log2" => self.domain_checked(function, args, |x| x > 0.0, f64::log2),
            "exp" => self.unary(function, args, f64::exp),
            "sin" => self.unary(function, args, f64::sin),
            "cos" => self.unary(function, args, f64::cos),
            "tan" => self.unary(function, args, f64::tan),
            "fabs" => self.unary(function, args, f64::abs),
            "floor" => self.to_int(function, args, f64::floor),
            "ceil" => self.to_int(function, args, f64::ceil),
            "trunc" => self.to_int(function, args, f64::trunc),
            "pow" => {
                arity("math", function, args, 2)?;
                let base = number(&args[0], function)?.as_f64();
                let exp = number(&args[1], function)?.as_f64();
                float_value(base.powf(exp))
            }
            "isclose" => {
                arity("math", function, args, 2)?;
                let a = number(&args[0], function)?.as_f64();
                let b = number(&args[1], function)?.as_f64();
                let tolerance = 1e-9 * a.abs().max(b.abs());
                Ok(Value::Bool((a - b).abs() <= tolerance))
            }
            _ => Err(no_function("math", function)),
        }
    }
}

/// JSON encoding and decoding
pub struct JsonModule;

impl Module for JsonModule {
    fn name(&self) -> &str {
        "json"
    }

    fn attribute(&self, _name: &str) -> Option<Value> {
        None
    }

    fn call(&self, function: &str, args: &[Value]) -> ScriptResult<Value> {
        match function {
            "dumps" => {
                arity("json", function, args, 1)?;
                serde_json::to_string(&args[0])
                    .map(Value::String)
                    .map_err(|e| ScriptError::value_error(e.to_string()))
            }
            "loads" => {
                arity("json", function, args, 1)?;
                let text = args[0].as_str().ok_or_else(|| {
                    ScriptError::type_error("json.loads() expects a string")
                })?;
                serde_json::from_str(text).map_err(|e| ScriptError::value_error(e.to_string()))
            }
            _ => Err(no_function("json", function)),
        }
    }
}
