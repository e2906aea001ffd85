// SPDX-License-Identifier: MIT

//! Value helpers shared by the evaluator, builtins and modules
//!
//! Fragments compute directly over `serde_json::Value`. Integers stay `i64`
//! until an operation needs a float.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::error::{ScriptError, ScriptResult};

/// Upper bound on the length of any list or string a fragment builds
pub const MAX_SEQUENCE_LEN: usize = 1 << 20;

/// Upper bound on the total size of a value a fragment builds, counting
/// every nested item and string byte
pub const MAX_VALUE_SIZE: usize = 1 << 22;

/// Upper bound on the nesting of containers a fragment builds
pub const MAX_VALUE_DEPTH: usize = 128;

/// A numeric operand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn from_value(value: &Value) -> Option<Num> {
        match value {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Num::Int(i)),
                None => n.as_f64().map(Num::Float),
            },
            _ => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    pub fn into_value(self) -> ScriptResult<Value> {
        match self {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => float_value(f),
        }
    }
}

/// Wrap a float, rejecting NaN and infinities which JSON cannot carry
pub fn float_value(f: f64) -> ScriptResult<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ScriptError::value_error(format!("{} is not a finite number", f)))
}

/// Expect a numeric argument
pub fn number(value: &Value, context: &str) -> ScriptResult<Num> {
    Num::from_value(value).ok_or_else(|| {
        ScriptError::type_error(format!(
            "{} expected a number, got '{}'",
            context,
            type_name(value)
        ))
    })
}

/// Expect an integer argument
pub fn integer(value: &Value, context: &str) -> ScriptResult<i64> {
    match Num::from_value(value) {
        Some(Num::Int(i)) => Ok(i),
        _ => Err(ScriptError::type_error(format!(
            "{} expected an integer, got '{}'",
            context,
            type_name(value)
        ))),
    }
}

/// Name of a value's type as fragment authors would write it
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Equality with numeric coercion (`1 == 1.0`)
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_))
        | (Value::Bool(_), Value::Number(_))
        | (Value::Number(_), Value::Bool(_)) => {
            match (Num::from_value(left), Num::from_value(right)) {
                (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
                (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
                _ => false,
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => left == right,
    }
}

/// Ordering between numbers, strings, or lists of those
pub fn compare_values(left: &Value, right: &Value) -> ScriptResult<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b) {
                let ord = compare_values(x, y)?;
                if ord != Ordering::Equal {
                    return Ok(ord);
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => match (Num::from_value(left), Num::from_value(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(a.cmp(&b)),
            (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()).ok_or_else(|| {
                ScriptError::value_error("cannot order NaN")
            }),
            _ => Err(ScriptError::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                type_name(left),
                type_name(right)
            ))),
        },
    }
}

/// Human-readable rendering, as `str()` produces it
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => repr(other),
    }
}

/// Literal-style rendering used inside containers
pub fn repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e16 => format!("{:.1}", f),
            _ => n.to_string(),
        },
        Value::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(repr).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("'{}': {}", k, repr(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Reject a sequence of `len` items or bytes built by `what`
pub fn check_len(len: usize, what: &str) -> ScriptResult<()> {
    if len > MAX_SEQUENCE_LEN {
        return Err(ScriptError::value_error(format!("{} result is too large", what)));
    }
    Ok(())
}

/// Total size of a value, counting every nested item and string byte
///
/// Walks iteratively and fails at the first size or nesting bound exceeded.
pub fn size_of(value: &Value) -> ScriptResult<usize> {
    let mut size = 0usize;
    let mut pending = vec![(value, 1usize)];

    while let Some((current, depth)) = pending.pop() {
        if depth > MAX_VALUE_DEPTH {
            return Err(ScriptError::value_error(format!(
                "value nested deeper than {}",
                MAX_VALUE_DEPTH
            )));
        }
        size += 1;
        match current {
            Value::String(s) => size += s.len(),
            Value::Array(items) => pending.extend(items.iter().map(|v| (v, depth + 1))),
            Value::Object(map) => {
                size += map.keys().map(String::len).sum::<usize>();
                pending.extend(map.values().map(|v| (v, depth + 1)));
            }
            _ => {}
        }
        check_total(size)?;
    }
    Ok(size)
}

/// Reject values too large or too deeply nested to build
pub fn check_size(value: &Value) -> ScriptResult<()> {
    size_of(value).map(|_| ())
}

/// Reject a value whose total size would be `size`
pub fn check_total(size: usize) -> ScriptResult<()> {
    if size > MAX_VALUE_SIZE {
        return Err(ScriptError::value_error("value is too large"));
    }
    Ok(())
}

/// Resolve a possibly negative index against a sequence length
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let idx = if index < 0 { index + len } else { index };
    if (0..len).contains(&idx) {
        usize::try_from(idx).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthy() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!(0.5)));
        assert!(truthy(&json!({"a": 1})));
    }

    #[test]
    fn test_numeric_equality() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!([1, 2]), &json!([1.0, 2])));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(1), &json!(2.5)).unwrap(), Ordering::Less);
        assert_eq!(
            compare_values(&json!("b"), &json!("a")).unwrap(),
            Ordering::Greater
        );
        assert!(compare_values(&json!(1), &json!("a")).is_err());
    }

    #[test]
    fn test_repr() {
        assert_eq!(repr(&json!(null)), "None");
        assert_eq!(repr(&json!(3.0)), "3.0");
        assert_eq!(repr(&json!([1, "a", true])), "[1, 'a', True]");
        assert_eq!(display(&json!("plain")), "plain");
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(0, 3), Some(0));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
        assert_eq!(normalize_index(0, 0), None);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(float_value(f64::NAN).is_err());
        assert_eq!(float_value(1.5).unwrap(), json!(1.5));
    }

    #[test]
    fn test_check_size_bounds() {
        assert!(check_size(&json!({"a": [1, 2, {"b": "c"}]})).is_ok());

        let mut nested = json!(0);
        for _ in 0..MAX_VALUE_DEPTH {
            nested = json!([nested]);
        }
        assert!(matches!(check_size(&nested), Err(ScriptError::Value(_))));

        let wide = Value::String("x".repeat(MAX_VALUE_SIZE));
        assert!(matches!(check_size(&wide), Err(ScriptError::Value(_))));
        assert!(check_len(MAX_SEQUENCE_LEN, "join()").is_ok());
        assert!(check_len(MAX_SEQUENCE_LEN + 1, "join()").is_err());
    }
}
