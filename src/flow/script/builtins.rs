// SPDX-License-Identifier: MIT

//! Builtin functions and methods on data values

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::error::{ScriptError, ScriptResult};
use super::values::{
    check_len, check_size, compare_values, display, float_value, integer, number, truthy,
    type_name, values_equal, Num, MAX_SEQUENCE_LEN,
};

const BUILTINS: &[&str] = &[
    "abs", "bool", "float", "int", "len", "list", "max", "min", "print", "range", "round", "sorted",
    "str", "sum",
];

/// Whether `name` is a builtin function
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

fn expect_args(function: &str, args: &[Value], min: usize, max: usize) -> ScriptResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(ScriptError::type_error(format!(
            "{}() takes {} argument(s) ({} given)",
            function,
            expected,
            args.len()
        )));
    }
    Ok(())
}

/// Items a `for` loop or an iterating builtin walks: list items, dict keys
/// or the characters of a string
pub fn items(value: &Value, context: &str) -> ScriptResult<Vec<Value>> {
    match value {
        Value::Array(a) => Ok(a.clone()),
        Value::Object(o) => Ok(o.keys().cloned().map(Value::String).collect()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(ScriptError::type_error(format!(
            "{}: '{}' object is not iterable",
            context,
            type_name(other)
        ))),
    }
}

/// Round half to even, as fragment authors expect from `round`
fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        r
    }
}

fn float_to_int(f: f64) -> ScriptResult<i64> {
    if !f.is_finite() || f.abs() >= i64::MAX as f64 {
        return Err(ScriptError::Overflow(format!(
            "cannot convert {} to integer",
            f
        )));
    }
    Ok(f.trunc() as i64)
}

fn extreme(function: &str, args: &[Value], wanted: Ordering) -> ScriptResult<Value> {
    let candidates = match args {
        [] => return Err(ScriptError::type_error(format!("{}() expected at least 1 argument", function))),
        [single] => items(single, function)?,
        many => many.to_vec(),
    };

    let mut iter = candidates.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| ScriptError::value_error(format!("{}() arg is an empty sequence", function)))?;
    for candidate in iter {
        if compare_values(&candidate, &best)? == wanted {
            best = candidate;
        }
    }
    Ok(best)
}

/// Call a builtin function
pub fn call(function: &str, args: &[Value]) -> ScriptResult<Value> {
    match function {
        "len" => {
            expect_args(function, args, 1, 1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "object of type '{}' has no len()",
                        type_name(other)
                    )))
                }
            };
            Ok(Value::from(len))
        }
        "abs" => {
            expect_args(function, args, 1, 1)?;
            match number(&args[0], function)? {
                Num::Int(i) => i
                    .checked_abs()
                    .map(Value::from)
                    .ok_or_else(|| ScriptError::Overflow("integer overflow in abs()".to_string())),
                Num::Float(f) => float_value(f.abs()),
            }
        }
        "bool" => {
            expect_args(function, args, 0, 1)?;
            Ok(Value::Bool(args.first().map(truthy).unwrap_or(false)))
        }
        "int" => {
            expect_args(function, args, 0, 1)?;
            match args.first() {
                None => Ok(Value::from(0)),
                Some(Value::String(s)) => s.trim().parse::<i64>().map(Value::from).map_err(|_| {
                    ScriptError::value_error(format!("invalid literal for int(): '{}'", s))
                }),
                Some(other) => match number(other, function)? {
                    Num::Int(i) => Ok(Value::from(i)),
                    Num::Float(f) => float_to_int(f).map(Value::from),
                },
            }
        }
        "float" => {
            expect_args(function, args, 0, 1)?;
            match args.first() {
                None => float_value(0.0),
                Some(Value::String(s)) => {
                    let f = s.trim().parse::<f64>().map_err(|_| {
                        ScriptError::value_error(format!(
                            "could not convert string to float: '{}'",
                            s
                        ))
                    })?;
                    float_value(f)
                }
                Some(other) => float_value(number(other, function)?.as_f64()),
            }
        }
        "str" => {
            expect_args(function, args, 0, 1)?;
            Ok(Value::String(args.first().map(display).unwrap_or_default()))
        }
        "list" => {
            expect_args(function, args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Array(vec![])),
                Some(v) => items(v, function).map(Value::Array),
            }
        }
        "range" => {
            expect_args(function, args, 1, 3)?;
            let (start, stop, step) = match args {
                [stop] => (0, integer(stop, function)?, 1),
                [start, stop] => (integer(start, function)?, integer(stop, function)?, 1),
                [start, stop, step] => (
                    integer(start, function)?,
                    integer(stop, function)?,
                    integer(step, function)?,
                ),
                _ => unreachable!("argument count checked above"),
            };
            if step == 0 {
                return Err(ScriptError::value_error("range() arg 3 must not be zero"));
            }
            let mut out = Vec::new();
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                if out.len() >= MAX_SEQUENCE_LEN {
                    return Err(ScriptError::value_error("range() result is too large"));
                }
                out.push(Value::from(i));
                i = match i.checked_add(step) {
                    Some(next) => next,
                    None => break,
                };
            }
            Ok(Value::Array(out))
        }
        "sum" => {
            expect_args(function, args, 1, 2)?;
            let mut total = match args.get(1) {
                Some(start) => number(start, function)?,
                None => Num::Int(0),
            };
            for item in items(&args[0], function)? {
                total = match (total, number(&item, function)?) {
                    (Num::Int(a), Num::Int(b)) => Num::Int(a.checked_add(b).ok_or_else(|| {
                        ScriptError::Overflow("integer overflow in sum()".to_string())
                    })?),
                    (a, b) => Num::Float(a.as_f64() + b.as_f64()),
                };
            }
            total.into_value()
        }
        "min" => extreme(function, args, Ordering::Less),
        "max" => extreme(function, args, Ordering::Greater),
        "round" => {
            expect_args(function, args, 1, 2)?;
            let x = number(&args[0], function)?;
            match args.get(1) {
                None => match x {
                    Num::Int(i) => Ok(Value::from(i)),
                    Num::Float(f) => float_to_int(round_half_even(f)).map(Value::from),
                },
                Some(digits) => {
                    let digits = integer(digits, function)?;
                    let scale = 10f64.powi(i32::try_from(digits).unwrap_or(i32::MAX));
                    match x {
                        Num::Int(i) if digits >= 0 => Ok(Value::from(i)),
                        other => float_value(round_half_even(other.as_f64() * scale) / scale),
                    }
                }
            }
        }
        "sorted" => {
            expect_args(function, args, 1, 1)?;
            let mut values = items(&args[0], function)?;
            let mut failure = None;
            values.sort_by(|a, b| match compare_values(a, b) {
                Ok(ord) => ord,
                Err(e) => {
                    failure.get_or_insert(e);
                    Ordering::Equal
                }
            });
            match failure {
                Some(e) => Err(e),
                None => Ok(Value::Array(values)),
            }
        }
        "print" => {
            let line = args.iter().map(display).collect::<Vec<_>>().join(" ");
            log::debug!("fragment print: {}", line);
            Ok(Value::Null)
        }
        _ => Err(ScriptError::Name(function.to_string())),
    }
}

fn no_method(value: &Value, method: &str) -> ScriptError {
    ScriptError::Attribute(format!(
        "'{}' object has no attribute '{}'",
        type_name(value),
        method
    ))
}

fn string_arg<'a>(args: &'a [Value], idx: usize, method: &str) -> ScriptResult<&'a str> {
    args.get(idx).and_then(Value::as_str).ok_or_else(|| {
        ScriptError::type_error(format!("{}() expects a string argument", method))
    })
}

/// Call a non-mutating method on a data value
pub fn call_method(receiver: &Value, method: &str, args: &[Value]) -> ScriptResult<Value> {
    match (receiver, method) {
        (Value::Object(map), "get") => {
            expect_args(method, args, 1, 2)?;
            let key = string_arg(args, 0, method)?;
            Ok(map
                .get(key)
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Null)))
        }
        (Value::Object(map), "keys") => {
            expect_args(method, args, 0, 0)?;
            Ok(Value::Array(map.keys().cloned().map(Value::String).collect()))
        }
        (Value::Object(map), "values") => {
            expect_args(method, args, 0, 0)?;
            Ok(Value::Array(map.values().cloned().collect()))
        }
        (Value::Object(map), "items") => {
            expect_args(method, args, 0, 0)?;
            Ok(Value::Array(
                map.iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                    .collect(),
            ))
        }
        (Value::String(s), "upper") => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), "lower") => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), "strip") => Ok(Value::String(s.trim().to_string())),
        (Value::String(s), "startswith") => {
            Ok(Value::Bool(s.starts_with(string_arg(args, 0, method)?)))
        }
        (Value::String(s), "endswith") => {
            Ok(Value::Bool(s.ends_with(string_arg(args, 0, method)?)))
        }
        (Value::String(s), "replace") => {
            expect_args(method, args, 2, 2)?;
            let from = string_arg(args, 0, method)?;
            let to = string_arg(args, 1, method)?;
            let hits = if from.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(from).count()
            };
            check_len(
                s.len().saturating_add(hits.saturating_mul(to.len())),
                "replace()",
            )?;
            Ok(Value::String(s.replace(from, to)))
        }
        (Value::String(s), "split") => {
            expect_args(method, args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Null) => s
                    .split_whitespace()
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
                Some(_) => {
                    let sep = string_arg(args, 0, method)?;
                    if sep.is_empty() {
                        return Err(ScriptError::value_error("empty separator"));
                    }
                    s.split(sep).map(|p| Value::String(p.to_string())).collect()
                }
            };
            Ok(Value::Array(parts))
        }
        (Value::String(sep), "join") => {
            expect_args(method, args, 1, 1)?;
            let parts = items(&args[0], method)?
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        ScriptError::type_error(format!(
                            "join() expects str items, found '{}'",
                            type_name(v)
                        ))
                    })
                })
                .collect::<ScriptResult<Vec<_>>>()?;
            let joined = parts.iter().map(String::len).sum::<usize>()
                + sep.len().saturating_mul(parts.len().saturating_sub(1));
            check_len(joined, "join()")?;
            Ok(Value::String(parts.join(sep)))
        }
        (Value::String(s), "count") => {
            let needle = string_arg(args, 0, method)?;
            if needle.is_empty() {
                return Ok(Value::from(s.chars().count() + 1));
            }
            Ok(Value::from(s.matches(needle).count()))
        }
        (Value::Array(a), "count") => {
            expect_args(method, args, 1, 1)?;
            Ok(Value::from(
                a.iter().filter(|v| values_equal(v, &args[0])).count(),
            ))
        }
        (Value::Array(a), "index") => {
            expect_args(method, args, 1, 1)?;
            a.iter()
                .position(|v| values_equal(v, &args[0]))
                .map(Value::from)
                .ok_or_else(|| ScriptError::value_error("value is not in list"))
        }
        _ => Err(no_method(receiver, method)),
    }
}

/// Call a method that mutates its receiver in place, returning `None` if
/// `method` is not a mutating method for that receiver
pub fn call_mutating_method(
    receiver: &mut Value,
    method: &str,
    args: &[Value],
) -> Option<ScriptResult<Value>> {
    let result = match (receiver, method) {
        (Value::Array(a), "append") => expect_args(method, args, 1, 1)
            .and_then(|_| check_len(a.len() + 1, method))
            .and_then(|_| check_size(&args[0]))
            .map(|_| {
                a.push(args[0].clone());
                Value::Null
            }),
        (Value::Array(a), "extend") => expect_args(method, args, 1, 1)
            .and_then(|_| check_size(&args[0]))
            .and_then(|_| items(&args[0], method))
            .and_then(|more| {
                check_len(a.len().saturating_add(more.len()), method)?;
                a.extend(more);
                Ok(Value::Null)
            }),
        (Value::Array(a), "pop") => expect_args(method, args, 0, 0).and_then(|_| {
            a.pop()
                .ok_or_else(|| ScriptError::Index("pop from empty list".to_string()))
        }),
        (Value::Object(map), "update") => expect_args(method, args, 1, 1).and_then(|_| {
            match &args[0] {
                Value::Object(other) => {
                    check_size(&args[0])?;
                    map.extend(other.clone());
                    Ok(Value::Null)
                }
                other => Err(ScriptError::type_error(format!(
                    "update() expects a dict, got '{}'",
                    type_name(other)
                ))),
            }
        }),
        _ => return None,
    };
    Some(result)
}

/// Build a dict from evaluated entries, requiring string keys
pub fn make_dict(entries: Vec<(Value, Value)>) -> ScriptResult<Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        let key = match key {
            Value::String(s) => s,
            other => {
                return Err(ScriptError::type_error(format!(
                    "dict keys must be str, got '{}'",
                    type_name(&other)
                )))
            }
        };
        map.insert(key, value);
    }
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_len() {
        assert_eq!(call("len", &[json!([1, 2, 3])]).unwrap(), json!(3));
        assert_eq!(call("len", &[json!("héllo")]).unwrap(), json!(5));
        assert!(call("len", &[json!(5)]).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", &[json!("42")]).unwrap(), json!(42));
        assert_eq!(call("int", &[json!(3.9)]).unwrap(), json!(3));
        assert_eq!(call("float", &[json!(2)]).unwrap(), json!(2.0));
        assert_eq!(call("str", &[json!(2.0)]).unwrap(), json!("2.0"));
        assert_eq!(call("bool", &[json!([])]).unwrap(), json!(false));
        assert!(matches!(
            call("int", &[json!("x")]),
            Err(ScriptError::Value(_))
        ));
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(call("sum", &[json!([1, 2, 3])]).unwrap(), json!(6));
        assert_eq!(call("sum", &[json!([1, 2.5])]).unwrap(), json!(3.5));
        assert_eq!(call("min", &[json!([3, 1, 2])]).unwrap(), json!(1));
        assert_eq!(call("max", &[json!(3), json!(7), json!(2)]).unwrap(), json!(7));
        assert!(call("max", &[json!([])]).is_err());
        assert_eq!(call("sorted", &[json!([3, 1, 2])]).unwrap(), json!([1, 2, 3]));
        assert!(call("sorted", &[json!([1, "a"])]).is_err());
    }

    #[test]
    fn test_range_and_round() {
        assert_eq!(call("range", &[json!(3)]).unwrap(), json!([0, 1, 2]));
        assert_eq!(call("range", &[json!(5), json!(0), json!(-2)]).unwrap(), json!([5, 3, 1]));
        assert!(call("range", &[json!(0), json!(1), json!(0)]).is_err());
        assert_eq!(call("round", &[json!(2.5)]).unwrap(), json!(2));
        assert_eq!(call("round", &[json!(3.5)]).unwrap(), json!(4));
        assert_eq!(call("round", &[json!(1.234), json!(1)]).unwrap(), json!(1.2));
    }

    #[test]
    fn test_methods() {
        let d = json!({"a": 1});
        assert_eq!(call_method(&d, "get", &[json!("a")]).unwrap(), json!(1));
        assert_eq!(call_method(&d, "get", &[json!("b"), json!(0)]).unwrap(), json!(0));
        assert_eq!(call_method(&d, "items", &[]).unwrap(), json!([["a", 1]]));
        assert_eq!(
            call_method(&json!("a,b"), "split", &[json!(",")]).unwrap(),
            json!(["a", "b"])
        );
        assert_eq!(
            call_method(&json!("-"), "join", &[json!(["x", "y"])]).unwrap(),
            json!("x-y")
        );
        assert!(matches!(
            call_method(&json!(1), "upper", &[]),
            Err(ScriptError::Attribute(_))
        ));
    }

    #[test]
    fn test_mutating_methods() {
        let mut list = json!([1]);
        call_mutating_method(&mut list, "append", &[json!(2)])
            .unwrap()
            .unwrap();
        assert_eq!(list, json!([1, 2]));
        assert!(call_mutating_method(&mut list, "upper", &[]).is_none());
    }

    #[test]
    fn test_growth_is_capped() {
        let big = Value::String("x".repeat(MAX_SEQUENCE_LEN / 2 + 1));
        assert!(matches!(
            call_method(&json!(""), "join", &[json!([big.clone(), big.clone()])]),
            Err(ScriptError::Value(_))
        ));
        assert!(matches!(
            call_method(&big, "replace", &[json!("x"), json!("yy")]),
            Err(ScriptError::Value(_))
        ));
        assert_eq!(
            call_method(&json!("ab"), "replace", &[json!(""), json!("-")]).unwrap(),
            json!("-a-b-")
        );

        let mut list = Value::Array(vec![json!(0); MAX_SEQUENCE_LEN]);
        assert!(matches!(
            call_mutating_method(&mut list, "extend", &[json!([1])]),
            Some(Err(ScriptError::Value(_)))
        ));
        assert!(matches!(
            call_mutating_method(&mut list, "append", &[json!(1)]),
            Some(Err(ScriptError::Value(_)))
        ));
        assert_eq!(list.as_array().map(Vec::len), Some(MAX_SEQUENCE_LEN));
    }

    #[test]
    fn test_make_dict_requires_string_keys() {
        assert_eq!(
            make_dict(vec![(json!("a"), json!(1))]).unwrap(),
            json!({"a": 1})
        );
        assert!(make_dict(vec![(json!(1), json!(1))]).is_err());
    }
}
