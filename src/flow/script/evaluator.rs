// SPDX-License-Identifier: MIT

//! Tree-walking evaluator for code fragments

use std::borrow::Cow;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::ast::{BinaryOp, CompareOp, Expr, Literal, Program, Statement, Target, UnaryOp};
use super::builtins;
use super::error::{ScriptError, ScriptResult};
use super::modules::Module;
use super::values::{
    check_len, check_size, check_total, compare_values, float_value, integer, normalize_index,
    repr, size_of, truthy, type_name, values_equal, Num, MAX_SEQUENCE_LEN,
};
use super::Sandbox;

/// Binding through which a fragment reads the workflow state
pub const STATE_BINDING: &str = "state";

/// Binding a fragment assigns to communicate its result
pub const RESULT_SLOT: &str = "result";

const MUTATING_METHODS: &[&str] = &["append", "extend", "pop", "update"];

enum Binding {
    Data(Value),
    Module(Arc<dyn Module>),
}

/// How a statement hands control back to its block
enum Flow {
    Next,
    Break,
    Continue,
    Return(Value),
}

/// Evaluates one program in a fresh scope
pub struct Interpreter<'a> {
    sandbox: &'a Sandbox,
    scope: HashMap<String, Binding>,
    steps: Cell<u64>,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter whose only binding is `state`
    pub fn new(sandbox: &'a Sandbox, state: Value) -> Self {
        let mut scope = HashMap::new();
        scope.insert(STATE_BINDING.to_string(), Binding::Data(state));
        Self {
            sandbox,
            scope,
            steps: Cell::new(0),
        }
    }

    /// Number of evaluation steps taken so far
    pub fn steps(&self) -> u64 {
        self.steps.get()
    }

    /// Run the program and return the value of the result slot
    ///
    /// `return <expr>` fills the slot and stops; otherwise the final value
    /// bound to `result` is used. `None` means the slot was never assigned.
    pub fn run(mut self, program: &Program) -> ScriptResult<Option<Value>> {
        if let Flow::Return(value) = self.exec_block(&program.statements)? {
            return Ok(Some(value));
        }

        Ok(match self.scope.remove(RESULT_SLOT) {
            Some(Binding::Data(value)) => Some(value),
            _ => None,
        })
    }

    fn tick(&self) -> ScriptResult<()> {
        let steps = self.steps.get() + 1;
        self.steps.set(steps);
        let limit = self.sandbox.config().max_steps;
        if steps > limit {
            return Err(ScriptError::StepLimit(limit));
        }
        Ok(())
    }

    fn exec_block(&mut self, statements: &[Statement]) -> ScriptResult<Flow> {
        for statement in statements {
            match self.exec(statement)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, statement: &Statement) -> ScriptResult<Flow> {
        self.tick()?;
        match statement {
            Statement::Pass => {}
            Statement::Break => return Ok(Flow::Break),
            Statement::Continue => return Ok(Flow::Continue),
            Statement::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Statement::Import { module, alias } => {
                let found = self.sandbox.module(module).ok_or_else(|| {
                    ScriptError::Import(format!("No module named '{}'", module))
                })?;
                let name = alias.clone().unwrap_or_else(|| module.clone());
                self.scope.insert(name, Binding::Module(found));
            }
            Statement::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            Statement::AugAssign {
                target,
                read,
                op,
                value,
            } => {
                let updated = {
                    let current = self.place(read)?;
                    let operand = self.place(value)?;
                    binary(*op, &*current, &*operand)?
                };
                self.assign(target, updated)?;
            }
            Statement::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if truthy(&*self.place(cond)?) {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(otherwise);
            }
            Statement::For {
                targets,
                iter,
                body,
            } => {
                let iterable = self.place(iter)?;
                let items = builtins::items(&*iterable, "for")?;
                drop(iterable);
                for item in items {
                    self.tick()?;
                    self.bind_targets(targets, item)?;
                    match self.exec_block(body)? {
                        Flow::Next | Flow::Continue => {}
                        Flow::Break => break,
                        returned @ Flow::Return(_) => return Ok(returned),
                    }
                }
            }
            Statement::While { cond, body } => {
                while truthy(&*self.place(cond)?) {
                    match self.exec_block(body)? {
                        Flow::Next | Flow::Continue => {}
                        Flow::Break => break,
                        returned @ Flow::Return(_) => return Ok(returned),
                    }
                }
            }
            Statement::Expr(expr) => {
                if !self.exec_mutating_call(expr)? {
                    self.eval(expr)?;
                }
            }
        }
        Ok(Flow::Next)
    }

    /// Bind a loop item to one name, or unpack a sequence over several
    fn bind_targets(&mut self, targets: &[String], item: Value) -> ScriptResult<()> {
        if let [name] = targets {
            self.scope.insert(name.clone(), Binding::Data(item));
            return Ok(());
        }

        let parts = match item {
            Value::Array(parts) => parts,
            other => {
                return Err(ScriptError::type_error(format!(
                    "cannot unpack non-sequence '{}'",
                    type_name(&other)
                )))
            }
        };
        if parts.len() != targets.len() {
            return Err(ScriptError::value_error(format!(
                "expected {} values to unpack, got {}",
                targets.len(),
                parts.len()
            )));
        }
        for (name, part) in targets.iter().zip(parts) {
            self.scope.insert(name.clone(), Binding::Data(part));
        }
        Ok(())
    }

    /// `name.append(x)` and friends, which update a local binding in place
    fn exec_mutating_call(&mut self, expr: &Expr) -> ScriptResult<bool> {
        let Expr::Call { func, args } = expr else {
            return Ok(false);
        };
        let Expr::Attribute { object, attr } = func.as_ref() else {
            return Ok(false);
        };
        let Expr::Name(name) = object.as_ref() else {
            return Ok(false);
        };
        if !MUTATING_METHODS.contains(&attr.as_str()) {
            return Ok(false);
        }

        let args = self.eval_all(args)?;
        let receiver = match self.scope.get_mut(name) {
            Some(Binding::Data(v)) => v,
            Some(Binding::Module(_)) => return Ok(false),
            None => return Err(ScriptError::Name(name.clone())),
        };
        match builtins::call_mutating_method(receiver, attr, &args) {
            Some(result) => result.map(|_| true),
            None => Err(ScriptError::Attribute(format!(
                "'{}' object has no attribute '{}'",
                type_name(receiver),
                attr
            ))),
        }
    }

    fn assign(&mut self, target: &Target, value: Value) -> ScriptResult<()> {
        match target {
            Target::Name(name) => {
                self.scope.insert(name.clone(), Binding::Data(value));
                Ok(())
            }
            Target::Index { name, path } => {
                let keys = self.eval_all(path)?;
                let mut current = match self.scope.get_mut(name) {
                    Some(Binding::Data(v)) => v,
                    Some(Binding::Module(_)) => {
                        return Err(ScriptError::type_error(
                            "'module' object does not support item assignment",
                        ))
                    }
                    None => return Err(ScriptError::Name(name.clone())),
                };

                let Some((last, parents)) = keys.split_last() else {
                    return Ok(());
                };
                check_size(&value)?;
                for key in parents {
                    current = locate_mut(current, key)?;
                }
                store(current, last, value)
            }
        }
    }

    fn eval_all(&self, exprs: &[Expr]) -> ScriptResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    /// Evaluate an expression to an owned value
    pub fn eval(&self, expr: &Expr) -> ScriptResult<Value> {
        self.place(expr).map(Cow::into_owned)
    }

    /// Evaluate an expression, borrowing from the scope where possible so that
    /// reading `state[...]` does not copy the whole state
    fn place(&self, expr: &Expr) -> ScriptResult<Cow<'_, Value>> {
        self.tick()?;
        match expr {
            Expr::Name(name) => match self.scope.get(name) {
                Some(Binding::Data(v)) => Ok(Cow::Borrowed(v)),
                Some(Binding::Module(m)) => Err(ScriptError::type_error(format!(
                    "module '{}' cannot be used as a value",
                    m.name()
                ))),
                None if builtins::is_builtin(name) => Err(ScriptError::type_error(format!(
                    "builtin '{}' cannot be used as a value",
                    name
                ))),
                None => Err(ScriptError::Name(name.clone())),
            },
            Expr::Index { object, index } => {
                let container = self.place(object)?;
                let key = self.eval(index)?;
                index_into(container, &key)
            }
            other => self.compute(other).map(Cow::Owned),
        }
    }

    fn compute(&self, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Literal(lit) => match lit {
                Literal::Int(i) => Ok(Value::from(*i)),
                Literal::Float(f) => float_value(*f),
                Literal::String(s) => Ok(Value::String(s.clone())),
                Literal::Boolean(b) => Ok(Value::Bool(*b)),
                Literal::None => Ok(Value::Null),
            },
            Expr::Name(_) | Expr::Index { .. } => self.eval(expr),
            Expr::List(items) => {
                let list = Value::Array(self.eval_all(items)?);
                check_size(&list)?;
                Ok(list)
            }
            Expr::Dict(entries) => {
                let mut evaluated = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    evaluated.push((self.eval(k)?, self.eval(v)?));
                }
                let dict = builtins::make_dict(evaluated)?;
                check_size(&dict)?;
                Ok(dict)
            }
            Expr::Attribute { object, attr } => {
                if let Some(module) = self.module_ref(object) {
                    return module.attribute(attr).ok_or_else(|| {
                        ScriptError::Attribute(format!(
                            "module '{}' has no attribute '{}'",
                            module.name(),
                            attr
                        ))
                    });
                }
                let receiver = self.place(object)?;
                Err(ScriptError::Attribute(format!(
                    "'{}' object has no attribute '{}'",
                    type_name(&*receiver),
                    attr
                )))
            }
            Expr::Call { func, args } => self.call(func, args),
            Expr::Unary { op, operand } => {
                let value = self.place(operand)?;
                unary(*op, &*value)
            }
            Expr::Binary { left, op, right } => {
                let l = self.place(left)?;
                let r = self.place(right)?;
                binary(*op, &*l, &*r)
            }
            Expr::Compare { left, op, right } => {
                let l = self.place(left)?;
                let r = self.place(right)?;
                compare(*op, &*l, &*r).map(Value::Bool)
            }
            Expr::And(left, right) => {
                let l = self.eval(left)?;
                if !truthy(&l) {
                    return Ok(l);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let l = self.eval(left)?;
                if truthy(&l) {
                    return Ok(l);
                }
                self.eval(right)
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if truthy(&*self.place(cond)?) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn module_ref(&self, expr: &Expr) -> Option<&Arc<dyn Module>> {
        match expr {
            Expr::Name(name) => match self.scope.get(name) {
                Some(Binding::Module(m)) => Some(m),
                _ => None,
            },
            _ => None,
        }
    }

    fn call(&self, func: &Expr, args: &[Expr]) -> ScriptResult<Value> {
        match func {
            Expr::Name(name) => {
                if let Some(binding) = self.scope.get(name) {
                    let kind = match binding {
                        Binding::Data(v) => type_name(v),
                        Binding::Module(_) => "module",
                    };
                    return Err(ScriptError::type_error(format!(
                        "'{}' object is not callable",
                        kind
                    )));
                }
                if !builtins::is_builtin(name) {
                    return Err(ScriptError::Name(name.clone()));
                }
                let args = self.eval_all(args)?;
                builtins::call(name, &args)
            }
            Expr::Attribute { object, attr } => {
                if let Some(module) = self.module_ref(object) {
                    let args = self.eval_all(args)?;
                    return module.call(attr, &args);
                }
                let receiver = self.place(object)?;
                if MUTATING_METHODS.contains(&attr.as_str()) {
                    return Err(ScriptError::type_error(format!(
                        "{}() is only supported as a statement on a variable",
                        attr
                    )));
                }
                let args = self.eval_all(args)?;
                builtins::call_method(&*receiver, attr, &args)
            }
            other => {
                let value = self.place(other)?;
                Err(ScriptError::type_error(format!(
                    "'{}' object is not callable",
                    type_name(&*value)
                )))
            }
        }
    }
}

fn locate<'v>(container: &'v Value, key: &Value) -> ScriptResult<&'v Value> {
    match container {
        Value::Array(items) => {
            let idx = list_index(key)?;
            normalize_index(idx, items.len())
                .and_then(|i| items.get(i))
                .ok_or_else(|| ScriptError::Index("list index out of range".to_string()))
        }
        Value::Object(map) => key
            .as_str()
            .and_then(|k| map.get(k))
            .ok_or_else(|| ScriptError::Key(repr(key))),
        other => Err(not_subscriptable(other)),
    }
}

fn locate_mut<'v>(container: &'v mut Value, key: &Value) -> ScriptResult<&'v mut Value> {
    match container {
        Value::Array(items) => {
            let idx = list_index(key)?;
            let len = items.len();
            normalize_index(idx, len)
                .and_then(move |i| items.get_mut(i))
                .ok_or_else(|| ScriptError::Index("list index out of range".to_string()))
        }
        Value::Object(map) => key
            .as_str()
            .and_then(move |k| map.get_mut(k))
            .ok_or_else(|| ScriptError::Key(repr(key))),
        other => Err(not_subscriptable(other)),
    }
}

fn store(container: &mut Value, key: &Value, value: Value) -> ScriptResult<()> {
    match container {
        Value::Array(items) => {
            let idx = list_index(key)?;
            let slot = normalize_index(idx, items.len())
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| {
                    ScriptError::Index("list assignment index out of range".to_string())
                })?;
            *slot = value;
            Ok(())
        }
        Value::Object(map) => {
            let key = key.as_str().ok_or_else(|| {
                ScriptError::type_error(format!("dict keys must be str, got '{}'", type_name(key)))
            })?;
            map.insert(key.to_string(), value);
            Ok(())
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object does not support item assignment",
            type_name(other)
        ))),
    }
}

fn index_into<'v>(container: Cow<'v, Value>, key: &Value) -> ScriptResult<Cow<'v, Value>> {
    if let Value::String(s) = container.as_ref() {
        let idx = list_index(key)?;
        let chars: Vec<char> = s.chars().collect();
        return normalize_index(idx, chars.len())
            .map(|i| Cow::Owned(Value::String(chars[i].to_string())))
            .ok_or_else(|| ScriptError::Index("string index out of range".to_string()));
    }

    match container {
        Cow::Borrowed(c) => locate(c, key).map(Cow::Borrowed),
        Cow::Owned(c) => locate(&c, key).map(|v| Cow::Owned(v.clone())),
    }
}

fn list_index(key: &Value) -> ScriptResult<i64> {
    match key {
        Value::Number(_) | Value::Bool(_) => integer(key, "index").map_err(|_| {
            ScriptError::type_error(format!(
                "list indices must be integers, not '{}'",
                type_name(key)
            ))
        }),
        other => Err(ScriptError::type_error(format!(
            "list indices must be integers, not '{}'",
            type_name(other)
        ))),
    }
}

fn not_subscriptable(value: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "'{}' object is not subscriptable",
        type_name(value)
    ))
}

fn unsupported(op: impl std::fmt::Display, left: &Value, right: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        type_name(left),
        type_name(right)
    ))
}

fn overflow(op: BinaryOp) -> ScriptError {
    ScriptError::Overflow(format!("integer overflow in '{}'", op))
}

fn unary(op: UnaryOp, value: &Value) -> ScriptResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!truthy(value))),
        UnaryOp::Pos | UnaryOp::Neg => {
            let n = Num::from_value(value).ok_or_else(|| {
                ScriptError::type_error(format!(
                    "bad operand type for unary {}: '{}'",
                    if op == UnaryOp::Neg { "-" } else { "+" },
                    type_name(value)
                ))
            })?;
            match (op, n) {
                (UnaryOp::Neg, Num::Int(i)) => i
                    .checked_neg()
                    .map(Value::from)
                    .ok_or_else(|| ScriptError::Overflow("integer overflow in '-'".to_string())),
                (UnaryOp::Neg, Num::Float(f)) => float_value(-f),
                (_, n) => n.into_value(),
            }
        }
    }
}

fn repeat<T: Clone>(items: &[T], times: i64) -> ScriptResult<Vec<T>> {
    let times = usize::try_from(times.max(0)).unwrap_or(0);
    if items.len().saturating_mul(times) > MAX_SEQUENCE_LEN {
        return Err(ScriptError::value_error("repeated sequence is too large"));
    }
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    match (op, left, right) {
        (BinaryOp::Add, Value::String(a), Value::String(b)) => {
            check_len(a.len().saturating_add(b.len()), "'+'")?;
            Ok(Value::String(format!("{a}{b}")))
        }
        (BinaryOp::Add, Value::Array(a), Value::Array(b)) => {
            check_len(a.len().saturating_add(b.len()), "'+'")?;
            check_total(size_of(left)?.saturating_add(size_of(right)?))?;
            Ok(Value::Array(a.iter().chain(b).cloned().collect()))
        }
        (BinaryOp::Mul, Value::String(s), Value::Number(_))
        | (BinaryOp::Mul, Value::Number(_), Value::String(s)) => {
            let times = integer(if left.is_string() { right } else { left }, "*")
                .map_err(|_| unsupported(op, left, right))?;
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::String(repeat(&chars, times)?.into_iter().collect()))
        }
        (BinaryOp::Mul, Value::Array(a), Value::Number(_))
        | (BinaryOp::Mul, Value::Number(_), Value::Array(a)) => {
            let (list, count) = if left.is_array() { (left, right) } else { (right, left) };
            let times = integer(count, "*").map_err(|_| unsupported(op, left, right))?;
            let copies = usize::try_from(times.max(0)).unwrap_or(0);
            check_total(size_of(list)?.saturating_mul(copies))?;
            repeat(a, times).map(Value::Array)
        }
        _ => {
            let (Some(a), Some(b)) = (Num::from_value(left), Num::from_value(right)) else {
                return Err(unsupported(op, left, right));
            };
            arithmetic(op, a, b)?.into_value()
        }
    }
}

fn arithmetic(op: BinaryOp, a: Num, b: Num) -> ScriptResult<Num> {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        return int_arithmetic(op, x, y);
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let zero = || ScriptError::ZeroDivision("float division by zero".to_string());
    let value = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(zero());
            }
            x / y
        }
        BinaryOp::FloorDiv => {
            if y == 0.0 {
                return Err(zero());
            }
            (x / y).floor()
        }
        BinaryOp::Mod => {
            if y == 0.0 {
                return Err(ScriptError::ZeroDivision("float modulo".to_string()));
            }
            x - y * (x / y).floor()
        }
        BinaryOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(ScriptError::ZeroDivision(
                    "0.0 cannot be raised to a negative power".to_string(),
                ));
            }
            x.powf(y)
        }
    };
    Ok(Num::Float(value))
}

fn int_arithmetic(op: BinaryOp, x: i64, y: i64) -> ScriptResult<Num> {
    let zero = || ScriptError::ZeroDivision("integer division or modulo by zero".to_string());
    let value = match op {
        BinaryOp::Add => x.checked_add(y).ok_or_else(|| overflow(op))?,
        BinaryOp::Sub => x.checked_sub(y).ok_or_else(|| overflow(op))?,
        BinaryOp::Mul => x.checked_mul(y).ok_or_else(|| overflow(op))?,
        BinaryOp::Div => {
            if y == 0 {
                return Err(ScriptError::ZeroDivision("division by zero".to_string()));
            }
            return Ok(Num::Float(x as f64 / y as f64));
        }
        BinaryOp::FloorDiv => {
            if y == 0 {
                return Err(zero());
            }
            let q = x.checked_div(y).ok_or_else(|| overflow(op))?;
            if (x % y != 0) && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(zero());
            }
            let r = x.checked_rem(y).ok_or_else(|| overflow(op))?;
            if r != 0 && ((r < 0) != (y < 0)) {
                r + y
            } else {
                r
            }
        }
        BinaryOp::Pow => {
            if y < 0 {
                if x == 0 {
                    return Err(ScriptError::ZeroDivision(
                        "0 cannot be raised to a negative power".to_string(),
                    ));
                }
                return Ok(Num::Float((x as f64).powf(y as f64)));
            }
            let exp = u32::try_from(y).map_err(|_| overflow(op))?;
            x.checked_pow(exp).ok_or_else(|| overflow(op))?
        }
    };
    Ok(Num::Int(value))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> ScriptResult<bool> {
    use std::cmp::Ordering::{Greater, Less};

    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::NotEq => Ok(!values_equal(left, right)),
        CompareOp::Lt => Ok(compare_values(left, right)? == Less),
        CompareOp::Lte => Ok(compare_values(left, right)? != Greater),
        CompareOp::Gt => Ok(compare_values(left, right)? == Greater),
        CompareOp::Gte => Ok(compare_values(left, right)? != Less),
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => contains(right, left).map(|found| !found),
    }
}

fn contains(container: &Value, item: &Value) -> ScriptResult<bool> {
    match container {
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Object(map) => Ok(item.as_str().map(|k| map.contains_key(k)).unwrap_or(false)),
        Value::String(s) => match item {
            Value::String(needle) => Ok(s.contains(needle.as_str())),
            other => Err(ScriptError::type_error(format!(
                "'in <string>' requires string as left operand, not '{}'",
                type_name(other)
            ))),
        },
        other => Err(ScriptError::type_error(format!(
            "argument of type '{}' is not iterable",
            type_name(other)
        ))),
    }
}
