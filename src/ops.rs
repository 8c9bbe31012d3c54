// ABOUTME: Binary and unary operator application over runtime values,
// dispatched on the left operand's variant

use crate::ast::Operator;
use crate::error::{EvalError, EvalResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Applies a non-lazy binary operator. `and`/`or` never reach here; the
/// evaluator short-circuits them.
pub fn apply_binary(op: Operator, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match op {
        Operator::Add => add(lhs, rhs),
        Operator::Subtract => match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            _ => Err(bad_operands(op, lhs, rhs)),
        },
        Operator::Multiply => multiply(lhs, rhs),
        Operator::Divide => match (lhs, rhs) {
            (Value::Int(_), Value::Int(0)) => Err(EvalError::value_error("division by zero")),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(floor_div(*a, *b))),
            _ => Err(bad_operands(op, lhs, rhs)),
        },
        Operator::Modulo => modulo(lhs, rhs),
        Operator::LessThan => compared(lhs, rhs, op, |o| o == Ordering::Less),
        Operator::GreaterThan => compared(lhs, rhs, op, |o| o == Ordering::Greater),
        Operator::LessThanOrEqual => compared(lhs, rhs, op, |o| o != Ordering::Greater),
        Operator::GreaterThanOrEqual => compared(lhs, rhs, op, |o| o != Ordering::Less),
        Operator::Equal => Ok(Value::Bool(lhs == rhs)),
        Operator::NotEqual => Ok(Value::Bool(lhs != rhs)),
        Operator::In => contains(rhs, lhs).map(Value::Bool),
        Operator::NotIn => contains(rhs, lhs).map(|b| Value::Bool(!b)),
        Operator::Is => Ok(Value::Bool(lhs.is_identical(rhs))),
        Operator::IsNot => Ok(Value::Bool(!lhs.is_identical(rhs))),
        Operator::Union => union(lhs, rhs),
        Operator::And | Operator::Or => {
            unreachable!("logical operators are evaluated lazily")
        }
    }
}

/// Unary negation; defined for ints only. Negating a list or string has no
/// meaning in the language and fails.
pub fn negate(v: &Value) -> EvalResult<Value> {
    match v {
        Value::Int(i) => Ok(Value::Int(-i)),
        _ => Err(EvalError::type_error(format!(
            "bad operand type for unary -: '{}'",
            v.type_name()
        ))),
    }
}

fn add(lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Value::String(a), Value::String(b)) => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Value::string(s))
        }
        (
            Value::List(a) | Value::FrozenList(a),
            Value::List(b) | Value::FrozenList(b),
        ) => {
            let mut out = a.read().clone();
            out.extend(b.read().iter().cloned());
            Ok(Value::list(out))
        }
        _ => Err(bad_operands(Operator::Add, lhs, rhs)),
    }
}

fn multiply(lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
        (Value::String(s), Value::Int(n)) | (Value::Int(n), Value::String(s)) => {
            Ok(Value::string(s.repeat((*n).max(0) as usize)))
        }
        (Value::List(l) | Value::FrozenList(l), Value::Int(n))
        | (Value::Int(n), Value::List(l) | Value::FrozenList(l)) => {
            let items = l.read();
            let mut out = Vec::with_capacity(items.len() * (*n).max(0) as usize);
            for _ in 0..(*n).max(0) {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        _ => Err(bad_operands(Operator::Multiply, lhs, rhs)),
    }
}

fn modulo(lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match (lhs, rhs) {
        (Value::Int(_), Value::Int(0)) => Err(EvalError::value_error("modulo by zero")),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(floor_mod(*a, *b))),
        (Value::String(fmt), _) => {
            let args: Vec<Value> = match rhs {
                Value::List(l) | Value::FrozenList(l) => l.read().clone(),
                Value::String(_) | Value::Int(_) => vec![rhs.clone()],
                _ => return Err(bad_operands(Operator::Modulo, lhs, rhs)),
            };
            interpolate(fmt, &args).map(Value::string)
        }
        _ => Err(bad_operands(Operator::Modulo, lhs, rhs)),
    }
}

/// Python-style floor division: quotient rounds toward negative infinity.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && (a < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

/// Python-style modulo: the result carries the divisor's sign.
fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }
}

fn compared(
    lhs: &Value,
    rhs: &Value,
    op: Operator,
    f: impl Fn(Ordering) -> bool,
) -> EvalResult<Value> {
    lhs.compare(rhs)
        .map(|o| Value::Bool(f(o)))
        .map_err(|_| bad_operands(op, lhs, rhs))
}

/// Membership test for `in`/`not in`: substring for strings, structural
/// equality for lists, key presence for dicts and config.
fn contains(container: &Value, needle: &Value) -> EvalResult<bool> {
    match container {
        Value::String(s) => {
            let n = needle.as_str().ok_or_else(|| {
                EvalError::type_error(format!(
                    "'in <str>' requires string as left operand, not {}",
                    needle.type_name()
                ))
            })?;
            Ok(s.contains(n))
        }
        Value::List(l) | Value::FrozenList(l) => Ok(l.read().iter().any(|v| v == needle)),
        Value::Dict(d) | Value::FrozenDict(d) => {
            let k = needle.as_str().ok_or_else(|| {
                EvalError::type_error(format!(
                    "'in <dict>' requires string as left operand, not {}",
                    needle.type_name()
                ))
            })?;
            Ok(d.read().contains_key(k))
        }
        Value::Config(c) => {
            let k = needle.as_str().ok_or_else(|| {
                EvalError::type_error(format!(
                    "'in <config>' requires string as left operand, not {}",
                    needle.type_name()
                ))
            })?;
            Ok(c.contains(k))
        }
        _ => Err(EvalError::type_error(format!(
            "argument of type '{}' is not iterable",
            container.type_name()
        ))),
    }
}

/// Dict union; the right operand wins on key collisions.
fn union(lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match (lhs, rhs) {
        (
            Value::Dict(a) | Value::FrozenDict(a),
            Value::Dict(b) | Value::FrozenDict(b),
        ) => {
            let mut out = a.read().clone();
            for (k, v) in b.read().iter() {
                out.insert(k.clone(), v.clone());
            }
            Ok(Value::dict(out))
        }
        _ => Err(bad_operands(Operator::Union, lhs, rhs)),
    }
}

fn bad_operands(op: Operator, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::type_error(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op.symbol(),
        lhs.type_name(),
        rhs.type_name()
    ))
}

/// Printf-style interpolation for the string `%` operator and the log
/// builtins. Supports `%s` (any value, unquoted form), `%d` (ints), and
/// `%%`.
pub fn interpolate(fmt: &str, args: &[Value]) -> EvalResult<String> {
    let mut out = String::with_capacity(fmt.len() + 16);
    let mut next = 0;
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                let arg = args
                    .get(next)
                    .ok_or_else(|| EvalError::value_error("not enough arguments for format string"))?;
                out.push_str(&arg.to_string());
                next += 1;
            }
            Some('d') => {
                let arg = args
                    .get(next)
                    .ok_or_else(|| EvalError::value_error("not enough arguments for format string"))?;
                let i = arg.as_int().ok_or_else(|| {
                    EvalError::type_error(format!("%d format requires int, not {}", arg.type_name()))
                })?;
                out.push_str(&i.to_string());
                next += 1;
            }
            Some(other) => {
                return Err(EvalError::value_error(format!(
                    "unsupported format character '{other}'"
                )));
            }
            None => return Err(EvalError::value_error("incomplete format string")),
        }
    }
    if next < args.len() {
        return Err(EvalError::value_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}
