//! Type conversions and sequence operations
//!
//! The free-standing builtins every build file can reach: `str`, `int`,
//! `bool`, `len`, `sorted`, `reversed`, `zip`, `enumerate`, `any`, `all`,
//! `min`, `max`, `map`, `filter`, `reduce`, `range`, `chr`, `ord`.

use super::{install, want_function, want_list};
use crate::error::{EvalError, EvalResult};
use crate::eval::call_function;
use crate::scope::Scope;
use crate::value::Value;
use girder_macros::builtin;
use std::cmp::Ordering;
use std::sync::Arc;

pub fn register(scope: &Arc<Scope>) {
    install(scope, str_builtin());
    install(scope, int_builtin());
    install(scope, bool_builtin());
    install(scope, len_builtin());
    install(scope, sorted_builtin());
    install(scope, reversed_builtin());
    install(scope, zip_builtin());
    install(scope, enumerate_builtin());
    install(scope, any_builtin());
    install(scope, all_builtin());
    install(scope, min_builtin());
    install(scope, max_builtin());
    install(scope, map_builtin());
    install(scope, filter_builtin());
    install(scope, reduce_builtin());
    install(scope, range_builtin());
    install(scope, chr_builtin());
    install(scope, ord_builtin());
}

#[builtin(name = "str", params = "obj")]
fn str_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::string(args[0].to_string()))
}

#[builtin(name = "int", params = "obj: str|int|bool")]
fn int_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::String(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            EvalError::value_error(format!("invalid literal for int: '{s}'"))
        }),
        _ => unreachable!("argument type enforced by binding"),
    }
}

#[builtin(name = "bool", params = "obj")]
fn bool_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(args[0].is_truthy()))
}

#[builtin(name = "len", params = "obj")]
fn len_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    args[0].len().map(|n| Value::Int(n as i64))
}

/// Sorts the list in place and returns it. This deviates from Python's
/// `sorted`, which copies; build files rely on the in-place contract.
#[builtin(name = "sorted", params = "seq: list")]
fn sorted_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let list = match &args[0] {
        Value::List(l) => l.clone(),
        Value::FrozenList(_) => return Err(EvalError::invariant("list is immutable")),
        _ => unreachable!("argument type enforced by binding"),
    };
    let mut err = None;
    list.write().sort_by(|a, b| match a.compare(b) {
        Ok(ord) => ord,
        Err(e) => {
            err.get_or_insert(e);
            Ordering::Equal
        }
    });
    match err {
        Some(e) => Err(e),
        None => Ok(args[0].clone()),
    }
}

#[builtin(name = "reversed", params = "seq: list")]
fn reversed_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let mut items = want_list("reversed", args, 0)?;
    items.reverse();
    Ok(Value::list(items))
}

/// Truncates to the shortest input sequence.
#[builtin(name = "zip", params = "*seqs")]
fn zip_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let mut seqs = Vec::with_capacity(args.len());
    for i in 0..args.len() {
        seqs.push(want_list("zip", args, i)?);
    }
    let shortest = seqs.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(shortest);
    for i in 0..shortest {
        out.push(Value::list(seqs.iter().map(|s| s[i].clone()).collect()));
    }
    Ok(Value::list(out))
}

#[builtin(name = "enumerate", params = "seq: list")]
fn enumerate_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let items = want_list("enumerate", args, 0)?;
    let out = items
        .into_iter()
        .enumerate()
        .map(|(i, v)| Value::list(vec![Value::Int(i as i64), v]))
        .collect();
    Ok(Value::list(out))
}

#[builtin(name = "any", params = "seq: list")]
fn any_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(
        want_list("any", args, 0)?.iter().any(Value::is_truthy),
    ))
}

#[builtin(name = "all", params = "seq: list")]
fn all_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(
        want_list("all", args, 0)?.iter().all(Value::is_truthy),
    ))
}

#[builtin(name = "min", params = "seq: list, key: function = None")]
fn min_(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    extremum(s, args, "min", Ordering::Less)
}

#[builtin(name = "max", params = "seq: list, key: function = None")]
fn max_(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    extremum(s, args, "max", Ordering::Greater)
}

fn extremum(
    s: &Arc<Scope>,
    args: &[Value],
    function: &str,
    wanted: Ordering,
) -> EvalResult<Value> {
    let items = want_list(function, args, 0)?;
    if items.is_empty() {
        return Err(EvalError::value_error(format!(
            "{function}() arg is an empty sequence"
        )));
    }
    let key_of = |v: &Value| -> EvalResult<Value> {
        match &args[1] {
            Value::None => Ok(v.clone()),
            Value::Function(f) => {
                call_function(s, f, vec![v.clone()], vec![], Default::default())
            }
            _ => unreachable!("argument type enforced by binding"),
        }
    };
    let mut best = items[0].clone();
    let mut best_key = key_of(&best)?;
    for item in &items[1..] {
        let k = key_of(item)?;
        if k.compare(&best_key)? == wanted {
            best = item.clone();
            best_key = k;
        }
    }
    Ok(best)
}

#[builtin(name = "map", params = "f: function, seq: list")]
fn map_(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let f = want_function("map", args, 0)?;
    let items = want_list("map", args, 1)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(call_function(s, &f, vec![item], vec![], Default::default())?);
    }
    Ok(Value::list(out))
}

#[builtin(name = "filter", params = "f: function, seq: list")]
fn filter_(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let f = want_function("filter", args, 0)?;
    let items = want_list("filter", args, 1)?;
    let mut out = Vec::new();
    for item in items {
        if call_function(s, &f, vec![item.clone()], vec![], Default::default())?.is_truthy() {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

/// Folds the sequence. With no initializer an empty sequence yields None
/// and a single element yields that element.
#[builtin(name = "reduce", params = "f: function, seq: list, initializer = None")]
fn reduce(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let f = want_function("reduce", args, 0)?;
    let items = want_list("reduce", args, 1)?;
    let mut iter = items.into_iter();
    let mut acc = match &args[2] {
        Value::None => match iter.next() {
            Some(first) => first,
            None => return Ok(Value::None),
        },
        init => init.clone(),
    };
    for item in iter {
        acc = call_function(s, &f, vec![acc, item], vec![], Default::default())?;
    }
    Ok(acc)
}

#[builtin(name = "range", params = "start: int, stop: int = None, step: int = 1")]
fn range_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let (start, stop) = match &args[1] {
        Value::None => (0, want_int_value("range", &args[0])?),
        _ => (
            want_int_value("range", &args[0])?,
            want_int_value("range", &args[1])?,
        ),
    };
    let step = want_int_value("range", &args[2])?;
    if step == 0 {
        return Err(EvalError::value_error("range() step must not be zero"));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(Value::Int(i));
        i += step;
    }
    Ok(Value::list(out))
}

fn want_int_value(function: &str, v: &Value) -> EvalResult<i64> {
    v.as_int().ok_or_else(|| {
        EvalError::type_error(format!(
            "{function}: expected int, got {}",
            v.type_name()
        ))
    })
}

#[builtin(name = "chr", params = "i: int")]
fn chr_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let i = args[0].as_int().unwrap_or_default();
    let c = u32::try_from(i)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| EvalError::value_error(format!("chr() arg not in range: {i}")))?;
    Ok(Value::string(c.to_string()))
}

#[builtin(name = "ord", params = "c: str")]
fn ord_(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = args[0].as_str().unwrap_or_default();
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
        _ => Err(EvalError::value_error(format!(
            "ord() expected a character, but string of length {} found",
            text.chars().count()
        ))),
    }
}
