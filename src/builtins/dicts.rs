//! Dict methods: `get`, `keys`, `values`, `items`, `setdefault`, `copy`,
//! `update`
//!
//! Bound through property access on dict values after the dict's own keys
//! are consulted. Iteration surfaces are sorted by key so evaluation stays
//! deterministic.

use super::want_str;
use crate::error::{EvalError, EvalResult};
use crate::scope::Scope;
use crate::value::{FuncDef, Value};
use girder_macros::builtin;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

static METHODS: Lazy<HashMap<String, Arc<FuncDef>>> = Lazy::new(|| {
    [
        get_builtin(),
        keys_builtin(),
        values_builtin(),
        items_builtin(),
        setdefault_builtin(),
        copy_builtin(),
        update_builtin(),
    ]
    .into_iter()
    .map(|f| (f.name.clone(), Arc::new(f)))
    .collect()
});

/// Looks up a dict method for binding.
pub(crate) fn method(name: &str) -> Option<Arc<FuncDef>> {
    METHODS.get(name).cloned()
}

fn storage(receiver: &Value) -> EvalResult<Arc<RwLock<HashMap<String, Value>>>> {
    match receiver {
        Value::Dict(d) | Value::FrozenDict(d) => Ok(d.clone()),
        other => Err(EvalError::type_error(format!(
            "expected dict, got {}",
            other.type_name()
        ))),
    }
}

fn mutable(receiver: &Value) -> EvalResult<Arc<RwLock<HashMap<String, Value>>>> {
    match receiver {
        Value::Dict(d) => Ok(d.clone()),
        Value::FrozenDict(_) => Err(EvalError::invariant("dict is immutable")),
        other => Err(EvalError::type_error(format!(
            "expected dict, got {}",
            other.type_name()
        ))),
    }
}

fn sorted_keys(d: &HashMap<String, Value>) -> Vec<String> {
    let mut keys: Vec<String> = d.keys().cloned().collect();
    keys.sort();
    keys
}

#[builtin(name = "get", params = "self: dict, key: str, default = None")]
fn get(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let d = storage(&args[0])?;
    let key = want_str("get", args, 1)?;
    let value = d.read().get(key).cloned();
    Ok(value.unwrap_or_else(|| args[2].clone()))
}

#[builtin(name = "keys", params = "self: dict")]
fn keys(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let d = storage(&args[0])?;
    let d = d.read();
    Ok(Value::list(
        sorted_keys(&d).into_iter().map(Value::string).collect(),
    ))
}

#[builtin(name = "values", params = "self: dict")]
fn values(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let d = storage(&args[0])?;
    let d = d.read();
    Ok(Value::list(
        sorted_keys(&d).iter().map(|k| d[k].clone()).collect(),
    ))
}

#[builtin(name = "items", params = "self: dict")]
fn items(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let d = storage(&args[0])?;
    let d = d.read();
    Ok(Value::list(
        sorted_keys(&d)
            .into_iter()
            .map(|k| {
                let v = d[&k].clone();
                Value::list(vec![Value::string(k), v])
            })
            .collect(),
    ))
}

#[builtin(name = "setdefault", params = "self: dict, key: str, default = None")]
fn setdefault(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let d = mutable(&args[0])?;
    let key = want_str("setdefault", args, 1)?;
    let mut d = d.write();
    Ok(d.entry(key.to_owned()).or_insert_with(|| args[2].clone()).clone())
}

/// A shallow, unfrozen copy; copying a frozen dict yields a mutable one.
#[builtin(name = "copy", params = "self: dict")]
fn copy(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let d = storage(&args[0])?;
    let snapshot = d.read().clone();
    Ok(Value::dict(snapshot))
}

#[builtin(name = "update", params = "self: dict, other: dict")]
fn update(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let d = mutable(&args[0])?;
    // Snapshot first so updating a dict from itself cannot deadlock.
    let other = storage(&args[1])?.read().clone();
    d.write().extend(other);
    Ok(Value::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::interpreter::State;

    fn scope() -> Arc<Scope> {
        let root = Scope::builtin_root(State::for_testing(BuildConfig::default()));
        super::super::register_builtins(&root);
        root.child()
    }

    fn sample() -> Value {
        let mut m = HashMap::new();
        m.insert("b".to_owned(), Value::Int(2));
        m.insert("a".to_owned(), Value::Int(1));
        Value::dict(m)
    }

    #[test]
    fn test_get_with_default() {
        let s = scope();
        let d = sample();
        assert_eq!(
            get(&s, &[d.clone(), Value::string("a"), Value::None]).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            get(&s, &[d, Value::string("z"), Value::Int(9)]).unwrap(),
            Value::Int(9)
        );
    }

    #[test]
    fn test_iteration_surfaces_sorted() {
        let s = scope();
        let d = sample();
        assert_eq!(
            keys(&s, &[d.clone()]).unwrap(),
            Value::list(vec![Value::string("a"), Value::string("b")])
        );
        assert_eq!(
            values(&s, &[d.clone()]).unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            items(&s, &[d]).unwrap(),
            Value::list(vec![
                Value::list(vec![Value::string("a"), Value::Int(1)]),
                Value::list(vec![Value::string("b"), Value::Int(2)]),
            ])
        );
    }

    #[test]
    fn test_setdefault() {
        let s = scope();
        let d = sample();
        assert_eq!(
            setdefault(&s, &[d.clone(), Value::string("a"), Value::Int(9)]).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            setdefault(&s, &[d.clone(), Value::string("c"), Value::Int(3)]).unwrap(),
            Value::Int(3)
        );
        assert_eq!(d.index(&Value::string("c")).unwrap(), Value::Int(3));
        assert!(setdefault(&s, &[d.freeze(), Value::string("x"), Value::None]).is_err());
    }

    #[test]
    fn test_copy_unfreezes() {
        let s = scope();
        let frozen = sample().freeze();
        let copied = copy(&s, &[frozen.clone()]).unwrap();
        copied.set_index(&Value::string("c"), Value::Int(3)).unwrap();
        assert_eq!(copied.len().unwrap(), 3);
        assert_eq!(frozen.len().unwrap(), 2);
    }

    #[test]
    fn test_update_merges() {
        let s = scope();
        let d = sample();
        let mut other = HashMap::new();
        other.insert("a".to_owned(), Value::Int(9));
        other.insert("c".to_owned(), Value::Int(3));
        update(&s, &[d.clone(), Value::dict(other)]).unwrap();
        assert_eq!(d.index(&Value::string("a")).unwrap(), Value::Int(9));
        assert_eq!(d.len().unwrap(), 3);
        assert!(update(&s, &[d.freeze(), sample()]).is_err());
    }
}
