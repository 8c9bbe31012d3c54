//! List methods: `append`, `extend`, `index`, `remove`
//!
//! Bound through property access on list values. Mutators refuse frozen
//! views.

use super::want_list;
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
        append_builtin(),
        extend_builtin(),
        index_builtin(),
        remove_builtin(),
    ]
    .into_iter()
    .map(|f| (f.name.clone(), Arc::new(f)))
    .collect()
});

/// Looks up a list method for binding.
pub(crate) fn method(name: &str) -> Option<Arc<FuncDef>> {
    METHODS.get(name).cloned()
}

/// The writable storage behind a list receiver; frozen views fail.
fn mutable(receiver: &Value) -> EvalResult<Arc<RwLock<Vec<Value>>>> {
    match receiver {
        Value::List(l) => Ok(l.clone()),
        Value::FrozenList(_) => Err(EvalError::invariant("list is immutable")),
        other => Err(EvalError::type_error(format!(
            "expected list, got {}",
            other.type_name()
        ))),
    }
}

#[builtin(name = "append", params = "self: list, item")]
fn append(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    mutable(&args[0])?.write().push(args[1].clone());
    Ok(Value::None)
}

#[builtin(name = "extend", params = "self: list, seq: list")]
fn extend(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let storage = mutable(&args[0])?;
    // Snapshot first so extending a list with itself cannot deadlock.
    let items = want_list("extend", args, 1)?;
    storage.write().extend(items);
    Ok(Value::None)
}

#[builtin(name = "index", params = "self: list, item")]
fn index(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let items = want_list("index", args, 0)?;
    items
        .iter()
        .position(|v| v == &args[1])
        .map(|i| Value::Int(i as i64))
        .ok_or_else(|| {
            EvalError::value_error(format!("{} is not in list", args[1].repr()))
        })
}

#[builtin(name = "remove", params = "self: list, item")]
fn remove(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let storage = mutable(&args[0])?;
    let mut items = storage.write();
    match items.iter().position(|v| v == &args[1]) {
        Some(i) => {
            items.remove(i);
            Ok(Value::None)
        }
        None => Err(EvalError::value_error(format!(
            "{} is not in list",
            args[1].repr()
        ))),
    }
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

    #[test]
    fn test_append_mutates() {
        let s = scope();
        let l = Value::list(vec![Value::Int(1)]);
        append(&s, &[l.clone(), Value::Int(2)]).unwrap();
        assert_eq!(l, Value::list(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_mutators_refuse_frozen() {
        let s = scope();
        let l = Value::list(vec![Value::Int(1)]).freeze();
        assert!(append(&s, &[l.clone(), Value::Int(2)]).is_err());
        assert!(extend(&s, &[l.clone(), Value::list(vec![])]).is_err());
        assert!(remove(&s, &[l.clone(), Value::Int(1)]).is_err());
        // The underlying value is unchanged.
        assert_eq!(l.len().unwrap(), 1);
    }

    #[test]
    fn test_extend_with_self() {
        let s = scope();
        let l = Value::list(vec![Value::Int(1), Value::Int(2)]);
        extend(&s, &[l.clone(), l.clone()]).unwrap();
        assert_eq!(l.len().unwrap(), 4);
    }

    #[test]
    fn test_index_and_remove() {
        let s = scope();
        let l = Value::list(vec![Value::string("a"), Value::string("b")]);
        assert_eq!(
            index(&s, &[l.clone(), Value::string("b")]).unwrap(),
            Value::Int(1)
        );
        assert!(index(&s, &[l.clone(), Value::string("z")]).is_err());
        remove(&s, &[l.clone(), Value::string("a")]).unwrap();
        assert_eq!(l, Value::list(vec![Value::string("b")]));
        assert!(remove(&s, &[l, Value::string("a")]).is_err());
    }
}
