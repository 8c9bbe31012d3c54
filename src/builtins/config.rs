//! Config methods: `get`, `setdefault`
//!
//! Bound through property access on the CONFIG object, after the overlay
//! and base mappings are consulted.

use super::want_str;
use crate::error::{EvalError, EvalResult};
use crate::scope::Scope;
use crate::value::{ConfigValue, FuncDef, Value};
use girder_macros::builtin;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

static METHODS: Lazy<HashMap<String, Arc<FuncDef>>> = Lazy::new(|| {
    [get_builtin(), setdefault_builtin()]
        .into_iter()
        .map(|f| (f.name.clone(), Arc::new(f)))
        .collect()
});

/// Looks up a config method for binding.
pub(crate) fn method(name: &str) -> Option<Arc<FuncDef>> {
    METHODS.get(name).cloned()
}

fn receiver(v: &Value) -> EvalResult<Arc<ConfigValue>> {
    match v {
        Value::Config(c) => Ok(c.clone()),
        other => Err(EvalError::type_error(format!(
            "expected config, got {}",
            other.type_name()
        ))),
    }
}

#[builtin(name = "get", params = "self: config, key: str, default = None")]
fn get(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let cfg = receiver(&args[0])?;
    let key = want_str("get", args, 1)?;
    Ok(cfg.get(key).unwrap_or_else(|| args[2].clone()))
}

#[builtin(name = "setdefault", params = "self: config, key: str, default = None")]
fn setdefault(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let cfg = receiver(&args[0])?;
    let key = want_str("setdefault", args, 1)?;
    if let Some(v) = cfg.get(key) {
        return Ok(v);
    }
    cfg.set(key.to_owned(), args[2].clone());
    Ok(args[2].clone())
}
