//! # Builtin Functions
//!
//! The standard library exposed to build files, organized by concern:
//!
//! - **[general]** — type conversions and sequence operations (`str`,
//!   `len`, `sorted`, `zip`, `map`, `reduce`, ...)
//! - **[strings]**, **[lists]**, **[dicts]**, **[config]** — the method
//!   tables bound through property access on those values
//! - **[paths]** — lexical path helpers
//! - **[json]** — canonical JSON encoding
//! - **[semver]** — semantic version checks
//! - **[logging]** — the `log` object, forwarding to the host
//! - **[exec]** — external process execution with single-flight caching
//! - **[rules]** — build integration: `build_rule`, `package`,
//!   `subinclude`, labels and callback mutation helpers
//!
//! Every builtin is declared with the `#[builtin]` attribute from
//! girder-macros, which records its script name and parameter list; each
//! module's `register` function installs its globals into the builtin
//! scope.

use crate::error::{EvalError, EvalResult};
use crate::scope::Scope;
use crate::value::{FuncDef, Value};
use std::sync::Arc;

pub mod config;
pub mod dicts;
pub mod exec;
pub mod general;
pub mod json;
pub mod lists;
pub mod logging;
pub mod paths;
pub mod rules;
pub mod semver;
pub mod strings;

/// Installs the bool singletons and every builtin function into the given
/// (root) scope.
pub fn register_builtins(scope: &Arc<Scope>) {
    scope.set_local("True", Value::Bool(true));
    scope.set_local("False", Value::Bool(false));
    scope.set_local("None", Value::None);
    general::register(scope);
    paths::register(scope);
    json::register(scope);
    semver::register(scope);
    logging::register(scope);
    exec::register(scope);
    rules::register(scope);
}

/// Installs one builtin descriptor as a global.
pub(crate) fn install(scope: &Scope, f: FuncDef) {
    let name = f.name.clone();
    scope.set_local(name, Value::Function(Arc::new(f)));
}

// ===== Argument extraction helpers for native functions =====
//
// The binding machinery enforces declared parameter types before a native
// runs; these helpers unwrap the variants and produce contextual errors for
// the cases the whitelist cannot express.

pub(crate) fn want_str<'a>(function: &str, args: &'a [Value], i: usize) -> EvalResult<&'a str> {
    args[i].as_str().ok_or_else(|| {
        EvalError::type_error(format!(
            "{function}: expected str, got {} at argument {}",
            args[i].type_name(),
            i + 1
        ))
    })
}

/// Snapshot of a list argument's elements; accepts frozen views.
pub(crate) fn want_list(function: &str, args: &[Value], i: usize) -> EvalResult<Vec<Value>> {
    match &args[i] {
        Value::List(l) | Value::FrozenList(l) => Ok(l.read().clone()),
        other => Err(EvalError::type_error(format!(
            "{function}: expected list, got {} at argument {}",
            other.type_name(),
            i + 1
        ))),
    }
}

pub(crate) fn want_function(
    function: &str,
    args: &[Value],
    i: usize,
) -> EvalResult<Arc<FuncDef>> {
    match &args[i] {
        Value::Function(f) => Ok(f.clone()),
        other => Err(EvalError::type_error(format!(
            "{function}: expected function, got {} at argument {}",
            other.type_name(),
            i + 1
        ))),
    }
}
