//! The `log` object exposed to build files
//!
//! `log.info` and friends format printf-style and forward to the `log`
//! facade. A host can install a sink to capture messages instead, which
//! the orchestrator uses to attribute output to the file being parsed.

use crate::error::{EvalError, EvalResult};
use crate::ops::interpolate;
use crate::scope::Scope;
use crate::value::Value;
use girder_macros::builtin;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

type LogSink = Box<dyn Fn(log::Level, &str) + Send + Sync>;

static SINK: Lazy<RwLock<Option<LogSink>>> = Lazy::new(|| RwLock::new(None));

/// Redirects the `log.*` builtins into `sink` instead of the log facade.
pub fn set_log_sink(sink: impl Fn(log::Level, &str) + Send + Sync + 'static) {
    *SINK.write() = Some(Box::new(sink));
}

/// Restores forwarding to the log facade.
pub fn clear_log_sink() {
    *SINK.write() = None;
}

fn emit(level: log::Level, args: &[Value]) -> EvalResult<Value> {
    let fmt = args[0]
        .as_str()
        .ok_or_else(|| {
            EvalError::type_error(format!(
                "log message must be a string, not {}",
                args[0].type_name()
            ))
        })?;
    let message = interpolate(fmt, &args[1..])?;
    match SINK.read().as_ref() {
        Some(sink) => sink(level, &message),
        None => log::log!(level, "{message}"),
    }
    Ok(Value::None)
}

pub fn register(scope: &Arc<Scope>) {
    let mut methods = HashMap::new();
    for f in [
        debug_builtin(),
        info_builtin(),
        warning_builtin(),
        error_builtin(),
        fatal_builtin(),
    ] {
        methods.insert(f.name.clone(), Value::Function(Arc::new(f)));
    }
    scope.set_local("log", Value::dict(methods).freeze());
}

#[builtin(name = "debug", params = "msg: str, *args")]
fn debug(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    emit(log::Level::Debug, args)
}

#[builtin(name = "info", params = "msg: str, *args")]
fn info(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    emit(log::Level::Info, args)
}

#[builtin(name = "warning", params = "msg: str, *args")]
fn warning(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    emit(log::Level::Warn, args)
}

#[builtin(name = "error", params = "msg: str, *args")]
fn error(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    emit(log::Level::Error, args)
}

/// Logs at error level and aborts the current evaluation. The interpreter
/// is a library, so "fatal" surfaces as an error to the host rather than
/// exiting the process.
#[builtin(name = "fatal", params = "msg: str, *args")]
fn fatal(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let fmt = args[0].as_str().unwrap_or_default();
    let message = interpolate(fmt, &args[1..])?;
    match SINK.read().as_ref() {
        Some(sink) => sink(log::Level::Error, &message),
        None => log::error!("{message}"),
    }
    Err(EvalError::user(format!("fatal: {message}")))
}
