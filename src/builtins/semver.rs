//! Semantic version builtins: `is_semver`, `semver_check`

use super::{install, want_str};
use crate::error::{EvalError, EvalResult};
use crate::scope::Scope;
use crate::value::Value;
use girder_macros::builtin;
use semver::{Version, VersionReq};
use std::sync::Arc;

pub fn register(scope: &Arc<Scope>) {
    install(scope, is_semver_builtin());
    install(scope, semver_check_builtin());
}

#[builtin(name = "is_semver", params = "s: str")]
fn is_semver(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("is_semver", args, 0)?;
    Ok(Value::Bool(Version::parse(text).is_ok()))
}

/// Whether `version` satisfies `constraint` (e.g. ">=1.2.0, <2"). Both
/// must parse; an unparseable input is an error rather than False so typos
/// in build files surface.
#[builtin(name = "semver_check", params = "version: str, constraint: str")]
fn semver_check(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let version = want_str("semver_check", args, 0)?;
    let constraint = want_str("semver_check", args, 1)?;
    let version = Version::parse(version).map_err(|e| {
        EvalError::value_error(format!("invalid semantic version '{version}': {e}"))
    })?;
    let req = VersionReq::parse(constraint).map_err(|e| {
        EvalError::value_error(format!("invalid version constraint '{constraint}': {e}"))
    })?;
    Ok(Value::Bool(req.matches(&version)))
}
