//! Build integration builtins
//!
//! `build_rule`, `package`, `subinclude`, `tag`, `get_labels`,
//! `package_name`, `subrepo_name`, and the callback mutation helpers
//! `add_dep`/`add_out`/`add_label`.

use super::{install, want_str};
use crate::error::{EvalError, EvalResult};
use crate::graph::{BuildLabel, Target};
use crate::interpreter;
use crate::scope::Scope;
use crate::target::{create_target, tag_name};
use crate::value::Value;
use girder_macros::builtin;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Arc;

pub fn register(scope: &Arc<Scope>) {
    install(scope, build_rule_builtin());
    install(scope, package_builtin());
    install(scope, subinclude_builtin());
    install(scope, tag_builtin());
    install(scope, get_labels_builtin());
    install(scope, package_name_builtin());
    install(scope, subrepo_name_builtin());
    install(scope, add_dep_builtin());
    install(scope, add_out_builtin());
    install(scope, add_label_builtin());
}

/// Declares a build target. Generated rule wrappers call this with every
/// argument, so the parameter list is the fixed positional layout that
/// `target::RuleArgs` indexes.
#[builtin(
    name = "build_rule",
    params = "name: str, cmd: str|dict = None, test_cmd: str|dict = None, srcs: list|dict = None, data: list|dict = None, outs: list|dict = None, deps: list = None, secrets: list = None, tools: str|list|dict = None, labels: list = None, visibility: list = None, binary: bool = False, test: bool = False, test_timeout: int = 0, build_timeout: int = 0, sandbox: bool = None, test_sandbox: bool = None, size: str = None, flaky: bool|int = 0, tag: str = '', entry_points: dict = None, env: dict = None, system_srcs: bool = False, remote: bool = False, pre_build: function = None, post_build: function = None"
)]
fn build_rule(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    create_target(s, args)
}

/// Overrides configuration for the current package. Must run before any
/// target is declared so every rule in the package sees the same config.
#[builtin(name = "package", params = "**kwargs")]
fn package(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    if let Some(pkg) = &s.pkg {
        if !pkg.target_names().is_empty() {
            return Err(EvalError::value_error(
                "package() must be called before any build targets",
            ));
        }
    }
    let config = s
        .config()
        .ok_or_else(|| EvalError::name_error("CONFIG"))?;
    match &args[0] {
        Value::Dict(d) | Value::FrozenDict(d) => {
            for (k, v) in d.read().iter() {
                config.set_index(&Value::string(k), v.clone())?;
            }
        }
        _ => unreachable!("kwargs are assembled by the call protocol"),
    }
    Ok(Value::None)
}

/// Loads other build files and imports their public bindings into this
/// scope. Concurrent loads of the same file are coordinated so each file
/// is parsed at most once.
#[builtin(name = "subinclude", params = "*targets")]
fn subinclude(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    if args.is_empty() {
        return Err(EvalError::arity("subinclude", "at least 1", 0));
    }
    for (i, _) in args.iter().enumerate() {
        let target = want_str("subinclude", args, i)?;
        interpreter::subinclude(s, target)?;
    }
    Ok(Value::None)
}

#[builtin(name = "tag", params = "name: str, tag: str")]
fn tag(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::string(tag_name(
        want_str("tag", args, 0)?,
        want_str("tag", args, 1)?,
    )))
}

/// Collects labels with a prefix from a target and (optionally) its
/// dependencies, prefix-stripped and sorted. `maxdepth` bounds the
/// traversal in hops: 0 is the target only, -1 leaves the bound to
/// `transitive`.
#[builtin(
    name = "get_labels",
    params = "target: str, prefix: str, transitive: bool = False, maxdepth: int = -1"
)]
fn get_labels(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let target = want_str("get_labels", args, 0)?;
    let prefix = want_str("get_labels", args, 1)?;
    let transitive = args[2].is_truthy();
    let maxdepth = args[3].as_int().unwrap_or(-1);

    // An explicit non-negative maxdepth wins; otherwise transitive decides
    // between unbounded and target-only.
    let depth_limit = if maxdepth >= 0 {
        maxdepth
    } else if transitive {
        i64::MAX
    } else {
        0
    };

    let (pkg_name, pkg_subrepo) = match &s.pkg {
        Some(p) => (p.name.clone(), p.subrepo.clone()),
        None => (String::new(), String::new()),
    };
    let label = BuildLabel::parse(target, &pkg_name, &pkg_subrepo)?;
    let root = s.state().graph.target(&label).ok_or_else(|| {
        EvalError::value_error(format!("unknown target: {label}"))
    })?;

    let mut found: BTreeSet<String> = BTreeSet::new();
    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut queue: VecDeque<(Arc<Target>, i64)> = VecDeque::new();
    visited.insert(root.label.to_string());
    queue.push_back((root, 0));
    while let Some((t, depth)) = queue.pop_front() {
        for l in t.labels() {
            if let Some(stripped) = l.strip_prefix(prefix) {
                found.insert(stripped.to_owned());
            }
        }
        if depth >= depth_limit {
            continue;
        }
        for dep in t.deps() {
            if !visited.insert(dep.to_string()) {
                continue;
            }
            // Dependencies from other packages may not be parsed yet; the
            // traversal covers what the graph knows.
            if let Some(dep_target) = s.state().graph.target(&dep) {
                queue.push_back((dep_target, depth + 1));
            }
        }
    }
    Ok(Value::list(found.into_iter().map(Value::string).collect()))
}

/// The current package's name, or the package of a given label.
#[builtin(name = "package_name", params = "label: str = None")]
fn package_name(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    match &args[0] {
        Value::None => match &s.pkg {
            Some(pkg) => Ok(Value::string(&pkg.name)),
            None => Err(EvalError::value_error(
                "package_name() called outside a package",
            )),
        },
        v => {
            let text = v.as_str().unwrap_or_default();
            let (pkg_name, pkg_subrepo) = match &s.pkg {
                Some(p) => (p.name.clone(), p.subrepo.clone()),
                None => (String::new(), String::new()),
            };
            let label = BuildLabel::parse(text, &pkg_name, &pkg_subrepo)?;
            Ok(Value::string(label.package))
        }
    }
}

#[builtin(name = "subrepo_name", params = "")]
fn subrepo_name(s: &Arc<Scope>, _args: &[Value]) -> EvalResult<Value> {
    match &s.pkg {
        Some(pkg) => Ok(Value::string(&pkg.subrepo)),
        None => Ok(Value::string("")),
    }
}

/// Looks up a target for the callback mutation helpers; only valid inside
/// a pre/post-build callback.
fn callback_target(s: &Arc<Scope>, function: &str, label: &str) -> EvalResult<Arc<Target>> {
    if !s.callback {
        return Err(EvalError::invariant(format!(
            "{function} can only be called from a pre- or post-build callback"
        )));
    }
    let (pkg_name, pkg_subrepo) = match &s.pkg {
        Some(p) => (p.name.clone(), p.subrepo.clone()),
        None => (String::new(), String::new()),
    };
    let parsed = BuildLabel::parse(label, &pkg_name, &pkg_subrepo)?;
    s.state()
        .graph
        .target(&parsed)
        .ok_or_else(|| EvalError::value_error(format!("unknown target: {parsed}")))
}

#[builtin(name = "add_dep", params = "target: str, dep: str")]
fn add_dep(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let target = callback_target(s, "add_dep", want_str("add_dep", args, 0)?)?;
    let (pkg_name, pkg_subrepo) = match &s.pkg {
        Some(p) => (p.name.clone(), p.subrepo.clone()),
        None => (String::new(), String::new()),
    };
    let dep = BuildLabel::parse(want_str("add_dep", args, 1)?, &pkg_name, &pkg_subrepo)?;
    target.add_dep(dep);
    Ok(Value::None)
}

/// Adds an output to a target. With two arguments the output is anonymous;
/// with three it joins the named group `name`.
#[builtin(name = "add_out", params = "target: str, name: str, out: str = ''")]
fn add_out(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let target = callback_target(s, "add_out", want_str("add_out", args, 0)?)?;
    let name = want_str("add_out", args, 1)?;
    let out = want_str("add_out", args, 2)?;
    if out.is_empty() {
        target.add_out(name);
    } else {
        target.add_named_out(name, out);
    }
    if let Some(pkg) = &s.pkg {
        let out_path = if out.is_empty() { name } else { out };
        pkg.register_output(out_path, &target.label.name)?;
    }
    Ok(Value::None)
}

#[builtin(name = "add_label", params = "target: str, label: str")]
fn add_label(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let target = callback_target(s, "add_label", want_str("add_label", args, 0)?)?;
    target.add_label(want_str("add_label", args, 1)?);
    Ok(Value::None)
}
