// ABOUTME: build_rule argument decoding and translation into graph
// mutations

use crate::error::{EvalError, EvalResult};
use crate::eval;
use crate::graph::{
    looks_like_label, BuildLabel, Command, Input, InputSet, OutputSet, Package, Target,
};
use crate::scope::Scope;
use crate::value::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Index of each `build_rule` argument slot. The builtin wrapper passes a
/// fixed positional array; this enumeration names the slots. Must stay in
/// step with the parameter spec on the `build_rule` builtin (tested).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub(crate) enum RuleArgs {
    Name,
    Cmd,
    TestCmd,
    Srcs,
    Data,
    Outs,
    Deps,
    Secrets,
    Tools,
    Labels,
    Visibility,
    Binary,
    Test,
    TestTimeout,
    BuildTimeout,
    Sandbox,
    TestSandbox,
    Size,
    Flaky,
    Tag,
    EntryPoints,
    Env,
    SystemSrcs,
    Remote,
    PreBuild,
    PostBuild,
}

/// Slot names in enumeration order, used to verify the builtin's declared
/// parameters line up with [`RuleArgs`].
pub(crate) const RULE_ARG_NAMES: [&str; 26] = [
    "name",
    "cmd",
    "test_cmd",
    "srcs",
    "data",
    "outs",
    "deps",
    "secrets",
    "tools",
    "labels",
    "visibility",
    "binary",
    "test",
    "test_timeout",
    "build_timeout",
    "sandbox",
    "test_sandbox",
    "size",
    "flaky",
    "tag",
    "entry_points",
    "env",
    "system_srcs",
    "remote",
    "pre_build",
    "post_build",
];

fn arg(args: &[Value], slot: RuleArgs) -> &Value {
    &args[slot as usize]
}

/// Synthesizes the name of a tagged rule: an underscore prefix plus
/// `#tag`, switching to `_tag` once the name already carries a hash.
pub fn tag_name(name: &str, tag: &str) -> String {
    let mut out = if name.starts_with('_') {
        name.to_owned()
    } else {
        format!("_{name}")
    };
    out.push(if out.contains('#') { '_' } else { '#' });
    out.push_str(tag);
    out
}

/// Decodes one `build_rule` invocation into a registered target. Returns
/// the target's label string.
pub(crate) fn create_target(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let pkg = s.pkg.clone().ok_or_else(|| {
        EvalError::value_error("build_rule can only be called while parsing a package")
    })?;
    let config = &s.state().config;

    let mut name = arg(args, RuleArgs::Name)
        .as_str()
        .unwrap_or_default()
        .to_owned();
    validate_name(&name)?;
    let tag = arg(args, RuleArgs::Tag).as_str().unwrap_or_default();
    if !tag.is_empty() {
        name = tag_name(&name, tag);
    }

    let label = BuildLabel {
        subrepo: pkg.subrepo.clone(),
        package: pkg.name.clone(),
        name: name.clone(),
    };
    let mut target = Target::new(label.clone());
    target.binary = arg(args, RuleArgs::Binary).is_truthy();
    target.test = arg(args, RuleArgs::Test).is_truthy();

    target.command = decode_command("cmd", arg(args, RuleArgs::Cmd))?;
    target.test_command = decode_command("test_cmd", arg(args, RuleArgs::TestCmd))?;
    if target.test_command.is_set() && !target.test {
        return Err(EvalError::value_error(format!(
            "target {label} has a test_cmd but is not a test"
        )));
    }

    // Timeouts: explicit seconds win, else a named size, else config.
    let build_timeout = arg(args, RuleArgs::BuildTimeout).as_int().unwrap_or(0);
    target.build_timeout = if build_timeout > 0 {
        Duration::from_secs(build_timeout as u64)
    } else {
        config.build_timeout
    };
    let size = match arg(args, RuleArgs::Size) {
        Value::None => None,
        v => Some(v.as_str().unwrap_or_default().to_owned()),
    };
    let test_timeout = arg(args, RuleArgs::TestTimeout).as_int().unwrap_or(0);
    target.test_timeout = if test_timeout > 0 {
        Duration::from_secs(test_timeout as u64)
    } else if let Some(size) = &size {
        *config
            .sizes
            .get(size)
            .ok_or_else(|| EvalError::value_error(format!("unknown size '{size}'")))?
    } else {
        config.test_timeout
    };
    target.flakiness = decode_flakiness(arg(args, RuleArgs::Flaky))?;
    target.size = size.clone();

    // Labels: the declared ones plus those implied by flags.
    let mut labels: BTreeSet<String> = BTreeSet::new();
    for v in decode_string_list("labels", arg(args, RuleArgs::Labels))? {
        labels.insert(v);
    }
    if target.binary {
        labels.insert("bin".to_owned());
    }
    if target.flakiness > 1 {
        labels.insert("flaky".to_owned());
    }
    if arg(args, RuleArgs::Remote).is_truthy() {
        labels.insert("remote".to_owned());
    }
    if let Some(size) = &size {
        labels.insert(size.clone());
    }

    target.sandbox = decode_sandbox(
        arg(args, RuleArgs::Sandbox),
        config.build_sandbox,
        &labels,
        &config.sandbox_excludable_labels,
        &label,
        "build",
    )?;
    target.test_sandbox = if target.test {
        decode_sandbox(
            arg(args, RuleArgs::TestSandbox),
            config.test_sandbox,
            &labels,
            &config.sandbox_excludable_labels,
            &label,
            "test",
        )?
    } else {
        false
    };

    let system_srcs = arg(args, RuleArgs::SystemSrcs).is_truthy();
    target.srcs = decode_inputs("srcs", arg(args, RuleArgs::Srcs), &pkg, system_srcs, false)?;
    target.data = decode_inputs("data", arg(args, RuleArgs::Data), &pkg, false, false)?;
    target.tools = decode_tools(arg(args, RuleArgs::Tools), &pkg)?;
    target.secrets = decode_string_list("secrets", arg(args, RuleArgs::Secrets))?;

    for dep in decode_string_list("deps", arg(args, RuleArgs::Deps))? {
        target.add_dep(BuildLabel::parse(&dep, &pkg.name, &pkg.subrepo)?);
    }
    for l in labels {
        target.add_label(l);
    }
    target.set_outs(decode_outputs("outs", arg(args, RuleArgs::Outs))?);

    target.entry_points = decode_env_map("entry_points", arg(args, RuleArgs::EntryPoints))?;
    target.env = decode_env_map("env", arg(args, RuleArgs::Env))?;

    for v in decode_string_list("visibility", arg(args, RuleArgs::Visibility))? {
        target
            .visibility
            .push(BuildLabel::parse_visibility(&v, &pkg.name)?);
    }

    attach_pre_build(&target, arg(args, RuleArgs::PreBuild))?;
    attach_post_build(&target, arg(args, RuleArgs::PostBuild))?;

    let registered = pkg.add_target(target)?;
    for out in registered.outs().iter_all() {
        pkg.register_output(out, &name)?;
    }
    Ok(Value::string(label.to_string()))
}

fn validate_name(name: &str) -> EvalResult<()> {
    if name.is_empty() {
        return Err(EvalError::value_error("rule name cannot be empty"));
    }
    if name == "all" {
        return Err(EvalError::invariant("'all' is a reserved target name"));
    }
    if name.contains('/') || name.contains(':') {
        return Err(EvalError::value_error(format!(
            "invalid character in rule name '{name}': cannot contain / or :"
        )));
    }
    Ok(())
}

fn decode_command(what: &str, v: &Value) -> EvalResult<Command> {
    match v {
        Value::None => Ok(Command::Unset),
        Value::String(cmd) => Ok(Command::Plain(cmd.to_string())),
        Value::Dict(d) | Value::FrozenDict(d) => {
            let mut by_config = std::collections::BTreeMap::new();
            for (k, cmd) in d.read().iter() {
                let cmd = cmd.as_str().ok_or_else(|| {
                    EvalError::type_error(format!(
                        "{what}: command for config '{k}' must be a string, not {}",
                        cmd.type_name()
                    ))
                })?;
                by_config.insert(k.clone(), cmd.to_owned());
            }
            Ok(Command::PerConfig(by_config))
        }
        _ => unreachable!("argument type enforced by binding"),
    }
}

fn decode_flakiness(v: &Value) -> EvalResult<i32> {
    match v {
        Value::Bool(true) => Ok(3),
        Value::Bool(false) => Ok(1),
        Value::Int(0) => Ok(1),
        Value::Int(n) if *n >= 1 => Ok(*n as i32),
        Value::Int(n) => Err(EvalError::value_error(format!(
            "flaky must be a bool or an int >= 1, was {n}"
        ))),
        _ => unreachable!("argument type enforced by binding"),
    }
}

/// Resolves a sandbox flag against the config default. Turning sandboxing
/// off when the config has it on requires one of the excludable labels.
fn decode_sandbox(
    v: &Value,
    config_default: bool,
    labels: &BTreeSet<String>,
    excludable: &[String],
    label: &BuildLabel,
    what: &str,
) -> EvalResult<bool> {
    let sandbox = match v {
        Value::None => config_default,
        Value::Bool(b) => *b,
        _ => unreachable!("argument type enforced by binding"),
    };
    if config_default && !sandbox && !excludable.iter().any(|l| labels.contains(l)) {
        return Err(EvalError::invariant(format!(
            "target {label} opts out of {what} sandboxing but carries none of the excludable labels"
        )));
    }
    Ok(sandbox)
}

fn decode_string_list(what: &str, v: &Value) -> EvalResult<Vec<String>> {
    match v {
        Value::None => Ok(Vec::new()),
        Value::List(l) | Value::FrozenList(l) => {
            let items = l.read();
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                let text = item.as_str().ok_or_else(|| {
                    EvalError::type_error(format!(
                        "{what}: entries must be strings, not {}",
                        item.type_name()
                    ))
                })?;
                out.push(text.to_owned());
            }
            Ok(out)
        }
        other => Err(EvalError::type_error(format!(
            "{what}: expected list, got {}",
            other.type_name()
        ))),
    }
}

/// Decodes a srcs/data-style argument: a list (anonymous) or a dict of
/// named groups whose values are lists.
fn decode_inputs(
    what: &str,
    v: &Value,
    pkg: &Package,
    system_allowed: bool,
    tool: bool,
) -> EvalResult<InputSet> {
    let mut set = InputSet::default();
    match v {
        Value::None => {}
        Value::List(l) | Value::FrozenList(l) => {
            for item in l.read().iter() {
                set.anonymous
                    .push(decode_input(what, item, pkg, system_allowed, tool)?);
            }
        }
        Value::Dict(d) | Value::FrozenDict(d) => {
            for (group, items) in d.read().iter() {
                let items = match items {
                    Value::List(l) | Value::FrozenList(l) => l.read().clone(),
                    other => {
                        return Err(EvalError::type_error(format!(
                            "{what}: named group '{group}' must be a list, not {}",
                            other.type_name()
                        )));
                    }
                };
                let mut decoded = Vec::with_capacity(items.len());
                for item in &items {
                    decoded.push(decode_input(what, item, pkg, system_allowed, tool)?);
                }
                set.named.insert(group.clone(), decoded);
            }
        }
        other => {
            return Err(EvalError::type_error(format!(
                "{what}: expected list or dict, got {}",
                other.type_name()
            )));
        }
    }
    Ok(set)
}

fn decode_input(
    what: &str,
    v: &Value,
    pkg: &Package,
    system_allowed: bool,
    tool: bool,
) -> EvalResult<Input> {
    let text = v.as_str().ok_or_else(|| {
        EvalError::type_error(format!(
            "{what}: entries must be strings, not {}",
            v.type_name()
        ))
    })?;
    if text.is_empty() {
        return Err(EvalError::value_error(format!("{what}: empty source path")));
    }
    if looks_like_label(text) {
        // Tools resolve against the host: a cross-compile subrepo never
        // applies to the machine running the build.
        let subrepo = if tool { "" } else { &pkg.subrepo };
        return Ok(Input::Label(BuildLabel::parse(text, &pkg.name, subrepo)?));
    }
    if text.contains("../") {
        return Err(EvalError::value_error(format!(
            "{what}: paths cannot contain '../': {text}"
        )));
    }
    if text.starts_with('/') || text.starts_with('~') {
        if !system_allowed {
            return Err(EvalError::value_error(format!(
                "{what}: absolute paths are not allowed: {text}"
            )));
        }
        return Ok(Input::SystemFile(text.to_owned()));
    }
    if tool && !text.contains('/') {
        return Ok(Input::SystemPath(text.to_owned()));
    }
    Ok(Input::File(text.to_owned()))
}

fn decode_tools(v: &Value, pkg: &Package) -> EvalResult<InputSet> {
    match v {
        Value::String(_) => {
            let mut set = InputSet::default();
            set.anonymous.push(decode_input("tools", v, pkg, false, true)?);
            Ok(set)
        }
        other => decode_inputs("tools", other, pkg, false, true),
    }
}

fn decode_outputs(what: &str, v: &Value) -> EvalResult<OutputSet> {
    let decode_one = |item: &Value| -> EvalResult<String> {
        let text = item.as_str().ok_or_else(|| {
            EvalError::type_error(format!(
                "{what}: outputs must be strings, not {}",
                item.type_name()
            ))
        })?;
        if text.is_empty() {
            return Err(EvalError::value_error(format!("{what}: empty output path")));
        }
        if text.contains("../") || text.starts_with('/') {
            return Err(EvalError::value_error(format!(
                "{what}: outputs must be relative paths within the package: {text}"
            )));
        }
        Ok(text.to_owned())
    };
    let mut outs = OutputSet::default();
    match v {
        Value::None => {}
        Value::List(l) | Value::FrozenList(l) => {
            for item in l.read().iter() {
                outs.anonymous.push(decode_one(item)?);
            }
        }
        Value::Dict(d) | Value::FrozenDict(d) => {
            for (group, items) in d.read().iter() {
                let items = match items {
                    Value::List(l) | Value::FrozenList(l) => l.read().clone(),
                    other => {
                        return Err(EvalError::type_error(format!(
                            "{what}: named group '{group}' must be a list, not {}",
                            other.type_name()
                        )));
                    }
                };
                let mut decoded = Vec::with_capacity(items.len());
                for item in &items {
                    decoded.push(decode_one(item)?);
                }
                outs.named.insert(group.clone(), decoded);
            }
        }
        other => {
            return Err(EvalError::type_error(format!(
                "{what}: expected list or dict, got {}",
                other.type_name()
            )));
        }
    }
    Ok(outs)
}

fn decode_env_map(
    what: &str,
    v: &Value,
) -> EvalResult<std::collections::BTreeMap<String, String>> {
    match v {
        Value::None => Ok(std::collections::BTreeMap::new()),
        Value::Dict(d) | Value::FrozenDict(d) => {
            let mut out = std::collections::BTreeMap::new();
            for (k, item) in d.read().iter() {
                let text = item.as_str().ok_or_else(|| {
                    EvalError::type_error(format!(
                        "{what}: value for '{k}' must be a string, not {}",
                        item.type_name()
                    ))
                })?;
                out.insert(k.clone(), text.to_owned());
            }
            Ok(out)
        }
        other => Err(EvalError::type_error(format!(
            "{what}: expected dict, got {}",
            other.type_name()
        ))),
    }
}

fn attach_pre_build(target: &Target, v: &Value) -> EvalResult<()> {
    match v {
        Value::None => Ok(()),
        Value::Function(f) => {
            if f.params.len() != 1 {
                return Err(EvalError::type_error(
                    "pre_build callbacks must take exactly one argument",
                ));
            }
            let f = f.clone();
            target.set_pre_build(Box::new(move |name: &str| {
                eval::run_callback(&f, &[Value::string(name)]).map(|_| ())
            }));
            Ok(())
        }
        _ => unreachable!("argument type enforced by binding"),
    }
}

fn attach_post_build(target: &Target, v: &Value) -> EvalResult<()> {
    match v {
        Value::None => Ok(()),
        Value::Function(f) => {
            if f.params.len() != 2 {
                return Err(EvalError::type_error(
                    "post_build callbacks must take exactly two arguments",
                ));
            }
            let f = f.clone();
            target.set_post_build(Box::new(move |name: &str, output: &[String]| {
                let lines = Value::list(output.iter().map(Value::string).collect());
                eval::run_callback(&f, &[Value::string(name), lines]).map(|_| ())
            }));
            Ok(())
        }
        _ => unreachable!("argument type enforced by binding"),
    }
}
