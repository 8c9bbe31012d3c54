//! String methods
//!
//! The method table bound through property access on string values:
//! `format`, `join`, `split`, `replace`, `startswith`, `endswith`,
//! `strip`/`lstrip`/`rstrip`, `lower`/`upper`, `find`, `count`,
//! `partition`, `rpartition`, `removeprefix`, `removesuffix`,
//! `splitlines`.

use super::{want_list, want_str};
use crate::error::{EvalError, EvalResult};
use crate::scope::Scope;
use crate::value::{FuncDef, Value};
use girder_macros::builtin;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

static METHODS: Lazy<HashMap<String, Arc<FuncDef>>> = Lazy::new(|| {
    [
        format_(),
        join_builtin(),
        split_builtin(),
        replace_builtin(),
        startswith_builtin(),
        endswith_builtin(),
        strip_builtin(),
        lstrip_builtin(),
        rstrip_builtin(),
        lower_builtin(),
        upper_builtin(),
        find_builtin(),
        count_builtin(),
        partition_builtin(),
        rpartition_builtin(),
        removeprefix_builtin(),
        removesuffix_builtin(),
        splitlines_builtin(),
    ]
    .into_iter()
    .map(|f| (f.name.clone(), Arc::new(f)))
    .collect()
});

/// Looks up a string method for binding.
pub(crate) fn method(name: &str) -> Option<Arc<FuncDef>> {
    METHODS.get(name).cloned()
}

// `format` takes arbitrary keywords, which the #[builtin] spec cannot
// declare alongside a receiver, so its descriptor is built by hand.
fn format_() -> FuncDef {
    FuncDef::native("format", format_impl).arg("self", &["str"], None).with_kwargs()
}

/// Curly-brace named substitution. Holes are `{name}`; names resolve from
/// the call's keyword arguments first, then the calling scope's locals.
/// Anything that is not a well-formed hole passes through literally.
fn format_impl(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("format", args, 0)?;
    let kwargs = &args[1];
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_identifier(&after[..close]) => {
                let name = &after[..close];
                let v = match kwargs.index(&Value::string(name)) {
                    Ok(v) => v,
                    Err(_) => s.lookup(name).map_err(|_| {
                        EvalError::name_error(name)
                    })?,
                };
                out.push_str(&v.to_string());
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(Value::string(out))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[builtin(name = "join", params = "self: str, seq: list")]
fn join(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let sep = want_str("join", args, 0)?;
    let items = want_list("join", args, 1)?;
    let mut parts = Vec::with_capacity(items.len());
    for item in &items {
        let text = item.as_str().ok_or_else(|| {
            EvalError::type_error(format!(
                "sequence item for join must be str, not {}",
                item.type_name()
            ))
        })?;
        parts.push(text.to_owned());
    }
    Ok(Value::string(parts.join(sep)))
}

#[builtin(name = "split", params = "self: str, on: str = None")]
fn split(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("split", args, 0)?;
    let parts: Vec<Value> = match &args[1] {
        Value::None => text.split_whitespace().map(Value::string).collect(),
        Value::String(sep) if sep.is_empty() => {
            return Err(EvalError::value_error("empty separator"));
        }
        Value::String(sep) => text.split(sep.as_ref()).map(Value::string).collect(),
        _ => unreachable!("argument type enforced by binding"),
    };
    Ok(Value::list(parts))
}

#[builtin(name = "replace", params = "self: str, old: str, new: str")]
fn replace(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("replace", args, 0)?;
    let old = want_str("replace", args, 1)?;
    let new = want_str("replace", args, 2)?;
    Ok(Value::string(text.replace(old, new)))
}

#[builtin(name = "startswith", params = "self: str, prefix: str")]
fn startswith(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(
        want_str("startswith", args, 0)?.starts_with(want_str("startswith", args, 1)?),
    ))
}

#[builtin(name = "endswith", params = "self: str, suffix: str")]
fn endswith(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(
        want_str("endswith", args, 0)?.ends_with(want_str("endswith", args, 1)?),
    ))
}

fn strip_chars(args: &[Value]) -> EvalResult<Option<Vec<char>>> {
    match &args[1] {
        Value::None => Ok(None),
        Value::String(chars) => Ok(Some(chars.chars().collect())),
        _ => unreachable!("argument type enforced by binding"),
    }
}

#[builtin(name = "strip", params = "self: str, chars: str = None")]
fn strip(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("strip", args, 0)?;
    Ok(Value::string(match strip_chars(args)? {
        None => text.trim(),
        Some(set) => text.trim_matches(|c| set.contains(&c)),
    }))
}

#[builtin(name = "lstrip", params = "self: str, chars: str = None")]
fn lstrip(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("lstrip", args, 0)?;
    Ok(Value::string(match strip_chars(args)? {
        None => text.trim_start(),
        Some(set) => text.trim_start_matches(|c| set.contains(&c)),
    }))
}

#[builtin(name = "rstrip", params = "self: str, chars: str = None")]
fn rstrip(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("rstrip", args, 0)?;
    Ok(Value::string(match strip_chars(args)? {
        None => text.trim_end(),
        Some(set) => text.trim_end_matches(|c| set.contains(&c)),
    }))
}

#[builtin(name = "lower", params = "self: str")]
fn lower(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::string(want_str("lower", args, 0)?.to_lowercase()))
}

#[builtin(name = "upper", params = "self: str")]
fn upper(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::string(want_str("upper", args, 0)?.to_uppercase()))
}

/// Returns the character index of the first occurrence, or -1.
#[builtin(name = "find", params = "self: str, needle: str")]
fn find(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("find", args, 0)?;
    let needle = want_str("find", args, 1)?;
    match text.find(needle) {
        Some(byte_idx) => Ok(Value::Int(text[..byte_idx].chars().count() as i64)),
        None => Ok(Value::Int(-1)),
    }
}

#[builtin(name = "count", params = "self: str, needle: str")]
fn count(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("count", args, 0)?;
    let needle = want_str("count", args, 1)?;
    if needle.is_empty() {
        return Ok(Value::Int(text.chars().count() as i64 + 1));
    }
    Ok(Value::Int(text.matches(needle).count() as i64))
}

#[builtin(name = "partition", params = "self: str, sep: str")]
fn partition(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("partition", args, 0)?;
    let sep = want_str("partition", args, 1)?;
    Ok(match text.split_once(sep) {
        Some((before, after)) => Value::list(vec![
            Value::string(before),
            Value::string(sep),
            Value::string(after),
        ]),
        None => Value::list(vec![
            Value::string(text),
            Value::string(""),
            Value::string(""),
        ]),
    })
}

#[builtin(name = "rpartition", params = "self: str, sep: str")]
fn rpartition(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("rpartition", args, 0)?;
    let sep = want_str("rpartition", args, 1)?;
    Ok(match text.rsplit_once(sep) {
        Some((before, after)) => Value::list(vec![
            Value::string(before),
            Value::string(sep),
            Value::string(after),
        ]),
        None => Value::list(vec![
            Value::string(""),
            Value::string(""),
            Value::string(text),
        ]),
    })
}

#[builtin(name = "removeprefix", params = "self: str, prefix: str")]
fn removeprefix(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("removeprefix", args, 0)?;
    let prefix = want_str("removeprefix", args, 1)?;
    Ok(Value::string(text.strip_prefix(prefix).unwrap_or(text)))
}

#[builtin(name = "removesuffix", params = "self: str, suffix: str")]
fn removesuffix(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("removesuffix", args, 0)?;
    let suffix = want_str("removesuffix", args, 1)?;
    Ok(Value::string(text.strip_suffix(suffix).unwrap_or(text)))
}

#[builtin(name = "splitlines", params = "self: str")]
fn splitlines(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let text = want_str("splitlines", args, 0)?;
    Ok(Value::list(text.lines().map(Value::string).collect()))
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
    fn test_method_table_contains_all() {
        for name in [
            "format",
            "join",
            "split",
            "replace",
            "startswith",
            "endswith",
            "strip",
            "lstrip",
            "rstrip",
            "lower",
            "upper",
            "find",
            "count",
            "partition",
            "rpartition",
            "removeprefix",
            "removesuffix",
            "splitlines",
        ] {
            assert!(method(name).is_some(), "missing string method {name}");
        }
        assert!(method("nope").is_none());
    }

    #[test]
    fn test_split_default_whitespace() {
        let s = scope();
        let v = split(&s, &[Value::string("a  b\tc"), Value::None]).unwrap();
        assert_eq!(
            v,
            Value::list(vec![
                Value::string("a"),
                Value::string("b"),
                Value::string("c"),
            ])
        );
        let v = split(&s, &[Value::string("a,b"), Value::string(",")]).unwrap();
        assert_eq!(v, Value::list(vec![Value::string("a"), Value::string("b")]));
        assert!(split(&s, &[Value::string("a"), Value::string("")]).is_err());
    }

    #[test]
    fn test_join_requires_strings() {
        let s = scope();
        let items = Value::list(vec![Value::string("a"), Value::string("b")]);
        assert_eq!(
            join(&s, &[Value::string(","), items]).unwrap(),
            Value::string("a,b")
        );
        let bad = Value::list(vec![Value::Int(1)]);
        assert!(join(&s, &[Value::string(","), bad]).is_err());
    }

    #[test]
    fn test_partition_variants() {
        let s = scope();
        let v = partition(&s, &[Value::string("a=b=c"), Value::string("=")]).unwrap();
        assert_eq!(
            v,
            Value::list(vec![
                Value::string("a"),
                Value::string("="),
                Value::string("b=c"),
            ])
        );
        let v = rpartition(&s, &[Value::string("a=b=c"), Value::string("=")]).unwrap();
        assert_eq!(
            v,
            Value::list(vec![
                Value::string("a=b"),
                Value::string("="),
                Value::string("c"),
            ])
        );
        let v = rpartition(&s, &[Value::string("abc"), Value::string("=")]).unwrap();
        assert_eq!(
            v,
            Value::list(vec![
                Value::string(""),
                Value::string(""),
                Value::string("abc"),
            ])
        );
    }

    #[test]
    fn test_find_counts_characters() {
        let s = scope();
        assert_eq!(
            find(&s, &[Value::string("héllo"), Value::string("llo")]).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            find(&s, &[Value::string("abc"), Value::string("z")]).unwrap(),
            Value::Int(-1)
        );
    }

    #[test]
    fn test_format_kwargs_then_locals() {
        let s = scope();
        s.set_local("pkg", Value::string("lib"));
        let mut kwargs = std::collections::HashMap::new();
        kwargs.insert("name".to_owned(), Value::string("x"));
        let v = format_impl(
            &s,
            &[Value::string("//{pkg}:{name} {not a hole}"), Value::dict(kwargs)],
        )
        .unwrap();
        assert_eq!(v, Value::string("//lib:x {not a hole}"));

        let err = format_impl(&s, &[Value::string("{missing}"), Value::dict(Default::default())]);
        assert!(err.is_err());
    }

    #[test]
    fn test_strip_with_char_set() {
        let s = scope();
        assert_eq!(
            strip(&s, &[Value::string("xxhixx"), Value::string("x")]).unwrap(),
            Value::string("hi")
        );
        assert_eq!(
            strip(&s, &[Value::string("  hi  "), Value::None]).unwrap(),
            Value::string("hi")
        );
    }
}
