//! Lexical path helpers: `join_path`, `split_path`, `splitext`,
//! `basename`, `dirname`
//!
//! Pure string manipulation; nothing here touches the filesystem.

use super::{install, want_str};
use crate::error::EvalResult;
use crate::scope::Scope;
use crate::value::Value;
use girder_macros::builtin;
use std::sync::Arc;

pub fn register(scope: &Arc<Scope>) {
    install(scope, join_path_builtin());
    install(scope, split_path_builtin());
    install(scope, splitext_builtin());
    install(scope, basename_builtin());
    install(scope, dirname_builtin());
}

/// Lexically cleans a slash-separated path: collapses `//` and `.`,
/// resolves `..` against earlier components, preserves a leading `/`.
fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_owned(),
        (false, false) => joined,
    }
}

#[builtin(name = "join_path", params = "*paths")]
fn join_path(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let mut parts = Vec::with_capacity(args.len());
    for i in 0..args.len() {
        let p = want_str("join_path", args, i)?;
        if !p.is_empty() {
            parts.push(p);
        }
    }
    if parts.is_empty() {
        return Ok(Value::string(""));
    }
    Ok(Value::string(clean_path(&parts.join("/"))))
}

#[builtin(name = "split_path", params = "path: str")]
fn split_path(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let path = want_str("split_path", args, 0)?;
    let (dir, file) = match path.rsplit_once('/') {
        Some(("", file)) => ("/", file),
        Some((dir, file)) => (dir, file),
        None => ("", path),
    };
    Ok(Value::list(vec![Value::string(dir), Value::string(file)]))
}

#[builtin(name = "splitext", params = "path: str")]
fn splitext(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let path = want_str("splitext", args, 0)?;
    let base_start = path.rfind('/').map_or(0, |i| i + 1);
    let base = &path[base_start..];
    // A leading dot marks a hidden file, not an extension.
    let ext_at = base.rfind('.').filter(|&i| i > 0);
    let (root, ext) = match ext_at {
        Some(i) => path.split_at(base_start + i),
        None => (path, ""),
    };
    Ok(Value::list(vec![Value::string(root), Value::string(ext)]))
}

#[builtin(name = "basename", params = "path: str")]
fn basename(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let path = want_str("basename", args, 0)?;
    Ok(Value::string(
        path.rsplit('/').next().unwrap_or(path),
    ))
}

#[builtin(name = "dirname", params = "path: str")]
fn dirname(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let path = want_str("dirname", args, 0)?;
    let dir = match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((dir, _)) => dir,
        None => "",
    };
    Ok(Value::string(dir))
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
    fn test_join_path_cleans() {
        let s = scope();
        let v = join_path(&s, &[Value::string("a"), Value::string("b/c")]).unwrap();
        assert_eq!(v, Value::string("a/b/c"));

        let v = join_path(&s, &[Value::string("a//b"), Value::string("./c")]).unwrap();
        assert_eq!(v, Value::string("a/b/c"));

        let v = join_path(&s, &[Value::string("a/b"), Value::string("../c")]).unwrap();
        assert_eq!(v, Value::string("a/c"));

        let v = join_path(&s, &[Value::string(""), Value::string("x")]).unwrap();
        assert_eq!(v, Value::string("x"));

        let v = join_path(&s, &[]).unwrap();
        assert_eq!(v, Value::string(""));
    }

    #[test]
    fn test_split_path_forms() {
        let s = scope();
        assert_eq!(
            split_path(&s, &[Value::string("a/b/c.txt")]).unwrap(),
            Value::list(vec![Value::string("a/b"), Value::string("c.txt")])
        );
        assert_eq!(
            split_path(&s, &[Value::string("c.txt")]).unwrap(),
            Value::list(vec![Value::string(""), Value::string("c.txt")])
        );
        assert_eq!(
            split_path(&s, &[Value::string("/c")]).unwrap(),
            Value::list(vec![Value::string("/"), Value::string("c")])
        );
    }

    #[test]
    fn test_splitext() {
        let s = scope();
        assert_eq!(
            splitext(&s, &[Value::string("a/b.tar.gz")]).unwrap(),
            Value::list(vec![Value::string("a/b.tar"), Value::string(".gz")])
        );
        assert_eq!(
            splitext(&s, &[Value::string("a/.hidden")]).unwrap(),
            Value::list(vec![Value::string("a/.hidden"), Value::string("")])
        );
        assert_eq!(
            splitext(&s, &[Value::string("noext")]).unwrap(),
            Value::list(vec![Value::string("noext"), Value::string("")])
        );
    }

    #[test]
    fn test_basename_dirname() {
        let s = scope();
        assert_eq!(
            basename(&s, &[Value::string("a/b/c.txt")]).unwrap(),
            Value::string("c.txt")
        );
        assert_eq!(
            dirname(&s, &[Value::string("a/b/c.txt")]).unwrap(),
            Value::string("a/b")
        );
        assert_eq!(dirname(&s, &[Value::string("c.txt")]).unwrap(), Value::string(""));
    }
}
