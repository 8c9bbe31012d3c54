//! JSON encoding of interpreter values
//!
//! `json(value, indent=None)` emits a canonical encoding: object keys are
//! sorted, compact output carries no whitespace, and `indent` switches to
//! pretty printing with that many spaces per level.

use super::install;
use crate::error::{EvalError, EvalResult};
use crate::scope::Scope;
use crate::value::Value;
use girder_macros::builtin;
use serde::Serialize;
use std::sync::Arc;

pub fn register(scope: &Arc<Scope>) {
    install(scope, json_builtin());
}

#[builtin(name = "json", params = "value, indent: int = None")]
fn json(_s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let encoded = match &args[1] {
        Value::None => serde_json::to_string(&args[0]),
        Value::Int(n) if *n >= 0 => {
            let indent = " ".repeat(*n as usize);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut out = Vec::new();
            let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
            args[0]
                .serialize(&mut serializer)
                .map(|()| String::from_utf8(out).expect("serde_json emits UTF-8"))
        }
        Value::Int(n) => {
            return Err(EvalError::value_error(format!(
                "json() indent must be non-negative, was {n}"
            )));
        }
        _ => unreachable!("argument type enforced by binding"),
    };
    encoded
        .map(Value::string)
        .map_err(|e| EvalError::type_error(format!("json(): {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::interpreter::State;
    use std::collections::HashMap;

    fn scope() -> Arc<Scope> {
        let root = Scope::builtin_root(State::for_testing(BuildConfig::default()));
        super::super::register_builtins(&root);
        root.child()
    }

    #[test]
    fn test_compact_output_sorts_keys() {
        let s = scope();
        let mut m = HashMap::new();
        m.insert("b".to_owned(), Value::Int(2));
        m.insert("a".to_owned(), Value::list(vec![Value::Int(1), Value::None]));
        let v = json(&s, &[Value::dict(m), Value::None]).unwrap();
        assert_eq!(v, Value::string(r#"{"a":[1,null],"b":2}"#));
    }

    #[test]
    fn test_scalars() {
        let s = scope();
        assert_eq!(
            json(&s, &[Value::string("hi"), Value::None]).unwrap(),
            Value::string("\"hi\"")
        );
        assert_eq!(
            json(&s, &[Value::Bool(true), Value::None]).unwrap(),
            Value::string("true")
        );
        assert_eq!(
            json(&s, &[Value::None, Value::None]).unwrap(),
            Value::string("null")
        );
    }

    #[test]
    fn test_indented_output() {
        let s = scope();
        let mut m = HashMap::new();
        m.insert("a".to_owned(), Value::Int(1));
        let v = json(&s, &[Value::dict(m), Value::Int(2)]).unwrap();
        assert_eq!(v, Value::string("{\n  \"a\": 1\n}"));
    }

    #[test]
    fn test_functions_are_not_serializable() {
        let s = scope();
        let f = s.lookup("len").unwrap();
        assert!(json(&s, &[f, Value::None]).is_err());
    }
}
