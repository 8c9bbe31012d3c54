// ABOUTME: Value types representing the build language's runtime objects

use crate::ast::{Expression, Statement};
use crate::builtins;
use crate::error::{EvalError, EvalResult};
use crate::scope::Scope;
use parking_lot::RwLock;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A runtime value. Values are cheap handles: collections and functions are
/// `Arc`-shared, so cloning never copies payloads. Frozen variants share the
/// allocation of the value they froze; mutation through them is refused but
/// holders of the original may still write (a soft freeze).
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    String(Arc<str>),
    List(Arc<RwLock<Vec<Value>>>),
    FrozenList(Arc<RwLock<Vec<Value>>>),
    Dict(Arc<RwLock<HashMap<String, Value>>>),
    FrozenDict(Arc<RwLock<HashMap<String, Value>>>),
    Config(Arc<ConfigValue>),
    Function(Arc<FuncDef>),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn dict(items: HashMap<String, Value>) -> Value {
        Value::Dict(Arc::new(RwLock::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::String(_) => "str",
            Value::List(_) | Value::FrozenList(_) => "list",
            Value::Dict(_) | Value::FrozenDict(_) => "dict",
            Value::Config(_) => "config",
            Value::Function(_) => "function",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) | Value::FrozenList(l) => !l.read().is_empty(),
            Value::Dict(d) | Value::FrozenDict(d) => !d.read().is_empty(),
            Value::Config(_) | Value::Function(_) => true,
        }
    }

    pub fn len(&self) -> EvalResult<usize> {
        match self {
            Value::String(s) => Ok(s.chars().count()),
            Value::List(l) | Value::FrozenList(l) => Ok(l.read().len()),
            Value::Dict(d) | Value::FrozenDict(d) => Ok(d.read().len()),
            _ => Err(EvalError::type_error(format!(
                "object of type '{}' has no len()",
                self.type_name()
            ))),
        }
    }

    /// Snapshot of the elements for iteration. Dicts iterate their keys in
    /// sorted order so evaluation is deterministic. Snapshotting means loop
    /// bodies may freely mutate the sequence they iterate.
    pub fn iterate(&self) -> EvalResult<Vec<Value>> {
        match self {
            Value::List(l) | Value::FrozenList(l) => Ok(l.read().clone()),
            Value::Dict(d) | Value::FrozenDict(d) => {
                let d = d.read();
                let mut keys: Vec<&String> = d.keys().collect();
                keys.sort();
                Ok(keys.into_iter().map(Value::string).collect())
            }
            _ => Err(EvalError::type_error(format!(
                "'{}' object is not iterable",
                self.type_name()
            ))),
        }
    }

    /// Property lookup (`x.name`). Dispatch depends on the variant: strings,
    /// lists and dicts consult their method tables; dicts check their own
    /// keys first so config-style access works; config checks overlay, base,
    /// then its methods.
    pub fn property(&self, name: &str) -> EvalResult<Value> {
        match self {
            Value::String(_) => builtins::strings::method(name)
                .map(|f| Value::Function(f.bind(self.clone())))
                .ok_or_else(|| property_error(self, name)),
            Value::List(_) | Value::FrozenList(_) => builtins::lists::method(name)
                .map(|f| Value::Function(f.bind(self.clone())))
                .ok_or_else(|| property_error(self, name)),
            Value::Dict(d) | Value::FrozenDict(d) => {
                if let Some(v) = d.read().get(name) {
                    return Ok(v.clone());
                }
                builtins::dicts::method(name)
                    .map(|f| Value::Function(f.bind(self.clone())))
                    .ok_or_else(|| property_error(self, name))
            }
            Value::Config(c) => {
                if let Some(v) = c.get(name) {
                    return Ok(v);
                }
                builtins::config::method(name)
                    .map(|f| Value::Function(f.bind(self.clone())))
                    .ok_or_else(|| {
                        EvalError::name_error(format!("CONFIG.{name}"))
                    })
            }
            _ => Err(property_error(self, name)),
        }
    }

    /// Subscript read (`x[k]`).
    pub fn index(&self, key: &Value) -> EvalResult<Value> {
        match self {
            Value::String(s) => {
                let i = want_index(key, s.chars().count())?;
                Ok(Value::string(
                    s.chars().nth(i).map(String::from).unwrap_or_default(),
                ))
            }
            Value::List(l) | Value::FrozenList(l) => {
                let l = l.read();
                let i = want_index(key, l.len())?;
                Ok(l[i].clone())
            }
            Value::Dict(d) | Value::FrozenDict(d) => {
                let k = want_string_key(key)?;
                d.read().get(k.as_ref()).cloned().ok_or_else(|| {
                    EvalError::value_error(format!("'{k}' is not in the dict"))
                })
            }
            Value::Config(c) => {
                let k = want_string_key(key)?;
                c.get(&k).ok_or_else(|| {
                    EvalError::value_error(format!("'{k}' is not set in the config"))
                })
            }
            _ => Err(EvalError::type_error(format!(
                "'{}' object is not subscriptable",
                self.type_name()
            ))),
        }
    }

    /// Subscript write (`x[k] = v`).
    pub fn set_index(&self, key: &Value, value: Value) -> EvalResult<()> {
        match self {
            Value::List(l) => {
                let mut l = l.write();
                let i = want_index(key, l.len())?;
                l[i] = value;
                Ok(())
            }
            Value::Dict(d) => {
                let k = want_string_key(key)?;
                d.write().insert(k.into_owned(), value);
                Ok(())
            }
            Value::Config(c) => {
                let k = want_string_key(key)?;
                c.set(k.into_owned(), value);
                Ok(())
            }
            Value::FrozenList(_) => Err(EvalError::invariant("list is immutable")),
            Value::FrozenDict(_) => Err(EvalError::invariant("dict is immutable")),
            _ => Err(EvalError::type_error(format!(
                "'{}' object does not support item assignment",
                self.type_name()
            ))),
        }
    }

    /// Returns a frozen view of this value; scalars freeze to themselves.
    /// The freeze is shallow and soft: the underlying storage is shared.
    pub fn freeze(&self) -> Value {
        match self {
            Value::List(l) => Value::FrozenList(l.clone()),
            Value::Dict(d) => Value::FrozenDict(d.clone()),
            other => other.clone(),
        }
    }

    /// Identity comparison for `is`. The singletons compare by variant,
    /// collections by allocation, and scalars by value.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a) | Value::FrozenList(a), Value::List(b) | Value::FrozenList(b)) => {
                Arc::ptr_eq(a, b)
            }
            (Value::Dict(a) | Value::FrozenDict(a), Value::Dict(b) | Value::FrozenDict(b)) => {
                Arc::ptr_eq(a, b)
            }
            (Value::Config(a), Value::Config(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering for `<` and friends; defined for ints, strings, and lists
    /// (lexicographic, recursively).
    pub fn compare(&self, other: &Value) -> EvalResult<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (Value::List(a) | Value::FrozenList(a), Value::List(b) | Value::FrozenList(b)) => {
                let (a, b) = (a.read().clone(), b.read().clone());
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        ord => return Ok(ord),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(EvalError::type_error(format!(
                "'{}' is not comparable with '{}'",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// The quoted form used inside collections and error messages.
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            other => other.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

fn property_error(v: &Value, name: &str) -> EvalError {
    EvalError::type_error(format!(
        "'{}' object has no property '{}'",
        v.type_name(),
        name
    ))
}

/// Normalizes a subscript to a checked index into a sequence of `len`.
fn want_index(key: &Value, len: usize) -> EvalResult<usize> {
    let i = key.as_int().ok_or_else(|| {
        EvalError::type_error(format!(
            "indices must be integers, not {}",
            key.type_name()
        ))
    })?;
    let adjusted = if i < 0 { i + len as i64 } else { i };
    if adjusted < 0 || adjusted >= len as i64 {
        return Err(EvalError::type_error(format!(
            "index {i} is out of range (length {len})"
        )));
    }
    Ok(adjusted as usize)
}

fn want_string_key(key: &Value) -> EvalResult<std::borrow::Cow<'_, str>> {
    match key {
        Value::String(s) => Ok(std::borrow::Cow::Borrowed(s)),
        _ => Err(EvalError::type_error(format!(
            "keys must be strings, not {}",
            key.type_name()
        ))),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a) | Value::FrozenList(a), Value::List(b) | Value::FrozenList(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                *a.read() == *b.read()
            }
            (Value::Dict(a) | Value::FrozenDict(a), Value::Dict(b) | Value::FrozenDict(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                *a.read() == *b.read()
            }
            (Value::Config(a), Value::Config(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(i) => write!(f, "{i}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(l) | Value::FrozenList(l) => {
                write!(f, "[")?;
                for (i, item) in l.read().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.repr())?;
                }
                write!(f, "]")
            }
            Value::Dict(d) | Value::FrozenDict(d) => {
                let d = d.read();
                let mut entries: Vec<_> = d.iter().collect();
                entries.sort_by_key(|(k, _)| *k);
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", key, value.repr())?;
                }
                write!(f, "}}")
            }
            Value::Config(c) => {
                let merged = c.merged();
                write!(f, "{{")?;
                for (i, (key, value)) in merged.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", key, value.repr())?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => write!(f, "<function {}>", func.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::None => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(l) | Value::FrozenList(l) => {
                let l = l.read();
                let mut seq = serializer.serialize_seq(Some(l.len()))?;
                for item in l.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(d) | Value::FrozenDict(d) => {
                let d = d.read();
                let mut entries: Vec<_> = d.iter().collect();
                entries.sort_by_key(|(k, _)| *k);
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Config(c) => {
                let merged = c.merged();
                let mut map = serializer.serialize_map(Some(merged.len()))?;
                for (k, v) in &merged {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Function(func) => Err(S::Error::custom(format!(
                "function {} is not serializable",
                func.name
            ))),
        }
    }
}

/// The CONFIG object: a read-only base mapping shared between packages plus
/// a per-package writable overlay. Lookups check the overlay first.
pub struct ConfigValue {
    base: Arc<HashMap<String, Value>>,
    overlay: RwLock<HashMap<String, Value>>,
}

impl ConfigValue {
    pub fn new(base: Arc<HashMap<String, Value>>) -> Self {
        ConfigValue {
            base,
            overlay: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.overlay.read().get(name) {
            return Some(v.clone());
        }
        self.base.get(name).cloned()
    }

    pub fn set(&self, name: String, value: Value) {
        self.overlay.write().insert(name, value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.overlay.read().contains_key(name) || self.base.contains_key(name)
    }

    /// A fresh config over the same base with an empty overlay.
    pub fn fork(&self) -> ConfigValue {
        ConfigValue::new(self.base.clone())
    }

    /// Overlay merged over base, sorted by key.
    pub fn merged(&self) -> Vec<(String, Value)> {
        let mut out: HashMap<String, Value> = (*self.base).clone();
        for (k, v) in self.overlay.read().iter() {
            out.insert(k.clone(), v.clone());
        }
        let mut entries: Vec<_> = out.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// A callable: either a user function defined in a build file or a native
/// builtin. Descriptors are immutable once built; binding `self` for a
/// method call clones the descriptor with the receiver filled in.
pub struct FuncDef {
    pub name: String,
    pub params: Vec<Param>,
    pub varargs: bool,
    pub kwargs: bool,
    pub keywords_only: bool,
    pub return_type: Option<String>,
    pub code: FuncCode,
    /// The definition scope; None for natives.
    pub capture: Option<Arc<Scope>>,
    /// Receiver bound into the first parameter slot for method calls.
    pub self_value: Option<Value>,
}

#[derive(Clone)]
pub enum FuncCode {
    User(Arc<[Statement]>),
    Native(NativeFn),
}

pub type NativeFn = fn(&Arc<Scope>, &[Value]) -> EvalResult<Value>;

/// One declared parameter. At most one of `constant` and `default` is set:
/// the optimizer pre-evaluates literal defaults into `constant`, all other
/// defaults stay as expressions evaluated in the capture scope per call.
pub struct Param {
    pub name: String,
    pub aliases: Vec<String>,
    pub types: Vec<String>,
    pub default: Option<Expression>,
    pub constant: Option<Value>,
}

impl Param {
    pub fn matches_name(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }

    pub fn accepts_type(&self, v: &Value) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t == v.type_name())
    }

    pub fn has_default(&self) -> bool {
        self.constant.is_some() || self.default.is_some()
    }
}

impl FuncDef {
    pub fn native(name: &str, f: NativeFn) -> FuncDef {
        FuncDef {
            name: name.to_owned(),
            params: Vec::new(),
            varargs: false,
            kwargs: false,
            keywords_only: false,
            return_type: None,
            code: FuncCode::Native(f),
            capture: None,
            self_value: None,
        }
    }

    /// Builder: appends a parameter. `types` empty accepts anything; a
    /// `Some` default makes the parameter optional.
    #[must_use]
    pub fn arg(mut self, name: &str, types: &[&str], default: Option<Value>) -> Self {
        self.params.push(Param {
            name: name.to_owned(),
            aliases: Vec::new(),
            types: types.iter().map(|t| (*t).to_owned()).collect(),
            default: None,
            constant: default,
        });
        self
    }

    /// Builder: adds a keyword alias to the most recently added parameter.
    #[must_use]
    pub fn alias(mut self, alias: &str) -> Self {
        if let Some(p) = self.params.last_mut() {
            p.aliases.push(alias.to_owned());
        }
        self
    }

    #[must_use]
    pub fn with_varargs(mut self) -> Self {
        self.varargs = true;
        self
    }

    #[must_use]
    pub fn with_kwargs(mut self) -> Self {
        self.kwargs = true;
        self
    }

    /// Clones this descriptor with a receiver bound as the first argument.
    pub fn bind(self: &Arc<Self>, receiver: Value) -> Arc<FuncDef> {
        Arc::new(FuncDef {
            name: self.name.clone(),
            params: self
                .params
                .iter()
                .map(|p| Param {
                    name: p.name.clone(),
                    aliases: p.aliases.clone(),
                    types: p.types.clone(),
                    default: p.default.clone(),
                    constant: p.constant.clone(),
                })
                .collect(),
            varargs: self.varargs,
            kwargs: self.kwargs,
            keywords_only: self.keywords_only,
            return_type: self.return_type.clone(),
            code: self.code.clone(),
            capture: self.capture.clone(),
            self_value: Some(receiver),
        })
    }

    pub fn is_private(&self) -> bool {
        self.name.starts_with('_')
    }
}

impl fmt::Debug for FuncDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncDef")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .finish()
    }
}
