// ABOUTME: Lexical scope chain for managing variable bindings during
// evaluation of build files

use crate::error::{EvalError, EvalResult};
use crate::graph::Package;
use crate::interpreter::State;
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// One lexical environment. Scopes form a chain through `parent`, rooted at
/// the interpreter's builtin scope; each package evaluation and each
/// function call gets its own scope, discarded when evaluation returns.
pub struct Scope {
    pub(crate) state: Arc<State>,
    /// The package this evaluation is registering targets into; None in the
    /// builtin scope and while evaluating subincluded files.
    pub pkg: Option<Arc<Package>>,
    parent: Option<Arc<Scope>>,
    locals: RwLock<HashMap<String, Value>>,
    /// Set while executing a pre/post-build callback; gates the builtins
    /// that mutate already-registered targets.
    pub callback: bool,
    /// Marks the distinguished root scope holding the builtins; assignment
    /// never writes into it.
    builtins: bool,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("pkg", &self.pkg.as_ref().map(|p| &p.name))
            .field("callback", &self.callback)
            .field("builtins", &self.builtins)
            .finish_non_exhaustive()
    }
}

impl Scope {
    /// The root scope holding builtins. Everything else parents onto it.
    pub fn builtin_root(state: Arc<State>) -> Arc<Scope> {
        Arc::new(Scope {
            state,
            pkg: None,
            parent: None,
            locals: RwLock::new(HashMap::new()),
            callback: false,
            builtins: true,
        })
    }

    /// A child scope sharing this scope's package.
    pub fn child(self: &Arc<Self>) -> Arc<Scope> {
        Arc::new(Scope {
            state: self.state.clone(),
            pkg: self.pkg.clone(),
            parent: Some(self.clone()),
            locals: RwLock::new(HashMap::new()),
            callback: self.callback,
            builtins: false,
        })
    }

    /// A child scope rebound to a different package. Used to run a function
    /// body in its definition scope with the calling package's context, and
    /// to run pre/post-build callbacks.
    pub fn packaged_child(self: &Arc<Self>, pkg: Option<Arc<Package>>) -> Arc<Scope> {
        Arc::new(Scope {
            state: self.state.clone(),
            pkg,
            parent: Some(self.clone()),
            locals: RwLock::new(HashMap::new()),
            callback: self.callback,
            builtins: false,
        })
    }

    /// Like [`packaged_child`], additionally marked as a callback scope.
    pub fn callback_child(self: &Arc<Self>, pkg: Option<Arc<Package>>) -> Arc<Scope> {
        Arc::new(Scope {
            state: self.state.clone(),
            pkg,
            parent: Some(self.clone()),
            locals: RwLock::new(HashMap::new()),
            callback: true,
            builtins: false,
        })
    }

    /// The scope for a function call: parented here (the capture scope) but
    /// carrying the calling package and the caller's callback flag, so
    /// helpers invoked from a pre/post-build callback keep its privileges.
    pub fn call_child(
        self: &Arc<Self>,
        pkg: Option<Arc<Package>>,
        callback: bool,
    ) -> Arc<Scope> {
        Arc::new(Scope {
            state: self.state.clone(),
            pkg,
            parent: Some(self.clone()),
            locals: RwLock::new(HashMap::new()),
            callback,
            builtins: false,
        })
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    /// Looks a name up in this scope and parent scopes.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.locals.read().get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// As [`get`], failing with a NameError for unknown names.
    pub fn lookup(&self, name: &str) -> EvalResult<Value> {
        self.get(name)
            .ok_or_else(|| EvalError::name_error(name))
    }

    /// Defines a binding in this scope only.
    pub fn set_local(&self, name: impl Into<String>, value: Value) {
        self.locals.write().insert(name.into(), value);
    }

    /// Plain assignment: rebinds the nearest enclosing scope that already
    /// holds the name, else defines it here. The walk never writes into the
    /// builtin scope, so assigning a builtin's name shadows it instead.
    pub fn set(&self, name: &str, value: Value) {
        let mut scope = self;
        loop {
            if !scope.builtins && scope.locals.read().contains_key(name) {
                scope.locals.write().insert(name.to_owned(), value);
                return;
            }
            match &scope.parent {
                Some(p) => scope = p,
                None => break,
            }
        }
        self.set_local(name, value);
    }

    /// The CONFIG object visible from this scope, if any.
    pub fn config(&self) -> Option<Value> {
        self.get("CONFIG")
    }

    /// Walks to the builtin root scope.
    pub fn root(self: &Arc<Self>) -> Arc<Scope> {
        let mut scope = self.clone();
        while let Some(p) = &scope.parent {
            let p = p.clone();
            scope = p;
        }
        scope
    }

    /// The public bindings of this scope (its own locals whose names do not
    /// start with `_`, excluding CONFIG), frozen for publication to other
    /// evaluations. This is what `subinclude` exports.
    pub fn publishable_locals(&self) -> HashMap<String, Value> {
        self.locals
            .read()
            .iter()
            .filter(|(name, _)| !name.starts_with('_') && *name != "CONFIG")
            .map(|(name, value)| (name.clone(), value.freeze()))
            .collect()
    }

    /// Number of bindings defined directly in this scope.
    pub fn local_count(&self) -> usize {
        self.locals.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::interpreter::State;

    fn root() -> Arc<Scope> {
        Scope::builtin_root(State::for_testing(BuildConfig::default()))
    }

    #[test]
    fn test_define_and_get() {
        let env = root().child();
        env.set_local("x", Value::Int(42));
        assert_eq!(env.get("x"), Some(Value::Int(42)));
        assert!(env.get("undefined").is_none());
        assert!(env.lookup("undefined").is_err());
    }

    #[test]
    fn test_shadowing_and_parent_lookup() {
        let parent = root().child();
        parent.set_local("x", Value::Int(42));
        parent.set_local("y", Value::Int(7));

        let child = parent.child();
        child.set_local("x", Value::Int(100));
        assert_eq!(child.get("x"), Some(Value::Int(100)));
        assert_eq!(child.get("y"), Some(Value::Int(7)));
        assert_eq!(parent.get("x"), Some(Value::Int(42)));
    }

    #[test]
    fn test_set_rebinds_nearest_enclosing() {
        let parent = root().child();
        parent.set_local("x", Value::Int(1));
        let child = parent.child();
        child.set("x", Value::Int(2));
        assert_eq!(parent.get("x"), Some(Value::Int(2)));
        assert_eq!(child.local_count(), 0);

        child.set("fresh", Value::Int(3));
        assert_eq!(child.local_count(), 1);
        assert!(parent.get("fresh").is_none());
    }

    #[test]
    fn test_set_never_writes_builtin_scope() {
        let builtin = root();
        builtin.set_local("True", Value::Bool(true));
        let pkg_scope = builtin.child();
        pkg_scope.set("True", Value::Int(1));
        // The builtin binding is untouched; the package scope shadows it.
        assert_eq!(pkg_scope.get("True"), Some(Value::Int(1)));
        assert_eq!(builtin.locals.read().get("True"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_publishable_locals_skips_private_and_freezes() {
        let s = root().child();
        s.set_local("lib", Value::list(vec![Value::Int(1)]));
        s.set_local("_internal", Value::Int(2));
        s.set_local("CONFIG", Value::Int(3));
        let published = s.publishable_locals();
        assert_eq!(published.len(), 1);
        assert!(matches!(published["lib"], Value::FrozenList(_)));
    }
}
