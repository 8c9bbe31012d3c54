// ABOUTME: Interpreter state and the per-package interpretation entry point

use crate::ast::Statement;
use crate::builtins;
use crate::config::BuildConfig;
use crate::error::{EvalError, EvalResult};
use crate::eval;
use crate::graph::{BuildLabel, Graph, Package};
use crate::optimize::optimise;
use crate::scope::Scope;
use crate::subinclude::{Claim, SingleFlight, SubincludeKey};
use crate::value::{ConfigValue, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Supplies parsed build files. The host wraps its parser and file I/O
/// behind this; the interpreter itself never reads source text. A missing
/// file surfaces as an IO-kind error.
pub trait AstSource: Send + Sync {
    fn load(&self, path: &Path) -> EvalResult<Vec<Statement>>;
}

/// The bindings a subincluded file exports: its public top-level names,
/// frozen for sharing between evaluations.
pub type SubincludeGlobals = Arc<HashMap<String, Value>>;

/// State shared by every evaluation of one build: the graph, the host
/// configuration, the AST source, and the subinclude coordination table.
pub struct State {
    pub graph: Graph,
    pub config: BuildConfig,
    pub(crate) source: Box<dyn AstSource>,
    pub(crate) subincludes: SingleFlight<SubincludeKey, SubincludeGlobals>,
    config_base: Arc<HashMap<String, Value>>,
}

impl State {
    pub fn new(config: BuildConfig, source: impl AstSource + 'static) -> Arc<State> {
        let config_base = config.config_base();
        Arc::new(State {
            graph: Graph::new(),
            config,
            source: Box::new(source),
            subincludes: SingleFlight::new(),
            config_base,
        })
    }

    /// State with no build files behind it; subinclude fails with IO.
    pub fn for_testing(config: BuildConfig) -> Arc<State> {
        struct NoSource;
        impl AstSource for NoSource {
            fn load(&self, path: &Path) -> EvalResult<Vec<Statement>> {
                Err(EvalError::io(format!(
                    "no build file at {}",
                    path.display()
                )))
            }
        }
        State::new(config, NoSource)
    }

    /// A fresh CONFIG value over the shared base with an empty overlay.
    pub fn new_config_value(&self) -> Value {
        Value::Config(Arc::new(ConfigValue::new(self.config_base.clone())))
    }
}

/// The interpreter: a builtin root scope plus the shared state. One
/// instance serves all packages; evaluations may run concurrently on
/// separate threads, each within its own root-child scope.
pub struct Interpreter {
    root: Arc<Scope>,
    state: Arc<State>,
}

impl Interpreter {
    pub fn new(state: Arc<State>) -> Interpreter {
        let root = Scope::builtin_root(state.clone());
        builtins::register_builtins(&root);
        Interpreter { root, state }
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    pub fn root_scope(&self) -> &Arc<Scope> {
        &self.root
    }

    /// Interprets a package's build file: optimizes the statements, then
    /// evaluates them in a fresh scope bound to the package. Declared
    /// targets land in the graph as a side effect. Returns the package
    /// scope so the host can inspect bindings.
    pub fn interpret(
        &self,
        pkg: Arc<Package>,
        mut statements: Vec<Statement>,
    ) -> EvalResult<Arc<Scope>> {
        optimise(&mut statements);
        let pkg = self.state.graph.ensure_package(pkg);
        let scope = self.root.packaged_child(Some(pkg));
        scope.set_local("CONFIG", self.state.new_config_value());
        eval::eval_statements(&scope, &statements)?;
        Ok(scope)
    }
}

/// The subinclude driver. Canonicalizes the label to a file key, claims it
/// in the coordination table, and either reuses the published globals or
/// (as first caller) loads, optimizes and evaluates the file in a fresh
/// scope before publishing its public bindings into the table. The
/// caller's scope receives every published name.
pub(crate) fn subinclude(s: &Arc<Scope>, label_str: &str) -> EvalResult<()> {
    let (pkg_name, pkg_subrepo) = match &s.pkg {
        Some(p) => (p.name.clone(), p.subrepo.clone()),
        None => (String::new(), String::new()),
    };
    let label = BuildLabel::parse(label_str, &pkg_name, &pkg_subrepo)?;
    let path = subinclude_path(&label);
    let key = SubincludeKey {
        path: path.clone(),
        subrepo: label.subrepo.clone(),
    };
    let globals = load_subinclude(s, key, &path)?;
    for (name, value) in globals.iter() {
        s.set_local(name.clone(), value.clone());
    }
    Ok(())
}

/// The canonical on-disk path of a subinclude label: the named file within
/// the label's package directory.
fn subinclude_path(label: &BuildLabel) -> PathBuf {
    if label.package.is_empty() {
        PathBuf::from(&label.name)
    } else {
        Path::new(&label.package).join(&label.name)
    }
}

fn load_subinclude(
    s: &Arc<Scope>,
    key: SubincludeKey,
    path: &Path,
) -> EvalResult<SubincludeGlobals> {
    let state = s.state().clone();
    let outcome = match state.subincludes.begin(key) {
        Claim::Ready(globals) => Ok(globals),
        Claim::Failed(err) => Err(err),
        Claim::First(flight) => {
            let result = evaluate_subinclude(s, &state, path);
            match result {
                Ok(globals) => {
                    flight.finish(globals.clone());
                    Ok(globals)
                }
                Err(err) => {
                    flight.fail(err.clone());
                    Err(err)
                }
            }
        }
    };
    outcome
}

/// Evaluates a subincluded file. The scope is packageless and gets a fresh
/// CONFIG, so the result is independent of which package asked first and
/// can be memoized under the file key.
fn evaluate_subinclude(
    s: &Arc<Scope>,
    state: &Arc<State>,
    path: &Path,
) -> EvalResult<SubincludeGlobals> {
    let mut statements = state.source.load(path)?;
    optimise(&mut statements);
    let sub_scope = s.root().packaged_child(None);
    sub_scope.set_local("CONFIG", state.new_config_value());
    eval::eval_statements(&sub_scope, &statements)?;
    Ok(Arc::new(sub_scope.publishable_locals()))
}
