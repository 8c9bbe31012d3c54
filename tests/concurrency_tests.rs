// ABOUTME: Tests for subinclude single-flight coordination and the exec
// cache under concurrent evaluation

use girder_script::ast::{CallArgument, Expression, Statement};
use girder_script::config::BuildConfig;
use girder_script::error::{ErrorKind, EvalResult};
use girder_script::graph::Package;
use girder_script::interpreter::{AstSource, Interpreter, State};
use girder_script::value::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn pos(e: Expression) -> CallArgument {
    CallArgument::positional(e)
}

/// An AstSource backed by a map of pre-built files, counting loads.
struct MapSource {
    files: HashMap<PathBuf, Vec<Statement>>,
    loads: AtomicUsize,
}

impl MapSource {
    fn new(files: HashMap<PathBuf, Vec<Statement>>) -> Arc<Self> {
        Arc::new(MapSource {
            files,
            loads: AtomicUsize::new(0),
        })
    }
}

/// Local wrapper so the orphan rule doesn't block implementing a
/// foreign-crate trait on a foreign-crate `Arc`.
struct SourceHandle(Arc<MapSource>);

impl AstSource for SourceHandle {
    fn load(&self, path: &Path) -> EvalResult<Vec<Statement>> {
        self.0.loads.fetch_add(1, Ordering::SeqCst);
        // Loading is slow enough that concurrent callers pile up behind
        // the pending entry.
        std::thread::sleep(std::time::Duration::from_millis(30));
        self.0
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| girder_script::EvalError::io(format!("no such file: {}", path.display())))
    }
}

fn subinclude_stmt(target: &str) -> Statement {
    Statement::expression(Expression::call(
        "subinclude",
        vec![pos(Expression::string(target))],
    ))
}

#[test]
fn test_concurrent_subincludes_parse_once() {
    let mut files = HashMap::new();
    files.insert(
        PathBuf::from("build_defs/shared"),
        vec![
            Statement::assign("shared_value", Expression::int(42)),
            Statement::assign(
                "shared_list",
                Expression::list(vec![Expression::string("a"), Expression::string("b")]),
            ),
            Statement::assign("_private", Expression::int(7)),
        ],
    );
    let source = MapSource::new(files);
    let interp = Arc::new(Interpreter::new(State::new(
        BuildConfig::default(),
        SourceHandle(source.clone()),
    )));

    let mut handles = Vec::new();
    for i in 0..8 {
        let interp = interp.clone();
        handles.push(std::thread::spawn(move || {
            let pkg = Package::new(&format!("pkg{i}"));
            let scope = interp
                .interpret(pkg, vec![subinclude_stmt("//build_defs:shared")])
                .unwrap();
            (
                scope.get("shared_value").unwrap(),
                scope.get("shared_list").unwrap(),
                scope.get("_private"),
            )
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // The file was parsed exactly once despite eight concurrent callers.
    assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    for (value, list, private) in &results {
        assert_eq!(*value, Value::Int(42));
        assert_eq!(
            *list,
            Value::list(vec![Value::string("a"), Value::string("b")])
        );
        // Underscore names are not exported.
        assert!(private.is_none());
    }
    // All callers observe the same (frozen) published list.
    match &results[0].1 {
        Value::FrozenList(_) => {}
        other => panic!("published list was not frozen: {other:?}"),
    }
    assert!(results[0].1.is_identical(&results[1].1));
}

#[test]
fn test_published_globals_are_immutable() {
    let mut files = HashMap::new();
    files.insert(
        PathBuf::from("build_defs/shared"),
        vec![Statement::assign(
            "exported",
            Expression::list(vec![Expression::int(1)]),
        )],
    );
    let interp = Interpreter::new(State::new(BuildConfig::default(), SourceHandle(MapSource::new(files))));

    // subinclude, then try to append to the imported list.
    let stmts = vec![
        subinclude_stmt("//build_defs:shared"),
        Statement::expression(
            Expression::ident("exported").method("append", vec![pos(Expression::int(2))]),
        ),
    ];
    let err = interp.interpret(Package::new("pkg"), stmts).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Invariant(_)));
}

#[test]
fn test_failed_subinclude_poisons_only_its_key() {
    let mut files = HashMap::new();
    files.insert(
        PathBuf::from("build_defs/good"),
        vec![Statement::assign("ok", Expression::bool_(true))],
    );
    let source = MapSource::new(files);
    let interp = Arc::new(Interpreter::new(State::new(
        BuildConfig::default(),
        SourceHandle(source.clone()),
    )));

    // Two concurrent loads of a missing file: both see the IO failure but
    // only one load attempt happens.
    let mut handles = Vec::new();
    for i in 0..2 {
        let interp = interp.clone();
        handles.push(std::thread::spawn(move || {
            interp
                .interpret(
                    Package::new(&format!("pkg{i}")),
                    vec![subinclude_stmt("//build_defs:missing")],
                )
                .unwrap_err()
        }));
    }
    for handle in handles {
        let err = handle.join().unwrap();
        assert!(
            matches!(err.kind(), ErrorKind::Io(_) | ErrorKind::Cancelled(_)),
            "unexpected error: {err}"
        );
    }
    assert_eq!(source.loads.load(Ordering::SeqCst), 1);

    // A different key is unaffected.
    let scope = interp
        .interpret(Package::new("pkg3"), vec![subinclude_stmt("//build_defs:good")])
        .unwrap();
    assert_eq!(scope.get("ok").unwrap(), Value::Bool(true));
}

fn exec_call(cmd: Vec<Expression>) -> Expression {
    Expression::call(
        "exec",
        vec![pos(Expression::list(cmd))],
    )
}

#[test]
fn test_concurrent_exec_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let script = format!(
        "echo run >> {} && cat {} | wc -l",
        marker.display(),
        marker.display()
    );

    let interp = Arc::new(Interpreter::new(State::for_testing(BuildConfig::default())));
    let mut handles = Vec::new();
    for i in 0..8 {
        let interp = interp.clone();
        let script = script.clone();
        handles.push(std::thread::spawn(move || {
            let stmts = vec![Statement::assign(
                "out",
                exec_call(vec![
                    Expression::string("sh"),
                    Expression::string("-c"),
                    Expression::string(&script),
                ]),
            )];
            let scope = interp
                .interpret(Package::new(&format!("pkg{i}")), stmts)
                .unwrap();
            scope.get("out").unwrap()
        }));
    }
    let results: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // The command appended to the marker file exactly once, and every
    // caller observed that single run's output.
    let content = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(content.lines().count(), 1);
    for v in results {
        assert_eq!(v, Value::string("1"));
    }
}

#[test]
fn test_uncached_exec_runs_every_time() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let script = format!("echo run >> {}", marker.display());

    let interp = Interpreter::new(State::for_testing(BuildConfig::default()));
    let call = Expression::call(
        "exec",
        vec![
            pos(Expression::list(vec![
                Expression::string("sh"),
                Expression::string("-c"),
                Expression::string(&script),
            ])),
            CallArgument::keyword("cache", Expression::bool_(false)),
        ],
    );
    let stmts = vec![
        Statement::expression(call.clone()),
        Statement::expression(call),
    ];
    interp.interpret(Package::new("pkg"), stmts).unwrap();
    let content = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(content.lines().count(), 2);
}

#[test]
fn test_concurrent_package_evaluations_are_independent() {
    let interp = Arc::new(Interpreter::new(State::for_testing(BuildConfig::default())));
    let mut handles = Vec::new();
    for i in 0..8 {
        let interp = interp.clone();
        handles.push(std::thread::spawn(move || {
            let stmts = vec![
                Statement::assign("x", Expression::int(i)),
                Statement::expression(Expression::call(
                    "build_rule",
                    vec![CallArgument::keyword(
                        "name",
                        Expression::string(&format!("t{i}")),
                    )],
                )),
            ];
            interp
                .interpret(Package::new(&format!("pkg{i}")), stmts)
                .unwrap()
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let scope = handle.join().unwrap();
        assert_eq!(scope.get("x").unwrap(), Value::Int(i as i64));
    }
    for i in 0..8 {
        let label = girder_script::graph::BuildLabel::new(&format!("pkg{i}"), &format!("t{i}"));
        assert!(interp.state().graph.target(&label).is_some());
    }
}
