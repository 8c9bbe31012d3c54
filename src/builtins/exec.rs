//! External process execution: `exec` and the git helpers
//!
//! `exec` runs a command with a configured timeout and memoizes the
//! trimmed output in a process-wide single-flight cache, so N concurrent
//! callers with the same command produce one process invocation. Failures
//! poison only their own cache key.

use super::{install, want_str};
use crate::error::{EvalError, EvalResult};
use crate::scope::Scope;
use crate::subinclude::{Claim, SingleFlight};
use crate::value::Value;
use girder_macros::builtin;
use once_cell::sync::Lazy;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExecKey {
    argv: Vec<String>,
    want_stdout: bool,
    want_stderr: bool,
}

static CACHE: Lazy<SingleFlight<ExecKey, String>> = Lazy::new(SingleFlight::new);

pub fn register(scope: &Arc<Scope>) {
    install(scope, exec_builtin());
    install(scope, git_branch_builtin());
    install(scope, git_commit_builtin());
    install(scope, git_show_builtin());
    install(scope, git_state_builtin());
}

/// Runs an external command and returns its trimmed output. `cmd` is a
/// whitespace-split string or a list of arguments. Cached results must not
/// depend on the working directory or other ambient state; pass
/// `cache=False` for anything that does.
#[builtin(
    name = "exec",
    params = "cmd: str|list, want_stdout: bool = True, want_stderr: bool = False, cache: bool = True"
)]
fn exec_(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let argv = decode_argv(&args[0])?;
    let want_stdout = args[1].is_truthy();
    let want_stderr = args[2].is_truthy();
    let cache = args[3].is_truthy();
    let timeout = s.state().config.exec_timeout;
    if cache {
        cached_exec(argv, want_stdout, want_stderr, timeout)
    } else {
        run_command(&argv, want_stdout, want_stderr, timeout).map(Value::string)
    }
}

fn decode_argv(v: &Value) -> EvalResult<Vec<String>> {
    let argv: Vec<String> = match v {
        Value::String(s) => s.split_whitespace().map(str::to_owned).collect(),
        Value::List(l) | Value::FrozenList(l) => {
            let items = l.read();
            let mut argv = Vec::with_capacity(items.len());
            for item in items.iter() {
                let text = item.as_str().ok_or_else(|| {
                    EvalError::type_error(format!(
                        "exec: command arguments must be strings, not {}",
                        item.type_name()
                    ))
                })?;
                argv.push(text.to_owned());
            }
            argv
        }
        _ => unreachable!("argument type enforced by binding"),
    };
    if argv.is_empty() {
        return Err(EvalError::value_error("exec: empty command"));
    }
    Ok(argv)
}

fn cached_exec(
    argv: Vec<String>,
    want_stdout: bool,
    want_stderr: bool,
    timeout: Duration,
) -> EvalResult<Value> {
    let key = ExecKey {
        argv,
        want_stdout,
        want_stderr,
    };
    match CACHE.begin(key.clone()) {
        Claim::Ready(output) => Ok(Value::string(output)),
        Claim::Failed(err) => Err(err),
        Claim::First(flight) => {
            match run_command(&key.argv, want_stdout, want_stderr, timeout) {
                Ok(output) => {
                    flight.finish(output.clone());
                    Ok(Value::string(output))
                }
                Err(err) => {
                    flight.fail(err.clone());
                    Err(err)
                }
            }
        }
    }
}

/// Spawns the process, drains its pipes on reader threads, polls for exit
/// until the deadline, and kills on expiry. Draining concurrently keeps a
/// chatty child from blocking on a full pipe before it can exit.
fn run_command(
    argv: &[String],
    want_stdout: bool,
    want_stderr: bool,
    timeout: Duration,
) -> EvalResult<String> {
    let mut child = Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EvalError::io(format!("exec: command not found: {}", argv[0]))
            } else {
                EvalError::io(format!("exec: failed to run {}: {e}", argv[0]))
            }
        })?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");
    let read_all = |mut pipe: Box<dyn Read + Send>| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    };
    let stdout_reader = read_all(Box::new(stdout));
    let stderr_reader = read_all(Box::new(stderr));

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(EvalError::timeout(format!(
                        "exec: {} did not complete within {}s",
                        argv.join(" "),
                        timeout.as_secs()
                    )));
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(EvalError::io(format!("exec: wait failed: {e}"))),
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    if !status.success() {
        return Err(EvalError::io(format!(
            "exec: {} exited with {}: {}",
            argv.join(" "),
            status,
            String::from_utf8_lossy(&stderr).trim()
        )));
    }
    let mut output = Vec::new();
    if want_stdout {
        output.extend_from_slice(&stdout);
    }
    if want_stderr {
        output.extend_from_slice(&stderr);
    }
    Ok(String::from_utf8_lossy(&output).trim().to_owned())
}

fn cached_git(s: &Arc<Scope>, argv: &[&str]) -> EvalResult<Value> {
    cached_exec(
        argv.iter().map(|a| (*a).to_owned()).collect(),
        true,
        false,
        s.state().config.exec_timeout,
    )
}

/// The current git branch. With `short`, the abbreviated ref name;
/// otherwise the full symbolic ref.
#[builtin(name = "git_branch", params = "short: bool = True")]
fn git_branch(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    if args[0].is_truthy() {
        cached_git(s, &["git", "rev-parse", "--abbrev-ref", "HEAD"])
    } else {
        cached_git(s, &["git", "symbolic-ref", "HEAD"])
    }
}

#[builtin(name = "git_commit", params = "")]
fn git_commit(s: &Arc<Scope>, _args: &[Value]) -> EvalResult<Value> {
    cached_git(s, &["git", "rev-parse", "HEAD"])
}

/// `git show` of HEAD with a custom format string, e.g. `%cI` for the
/// commit date.
#[builtin(name = "git_show", params = "format: str")]
fn git_show(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
    let format = want_str("git_show", args, 0)?;
    let arg = format!("--format={format}");
    cached_git(s, &["git", "show", "-s", &arg])
}

/// "clean" when the working tree has no pending changes, else "dirty".
#[builtin(name = "git_state", params = "")]
fn git_state(s: &Arc<Scope>, _args: &[Value]) -> EvalResult<Value> {
    let status = cached_git(s, &["git", "status", "--porcelain"])?;
    Ok(Value::string(if status.to_string().is_empty() {
        "clean"
    } else {
        "dirty"
    }))
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
    fn test_exec_returns_trimmed_output() {
        let s = scope();
        let v = exec_(
            &s,
            &[
                Value::string("echo hello world"),
                Value::Bool(true),
                Value::Bool(false),
                Value::Bool(false),
            ],
        )
        .unwrap();
        assert_eq!(v, Value::string("hello world"));
    }

    #[test]
    fn test_exec_list_command() {
        let s = scope();
        let cmd = Value::list(vec![
            Value::string("echo"),
            Value::string("a  b"),
        ]);
        let v = exec_(
            &s,
            &[cmd, Value::Bool(true), Value::Bool(false), Value::Bool(false)],
        )
        .unwrap();
        assert_eq!(v, Value::string("a  b"));
    }

    #[test]
    fn test_exec_missing_command_is_io_error() {
        let s = scope();
        let err = exec_(
            &s,
            &[
                Value::string("definitely-not-a-real-binary-xyz"),
                Value::Bool(true),
                Value::Bool(false),
                Value::Bool(false),
            ],
        )
        .unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::Io(_)));
    }

    #[test]
    fn test_exec_empty_command_rejected() {
        let s = scope();
        let err = exec_(
            &s,
            &[
                Value::string("   "),
                Value::Bool(true),
                Value::Bool(false),
                Value::Bool(false),
            ],
        )
        .unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::Value(_)));
    }
}
