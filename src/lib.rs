// ABOUTME: Build-file interpreter for the Girder build system

pub mod ast;
pub mod builtins;
pub mod config;
pub mod error;
pub mod eval;
pub mod graph;
pub mod interpreter;
pub mod ops;
pub mod optimize;
pub mod scope;
pub mod subinclude;
pub mod target;
pub mod value;

pub use config::BuildConfig;
pub use error::{ErrorKind, EvalError, EvalResult};
pub use interpreter::{AstSource, Interpreter, State};
pub use value::Value;
