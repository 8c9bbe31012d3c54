//! Procedural macros for girder-script builtin functions
//!
//! Provides the `#[builtin]` attribute macro for declaring native builtins
//! together with their script-side name and parameter list, generating the
//! descriptor function the registration tables consume.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// One parsed parameter from the `params` attribute string.
struct ParamSpec {
    name: String,
    types: Vec<String>,
    default: Option<DefaultLit>,
}

/// Constant default literals supported in parameter specs.
enum DefaultLit {
    True,
    False,
    None,
    Int(i64),
    Str(String),
}

/// Extracts a `key = "value"` pair from the stringified attribute stream.
fn extract_string_arg(attr_str: &str, key: &str) -> Option<String> {
    let pattern = format!("{key} = \"");
    let start = attr_str.find(&pattern)?;
    let rest = &attr_str[start + pattern.len()..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Parses a parameter spec like
/// `"cmd: str|dict = None, tag: str = '', *args"`.
///
/// Each comma-separated entry is `name[: type(|type)*][= default]`, where
/// default is one of True/False/None, an integer, or a single-quoted
/// string. `*name` marks varargs and `**name` marks kwargs.
fn parse_params(spec: &str) -> (Vec<ParamSpec>, bool, bool) {
    let mut params = Vec::new();
    let mut varargs = false;
    let mut kwargs = false;
    for entry in spec.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if entry.starts_with("**") {
            kwargs = true;
            continue;
        }
        if entry.starts_with('*') {
            varargs = true;
            continue;
        }
        let (head, default) = match entry.split_once('=') {
            Some((head, default)) => (head.trim(), Some(parse_default(default.trim()))),
            None => (entry, None),
        };
        let (name, types) = match head.split_once(':') {
            Some((name, types)) => (
                name.trim().to_string(),
                types
                    .split('|')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
            ),
            None => (head.to_string(), Vec::new()),
        };
        params.push(ParamSpec {
            name,
            types,
            default,
        });
    }
    (params, varargs, kwargs)
}

fn parse_default(text: &str) -> DefaultLit {
    match text {
        "True" => DefaultLit::True,
        "False" => DefaultLit::False,
        "None" => DefaultLit::None,
        _ => {
            if let Some(stripped) = text
                .strip_prefix('\'')
                .and_then(|t| t.strip_suffix('\''))
            {
                DefaultLit::Str(stripped.to_string())
            } else if let Ok(i) = text.parse::<i64>() {
                DefaultLit::Int(i)
            } else {
                panic!("unsupported default literal in builtin params: {text}")
            }
        }
    }
}

/// Attribute macro declaring a native builtin.
///
/// Generates, next to the function, a `<fn>_builtin()` descriptor returning
/// the `FuncDef` that the per-module `register` functions and the method
/// tables install.
///
/// # Attribute Arguments
///
/// - `name`: the script-side name (defaults to the function name)
/// - `params`: the parameter spec (see [`parse_params`])
///
/// # Example
///
/// ```ignore
/// #[builtin(name = "get_labels", params = "target: str, prefix: str, transitive: bool = False, maxdepth: int = -1")]
/// pub fn get_labels(s: &Arc<Scope>, args: &[Value]) -> EvalResult<Value> {
///     // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn builtin(attr: TokenStream, item: TokenStream) -> TokenStream {
    let func = parse_macro_input!(item as ItemFn);
    let attr_str = attr.to_string();

    let fn_name = func.sig.ident.clone();
    let script_name =
        extract_string_arg(&attr_str, "name").unwrap_or_else(|| fn_name.to_string());
    let params_spec = extract_string_arg(&attr_str, "params").unwrap_or_default();
    let (params, varargs, kwargs) = parse_params(&params_spec);

    // Trailing underscores keep native names like `str_` off the Rust
    // keywords and primitives; the descriptor drops them.
    let descriptor_name =
        quote::format_ident!("{}_builtin", fn_name.to_string().trim_end_matches('_'));

    let mut builder = quote! {
        crate::value::FuncDef::native(#script_name, #fn_name)
    };
    for p in &params {
        let name = &p.name;
        let types = &p.types;
        let default = match &p.default {
            None => quote! { None },
            Some(DefaultLit::True) => quote! { Some(crate::value::Value::Bool(true)) },
            Some(DefaultLit::False) => quote! { Some(crate::value::Value::Bool(false)) },
            Some(DefaultLit::None) => quote! { Some(crate::value::Value::None) },
            Some(DefaultLit::Int(i)) => quote! { Some(crate::value::Value::Int(#i)) },
            Some(DefaultLit::Str(s)) => quote! { Some(crate::value::Value::string(#s)) },
        };
        builder = quote! {
            #builder.arg(#name, &[#(#types),*], #default)
        };
    }
    if varargs {
        builder = quote! { #builder.with_varargs() };
    }
    if kwargs {
        builder = quote! { #builder.with_kwargs() };
    }

    let expanded = quote! {
        #func

        /// Descriptor for the corresponding builtin, consumed at
        /// registration time.
        pub fn #descriptor_name() -> crate::value::FuncDef {
            #builder
        }
    };
    TokenStream::from(expanded)
}
