// ABOUTME: Evaluator for build-file statements and expressions

use crate::ast::{
    CallArguments, Comprehension, Expression, FuncDefStatement, IdentAction, IdentExpr,
    IdentExprAction, LambdaExpression, ListExpression, Operator, Optimised, Position,
    SliceExpression, Statement, StatementKind, UnaryOp, ValueExpression, ValueKind,
};
use crate::error::{EvalError, EvalResult};
use crate::ops;
use crate::scope::Scope;
use crate::value::{FuncCode, FuncDef, Param, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Statement-level control flow. `Continue` is the distinguished sentinel
/// that unwinds to the nearest enclosing for loop; `Return` unwinds the
/// whole statement list and surfaces at the function call.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Continue,
    Return(Value),
}

pub fn eval_statements(s: &Arc<Scope>, stmts: &[Statement]) -> EvalResult<Flow> {
    for stmt in stmts {
        match eval_statement(s, stmt)? {
            Flow::Normal => {}
            flow => return Ok(flow),
        }
    }
    Ok(Flow::Normal)
}

fn eval_statement(s: &Arc<Scope>, stmt: &Statement) -> EvalResult<Flow> {
    let result = match &stmt.kind {
        StatementKind::Pass => Ok(Flow::Normal),
        StatementKind::Continue => Ok(Flow::Continue),
        StatementKind::Return(expr) => {
            let v = match expr {
                Some(e) => eval_expression(s, e)?,
                None => Value::None,
            };
            Ok(Flow::Return(v))
        }
        StatementKind::Expression(e) => {
            eval_expression(s, e)?;
            Ok(Flow::Normal)
        }
        StatementKind::Assert { expr, message } => {
            let v = eval_expression(s, expr)?;
            if v.is_truthy() {
                Ok(Flow::Normal)
            } else {
                let msg = match message {
                    Some(m) => eval_expression(s, m)?.to_string(),
                    None => "expression is not true".to_owned(),
                };
                Err(EvalError::assertion(msg))
            }
        }
        StatementKind::Raise(expr) => {
            let v = eval_expression(s, expr)?;
            Err(EvalError::user(v.to_string()))
        }
        StatementKind::If(ifs) => {
            if eval_expression(s, &ifs.condition)?.is_truthy() {
                return eval_statements(s, &ifs.statements).map_err(|e| e.at(stmt.pos));
            }
            for (cond, body) in &ifs.elif {
                if eval_expression(s, cond)?.is_truthy() {
                    return eval_statements(s, body).map_err(|e| e.at(stmt.pos));
                }
            }
            eval_statements(s, &ifs.else_statements)
        }
        StatementKind::For(f) => {
            let iterable = eval_expression(s, &f.expr)?;
            for item in iterable.iterate()? {
                bind_names(s, &f.names, item)?;
                match eval_statements(s, &f.statements)? {
                    Flow::Normal | Flow::Continue => {}
                    ret @ Flow::Return(_) => return Ok(ret),
                }
            }
            Ok(Flow::Normal)
        }
        StatementKind::FuncDef(fd) => {
            let f = define_function(s, fd);
            s.set_local(fd.name.clone(), Value::Function(Arc::new(f)));
            Ok(Flow::Normal)
        }
        StatementKind::Ident(ident) => eval_ident_statement(s, ident).map(|()| Flow::Normal),
    };
    result.map_err(|e| e.at(stmt.pos))
}

/// Binds loop/comprehension variables; a multi-name binding unpacks the
/// element by iterating it.
fn bind_names(s: &Arc<Scope>, names: &[String], item: Value) -> EvalResult<()> {
    if names.len() == 1 {
        s.set_local(names[0].clone(), item);
        return Ok(());
    }
    let items = item
        .iterate()
        .map_err(|_| EvalError::type_error(format!("cannot unpack '{}'", item.type_name())))?;
    if items.len() != names.len() {
        return Err(EvalError::value_error(format!(
            "wrong number of values to unpack (expected {}, got {})",
            names.len(),
            items.len()
        )));
    }
    for (name, v) in names.iter().zip(items) {
        s.set_local(name.clone(), v);
    }
    Ok(())
}

fn eval_ident_statement(s: &Arc<Scope>, ident: &crate::ast::IdentStatement) -> EvalResult<()> {
    match &ident.action {
        IdentAction::Assign(expr) => {
            let v = eval_expression(s, expr)?;
            s.set(&ident.name, v);
        }
        IdentAction::AugAssign(expr) => {
            let current = s.lookup(&ident.name)?;
            let rhs = eval_expression(s, expr)?;
            let v = ops::apply_binary(Operator::Add, &current, &rhs)?;
            s.set(&ident.name, v);
        }
        IdentAction::IndexAssign {
            index,
            value,
            augmented,
        } => {
            let obj = s.lookup(&ident.name)?;
            let idx = eval_expression(s, index)?;
            let mut v = eval_expression(s, value)?;
            if *augmented {
                let current = obj.index(&idx)?;
                v = ops::apply_binary(Operator::Add, &current, &v)?;
            }
            obj.set_index(&idx, v)?;
        }
        IdentAction::Unpack { names, expr } => {
            let v = eval_expression(s, expr)?;
            let items = v.iterate().map_err(|_| {
                EvalError::type_error(format!("cannot unpack '{}'", v.type_name()))
            })?;
            if items.len() != names.len() {
                return Err(EvalError::value_error(format!(
                    "wrong number of values to unpack (expected {}, got {})",
                    names.len(),
                    items.len()
                )));
            }
            for (name, item) in names.iter().zip(items) {
                s.set(name, item);
            }
        }
        IdentAction::Call(args) => {
            let callee = s.lookup(&ident.name)?;
            call_value(s, callee, args, Position::default())?;
        }
    }
    Ok(())
}

fn define_function(s: &Arc<Scope>, fd: &FuncDefStatement) -> FuncDef {
    FuncDef {
        name: fd.name.clone(),
        params: fd.arguments.iter().map(|a| param_from_def(a)).collect(),
        varargs: false,
        kwargs: false,
        keywords_only: fd.keywords_only,
        return_type: fd.return_type.clone(),
        code: FuncCode::User(fd.statements.clone().into()),
        capture: Some(s.clone()),
        self_value: None,
    }
}

/// Converts a declared argument into a parameter; defaults the optimizer
/// folded to constants skip per-call evaluation.
fn param_from_def(a: &crate::ast::ArgumentDef) -> Param {
    let constant = a.value.as_ref().and_then(|e| match &e.optimised {
        Some(Optimised::Constant(v)) => Some(v.clone()),
        _ => None,
    });
    let default = if constant.is_some() {
        None
    } else {
        a.value.clone()
    };
    Param {
        name: a.name.clone(),
        aliases: a.aliases.clone(),
        types: a.types.clone(),
        default,
        constant,
    }
}

pub fn eval_expression(s: &Arc<Scope>, expr: &Expression) -> EvalResult<Value> {
    match &expr.optimised {
        Some(Optimised::Constant(v)) => return Ok(v.clone()),
        Some(Optimised::Local(name)) => return s.lookup(name).map_err(|e| e.at(expr.pos)),
        Some(Optimised::Config(name)) => {
            let cfg = s.lookup("CONFIG").map_err(|e| e.at(expr.pos))?;
            return cfg.property(name).map_err(|e| e.at(expr.pos));
        }
        Some(Optimised::Join { separator, list }) => {
            return eval_optimised_join(s, separator, list).map_err(|e| e.at(expr.pos));
        }
        None => {}
    }

    // The inline if picks its branch before anything else is evaluated.
    if let Some(inline) = &expr.if_else {
        if !eval_expression(s, &inline.condition)?.is_truthy() {
            return eval_expression(s, &inline.else_);
        }
    }

    let mut v = eval_value_expression(s, &expr.val, expr.pos)?;
    // Negation binds tighter than any binary operator; `not` binds looser,
    // so it applies to the folded result below.
    if expr.unary == Some(UnaryOp::Negate) {
        v = ops::negate(&v).map_err(|e| e.at(expr.pos))?;
    }
    for op_expr in &expr.ops {
        match op_expr.op {
            Operator::And => {
                if v.is_truthy() {
                    v = eval_expression(s, &op_expr.expr)?;
                }
            }
            Operator::Or => {
                if !v.is_truthy() {
                    v = eval_expression(s, &op_expr.expr)?;
                }
            }
            op => {
                let rhs = eval_expression(s, &op_expr.expr)?;
                v = ops::apply_binary(op, &v, &rhs).map_err(|e| e.at(expr.pos))?;
            }
        }
    }
    if expr.unary == Some(UnaryOp::Not) {
        v = Value::Bool(!v.is_truthy());
    }
    Ok(v)
}

fn eval_value_expression(
    s: &Arc<Scope>,
    ve: &ValueExpression,
    pos: Position,
) -> EvalResult<Value> {
    let mut v = match &ve.kind {
        ValueKind::String(text) => Value::string(text),
        ValueKind::FString(f) => eval_fstring(s, f).map_err(|e| e.at(pos))?,
        ValueKind::Int(i) => Value::Int(*i),
        ValueKind::Bool(Some(b)) => Value::Bool(*b),
        ValueKind::Bool(None) => Value::None,
        ValueKind::List(l) | ValueKind::Tuple(l) => eval_list(s, l)?,
        ValueKind::Dict(d) => eval_dict(s, d)?,
        ValueKind::Lambda(l) => eval_lambda(s, l),
        ValueKind::Ident(ie) => eval_ident_expr(s, ie)?,
    };
    if let Some(slice) = &ve.slice {
        v = eval_slice(s, v, slice).map_err(|e| e.at(pos))?;
    }
    if let Some(prop) = &ve.property {
        v = v.property(&prop.name).map_err(|e| e.at(prop.pos))?;
        v = apply_ident_actions(s, v, &prop.actions, prop.pos)?;
    }
    if let Some(call) = &ve.call {
        v = call_value(s, v, call, pos)?;
    }
    Ok(v)
}

fn eval_ident_expr(s: &Arc<Scope>, ie: &IdentExpr) -> EvalResult<Value> {
    let v = s.lookup(&ie.name).map_err(|e| e.at(ie.pos))?;
    apply_ident_actions(s, v, &ie.actions, ie.pos)
}

fn apply_ident_actions(
    s: &Arc<Scope>,
    mut v: Value,
    actions: &[IdentExprAction],
    pos: Position,
) -> EvalResult<Value> {
    for action in actions {
        match action {
            IdentExprAction::Property(ie) => {
                v = v.property(&ie.name).map_err(|e| e.at(ie.pos))?;
                v = apply_ident_actions(s, v, &ie.actions, ie.pos)?;
            }
            IdentExprAction::Call(args) => {
                v = call_value(s, v, args, pos)?;
            }
        }
    }
    Ok(v)
}

fn eval_lambda(s: &Arc<Scope>, l: &LambdaExpression) -> Value {
    let body: Vec<Statement> = vec![Statement::of(StatementKind::Return(Some(l.expr.clone())))];
    Value::Function(Arc::new(FuncDef {
        name: "<lambda>".to_owned(),
        params: l.arguments.iter().map(param_from_def).collect(),
        varargs: false,
        kwargs: false,
        keywords_only: false,
        return_type: None,
        code: FuncCode::User(body.into()),
        capture: Some(s.clone()),
        self_value: None,
    }))
}

fn eval_list(s: &Arc<Scope>, l: &ListExpression) -> EvalResult<Value> {
    if let Some(comp) = &l.comprehension {
        let element = &l.values[0];
        let mut out = Vec::new();
        for_each_comprehension(s, comp, |child| {
            out.push(eval_expression(child, element)?);
            Ok(())
        })?;
        return Ok(Value::list(out));
    }
    let mut out = Vec::with_capacity(l.values.len());
    for e in &l.values {
        out.push(eval_expression(s, e)?);
    }
    Ok(Value::list(out))
}

fn eval_dict(s: &Arc<Scope>, d: &crate::ast::DictExpression) -> EvalResult<Value> {
    let mut out = HashMap::new();
    let mut insert = |k: Value, v: Value, out: &mut HashMap<String, Value>| -> EvalResult<()> {
        match k {
            Value::String(key) => {
                out.insert(key.to_string(), v);
                Ok(())
            }
            other => Err(EvalError::type_error(format!(
                "keys must be strings, not {}",
                other.type_name()
            ))),
        }
    };
    if let Some(comp) = &d.comprehension {
        let (key_expr, value_expr) = &d.items[0];
        for_each_comprehension(s, comp, |child| {
            let k = eval_expression(child, key_expr)?;
            let v = eval_expression(child, value_expr)?;
            insert(k, v, &mut out)
        })?;
    } else {
        for (key_expr, value_expr) in &d.items {
            let k = eval_expression(s, key_expr)?;
            let v = eval_expression(s, value_expr)?;
            insert(k, v, &mut out)?;
        }
    }
    Ok(Value::dict(out))
}

/// Drives a comprehension, calling `emit` once per produced element with
/// the child scope the loop variables are bound in. Bindings never leak to
/// the enclosing scope.
fn for_each_comprehension(
    s: &Arc<Scope>,
    comp: &Comprehension,
    mut emit: impl FnMut(&Arc<Scope>) -> EvalResult<()>,
) -> EvalResult<()> {
    let child = s.child();
    let outer = eval_expression(&child, &comp.expr)?;
    for item in outer.iterate()? {
        bind_names(&child, &comp.names, item)?;
        if let Some(second) = &comp.second {
            let inner = eval_expression(&child, &second.expr)?;
            for inner_item in inner.iterate()? {
                bind_names(&child, &second.names, inner_item)?;
                if passes_condition(&child, comp)? {
                    emit(&child)?;
                }
            }
        } else if passes_condition(&child, comp)? {
            emit(&child)?;
        }
    }
    Ok(())
}

fn passes_condition(s: &Arc<Scope>, comp: &Comprehension) -> EvalResult<bool> {
    match &comp.condition {
        Some(cond) => Ok(eval_expression(s, cond)?.is_truthy()),
        None => Ok(true),
    }
}

fn eval_fstring(s: &Arc<Scope>, f: &crate::ast::FString) -> EvalResult<Value> {
    let mut out = String::with_capacity(f.suffix.len() + 32);
    for seg in &f.segments {
        out.push_str(&seg.prefix);
        let mut v = match s.get(&seg.var[0]) {
            Some(v) => v,
            None => s
                .config()
                .and_then(|cfg| cfg.property(&seg.var[0]).ok())
                .ok_or_else(|| EvalError::name_error(&seg.var[0]))?,
        };
        for part in &seg.var[1..] {
            v = v.property(part)?;
        }
        out.push_str(&v.to_string());
    }
    out.push_str(&f.suffix);
    Ok(Value::string(out))
}

fn eval_slice(s: &Arc<Scope>, v: Value, slice: &SliceExpression) -> EvalResult<Value> {
    if !slice.colon {
        let index_expr = slice
            .start
            .as_ref()
            .ok_or_else(|| EvalError::value_error("missing subscript"))?;
        let idx = eval_expression(s, index_expr)?;
        return v.index(&idx);
    }
    let start = eval_bound(s, &slice.start)?;
    let end = eval_bound(s, &slice.end)?;
    match &v {
        Value::String(text) => {
            let chars: Vec<char> = text.chars().collect();
            let (a, b) = slice_bounds(chars.len(), start, end);
            Ok(Value::string(chars[a..b].iter().collect::<String>()))
        }
        Value::List(l) | Value::FrozenList(l) => {
            let items = l.read();
            let (a, b) = slice_bounds(items.len(), start, end);
            Ok(Value::list(items[a..b].to_vec()))
        }
        _ => Err(EvalError::type_error(format!(
            "'{}' object cannot be sliced",
            v.type_name()
        ))),
    }
}

fn eval_bound(s: &Arc<Scope>, e: &Option<Expression>) -> EvalResult<Option<i64>> {
    match e {
        None => Ok(None),
        Some(e) => {
            let v = eval_expression(s, e)?;
            v.as_int().map(Some).ok_or_else(|| {
                EvalError::type_error(format!(
                    "slice indices must be integers, not {}",
                    v.type_name()
                ))
            })
        }
    }
}

/// Slice bounds clamp: negative indices count from the end, anything past
/// either end clamps rather than failing.
fn slice_bounds(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let clamp = |i: i64| -> usize {
        let adjusted = if i < 0 { i + len as i64 } else { i };
        adjusted.clamp(0, len as i64) as usize
    };
    let a = start.map_or(0, clamp);
    let b = end.map_or(len, clamp);
    (a, a.max(b))
}

/// Calls whatever `callee` is with the given syntactic arguments.
pub fn call_value(
    s: &Arc<Scope>,
    callee: Value,
    args: &CallArguments,
    pos: Position,
) -> EvalResult<Value> {
    let f = match &callee {
        Value::Function(f) => f.clone(),
        other => {
            return Err(
                EvalError::type_error(format!("'{}' object is not callable", other.type_name()))
                    .at(pos),
            );
        }
    };
    let mut positional = Vec::new();
    let mut keywords = Vec::new();
    for arg in &args.args {
        let v = eval_expression(s, &arg.value)?;
        match &arg.name {
            Some(name) => keywords.push((name.clone(), v)),
            None => {
                if !keywords.is_empty() {
                    return Err(EvalError::type_error(
                        "positional argument follows keyword argument",
                    )
                    .at(pos));
                }
                positional.push(v);
            }
        }
    }
    call_function(s, &f, positional, keywords, pos)
}

/// The call protocol: binds arguments to parameter slots (self first, then
/// positional, then keywords via name or alias), applies defaults and the
/// None-means-default rule, enforces type whitelists, then runs the body.
pub fn call_function(
    s: &Arc<Scope>,
    f: &Arc<FuncDef>,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
    pos: Position,
) -> EvalResult<Value> {
    let nparams = f.params.len();
    let mut slots: Vec<Option<Value>> = std::iter::repeat_with(|| None).take(nparams).collect();
    let mut extra_positional = Vec::new();
    let mut extra_keywords: Vec<(String, Value)> = Vec::new();

    let self_offset = usize::from(f.self_value.is_some());
    if let Some(receiver) = &f.self_value {
        slots[0] = Some(receiver.clone());
    }
    if f.keywords_only && !positional.is_empty() {
        return Err(EvalError::type_error(format!(
            "{} can only be called with keyword arguments",
            f.name
        ))
        .at(pos));
    }
    let given = positional.len();
    let mut next = self_offset;
    for v in positional {
        if next < nparams {
            slots[next] = Some(v);
            next += 1;
        } else if f.varargs {
            extra_positional.push(v);
        } else {
            return Err(EvalError::arity(&f.name, nparams - self_offset, given).at(pos));
        }
    }
    for (name, v) in keywords {
        match f.params.iter().position(|p| p.matches_name(&name)) {
            Some(i) => {
                if slots[i].is_some() {
                    return Err(EvalError::type_error(format!(
                        "{} got multiple values for argument '{}'",
                        f.name, name
                    ))
                    .at(pos));
                }
                slots[i] = Some(v);
            }
            None => {
                if f.kwargs {
                    extra_keywords.push((name, v));
                } else {
                    return Err(EvalError::type_error(format!(
                        "unexpected argument to {}: {}",
                        f.name, name
                    ))
                    .at(pos));
                }
            }
        }
    }

    let mut bound = Vec::with_capacity(nparams + extra_positional.len());
    for (i, p) in f.params.iter().enumerate() {
        let v = match slots[i].take() {
            Some(v) => {
                if p.accepts_type(&v) {
                    v
                } else if matches!(v, Value::None) && p.has_default() {
                    // None for a typed parameter means "use the default".
                    default_value(f, p)?
                } else {
                    return Err(EvalError::type_error(format!(
                        "invalid type for argument '{}' to {}; expected {}, was {}",
                        p.name,
                        f.name,
                        p.types.join(" or "),
                        v.type_name()
                    ))
                    .at(pos));
                }
            }
            None => {
                if p.has_default() {
                    default_value(f, p)?
                } else {
                    return Err(EvalError::type_error(format!(
                        "missing required argument to {}: {}",
                        f.name, p.name
                    ))
                    .at(pos));
                }
            }
        };
        bound.push(v);
    }

    match &f.code {
        FuncCode::Native(native) => {
            bound.extend(extra_positional);
            if f.kwargs {
                let mut d = HashMap::new();
                for (k, v) in extra_keywords {
                    d.insert(k, v);
                }
                bound.push(Value::dict(d));
            }
            native(s, &bound).map_err(|e| e.at(pos))
        }
        FuncCode::User(stmts) => {
            let capture = f.capture.as_ref().ok_or_else(|| {
                EvalError::type_error(format!("{} has no definition scope", f.name))
            })?;
            let call_scope = capture.call_child(s.pkg.clone(), s.callback);
            if let Some(cfg) = s.config() {
                call_scope.set_local("CONFIG", cfg);
            }
            for (p, v) in f.params.iter().zip(bound) {
                call_scope.set_local(p.name.clone(), v);
            }
            for (k, v) in extra_keywords {
                call_scope.set_local(k, v);
            }
            let ret = match eval_statements(&call_scope, stmts)? {
                Flow::Return(v) => v,
                _ => Value::None,
            };
            if let Some(expected) = &f.return_type {
                if ret.type_name() != expected {
                    return Err(EvalError::type_error(format!(
                        "invalid return type {} from {}, expected {}",
                        ret.type_name(),
                        f.name,
                        expected
                    ))
                    .at(pos));
                }
            }
            Ok(ret)
        }
    }
}

fn default_value(f: &FuncDef, p: &Param) -> EvalResult<Value> {
    if let Some(c) = &p.constant {
        return Ok(c.clone());
    }
    let expr = p
        .default
        .as_ref()
        .expect("has_default checked before default_value");
    let capture = f.capture.as_ref().ok_or_else(|| {
        EvalError::type_error(format!("{} has no definition scope", f.name))
    })?;
    eval_expression(capture, expr)
}

/// Runs a pre/post-build callback: a fresh scope in the function's capture
/// package with the Callback marker set, arguments bound positionally.
pub fn run_callback(f: &Arc<FuncDef>, args: &[Value]) -> EvalResult<Value> {
    let capture = f
        .capture
        .as_ref()
        .ok_or_else(|| EvalError::type_error("callbacks must be user-defined functions"))?;
    let stmts = match &f.code {
        FuncCode::User(stmts) => stmts.clone(),
        FuncCode::Native(_) => {
            return Err(EvalError::type_error(
                "callbacks must be user-defined functions",
            ));
        }
    };
    let cb_scope = capture.callback_child(capture.pkg.clone());
    for (p, v) in f.params.iter().zip(args.iter()) {
        cb_scope.set_local(p.name.clone(), v.clone());
    }
    match eval_statements(&cb_scope, &stmts)? {
        Flow::Return(v) => Ok(v),
        _ => Ok(Value::None),
    }
}

/// The streaming path for the optimized `"sep".join(...)`; elements are
/// appended to the output as they are produced, with no intermediate list.
fn eval_optimised_join(
    s: &Arc<Scope>,
    separator: &str,
    list: &ListExpression,
) -> EvalResult<Value> {
    let mut out = String::new();
    let mut first = true;
    let mut emit = |v: Value, out: &mut String, first: &mut bool| -> EvalResult<()> {
        let text = v.as_str().ok_or_else(|| {
            EvalError::type_error(format!(
                "sequence item for join must be str, not {}",
                v.type_name()
            ))
        })?;
        if !*first {
            out.push_str(separator);
        }
        *first = false;
        out.push_str(text);
        Ok(())
    };
    if let Some(comp) = &list.comprehension {
        let element = &list.values[0];
        for_each_comprehension(s, comp, |child| {
            let v = eval_expression(child, element)?;
            emit(v, &mut out, &mut first)
        })?;
    } else {
        for e in &list.values {
            let v = eval_expression(s, e)?;
            emit(v, &mut out, &mut first)?;
        }
    }
    Ok(Value::string(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CallArgument, SecondFor};
    use crate::config::BuildConfig;
    use crate::interpreter::State;

    fn scope() -> Arc<Scope> {
        let state = State::for_testing(BuildConfig::default());
        let root = Scope::builtin_root(state);
        crate::builtins::register_builtins(&root);
        root.child()
    }

    fn eval_stmts(s: &Arc<Scope>, stmts: &[Statement]) {
        eval_statements(s, stmts).unwrap();
    }

    #[test]
    fn test_addition_assignment() {
        let s = scope();
        eval_stmts(
            &s,
            &[Statement::assign(
                "y",
                Expression::int(3).op(Operator::Add, Expression::int(4)),
            )],
        );
        let y = s.get("y").unwrap();
        assert_eq!(y, Value::Int(7));
        assert!(y.is_truthy());
    }

    #[test]
    fn test_string_interpolation_operator() {
        let s = scope();
        eval_stmts(
            &s,
            &[Statement::assign(
                "x",
                Expression::string("//abc:%s").op(Operator::Modulo, Expression::string("123")),
            )],
        );
        assert_eq!(s.get("x").unwrap(), Value::string("//abc:123"));
    }

    #[test]
    fn test_lazy_and_or() {
        let s = scope();
        // "boom" is undefined; laziness means it must never be evaluated.
        eval_stmts(
            &s,
            &[
                Statement::assign(
                    "a",
                    Expression::int(0).op(Operator::And, Expression::ident("boom")),
                ),
                Statement::assign(
                    "b",
                    Expression::int(7).op(Operator::Or, Expression::ident("boom")),
                ),
            ],
        );
        assert_eq!(s.get("a").unwrap(), Value::Int(0));
        assert_eq!(s.get("b").unwrap(), Value::Int(7));
    }

    #[test]
    fn test_for_loop_with_continue() {
        let s = scope();
        // total = 0; for x in [1, 2, 3, 4]: if x == 2: continue; total += x
        let body = vec![
            Statement::of(StatementKind::If(crate::ast::IfStatement {
                condition: Expression::ident("x").op(Operator::Equal, Expression::int(2)),
                statements: vec![Statement::of(StatementKind::Continue)],
                elif: vec![],
                else_statements: vec![],
            })),
            Statement::aug_assign("total", Expression::ident("x")),
        ];
        eval_stmts(
            &s,
            &[
                Statement::assign("total", Expression::int(0)),
                Statement::of(StatementKind::For(crate::ast::ForStatement {
                    names: vec!["x".to_owned()],
                    expr: Expression::list(vec![
                        Expression::int(1),
                        Expression::int(2),
                        Expression::int(3),
                        Expression::int(4),
                    ]),
                    statements: body,
                })),
            ],
        );
        assert_eq!(s.get("total").unwrap(), Value::Int(8));
    }

    #[test]
    fn test_function_call_with_defaults_and_keywords() {
        let s = scope();
        // def f(a, b=10): return a + b
        let fd = FuncDefStatement {
            name: "f".to_owned(),
            arguments: vec![
                crate::ast::ArgumentDef::new("a"),
                crate::ast::ArgumentDef {
                    name: "b".to_owned(),
                    value: Some(Expression::int(10)),
                    ..Default::default()
                },
            ],
            docstring: None,
            statements: vec![Statement::ret(
                Expression::ident("a").op(Operator::Add, Expression::ident("b")),
            )],
            return_type: None,
            keywords_only: false,
        };
        eval_stmts(&s, &[Statement::of(StatementKind::FuncDef(fd))]);
        let call = Expression::call("f", vec![CallArgument::positional(Expression::int(1))]);
        assert_eq!(eval_expression(&s, &call).unwrap(), Value::Int(11));

        let call = Expression::call(
            "f",
            vec![
                CallArgument::keyword("b", Expression::int(2)),
                CallArgument::keyword("a", Expression::int(5)),
            ],
        );
        assert_eq!(eval_expression(&s, &call).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_typed_param_none_uses_default() {
        let s = scope();
        let fd = FuncDefStatement {
            name: "f".to_owned(),
            arguments: vec![crate::ast::ArgumentDef {
                name: "deps".to_owned(),
                types: vec!["list".to_owned()],
                value: Some(Expression::list(vec![])),
                ..Default::default()
            }],
            docstring: None,
            statements: vec![Statement::ret(Expression::ident("deps"))],
            return_type: None,
            keywords_only: false,
        };
        eval_stmts(&s, &[Statement::of(StatementKind::FuncDef(fd))]);
        let call = Expression::call("f", vec![CallArgument::positional(Expression::none())]);
        assert_eq!(eval_expression(&s, &call).unwrap(), Value::list(vec![]));

        // A genuinely wrong type still fails.
        let call = Expression::call("f", vec![CallArgument::positional(Expression::int(1))]);
        assert!(eval_expression(&s, &call).is_err());
    }

    #[test]
    fn test_keywords_only_function_rejects_positional() {
        let s = scope();
        let fd = FuncDefStatement {
            name: "f".to_owned(),
            arguments: vec![crate::ast::ArgumentDef::new("a")],
            docstring: None,
            statements: vec![Statement::ret(Expression::ident("a"))],
            return_type: None,
            keywords_only: true,
        };
        eval_stmts(&s, &[Statement::of(StatementKind::FuncDef(fd))]);
        let call = Expression::call("f", vec![CallArgument::positional(Expression::int(1))]);
        assert!(eval_expression(&s, &call).is_err());
        let call = Expression::call("f", vec![CallArgument::keyword("a", Expression::int(1))]);
        assert_eq!(eval_expression(&s, &call).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_parameter_alias_resolves() {
        let s = scope();
        let fd = FuncDefStatement {
            name: "f".to_owned(),
            arguments: vec![crate::ast::ArgumentDef {
                name: "deps".to_owned(),
                aliases: vec!["dependencies".to_owned()],
                ..Default::default()
            }],
            docstring: None,
            statements: vec![Statement::ret(Expression::ident("deps"))],
            return_type: None,
            keywords_only: false,
        };
        eval_stmts(&s, &[Statement::of(StatementKind::FuncDef(fd))]);
        let call = Expression::call(
            "f",
            vec![CallArgument::keyword("dependencies", Expression::int(3))],
        );
        assert_eq!(eval_expression(&s, &call).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_declared_return_type_enforced() {
        let s = scope();
        let fd = FuncDefStatement {
            name: "f".to_owned(),
            arguments: vec![],
            docstring: None,
            statements: vec![Statement::ret(Expression::int(1))],
            return_type: Some("str".to_owned()),
            keywords_only: false,
        };
        eval_stmts(&s, &[Statement::of(StatementKind::FuncDef(fd))]);
        let call = Expression::call("f", vec![]);
        let err = eval_expression(&s, &call).unwrap_err();
        assert!(format!("{err}").contains("invalid return type"));
    }

    #[test]
    fn test_unknown_keyword_argument_fails() {
        let s = scope();
        let fd = FuncDefStatement {
            name: "f".to_owned(),
            arguments: vec![crate::ast::ArgumentDef::new("a")],
            docstring: None,
            statements: vec![Statement::ret(Expression::ident("a"))],
            return_type: None,
            keywords_only: false,
        };
        eval_stmts(&s, &[Statement::of(StatementKind::FuncDef(fd))]);
        let call = Expression::call(
            "f",
            vec![
                CallArgument::keyword("a", Expression::int(1)),
                CallArgument::keyword("zzz", Expression::int(2)),
            ],
        );
        assert!(eval_expression(&s, &call).is_err());
    }

    #[test]
    fn test_return_unwinds_loops() {
        let s = scope();
        // def f(): for x in [1, 2, 3]: if x == 2: return x
        let fd = FuncDefStatement {
            name: "f".to_owned(),
            arguments: vec![],
            docstring: None,
            statements: vec![Statement::of(StatementKind::For(crate::ast::ForStatement {
                names: vec!["x".to_owned()],
                expr: Expression::list(vec![
                    Expression::int(1),
                    Expression::int(2),
                    Expression::int(3),
                ]),
                statements: vec![Statement::of(StatementKind::If(crate::ast::IfStatement {
                    condition: Expression::ident("x").op(Operator::Equal, Expression::int(2)),
                    statements: vec![Statement::ret(Expression::ident("x"))],
                    elif: vec![],
                    else_statements: vec![],
                }))],
            }))],
            return_type: None,
            keywords_only: false,
        };
        eval_stmts(&s, &[Statement::of(StatementKind::FuncDef(fd))]);
        let call = Expression::call("f", vec![]);
        assert_eq!(eval_expression(&s, &call).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_list_comprehension_with_condition() {
        let s = scope();
        // [x * 2 for x in [1, 2, 3] if x != 2]
        let comp = ListExpression {
            values: vec![Expression::ident("x").op(Operator::Multiply, Expression::int(2))],
            comprehension: Some(Comprehension {
                names: vec!["x".to_owned()],
                expr: Box::new(Expression::list(vec![
                    Expression::int(1),
                    Expression::int(2),
                    Expression::int(3),
                ])),
                second: None,
                condition: Some(Box::new(
                    Expression::ident("x").op(Operator::NotEqual, Expression::int(2)),
                )),
            }),
        };
        let e = Expression::of(Position::default(), ValueKind::List(comp));
        let v = eval_expression(&s, &e).unwrap();
        assert_eq!(v, Value::list(vec![Value::Int(2), Value::Int(6)]));
        // Comprehension variables do not leak.
        assert!(s.get("x").is_none());
    }

    #[test]
    fn test_double_comprehension() {
        let s = scope();
        // [y for x in [[1, 2], [3]] for y in x]
        let comp = ListExpression {
            values: vec![Expression::ident("y")],
            comprehension: Some(Comprehension {
                names: vec!["x".to_owned()],
                expr: Box::new(Expression::list(vec![
                    Expression::list(vec![Expression::int(1), Expression::int(2)]),
                    Expression::list(vec![Expression::int(3)]),
                ])),
                second: Some(SecondFor {
                    names: vec!["y".to_owned()],
                    expr: Box::new(Expression::ident("x")),
                }),
                condition: None,
            }),
        };
        let e = Expression::of(Position::default(), ValueKind::List(comp));
        let v = eval_expression(&s, &e).unwrap();
        assert_eq!(
            v,
            Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_empty_comprehension_yields_empty_list() {
        let s = scope();
        let comp = ListExpression {
            values: vec![Expression::ident("x")],
            comprehension: Some(Comprehension {
                names: vec!["x".to_owned()],
                expr: Box::new(Expression::list(vec![])),
                second: None,
                condition: None,
            }),
        };
        let e = Expression::of(Position::default(), ValueKind::List(comp));
        assert_eq!(eval_expression(&s, &e).unwrap(), Value::list(vec![]));
    }

    #[test]
    fn test_slice_clamps_past_end() {
        let s = scope();
        let e = Expression::of(
            Position::default(),
            ValueKind::String("hello".to_owned()),
        );
        let mut e = e;
        e.val.slice = Some(Box::new(SliceExpression {
            start: Some(Expression::int(1)),
            colon: true,
            end: Some(Expression::int(100)),
        }));
        assert_eq!(eval_expression(&s, &e).unwrap(), Value::string("ello"));
    }

    #[test]
    fn test_inline_if_is_lazy() {
        let s = scope();
        // "boom" if False else "ok"
        let mut e = Expression::string("unused");
        e.val.kind = ValueKind::Ident(Box::new(IdentExpr {
            pos: Position::default(),
            name: "boom".to_owned(),
            actions: vec![],
        }));
        e.if_else = Some(Box::new(crate::ast::InlineIf {
            condition: Expression::bool_(false),
            else_: Expression::string("ok"),
        }));
        assert_eq!(eval_expression(&s, &e).unwrap(), Value::string("ok"));
    }

    #[test]
    fn test_unpack_assignment() {
        let s = scope();
        eval_stmts(
            &s,
            &[Statement::of(StatementKind::Ident(crate::ast::IdentStatement {
                name: "a".to_owned(),
                action: IdentAction::Unpack {
                    names: vec!["a".to_owned(), "b".to_owned()],
                    expr: Expression::list(vec![Expression::int(1), Expression::int(2)]),
                },
            }))],
        );
        assert_eq!(s.get("a").unwrap(), Value::Int(1));
        assert_eq!(s.get("b").unwrap(), Value::Int(2));

        let bad = Statement::of(StatementKind::Ident(crate::ast::IdentStatement {
            name: "a".to_owned(),
            action: IdentAction::Unpack {
                names: vec!["a".to_owned(), "b".to_owned()],
                expr: Expression::list(vec![Expression::int(1)]),
            },
        }));
        assert!(eval_statements(&s, &[bad]).is_err());
    }

    #[test]
    fn test_assert_failure_message() {
        let s = scope();
        let stmt = Statement::of(StatementKind::Assert {
            expr: Expression::bool_(false),
            message: Some(Expression::string("wanted a name")),
        });
        let err = eval_statements(&s, &[stmt]).unwrap_err();
        assert_eq!(format!("{err}"), "assertion failed: wanted a name");
    }

    #[test]
    fn test_fstring_resolves_locals_then_config() {
        let s = scope();
        s.set_local("name", Value::string("lib"));
        let f = crate::ast::FString {
            segments: vec![crate::ast::FStringVar {
                prefix: "name=".to_owned(),
                var: vec!["name".to_owned()],
            }],
            suffix: "!".to_owned(),
        };
        let e = Expression::of(Position::default(), ValueKind::FString(f));
        assert_eq!(eval_expression(&s, &e).unwrap(), Value::string("name=lib!"));
    }
}
