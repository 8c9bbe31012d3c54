// ABOUTME: Pre-interpretation pass attaching optimization annotations to
// the AST without changing evaluation semantics

use crate::ast::{
    Expression, IdentExprAction, Optimised, Statement, StatementKind, UnaryOp, ValueKind,
};
use crate::value::Value;

/// Rewrites the statements in place, attaching annotations the evaluator
/// uses to skip work: constants, direct local lookups, direct config
/// lookups, and the streaming join fast path. Runs exactly once, before the
/// statements are first interpreted. Anything not certainly equivalent is
/// left unannotated.
pub fn optimise(stmts: &mut [Statement]) {
    for stmt in stmts {
        optimise_statement(stmt);
    }
}

fn optimise_statement(stmt: &mut Statement) {
    match &mut stmt.kind {
        StatementKind::FuncDef(fd) => {
            for arg in &mut fd.arguments {
                if let Some(default) = &mut arg.value {
                    optimise_expression(default);
                }
            }
            optimise(&mut fd.statements);
        }
        StatementKind::For(f) => {
            optimise_expression(&mut f.expr);
            optimise(&mut f.statements);
        }
        StatementKind::If(ifs) => {
            optimise_expression(&mut ifs.condition);
            optimise(&mut ifs.statements);
            for (cond, body) in &mut ifs.elif {
                optimise_expression(cond);
                optimise(body);
            }
            optimise(&mut ifs.else_statements);
        }
        StatementKind::Return(Some(e)) => optimise_expression(e),
        StatementKind::Return(None) | StatementKind::Pass | StatementKind::Continue => {}
        StatementKind::Assert { expr, message } => {
            optimise_expression(expr);
            if let Some(m) = message {
                optimise_expression(m);
            }
        }
        StatementKind::Raise(e) => optimise_expression(e),
        StatementKind::Expression(e) => optimise_expression(e),
        StatementKind::Ident(ident) => match &mut ident.action {
            crate::ast::IdentAction::Assign(e) | crate::ast::IdentAction::AugAssign(e) => {
                optimise_expression(e);
            }
            crate::ast::IdentAction::IndexAssign { index, value, .. } => {
                optimise_expression(index);
                optimise_expression(value);
            }
            crate::ast::IdentAction::Unpack { expr, .. } => optimise_expression(expr),
            crate::ast::IdentAction::Call(args) => {
                for arg in &mut args.args {
                    optimise_expression(&mut arg.value);
                }
            }
        },
    }
}

fn optimise_comprehension(comp: &mut crate::ast::Comprehension) {
    optimise_expression(&mut comp.expr);
    if let Some(second) = &mut comp.second {
        optimise_expression(&mut second.expr);
    }
    if let Some(condition) = &mut comp.condition {
        optimise_expression(condition);
    }
}

fn optimise_expression(expr: &mut Expression) {
    optimise_children(expr);
    expr.optimised = annotate(expr);
}

fn optimise_children(expr: &mut Expression) {
    optimise_value_children(&mut expr.val);
    for op in &mut expr.ops {
        optimise_expression(&mut op.expr);
    }
    if let Some(inline) = &mut expr.if_else {
        optimise_expression(&mut inline.condition);
        optimise_expression(&mut inline.else_);
    }
}

fn optimise_value_children(ve: &mut crate::ast::ValueExpression) {
    match &mut ve.kind {
        ValueKind::List(l) | ValueKind::Tuple(l) => {
            for e in &mut l.values {
                optimise_expression(e);
            }
            if let Some(comp) = &mut l.comprehension {
                optimise_comprehension(comp);
            }
        }
        ValueKind::Dict(d) => {
            for (k, v) in &mut d.items {
                optimise_expression(k);
                optimise_expression(v);
            }
            if let Some(comp) = &mut d.comprehension {
                optimise_comprehension(comp);
            }
        }
        ValueKind::Lambda(l) => {
            for arg in &mut l.arguments {
                if let Some(default) = &mut arg.value {
                    optimise_expression(default);
                }
            }
            optimise_expression(&mut l.expr);
        }
        ValueKind::Ident(ie) => optimise_ident_actions(ie),
        ValueKind::String(_)
        | ValueKind::FString(_)
        | ValueKind::Int(_)
        | ValueKind::Bool(_) => {}
    }
    if let Some(slice) = &mut ve.slice {
        if let Some(e) = &mut slice.start {
            optimise_expression(e);
        }
        if let Some(e) = &mut slice.end {
            optimise_expression(e);
        }
    }
    if let Some(prop) = &mut ve.property {
        optimise_ident_actions(prop);
    }
    if let Some(call) = &mut ve.call {
        for arg in &mut call.args {
            optimise_expression(&mut arg.value);
        }
    }
}

fn optimise_ident_actions(ie: &mut crate::ast::IdentExpr) {
    for action in &mut ie.actions {
        match action {
            IdentExprAction::Property(inner) => optimise_ident_actions(inner),
            IdentExprAction::Call(args) => {
                for arg in &mut args.args {
                    optimise_expression(&mut arg.value);
                }
            }
        }
    }
}

fn annotate(expr: &Expression) -> Option<Optimised> {
    if let Some(v) = fold_constant(expr) {
        return Some(Optimised::Constant(v));
    }
    if expr.unary.is_some() || !expr.ops.is_empty() || expr.if_else.is_some() {
        return None;
    }
    let ve = &expr.val;
    if ve.slice.is_some() || ve.call.is_some() {
        return None;
    }
    // Direct local and CONFIG.NAME lookups.
    if ve.property.is_none() {
        if let ValueKind::Ident(ie) = &ve.kind {
            match ie.actions.as_slice() {
                [] => return Some(Optimised::Local(ie.name.clone())),
                [IdentExprAction::Property(p)] if ie.name == "CONFIG" && p.actions.is_empty() => {
                    return Some(Optimised::Config(p.name.clone()));
                }
                _ => return None,
            }
        }
        return None;
    }
    // "sep".join([...]) and "sep".join([... for ... in ...]).
    if let (ValueKind::String(sep), Some(prop)) = (&ve.kind, &ve.property) {
        if prop.name != "join" {
            return None;
        }
        if let [IdentExprAction::Call(args)] = prop.actions.as_slice() {
            if args.args.len() != 1 || args.args[0].name.is_some() {
                return None;
            }
            let arg = &args.args[0].value;
            if arg.unary.is_some() || !arg.ops.is_empty() || arg.if_else.is_some() {
                return None;
            }
            let av = &arg.val;
            if av.slice.is_some() || av.property.is_some() || av.call.is_some() {
                return None;
            }
            if let ValueKind::List(list) = &av.kind {
                return Some(Optimised::Join {
                    separator: sep.clone(),
                    list: list.clone(),
                });
            }
        }
    }
    None
}

/// Evaluates an expression in the empty environment if it consists solely
/// of scalar literals. Mutable collection literals are never folded: the
/// cached value would be shared between evaluations.
fn fold_constant(expr: &Expression) -> Option<Value> {
    if !expr.ops.is_empty() || expr.if_else.is_some() {
        return None;
    }
    let ve = &expr.val;
    if ve.slice.is_some() || ve.property.is_some() || ve.call.is_some() {
        return None;
    }
    let v = match &ve.kind {
        ValueKind::Int(i) => Value::Int(*i),
        ValueKind::String(s) => Value::string(s),
        ValueKind::Bool(Some(b)) => Value::Bool(*b),
        ValueKind::Bool(None) => Value::None,
        ValueKind::FString(f) if f.segments.is_empty() => Value::string(&f.suffix),
        _ => return None,
    };
    match expr.unary {
        None => Some(v),
        Some(UnaryOp::Negate) => match v {
            Value::Int(i) => Some(Value::Int(-i)),
            _ => None,
        },
        Some(UnaryOp::Not) => Some(Value::Bool(!v.is_truthy())),
    }
}
