// ABOUTME: AST types for the build language, produced by an external parser
// and consumed by the optimizer and evaluator

use crate::value::Value;

/// A byte offset into the source of a build file. The interpreter never
/// inspects source text; positions travel on errors and a [`PositionTable`]
/// converts them to line and column for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position(pub u32);

/// Converts byte offsets to 1-based line/column pairs for one source file.
#[derive(Debug, Clone)]
pub struct PositionTable {
    line_starts: Vec<u32>,
}

impl PositionTable {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        PositionTable { line_starts }
    }

    /// Returns the (line, column) of a position, both 1-based.
    pub fn line_col(&self, pos: Position) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&pos.0) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, (pos.0 - self.line_starts[line]) as usize + 1)
    }
}

/// A single statement in a build file.
#[derive(Debug, Clone)]
pub struct Statement {
    pub pos: Position,
    pub kind: StatementKind,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    FuncDef(FuncDefStatement),
    For(ForStatement),
    If(IfStatement),
    Return(Option<Expression>),
    Assert {
        expr: Expression,
        message: Option<Expression>,
    },
    /// Deprecated; retained while build files still use it.
    Raise(Expression),
    Ident(IdentStatement),
    Expression(Expression),
    Pass,
    Continue,
}

#[derive(Debug, Clone)]
pub struct FuncDefStatement {
    pub name: String,
    pub arguments: Vec<ArgumentDef>,
    pub docstring: Option<String>,
    pub statements: Vec<Statement>,
    pub return_type: Option<String>,
    /// True for functions that must be called with keyword arguments only.
    pub keywords_only: bool,
}

/// One declared parameter of a function definition.
#[derive(Debug, Clone, Default)]
pub struct ArgumentDef {
    pub name: String,
    /// Accepted type names; empty means any type.
    pub types: Vec<String>,
    /// Alternative keyword names accepted for this parameter.
    pub aliases: Vec<String>,
    /// Default value expression, evaluated in the definition scope.
    pub value: Option<Expression>,
}

impl ArgumentDef {
    pub fn new(name: &str) -> Self {
        ArgumentDef {
            name: name.to_owned(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForStatement {
    pub names: Vec<String>,
    pub expr: Expression,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct IfStatement {
    pub condition: Expression,
    pub statements: Vec<Statement>,
    pub elif: Vec<(Expression, Vec<Statement>)>,
    pub else_statements: Vec<Statement>,
}

/// A statement that begins with an identifier: one of the assignment forms
/// or a direct call.
#[derive(Debug, Clone)]
pub struct IdentStatement {
    pub name: String,
    pub action: IdentAction,
}

#[derive(Debug, Clone)]
pub enum IdentAction {
    Assign(Expression),
    AugAssign(Expression),
    IndexAssign {
        index: Expression,
        value: Expression,
        augmented: bool,
    },
    /// `a, b = expr`; `names` holds every target including the leading one.
    Unpack {
        names: Vec<String>,
        expr: Expression,
    },
    Call(CallArguments),
}

/// An expression: an optional unary operator over a value, a flat tail of
/// (operator, rhs) pairs at one precedence level (the parser nests across
/// levels), an optional inline if, and the optimizer's annotation.
#[derive(Debug, Clone)]
pub struct Expression {
    pub pos: Position,
    pub unary: Option<UnaryOp>,
    pub val: ValueExpression,
    pub ops: Vec<OpExpression>,
    pub if_else: Option<Box<InlineIf>>,
    pub optimised: Option<Optimised>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone)]
pub struct OpExpression {
    pub op: Operator,
    pub expr: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
    In,
    NotIn,
    Is,
    IsNot,
    And,
    Or,
    Union,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThanOrEqual => ">=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Is => "is",
            Operator::IsNot => "is not",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Union => "|",
        }
    }
}

/// `val if condition else else_` (right-associative, lowest precedence).
#[derive(Debug, Clone)]
pub struct InlineIf {
    pub condition: Expression,
    pub else_: Expression,
}

/// The core of an expression: a literal, identifier, collection, or lambda,
/// with optional trailing slice, property access, and call.
#[derive(Debug, Clone)]
pub struct ValueExpression {
    pub kind: ValueKind,
    pub slice: Option<Box<SliceExpression>>,
    pub property: Option<Box<IdentExpr>>,
    pub call: Option<Box<CallArguments>>,
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    String(String),
    FString(FString),
    Int(i64),
    /// `Some(true)`/`Some(false)` are True/False; `None` is None.
    Bool(Option<bool>),
    List(ListExpression),
    /// A tuple literal; evaluates like a list.
    Tuple(ListExpression),
    Dict(DictExpression),
    Lambda(Box<LambdaExpression>),
    Ident(Box<IdentExpr>),
}

/// A list literal, or a list comprehension when `comprehension` is set, in
/// which case `values` holds exactly the element expression.
#[derive(Debug, Clone)]
pub struct ListExpression {
    pub values: Vec<Expression>,
    pub comprehension: Option<Comprehension>,
}

/// A dict literal, or a dict comprehension when `comprehension` is set, in
/// which case `items` holds exactly the key/value expression pair.
#[derive(Debug, Clone)]
pub struct DictExpression {
    pub items: Vec<(Expression, Expression)>,
    pub comprehension: Option<Comprehension>,
}

/// `for names in expr [for names2 in expr2] [if condition]`. The element
/// expression lives on the enclosing List/Dict expression.
#[derive(Debug, Clone)]
pub struct Comprehension {
    pub names: Vec<String>,
    pub expr: Box<Expression>,
    pub second: Option<SecondFor>,
    pub condition: Option<Box<Expression>>,
}

#[derive(Debug, Clone)]
pub struct SecondFor {
    pub names: Vec<String>,
    pub expr: Box<Expression>,
}

#[derive(Debug, Clone)]
pub struct LambdaExpression {
    pub arguments: Vec<ArgumentDef>,
    pub expr: Expression,
}

/// An identifier with a chain of property accesses and calls.
#[derive(Debug, Clone)]
pub struct IdentExpr {
    pub pos: Position,
    pub name: String,
    pub actions: Vec<IdentExprAction>,
}

#[derive(Debug, Clone)]
pub enum IdentExprAction {
    Property(Box<IdentExpr>),
    Call(CallArguments),
}

#[derive(Debug, Clone, Default)]
pub struct CallArguments {
    pub args: Vec<CallArgument>,
}

#[derive(Debug, Clone)]
pub struct CallArgument {
    pub name: Option<String>,
    pub value: Expression,
}

/// `[index]` when `colon` is false, `[start:end]` when true.
#[derive(Debug, Clone)]
pub struct SliceExpression {
    pub start: Option<Expression>,
    pub colon: bool,
    pub end: Option<Expression>,
}

/// An f-string: interpolation segments followed by a literal suffix. Each
/// segment is the literal text before one `{var}` or `{var.attr}` hole.
#[derive(Debug, Clone)]
pub struct FString {
    pub segments: Vec<FStringVar>,
    pub suffix: String,
}

#[derive(Debug, Clone)]
pub struct FStringVar {
    pub prefix: String,
    /// The dotted variable path, e.g. `["CONFIG", "ARCH"]`.
    pub var: Vec<String>,
}

/// The optimizer's verdict on an expression, attached once before
/// interpretation. See the optimize module.
#[derive(Debug, Clone)]
pub enum Optimised {
    Constant(Value),
    Local(String),
    Config(String),
    Join {
        separator: String,
        list: ListExpression,
    },
}

impl Expression {
    /// A bare expression around a value, positioned at `pos`.
    pub fn of(pos: Position, kind: ValueKind) -> Self {
        Expression {
            pos,
            unary: None,
            val: ValueExpression {
                kind,
                slice: None,
                property: None,
                call: None,
            },
            ops: Vec::new(),
            if_else: None,
            optimised: None,
        }
    }

    pub fn int(i: i64) -> Self {
        Self::of(Position::default(), ValueKind::Int(i))
    }

    pub fn string(s: &str) -> Self {
        Self::of(Position::default(), ValueKind::String(s.to_owned()))
    }

    pub fn bool_(b: bool) -> Self {
        Self::of(Position::default(), ValueKind::Bool(Some(b)))
    }

    pub fn none() -> Self {
        Self::of(Position::default(), ValueKind::Bool(None))
    }

    pub fn ident(name: &str) -> Self {
        Self::of(
            Position::default(),
            ValueKind::Ident(Box::new(IdentExpr {
                pos: Position::default(),
                name: name.to_owned(),
                actions: Vec::new(),
            })),
        )
    }

    pub fn list(values: Vec<Expression>) -> Self {
        Self::of(
            Position::default(),
            ValueKind::List(ListExpression {
                values,
                comprehension: None,
            }),
        )
    }

    pub fn dict(items: Vec<(Expression, Expression)>) -> Self {
        Self::of(
            Position::default(),
            ValueKind::Dict(DictExpression {
                items,
                comprehension: None,
            }),
        )
    }

    /// Chains a binary operator onto this expression.
    pub fn op(mut self, op: Operator, rhs: Expression) -> Self {
        self.ops.push(OpExpression { op, expr: rhs });
        self
    }

    /// A call on an identifier: `name(args...)`.
    pub fn call(name: &str, args: Vec<CallArgument>) -> Self {
        Self::of(
            Position::default(),
            ValueKind::Ident(Box::new(IdentExpr {
                pos: Position::default(),
                name: name.to_owned(),
                actions: vec![IdentExprAction::Call(CallArguments { args })],
            })),
        )
    }

    /// A method call on this expression: `expr.name(args...)`.
    pub fn method(mut self, name: &str, args: Vec<CallArgument>) -> Self {
        self.val.property = Some(Box::new(IdentExpr {
            pos: self.pos,
            name: name.to_owned(),
            actions: vec![IdentExprAction::Call(CallArguments { args })],
        }));
        self
    }

    /// A property access on this expression: `expr.name`.
    pub fn property(mut self, name: &str) -> Self {
        self.val.property = Some(Box::new(IdentExpr {
            pos: self.pos,
            name: name.to_owned(),
            actions: Vec::new(),
        }));
        self
    }

    /// Indexes this expression: `expr[index]`.
    pub fn index(mut self, index: Expression) -> Self {
        self.val.slice = Some(Box::new(SliceExpression {
            start: Some(index),
            colon: false,
            end: None,
        }));
        self
    }
}

impl CallArgument {
    pub fn positional(value: Expression) -> Self {
        CallArgument { name: None, value }
    }

    pub fn keyword(name: &str, value: Expression) -> Self {
        CallArgument {
            name: Some(name.to_owned()),
            value,
        }
    }
}

impl Statement {
    pub fn of(kind: StatementKind) -> Self {
        Statement {
            pos: Position::default(),
            kind,
        }
    }

    pub fn assign(name: &str, expr: Expression) -> Self {
        Self::of(StatementKind::Ident(IdentStatement {
            name: name.to_owned(),
            action: IdentAction::Assign(expr),
        }))
    }

    pub fn aug_assign(name: &str, expr: Expression) -> Self {
        Self::of(StatementKind::Ident(IdentStatement {
            name: name.to_owned(),
            action: IdentAction::AugAssign(expr),
        }))
    }

    pub fn expression(expr: Expression) -> Self {
        Self::of(StatementKind::Expression(expr))
    }

    pub fn ret(expr: Expression) -> Self {
        Self::of(StatementKind::Return(Some(expr)))
    }
}
