//! The expression AST. Extends the teacher's `config::types::Expression`
//! shape (literal / reference / function call / conditional / for-expr /
//! template / index / attribute) with the binary/unary/comprehension nodes
//! needed for CEL-equivalence (spec.md §4.1).

use crate::value::Value;

/// A compiled expression. `${…}` bodies parse to one `Expr`; string
/// literals containing embedded `${…}` parse to `Expr::Template`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),

    /// A bare top-level identifier, e.g. `parameters` in `parameters.cpu`.
    Ident(String),

    /// `base.field` / `base["field"]`.
    Field { base: Box<Expr>, field: String },

    /// `base[index_expr]`.
    Index { base: Box<Expr>, index: Box<Expr> },

    /// `name(args…)` — a free function, e.g. `merge(a, b)`, `omit()`,
    /// `hash(s)`, `generateName(parts…)`, or a standard-library function.
    Call { name: String, args: Vec<Expr> },

    /// `receiver.method(args…)` — a method call dispatched on the
    /// receiver's runtime type (`list.map(x, expr)`, `s.contains(x)`, the
    /// container-config member overloads of spec.md §4.1).
    Method { receiver: Box<Expr>, method: String, args: Vec<Expr> },

    /// `has(base.field)` — presence test; never raises missing-data.
    Has(Box<Expr>),

    /// `cond ? then : otherwise`.
    Ternary { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },

    Unary { op: UnaryOp, expr: Box<Expr> },

    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },

    /// `iterable.map(var, body)` / `.filter(var, body)` / `.exists(var,
    /// body)` / `.all(var, body)` — CEL-style list comprehensions,
    /// desugared from `Method` nodes whose name is a comprehension macro.
    Comprehension { kind: ComprehensionKind, var: String, iterable: Box<Expr>, body: Box<Expr> },

    ListLiteral(Vec<Expr>),
    MapLiteral(Vec<(Expr, Expr)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    Map,
    Filter,
    Exists,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// The names of the comprehension macros recognized by the parser.
pub const COMPREHENSION_METHODS: &[(&str, ComprehensionKind)] = &[
    ("map", ComprehensionKind::Map),
    ("filter", ComprehensionKind::Filter),
    ("exists", ComprehensionKind::Exists),
    ("all", ComprehensionKind::All),
];
