//! AST node types for the metrics DSL.
//!
//! The grammar (see crate-level docs) is:
//!
//! ```text
//! program     := (metric_decl | query_decl)*
//! metric_decl := "metric" IDENT "on" IDENT "=" expr
//! query_decl  := "query" IDENT "{" query_line* "}"
//! query_line  := ("dimensions"|"metrics") ":" IDENT ("," IDENT)*
//!              | "where" ":" bool_expr
//!              | "having" ":" having_expr
//! expr        := additive
//! additive    := multiplicative (("+"|"-") multiplicative)*
//! multiplicative := primary (("*"|"/") primary)*
//! primary     := "(" expr ")" | fn_call | NUMBER | IDENT
//! fn_call     := IDENT "(" ("*" | expr ("," expr)*)? ")"
//! ```

use crate::dsl::span::Spanned;

/// A parsed DSL source file: any number of metric and query declarations,
/// in lexical order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<Spanned<Item>>,
}

/// A top-level DSL item.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Metric(MetricDecl),
    Query(QueryDecl),
}

/// `metric <name> on <fact> = <expr>`
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDecl {
    pub name: Spanned<String>,
    pub base_fact: Spanned<String>,
    pub expr: Spanned<MetricExpr>,
}

/// `query <name> { ... }`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryDecl {
    pub name: Spanned<String>,
    pub dimensions: Vec<Spanned<String>>,
    pub metrics: Vec<Spanned<String>>,
    pub where_clause: Option<Spanned<BoolExpr>>,
    pub having: Option<Spanned<BoolExpr>>,
}

impl QueryDecl {
    pub fn new(name: Spanned<String>) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }
}

/// A single `dimensions:` / `metrics:` / `where:` / `having:` line inside
/// a query block. The parser folds these directly into `QueryDecl`; this
/// type exists to model the grammar's `query_line` production for callers
/// (e.g. completion) that want to reason about it line-by-line.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryLine {
    Dimensions(Vec<Spanned<String>>),
    Metrics(Vec<Spanned<String>>),
    Where(Spanned<BoolExpr>),
    Having(Spanned<BoolExpr>),
}

/// Arithmetic operator for `BinaryOp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl std::fmt::Display for ArithOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        };
        write!(f, "{s}")
    }
}

/// A metric-definition expression, as written by the user (unresolved:
/// attribute and metric names are plain strings, not yet bound to the
/// semantic model).
#[derive(Debug, Clone, PartialEq)]
pub enum MetricExpr {
    /// A numeric literal.
    Literal(f64),
    /// An attribute reference, or the special wildcard `"*"` (`count(*)`).
    AttrRef(String),
    /// A reference to another named metric.
    MetricRef(String),
    /// A binary arithmetic expression.
    BinaryOp(ArithOp, Box<Spanned<MetricExpr>>, Box<Spanned<MetricExpr>>),
    /// A function call: an aggregate (`sum|avg|min|max|count|count_distinct`)
    /// or the reserved special `last_year`.
    Call(Spanned<String>, Vec<Spanned<MetricExpr>>),
}

/// Comparison operator for `bool_expr` / `having_expr` leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Ge,
    Le,
    Gt,
    Lt,
    Eq,
    Ne,
}

impl std::fmt::Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        };
        write!(f, "{s}")
    }
}

/// A literal appearing on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Number(f64),
    Str(String),
    Bool(bool),
}

/// A boolean expression, shared by `where:` and `having:` lines.
///
/// `having_expr` is structurally identical to `bool_expr`, but every leaf's
/// literal must be a `Number`; that restriction is enforced after parsing,
/// by `transform::transform_predicate`'s `having_only` parameter, not
/// encoded into a second grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum BoolExpr {
    Or(Box<Spanned<BoolExpr>>, Box<Spanned<BoolExpr>>),
    And(Box<Spanned<BoolExpr>>, Box<Spanned<BoolExpr>>),
    Not(Box<Spanned<BoolExpr>>),
    Compare {
        ident: Spanned<String>,
        op: CmpOp,
        literal: Spanned<LiteralValue>,
    },
}
