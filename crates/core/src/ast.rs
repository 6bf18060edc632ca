//! Expression AST produced by [`crate::parser::parse_expression`].
//!
//! The evaluator lives in `mapwright-eval`; nothing here touches a document.

use crate::value::Value;

// ──────────────────────────────────────────────
// Operators
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number, string, boolean or null literal.
    Literal(Value),
    /// `[a, b, ...]` -- only valid as a literal value or the right side of `in`.
    Array(Vec<Expr>),
    /// `path(ref)` -- resolved against the current item when one is set,
    /// else the root; `$.x` always reads the root.
    Path(String),
    /// `exists(expr)` -- true when the operand resolves to a non-null value.
    Exists(Box<Expr>),
    Not(Box<Expr>),
    /// Two or more operands joined by `&&`, kept flat so a long chain
    /// does not nest.
    And(Vec<Expr>),
    /// Two or more operands joined by `||`.
    Or(Vec<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `needle in [a, b]`; the haystack is always an array literal.
    In {
        needle: Box<Expr>,
        haystack: Vec<Expr>,
    },
}

impl Expr {
    /// True when the expression reads nothing from the document, so its
    /// value is the same for every input.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Path(_) | Expr::Exists(_) => false,
            Expr::Array(items) => items.iter().all(Expr::is_constant),
            Expr::Not(inner) => inner.is_constant(),
            Expr::And(terms) | Expr::Or(terms) => terms.iter().all(Expr::is_constant),
            Expr::Compare { left, right, .. } => left.is_constant() && right.is_constant(),
            Expr::In { needle, haystack } => {
                needle.is_constant() && haystack.iter().all(Expr::is_constant)
            }
        }
    }
}
