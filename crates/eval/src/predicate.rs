//! Condition expression evaluator.
//!
//! Evaluation never fails: a missing path is null, null is false in
//! boolean context and NaN in numeric context, so every ordered
//! comparison against it is false. Only parsing can fail, and
//! [`Expressions`] caches the parse outcome per expression text.

use mapwright_core::coerce::{is_truthy, loose_equals, to_number};
use mapwright_core::path::resolve_scoped;
use mapwright_core::{parse_expression, CompareOp, Expr, ExprError, Value};
use std::borrow::Cow;
use std::collections::HashMap;

/// Documents an expression can read: the conversion root and, inside an
/// array rule, the current item.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub root: &'a Value,
    pub item: Option<&'a Value>,
}

impl<'a> Scope<'a> {
    pub fn root(root: &'a Value) -> Self {
        Scope { root, item: None }
    }

    pub fn with_item(self, item: &'a Value) -> Self {
        Scope {
            root: self.root,
            item: Some(item),
        }
    }

    /// Value at `path` under the scoping rules of
    /// [`resolve_scoped`]; missing is `None`.
    pub fn lookup(&self, path: &str) -> Option<&'a Value> {
        resolve_scoped(self.root, self.item, path)
    }
}

/// Evaluate `expr` to a value.
pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Array(items) => Value::Array(items.iter().map(|e| evaluate(e, scope)).collect()),
        Expr::Path(path) => scope.lookup(path).cloned().unwrap_or(Value::Null),
        Expr::Exists(inner) => Value::Bool(!evaluate(inner, scope).is_null()),
        Expr::Not(inner) => Value::Bool(!test(inner, scope)),
        Expr::And(terms) => Value::Bool(terms.iter().all(|t| test(t, scope))),
        Expr::Or(terms) => Value::Bool(terms.iter().any(|t| test(t, scope))),
        Expr::Compare { op, left, right } => {
            let l = evaluate(left, scope);
            let r = evaluate(right, scope);
            Value::Bool(compare(*op, &l, &r))
        }
        Expr::In { needle, haystack } => {
            let needle = evaluate(needle, scope);
            Value::Bool(
                haystack
                    .iter()
                    .any(|candidate| loose_equals(&needle, &evaluate(candidate, scope))),
            )
        }
    }
}

/// Evaluate `expr` in boolean context.
pub fn test(expr: &Expr, scope: &Scope<'_>) -> bool {
    is_truthy(&evaluate(expr, scope))
}

fn compare(op: CompareOp, l: &Value, r: &Value) -> bool {
    match op {
        CompareOp::Eq => loose_equals(l, r),
        CompareOp::Neq => !loose_equals(l, r),
        ordered => {
            let (a, b) = (to_number(l), to_number(r));
            if a.is_nan() || b.is_nan() {
                return false;
            }
            match ordered {
                CompareOp::Gt => a > b,
                CompareOp::Gte => a >= b,
                CompareOp::Lt => a < b,
                _ => a <= b,
            }
        }
    }
}

// ──────────────────────────────────────────────
// Parsed expression cache
// ──────────────────────────────────────────────

/// Parse outcomes keyed by trimmed expression text. Texts that were not
/// registered up front are parsed on demand and not retained, so a
/// shared `&Expressions` needs no interior mutability.
#[derive(Debug, Clone, Default)]
pub struct Expressions {
    parsed: HashMap<String, Result<Expr, ExprError>>,
}

impl Expressions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and remember `src`.
    pub fn insert(&mut self, src: &str) {
        let key = src.trim();
        if !self.parsed.contains_key(key) {
            self.parsed.insert(key.to_string(), parse_expression(key));
        }
    }

    pub fn get(&self, src: &str) -> Result<Cow<'_, Expr>, ExprError> {
        let key = src.trim();
        match self.parsed.get(key) {
            Some(Ok(expr)) => Ok(Cow::Borrowed(expr)),
            Some(Err(e)) => Err(e.clone()),
            None => parse_expression(key).map(Cow::Owned),
        }
    }

    pub fn len(&self) -> usize {
        self.parsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsed.is_empty()
    }

    /// Texts that failed to parse, with their diagnostics, sorted by text.
    pub fn failures(&self) -> Vec<(&str, &ExprError)> {
        let mut out: Vec<(&str, &ExprError)> = self
            .parsed
            .iter()
            .filter_map(|(k, v)| v.as_ref().err().map(|e| (k.as_str(), e)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }
}
