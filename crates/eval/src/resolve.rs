//! Value-source resolution.
//!
//! Every nested source (a condition's `trueSource`, an `elseIf` arm's
//! source) is resolved one level deeper; past [`MAX_SOURCE_DEPTH`] the
//! field fails with [`ExecError::SourceDepth`].

use crate::predicate::{test, Expressions, Scope};
use crate::transform::{apply_builtin, run_custom};
use crate::types::{ExecError, ExecOptions};
use mapwright_core::coerce::parse_scalar;
use mapwright_core::{
    ConditionOutput, ConditionSource, Expr, MergeMode, Outcome, TransformKind, TransformSource, Value,
    ValueSource,
};
use std::borrow::Cow;

pub const MAX_SOURCE_DEPTH: usize = 32;

/// Literal tokens in a concat transform's path list.
const CONST_PREFIX: &str = "const:";

/// Everything source resolution needs besides the documents.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    pub options: &'a ExecOptions,
    pub expressions: &'a Expressions,
}

impl<'a> Resolver<'a> {
    pub fn new(options: &'a ExecOptions, expressions: &'a Expressions) -> Self {
        Resolver {
            options,
            expressions,
        }
    }

    pub fn expression(&self, src: &str) -> Result<Cow<'a, Expr>, ExecError> {
        self.expressions.get(src).map_err(|source| ExecError::Expression {
            expression: src.trim().to_string(),
            source,
        })
    }

    /// Resolve `source` to a value. Unresolved paths are null.
    pub fn resolve(&self, source: &ValueSource, scope: &Scope<'_>, depth: usize) -> Result<Value, ExecError> {
        if depth > MAX_SOURCE_DEPTH {
            return Err(ExecError::SourceDepth {
                limit: MAX_SOURCE_DEPTH,
            });
        }
        match source {
            ValueSource::Constant { value } => Ok(parse_scalar(value)),
            ValueSource::Path { path } => Ok(lookup(scope, path)),
            ValueSource::Merge {
                paths,
                mode,
                separator,
            } => Ok(merge(scope, paths, *mode, separator)),
            ValueSource::Transform(t) => self.transform(t, scope),
            ValueSource::Condition(c) => self.condition(c, scope, depth),
        }
    }

    fn transform(&self, t: &TransformSource, scope: &Scope<'_>) -> Result<Value, ExecError> {
        match &t.kind {
            TransformKind::Concat { separator } => Ok(concat(scope, &t.path, separator)),
            TransformKind::Custom(name) => run_custom(&self.options.transforms, name, &lookup(scope, &t.path)),
            kind => Ok(apply_builtin(kind, lookup(scope, &t.path))),
        }
    }

    fn condition(&self, c: &ConditionSource, scope: &Scope<'_>, depth: usize) -> Result<Value, ExecError> {
        let matched = test(self.expression(&c.expression)?.as_ref(), scope);
        let ConditionOutput::Branch {
            when_true,
            else_if,
            when_false,
        } = &c.output
        else {
            return Ok(Value::Bool(matched));
        };
        if matched {
            return self.outcome(when_true.as_ref(), scope, depth);
        }
        for arm in else_if {
            if test(self.expression(&arm.expression)?.as_ref(), scope) {
                return self.outcome(arm.outcome.as_ref(), scope, depth);
            }
        }
        self.outcome(when_false.as_ref(), scope, depth)
    }

    fn outcome(&self, outcome: Option<&Outcome>, scope: &Scope<'_>, depth: usize) -> Result<Value, ExecError> {
        match outcome {
            None => Ok(Value::Null),
            Some(Outcome::Value(text)) => Ok(parse_scalar(text)),
            Some(Outcome::Source(nested)) => self.resolve(nested, scope, depth + 1),
        }
    }
}

fn lookup(scope: &Scope<'_>, path: &str) -> Value {
    scope.lookup(path).cloned().unwrap_or(Value::Null)
}

fn merge(scope: &Scope<'_>, paths: &[String], mode: MergeMode, separator: &str) -> Value {
    let mut values = paths.iter().map(|p| lookup(scope, p)).filter(|v| !v.is_null());
    match mode {
        MergeMode::Concat => {
            let parts: Vec<String> = values.filter(|v| !v.is_blank()).map(|v| v.to_text()).collect();
            if parts.is_empty() {
                Value::Null
            } else {
                Value::String(parts.join(separator))
            }
        }
        MergeMode::FirstNonEmpty => values.find(|v| !v.is_blank()).unwrap_or(Value::Null),
        MergeMode::Array => Value::Array(values.collect()),
    }
}

/// `first, const: , last`: path tokens are trimmed, `const:` tokens keep
/// everything after the prefix.
fn concat(scope: &Scope<'_>, tokens: &str, separator: &str) -> Value {
    let pieces: Vec<String> = tokens
        .split(',')
        .filter_map(|token| {
            let lead = token.trim_start();
            if let Some(literal) = lead.strip_prefix(CONST_PREFIX) {
                return Some(literal.to_string());
            }
            let path = token.trim();
            if path.is_empty() {
                return None;
            }
            Some(scope.lookup(path).map(Value::to_text).unwrap_or_default())
        })
        .collect();
    Value::String(pieces.join(separator))
}
