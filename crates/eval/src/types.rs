//! Result, error and option types shared by the executor, plans and
//! streams.

use crate::transform::TransformRegistry;
use mapwright_core::{CollisionPolicy, ExprError, Value, WriteError};
use serde::Serialize;

// ──────────────────────────────────────────────
// Results
// ──────────────────────────────────────────────

/// Outcome of one conversion. `errors` are rules that could not be
/// satisfied; `warnings` are benign skips.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversionResult {
    pub output: Value,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConversionResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// A single rule failed. Rendered into [`ConversionResult::errors`]
/// prefixed with the rule location; never returned as `Err` from a
/// conversion.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecError {
    #[error("invalid expression '{expression}': {source}")]
    Expression {
        expression: String,
        #[source]
        source: ExprError,
    },
    #[error("source nesting exceeds {limit} levels")]
    SourceDepth { limit: usize },
    #[error("rule nesting exceeds {limit} levels")]
    RuleDepth { limit: usize },
    #[error("input at '{path}' is {found}, not an array (set coerceSingle to accept a single value)")]
    NotAnArray { path: String, found: &'static str },
    #[error("rule has no output path")]
    MissingOutputPath,
    #[error("no custom transform registered as '{name}'")]
    UnknownTransform { name: String },
    #[error("custom transform '{name}' failed: {message}")]
    TransformFailed { name: String, message: String },
    #[error(transparent)]
    Write(#[from] WriteError),
}

// ──────────────────────────────────────────────
// Options
// ──────────────────────────────────────────────

/// Per-call runtime options. There is no global state: custom transforms
/// travel with the call.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub transforms: TransformRegistry,
    pub collision_policy: CollisionPolicy,
}

impl ExecOptions {
    pub fn with_transforms(mut self, transforms: TransformRegistry) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }
}
