//! mapwright-core: document model, payload codecs and rule front end.
//!
//! Provides the front half of the conversion pipeline:
//!
//! ```text
//! rules text -> normalize (fragments, validation) -> ConversionRules
//! payload text -> codec -> Value
//! ```
//!
//! # Public API
//!
//! - [`Value`] -- the universal document value shared by every codec
//! - [`codec`] -- JSON, XML and URL-query parse/format
//! - [`parser::parse_expression`] -- condition expression parser
//! - [`normalize_rules`] -- turn loosely-typed rule JSON into [`ConversionRules`]
//! - [`load_bundle`] -- resolve `include` lists into one rules document
//!
//! Execution lives in `mapwright-eval`; static analysis in `mapwright-analyze`.

/// Rules schema version understood by this runtime (semver).
pub const SCHEMA_VERSION: &str = "2.0.0";

pub mod ast;
pub mod bundle;
pub mod codec;
pub mod coerce;
pub mod error;
pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod path;
pub mod rules;
pub mod source;
pub mod value;

// ── Convenience re-exports ───────────────────────────────────────────

pub use ast::{CompareOp, Expr};
pub use bundle::{load_bundle, load_bundle_with_provider};
pub use codec::{format_payload, parse_payload, PayloadFormat};
pub use error::{BundleError, CodecError, ExprError};
pub use normalize::{normalize_rules, RulesInput};
pub use parser::parse_expression;
pub use path::{CollisionPolicy, WriteError};
pub use source::{DiskFiles, MemoryFiles, RuleFiles};
pub use rules::{
    ArrayRule, BranchArm, BranchRule, ConditionArm, ConditionOutput, ConditionSource,
    ConversionRules, FieldRule, MergeMode, Outcome, RuleNode, TransformKind, TransformSource,
    ValueSource,
};
pub use value::{Map, Value};
