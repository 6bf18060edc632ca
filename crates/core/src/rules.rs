//! Strict rule model produced by [`crate::normalize_rules`].
//!
//! Every type here is already validated: output paths are cleaned,
//! expressions trimmed, fragments spliced in. `to_value` renders the
//! canonical wire form, which is also what plan cache keys hash.

use crate::codec::PayloadFormat;
use serde::{Serialize, Serializer};
use serde_json::{json, Map as JsonMap, Value as Json};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionRules {
    pub schema_version: Option<String>,
    pub input_format: PayloadFormat,
    pub output_format: PayloadFormat,
    pub rules: Vec<RuleNode>,
    /// Problems found while normalizing. Rules that failed validation are
    /// not in `rules`.
    pub validation_errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleNode {
    Field(FieldRule),
    Array(ArrayRule),
    Branch(BranchRule),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub output_paths: Vec<String>,
    pub source: ValueSource,
    /// Literal text used when the source resolves to null or "".
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayRule {
    pub input_path: String,
    pub output_paths: Vec<String>,
    pub coerce_single: bool,
    pub item_rules: Vec<RuleNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchRule {
    pub expression: String,
    pub then: Vec<RuleNode>,
    pub else_if: Vec<BranchArm>,
    pub otherwise: Vec<RuleNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchArm {
    pub expression: String,
    pub then: Vec<RuleNode>,
}

// ──────────────────────────────────────────────
// Value sources
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Constant { value: String },
    Path { path: String },
    Merge {
        paths: Vec<String>,
        mode: MergeMode,
        separator: String,
    },
    Transform(TransformSource),
    Condition(ConditionSource),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Join non-empty values as text.
    #[default]
    Concat,
    /// First non-empty value, unchanged.
    FirstNonEmpty,
    /// All non-null values as a list.
    Array,
}

impl MergeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeMode::Concat => "concat",
            MergeMode::FirstNonEmpty => "firstNonEmpty",
            MergeMode::Array => "array",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformSource {
    pub path: String,
    pub kind: TransformKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransformKind {
    Lowercase,
    Uppercase,
    Number,
    Boolean,
    /// `path` holds a comma-separated token list; `const:` tokens are literal.
    Concat { separator: String },
    Split {
        separator: String,
        token_index: i64,
        trim: bool,
    },
    /// Looked up by name in the caller's transform registry.
    Custom(String),
}

impl TransformKind {
    pub fn name(&self) -> String {
        match self {
            TransformKind::Lowercase => "toLowerCase".into(),
            TransformKind::Uppercase => "toUpperCase".into(),
            TransformKind::Number => "number".into(),
            TransformKind::Boolean => "boolean".into(),
            TransformKind::Concat { .. } => "concat".into(),
            TransformKind::Split { .. } => "split".into(),
            TransformKind::Custom(name) => format!("custom:{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSource {
    pub expression: String,
    pub output: ConditionOutput,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionOutput {
    /// Yield the boolean result of the expression.
    Match,
    /// Yield the first matching arm's outcome.
    Branch {
        when_true: Option<Outcome>,
        else_if: Vec<ConditionArm>,
        when_false: Option<Outcome>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionArm {
    pub expression: String,
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Literal text, scalar-coerced when used.
    Value(String),
    Source(Box<ValueSource>),
}

// ──────────────────────────────────────────────
// Wire rendering
// ──────────────────────────────────────────────

impl ConversionRules {
    /// Canonical wire form. Validation errors are not part of it.
    pub fn to_value(&self) -> Json {
        let mut doc = JsonMap::new();
        if let Some(v) = &self.schema_version {
            doc.insert("schemaVersion".into(), json!(v));
        }
        doc.insert("inputFormat".into(), json!(self.input_format.as_str()));
        doc.insert("outputFormat".into(), json!(self.output_format.as_str()));
        doc.insert("rules".into(), nodes_json(&self.rules));
        Json::Object(doc)
    }

    /// Total number of rule nodes, nested ones included.
    pub fn node_count(&self) -> usize {
        fn count(nodes: &[RuleNode]) -> usize {
            nodes
                .iter()
                .map(|n| {
                    1 + match n {
                        RuleNode::Field(_) => 0,
                        RuleNode::Array(a) => count(&a.item_rules),
                        RuleNode::Branch(b) => {
                            count(&b.then)
                                + b.else_if.iter().map(|arm| count(&arm.then)).sum::<usize>()
                                + count(&b.otherwise)
                        }
                    }
                })
                .sum()
        }
        count(&self.rules)
    }
}

fn nodes_json(nodes: &[RuleNode]) -> Json {
    Json::Array(nodes.iter().map(RuleNode::to_value).collect())
}

impl RuleNode {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleNode::Field(_) => "field",
            RuleNode::Array(_) => "array",
            RuleNode::Branch(_) => "branch",
        }
    }

    pub fn to_value(&self) -> Json {
        match self {
            RuleNode::Field(f) => {
                let mut m = JsonMap::new();
                m.insert("kind".into(), json!("field"));
                m.insert("outputPaths".into(), json!(f.output_paths));
                m.insert("source".into(), f.source.to_value());
                if let Some(d) = &f.default_value {
                    m.insert("defaultValue".into(), json!(d));
                }
                Json::Object(m)
            }
            RuleNode::Array(a) => json!({
                "kind": "array",
                "inputPath": a.input_path,
                "outputPaths": a.output_paths,
                "coerceSingle": a.coerce_single,
                "itemRules": nodes_json(&a.item_rules),
            }),
            RuleNode::Branch(b) => {
                let mut m = JsonMap::new();
                m.insert("kind".into(), json!("branch"));
                m.insert("expression".into(), json!(b.expression));
                m.insert("then".into(), nodes_json(&b.then));
                if !b.else_if.is_empty() {
                    let arms: Vec<Json> = b
                        .else_if
                        .iter()
                        .map(|arm| json!({"expression": arm.expression, "then": nodes_json(&arm.then)}))
                        .collect();
                    m.insert("elseIf".into(), Json::Array(arms));
                }
                if !b.otherwise.is_empty() {
                    m.insert("else".into(), nodes_json(&b.otherwise));
                }
                Json::Object(m)
            }
        }
    }
}

impl ValueSource {
    pub fn to_value(&self) -> Json {
        match self {
            ValueSource::Constant { value } => json!({"type": "constant", "value": value}),
            ValueSource::Path { path } => json!({"type": "path", "path": path}),
            ValueSource::Merge {
                paths,
                mode,
                separator,
            } => json!({
                "type": "merge",
                "paths": paths,
                "mode": mode.as_str(),
                "separator": separator,
            }),
            ValueSource::Transform(t) => {
                let mut m = JsonMap::new();
                m.insert("type".into(), json!("transform"));
                m.insert("path".into(), json!(t.path));
                m.insert("transform".into(), json!(t.kind.name()));
                match &t.kind {
                    TransformKind::Concat { separator } => {
                        m.insert("separator".into(), json!(separator));
                    }
                    TransformKind::Split {
                        separator,
                        token_index,
                        trim,
                    } => {
                        m.insert("separator".into(), json!(separator));
                        m.insert("tokenIndex".into(), json!(token_index));
                        m.insert("trimAfterSplit".into(), json!(trim));
                    }
                    _ => {}
                }
                Json::Object(m)
            }
            ValueSource::Condition(c) => {
                let mut m = JsonMap::new();
                m.insert("type".into(), json!("condition"));
                m.insert("expression".into(), json!(c.expression));
                match &c.output {
                    ConditionOutput::Match => {
                        m.insert("outputMode".into(), json!("match"));
                    }
                    ConditionOutput::Branch {
                        when_true,
                        else_if,
                        when_false,
                    } => {
                        m.insert("outputMode".into(), json!("branch"));
                        outcome_into(&mut m, "trueValue", "trueSource", when_true);
                        outcome_into(&mut m, "falseValue", "falseSource", when_false);
                        if !else_if.is_empty() {
                            let arms: Vec<Json> = else_if
                                .iter()
                                .map(|arm| {
                                    let mut a = JsonMap::new();
                                    a.insert("expression".into(), json!(arm.expression));
                                    outcome_into(&mut a, "value", "source", &arm.outcome);
                                    Json::Object(a)
                                })
                                .collect();
                            m.insert("elseIf".into(), Json::Array(arms));
                        }
                    }
                }
                Json::Object(m)
            }
        }
    }
}

fn outcome_into(m: &mut JsonMap<String, Json>, value_key: &str, source_key: &str, outcome: &Option<Outcome>) {
    match outcome {
        Some(Outcome::Value(v)) => {
            m.insert(value_key.into(), json!(v));
        }
        Some(Outcome::Source(s)) => {
            m.insert(source_key.into(), s.to_value());
        }
        None => {}
    }
}

impl Serialize for ConversionRules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl Serialize for RuleNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
