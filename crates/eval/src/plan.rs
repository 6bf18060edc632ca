//! Compiled plans and the plan cache.
//!
//! A [`CompiledPlan`] is normalized rules plus a content hash of their
//! canonical form and every expression pre-parsed. Plans are immutable;
//! share them behind an `Arc` and call them from any thread.

use crate::executor::execute_with;
use crate::predicate::Expressions;
use crate::types::{ConversionResult, ExecOptions};
use mapwright_core::{
    format_payload, normalize_rules, parse_payload, CodecError, ConditionOutput, ConversionRules,
    Outcome, RuleNode, RulesInput, Value, ValueSource,
};
use serde_json::{Map as JsonMap, Value as Json};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CompiledPlan {
    rules: ConversionRules,
    cache_key: String,
    expressions: Expressions,
}

/// Output of [`CompiledPlan::convert`]: the conversion result and its
/// output serialized in the plan's output format.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub result: ConversionResult,
    pub body: String,
}

impl CompiledPlan {
    /// Normalize `input` and compile it.
    pub fn compile<'a>(input: impl Into<RulesInput<'a>>) -> Self {
        Self::from_rules(normalize_rules(input))
    }

    pub fn from_rules(rules: ConversionRules) -> Self {
        let cache_key = content_key(&rules.to_value());
        let mut expressions = Expressions::new();
        collect_nodes(&rules.rules, &mut expressions);
        debug!(
            cache_key = %cache_key,
            rules = rules.rules.len(),
            expressions = expressions.len(),
            "compiled plan"
        );
        CompiledPlan {
            rules,
            cache_key,
            expressions,
        }
    }

    pub fn rules(&self) -> &ConversionRules {
        &self.rules
    }

    /// Hex SHA-256 of the canonical (key-sorted) rules document.
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn expressions(&self) -> &Expressions {
        &self.expressions
    }

    pub fn execute(&self, input: &Value, options: &ExecOptions) -> ConversionResult {
        execute_with(&self.rules, input, options, &self.expressions)
    }

    /// Parse `payload` in the plan's input format, execute, and format the
    /// output in the plan's output format.
    pub fn convert(&self, payload: &str, options: &ExecOptions, pretty: bool) -> Result<Conversion, CodecError> {
        let input = parse_payload(payload, self.rules.input_format)?;
        let result = self.execute(&input, options);
        let body = format_payload(&result.output, self.rules.output_format, pretty)?;
        Ok(Conversion { result, body })
    }
}

fn collect_nodes(nodes: &[RuleNode], out: &mut Expressions) {
    for node in nodes {
        match node {
            RuleNode::Field(f) => collect_source(&f.source, out),
            RuleNode::Array(a) => collect_nodes(&a.item_rules, out),
            RuleNode::Branch(b) => {
                out.insert(&b.expression);
                collect_nodes(&b.then, out);
                for arm in &b.else_if {
                    out.insert(&arm.expression);
                    collect_nodes(&arm.then, out);
                }
                collect_nodes(&b.otherwise, out);
            }
        }
    }
}

fn collect_source(source: &ValueSource, out: &mut Expressions) {
    let ValueSource::Condition(c) = source else {
        return;
    };
    out.insert(&c.expression);
    if let ConditionOutput::Branch {
        when_true,
        else_if,
        when_false,
    } = &c.output
    {
        let nested = when_true
            .iter()
            .chain(else_if.iter().filter_map(|arm| arm.outcome.as_ref()))
            .chain(when_false.iter());
        for outcome in nested {
            if let Outcome::Source(s) = outcome {
                collect_source(s, out);
            }
        }
        for arm in else_if {
            out.insert(&arm.expression);
        }
    }
}

// ──────────────────────────────────────────────
// Content hashing
// ──────────────────────────────────────────────

/// SHA-256 over compact JSON with object keys sorted at every level.
pub fn content_key(doc: &Json) -> String {
    let canonical = sorted(doc).to_string();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

fn sorted(doc: &Json) -> Json {
    match doc {
        Json::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = JsonMap::new();
            for k in keys {
                out.insert(k.clone(), sorted(&map[k]));
            }
            Json::Object(out)
        }
        Json::Array(items) => Json::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn text_key(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

// ──────────────────────────────────────────────
// Plan cache
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Plans keyed by content hash. Raw rule text is also indexed by its own
/// hash so repeated identical text skips normalization. With a capacity,
/// the oldest plan is evicted first.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: HashMap<String, Arc<CompiledPlan>>,
    aliases: HashMap<String, String>,
    order: VecDeque<String>,
    capacity: Option<usize>,
    hits: u64,
    misses: u64,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` plans (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        PlanCache {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    pub fn get(&self, cache_key: &str) -> Option<Arc<CompiledPlan>> {
        self.plans.get(cache_key).cloned()
    }

    /// Plan for raw rules JSON text.
    pub fn get_or_compile_text(&mut self, text: &str) -> Arc<CompiledPlan> {
        let alias = text_key(text);
        if let Some(plan) = self.aliases.get(&alias).and_then(|key| self.plans.get(key)) {
            self.hits += 1;
            return Arc::clone(plan);
        }
        let plan = self.admit(CompiledPlan::compile(text));
        self.aliases.insert(alias, plan.cache_key.clone());
        plan
    }

    /// Plan for an already-parsed rules document.
    pub fn get_or_compile_value(&mut self, doc: &Json) -> Arc<CompiledPlan> {
        self.admit(CompiledPlan::compile(doc))
    }

    /// Plan for already-normalized rules.
    pub fn get_or_compile_rules(&mut self, rules: ConversionRules) -> Arc<CompiledPlan> {
        self.admit(CompiledPlan::from_rules(rules))
    }

    fn admit(&mut self, plan: CompiledPlan) -> Arc<CompiledPlan> {
        if let Some(existing) = self.plans.get(&plan.cache_key) {
            self.hits += 1;
            return Arc::clone(existing);
        }
        self.misses += 1;
        if let Some(capacity) = self.capacity {
            while self.plans.len() >= capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.plans.remove(&oldest);
                self.aliases.retain(|_, key| *key != oldest);
                debug!(cache_key = %oldest, "evicted plan");
            }
        }
        let key = plan.cache_key.clone();
        let plan = Arc::new(plan);
        self.plans.insert(key.clone(), Arc::clone(&plan));
        self.order.push_back(key);
        plan
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.plans.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn clear(&mut self) {
        self.plans.clear();
        self.aliases.clear();
        self.order.clear();
    }
}
