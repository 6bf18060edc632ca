//! Rule normalization: loosely-typed rule JSON -> [`ConversionRules`].
//!
//! Normalization never fails. Document-level problems (bad JSON, wrong
//! shape, legacy schema) yield an empty rule set plus one error; problems
//! inside a single rule drop that rule and keep its siblings. Every error
//! is prefixed with the location of the offending node, e.g.
//! `rules[2].then[0]: ...`.
//!
//! Fragments (`{"use": "name"}`) are spliced in here. Each fragment is
//! also validated on its own so a cycle among fragments is reported even
//! when nothing uses them.

use crate::codec::PayloadFormat;
use crate::rules::{
    ArrayRule, BranchArm, BranchRule, ConditionArm, ConditionOutput, ConditionSource,
    ConversionRules, FieldRule, MergeMode, Outcome, RuleNode, TransformKind, TransformSource,
    ValueSource,
};
use crate::value::format_number;
use serde_json::{Map as JsonMap, Value as Json};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Maximum nesting of rules and sources accepted from a document.
pub const MAX_NESTING: usize = 128;

/// Upper bound on rule nodes after fragment expansion.
pub const MAX_EXPANDED_NODES: usize = 100_000;

const TOP_LEVEL_KEYS: &[&str] = &[
    "schemaVersion",
    "inputFormat",
    "outputFormat",
    "include",
    "fragments",
    "rules",
];
const FIELD_KEYS: &[&str] = &["kind", "outputPaths", "source", "defaultValue"];
const ARRAY_KEYS: &[&str] = &["kind", "inputPath", "outputPaths", "coerceSingle", "itemRules"];
const BRANCH_KEYS: &[&str] = &["kind", "expression", "then", "elseIf", "else"];
const BRANCH_ARM_KEYS: &[&str] = &["expression", "then"];
const CONSTANT_KEYS: &[&str] = &["type", "value"];
const PATH_KEYS: &[&str] = &["type", "path"];
const MERGE_KEYS: &[&str] = &["type", "paths", "mode", "separator"];
const TRANSFORM_KEYS: &[&str] = &[
    "type",
    "path",
    "transform",
    "separator",
    "tokenIndex",
    "trimAfterSplit",
];
const CONDITION_KEYS: &[&str] = &[
    "type",
    "expression",
    "outputMode",
    "trueValue",
    "trueSource",
    "falseValue",
    "falseSource",
    "elseIf",
];
const CONDITION_ARM_KEYS: &[&str] = &["expression", "value", "source"];

/// Property names from the first schema generation and their replacements.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("mappings", "rules"),
    ("outputPath", "outputPaths"),
    ("targetPath", "outputPaths"),
    ("sourcePath", "source: {\"type\": \"path\", ...}"),
    ("children", "itemRules"),
    ("conditions", "expression"),
];

/// Anything `normalize_rules` accepts.
#[derive(Debug, Clone)]
pub enum RulesInput<'a> {
    Typed(ConversionRules),
    Text(&'a str),
    Json(&'a Json),
}

impl From<ConversionRules> for RulesInput<'_> {
    fn from(rules: ConversionRules) -> Self {
        RulesInput::Typed(rules)
    }
}

impl From<&ConversionRules> for RulesInput<'_> {
    fn from(rules: &ConversionRules) -> Self {
        RulesInput::Typed(rules.clone())
    }
}

impl<'a> From<&'a str> for RulesInput<'a> {
    fn from(text: &'a str) -> Self {
        RulesInput::Text(text)
    }
}

impl<'a> From<&'a String> for RulesInput<'a> {
    fn from(text: &'a String) -> Self {
        RulesInput::Text(text)
    }
}

impl<'a> From<&'a Json> for RulesInput<'a> {
    fn from(doc: &'a Json) -> Self {
        RulesInput::Json(doc)
    }
}

/// Normalize and validate a rules document.
pub fn normalize_rules<'a>(input: impl Into<RulesInput<'a>>) -> ConversionRules {
    let rules = match input.into() {
        RulesInput::Typed(typed) => {
            let mut again = normalize_document(&typed.to_value());
            let mut errors = typed.validation_errors;
            errors.append(&mut again.validation_errors);
            again.validation_errors = dedup(errors);
            again
        }
        RulesInput::Text(text) => match serde_json::from_str::<Json>(text) {
            Ok(doc) => normalize_document(&doc),
            Err(e) => rejected(format!("rules are not valid JSON: {e}")),
        },
        RulesInput::Json(doc) => normalize_document(doc),
    };
    debug!(
        rules = rules.rules.len(),
        nodes = rules.node_count(),
        errors = rules.validation_errors.len(),
        "normalized rules"
    );
    rules
}

fn rejected(message: String) -> ConversionRules {
    warn!(%message, "rules document rejected");
    ConversionRules {
        validation_errors: vec![message],
        ..Default::default()
    }
}

fn normalize_document(doc: &Json) -> ConversionRules {
    let Some(top) = doc.as_object() else {
        return rejected(format!(
            "rules document must be a JSON object, found {}",
            json_type(doc)
        ));
    };
    if let Some(message) = find_legacy(doc) {
        return rejected(message);
    }
    if let Some(key) = top.keys().find(|k| !TOP_LEVEL_KEYS.contains(&k.as_str())) {
        return rejected(format!("unknown top-level property '{key}'"));
    }
    let Some(raw_rules) = top.get("rules") else {
        return rejected("rules document is missing the 'rules' array".to_string());
    };
    let Some(raw_rules) = raw_rules.as_array() else {
        return rejected(format!(
            "'rules' must be an array, found {}",
            json_type(raw_rules)
        ));
    };

    let mut n = Normalizer::default();

    let schema_version = match top.get("schemaVersion") {
        None | Some(Json::Null) => None,
        Some(Json::String(s)) => Some(s.trim().to_string()),
        Some(other) => {
            n.error("schemaVersion", format!("must be a string, found {}", json_type(other)));
            None
        }
    };
    let input_format = n.format(top, "inputFormat");
    let output_format = n.format(top, "outputFormat");
    if top.contains_key("include") {
        n.error(
            "include",
            "includes are resolved by the bundler; load this document with load_bundle",
        );
    }
    match top.get("fragments") {
        None | Some(Json::Null) => {}
        Some(Json::Object(map)) => n.fragments = map.clone(),
        Some(other) => n.error(
            "fragments",
            format!("must be an object of named rules, found {}", json_type(other)),
        ),
    }

    let rules = n.nodes(raw_rules, "rules", 0);

    let mut names: Vec<String> = n.fragments.keys().cloned().collect();
    names.sort();
    for name in names {
        n.fragment_alone(&name);
    }

    ConversionRules {
        schema_version,
        input_format,
        output_format,
        rules,
        validation_errors: dedup(n.errors),
    }
}

fn dedup(errors: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    errors
        .into_iter()
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

fn json_type(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

// ──────────────────────────────────────────────
// Legacy detection
// ──────────────────────────────────────────────

fn find_legacy(doc: &Json) -> Option<String> {
    let top = doc.as_object()?;
    if let Some(found) = legacy_key(top, "", false) {
        return Some(found);
    }
    if let Some(Json::Array(rules)) = top.get("rules") {
        for (i, node) in rules.iter().enumerate() {
            if let Some(found) = legacy_in_node(node, &format!("rules[{i}]")) {
                return Some(found);
            }
        }
    }
    if let Some(Json::Object(fragments)) = top.get("fragments") {
        for (name, node) in fragments {
            if let Some(found) = legacy_in_node(node, &format!("fragments.{name}")) {
                return Some(found);
            }
        }
    }
    None
}

fn legacy_message(key: &str, replacement: &str, loc: &str) -> String {
    let at = if loc.is_empty() {
        String::new()
    } else {
        format!(" at {loc}")
    };
    format!(
        "unsupported legacy property '{key}'{at}: use {replacement} instead \
         (rules written for schema 1 must be migrated to schema 2)"
    )
}

fn legacy_key(map: &JsonMap<String, Json>, loc: &str, is_node: bool) -> Option<String> {
    for key in map.keys() {
        if let Some((_, replacement)) = LEGACY_KEYS.iter().find(|(k, _)| *k == key.as_str()) {
            return Some(legacy_message(key, &format!("'{replacement}'"), loc));
        }
        if is_node && key == "type" {
            return Some(legacy_message(key, "'kind'", loc));
        }
    }
    None
}

fn legacy_in_node(node: &Json, loc: &str) -> Option<String> {
    let map = node.as_object()?;
    if let Some(found) = legacy_key(map, loc, true) {
        return Some(found);
    }
    if let Some(source) = map.get("source") {
        if let Some(found) = legacy_in_source(source, &format!("{loc}.source")) {
            return Some(found);
        }
    }
    for key in ["then", "else", "itemRules"] {
        if let Some(Json::Array(children)) = map.get(key) {
            for (i, child) in children.iter().enumerate() {
                if let Some(found) = legacy_in_node(child, &format!("{loc}.{key}[{i}]")) {
                    return Some(found);
                }
            }
        }
    }
    if let Some(Json::Array(arms)) = map.get("elseIf") {
        for (i, arm) in arms.iter().enumerate() {
            let arm_loc = format!("{loc}.elseIf[{i}]");
            if let Some(arm_map) = arm.as_object() {
                if let Some(found) = legacy_key(arm_map, &arm_loc, false) {
                    return Some(found);
                }
            }
            if let Some(Json::Array(children)) = arm.get("then") {
                for (j, child) in children.iter().enumerate() {
                    if let Some(found) = legacy_in_node(child, &format!("{arm_loc}.then[{j}]")) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

fn legacy_in_source(source: &Json, loc: &str) -> Option<String> {
    let map = source.as_object()?;
    if let Some(found) = legacy_key(map, loc, false) {
        return Some(found);
    }
    if map.contains_key("defaultValue") {
        return Some(legacy_message(
            "defaultValue",
            "'defaultValue' on the field rule",
            loc,
        ));
    }
    for key in ["trueSource", "falseSource"] {
        if let Some(nested) = map.get(key) {
            if let Some(found) = legacy_in_source(nested, &format!("{loc}.{key}")) {
                return Some(found);
            }
        }
    }
    if let Some(Json::Array(arms)) = map.get("elseIf") {
        for (i, arm) in arms.iter().enumerate() {
            if let Some(nested) = arm.get("source") {
                if let Some(found) = legacy_in_source(nested, &format!("{loc}.elseIf[{i}].source"))
                {
                    return Some(found);
                }
            }
        }
    }
    None
}

// ──────────────────────────────────────────────
// Normalizer
// ──────────────────────────────────────────────

#[derive(Default)]
struct Normalizer {
    fragments: JsonMap<String, Json>,
    errors: Vec<String>,
    /// Fragments currently being expanded, outermost first.
    active: Vec<String>,
    expanded: usize,
}

impl Normalizer {
    fn error(&mut self, loc: &str, message: impl AsRef<str>) {
        let message = format!("{loc}: {}", message.as_ref());
        warn!(%message, "rule failed validation");
        self.errors.push(message);
    }

    fn format(&mut self, top: &JsonMap<String, Json>, key: &str) -> PayloadFormat {
        match top.get(key) {
            None | Some(Json::Null) => PayloadFormat::default(),
            Some(Json::String(s)) => match s.parse() {
                Ok(f) => f,
                Err(e) => {
                    self.error(key, e.to_string());
                    PayloadFormat::default()
                }
            },
            Some(other) => {
                self.error(key, format!("must be a string, found {}", json_type(other)));
                PayloadFormat::default()
            }
        }
    }

    fn fragment_alone(&mut self, name: &str) {
        let Some(raw) = self.fragments.get(name).cloned() else {
            return;
        };
        self.active.push(name.to_string());
        self.node(&raw, &format!("fragments.{name}"), 0);
        self.active.pop();
    }

    fn nodes(&mut self, raw: &[Json], loc: &str, depth: usize) -> Vec<RuleNode> {
        raw.iter()
            .enumerate()
            .filter_map(|(i, node)| self.node(node, &format!("{loc}[{i}]"), depth))
            .collect()
    }

    fn child_nodes(
        &mut self,
        map: &JsonMap<String, Json>,
        key: &str,
        loc: &str,
        depth: usize,
    ) -> Option<Vec<RuleNode>> {
        match map.get(key) {
            None | Some(Json::Null) => Some(Vec::new()),
            Some(Json::Array(items)) => Some(self.nodes(items, &format!("{loc}.{key}"), depth + 1)),
            Some(other) => {
                self.error(loc, format!("'{key}' must be an array, found {}", json_type(other)));
                None
            }
        }
    }

    fn node(&mut self, raw: &Json, loc: &str, depth: usize) -> Option<RuleNode> {
        if depth > MAX_NESTING {
            self.error(loc, format!("rules nest deeper than {MAX_NESTING} levels"));
            return None;
        }
        self.expanded += 1;
        if self.expanded > MAX_EXPANDED_NODES {
            if self.expanded == MAX_EXPANDED_NODES + 1 {
                self.error(
                    loc,
                    format!("fragment expansion exceeds {MAX_EXPANDED_NODES} rule nodes"),
                );
            }
            return None;
        }
        let Some(map) = raw.as_object() else {
            self.error(loc, format!("rule must be an object, found {}", json_type(raw)));
            return None;
        };

        if let Some(name) = map.get("use") {
            return self.splice(map, name, loc, depth);
        }

        let kind = match map.get("kind") {
            Some(Json::String(k)) => k.as_str(),
            Some(other) => {
                self.error(loc, format!("'kind' must be a string, found {}", json_type(other)));
                return None;
            }
            None => {
                self.error(loc, "missing 'kind' (expected field, array or branch)");
                return None;
            }
        };
        let allowed = match kind {
            "field" => FIELD_KEYS,
            "array" => ARRAY_KEYS,
            "branch" => BRANCH_KEYS,
            other => {
                self.error(
                    loc,
                    format!("unsupported rule kind '{other}' (expected field, array or branch)"),
                );
                return None;
            }
        };
        if !self.only_keys(map, allowed, loc, &format!("{kind} rule")) {
            return None;
        }
        match kind {
            "field" => self.field(map, loc, depth).map(RuleNode::Field),
            "array" => self.array(map, loc, depth).map(RuleNode::Array),
            _ => self.branch(map, loc, depth).map(RuleNode::Branch),
        }
    }

    fn only_keys(&mut self, map: &JsonMap<String, Json>, allowed: &[&str], loc: &str, what: &str) -> bool {
        match map.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(key) => {
                self.error(loc, format!("unknown property '{key}' on {what}"));
                false
            }
            None => true,
        }
    }

    fn splice(
        &mut self,
        map: &JsonMap<String, Json>,
        name: &Json,
        loc: &str,
        depth: usize,
    ) -> Option<RuleNode> {
        if map.len() > 1 {
            self.error(loc, "'use' cannot be combined with other properties");
            return None;
        }
        let Some(name) = name.as_str().map(str::trim) else {
            self.error(loc, "'use' must name a fragment");
            return None;
        };
        let Some(raw) = self.fragments.get(name).cloned() else {
            self.error(loc, format!("unknown fragment '{name}'"));
            return None;
        };
        if self.active.iter().any(|a| a == name) {
            let mut chain = self.active.clone();
            chain.push(name.to_string());
            self.error(
                loc,
                format!("fragment cycle detected: {}", chain.join(" \u{2192} ")),
            );
            return None;
        }
        self.active.push(name.to_string());
        let node = self.node(&raw, &format!("fragments.{name}"), depth + 1);
        self.active.pop();
        node
    }

    // -- Rule kinds ---------------------------------------------

    fn field(&mut self, map: &JsonMap<String, Json>, loc: &str, depth: usize) -> Option<FieldRule> {
        let output_paths = self.output_paths(map, loc)?;
        let source = match map.get("source") {
            Some(raw) => self.source(raw, &format!("{loc}.source"), depth + 1)?,
            None => {
                self.error(loc, "field rule is missing 'source'");
                return None;
            }
        };
        let default_value = match map.get("defaultValue") {
            None | Some(Json::Null) => None,
            Some(v) => Some(self.literal(v, loc, "defaultValue")?),
        };
        Some(FieldRule {
            output_paths,
            source,
            default_value,
        })
    }

    fn array(&mut self, map: &JsonMap<String, Json>, loc: &str, depth: usize) -> Option<ArrayRule> {
        let input_path = self.required_text(map, "inputPath", loc)?;
        let output_paths = self.output_paths(map, loc)?;
        let coerce_single = match map.get("coerceSingle") {
            None | Some(Json::Null) => false,
            Some(Json::Bool(b)) => *b,
            Some(other) => {
                self.error(
                    loc,
                    format!("'coerceSingle' must be a boolean, found {}", json_type(other)),
                );
                return None;
            }
        };
        let item_rules = self.child_nodes(map, "itemRules", loc, depth)?;
        Some(ArrayRule {
            input_path,
            output_paths,
            coerce_single,
            item_rules,
        })
    }

    fn branch(&mut self, map: &JsonMap<String, Json>, loc: &str, depth: usize) -> Option<BranchRule> {
        let expression = self.required_text(map, "expression", loc)?;
        let then = self.child_nodes(map, "then", loc, depth)?;
        let mut else_if = Vec::new();
        match map.get("elseIf") {
            None | Some(Json::Null) => {}
            Some(Json::Array(arms)) => {
                for (i, arm) in arms.iter().enumerate() {
                    let arm_loc = format!("{loc}.elseIf[{i}]");
                    let Some(arm_map) = arm.as_object() else {
                        self.error(&arm_loc, "elseIf entry must be an object");
                        return None;
                    };
                    if !self.only_keys(arm_map, BRANCH_ARM_KEYS, &arm_loc, "elseIf entry") {
                        return None;
                    }
                    let expression = self.required_text(arm_map, "expression", &arm_loc)?;
                    let then = self.child_nodes(arm_map, "then", &arm_loc, depth)?;
                    else_if.push(BranchArm { expression, then });
                }
            }
            Some(other) => {
                self.error(loc, format!("'elseIf' must be an array, found {}", json_type(other)));
                return None;
            }
        }
        let otherwise = self.child_nodes(map, "else", loc, depth)?;
        Some(BranchRule {
            expression,
            then,
            else_if,
            otherwise,
        })
    }

    // -- Sources ------------------------------------------------

    fn source(&mut self, raw: &Json, loc: &str, depth: usize) -> Option<ValueSource> {
        if depth > MAX_NESTING {
            self.error(loc, format!("sources nest deeper than {MAX_NESTING} levels"));
            return None;
        }
        let Some(map) = raw.as_object() else {
            self.error(loc, format!("source must be an object, found {}", json_type(raw)));
            return None;
        };
        let kind = match map.get("type") {
            Some(Json::String(t)) => t.as_str(),
            _ => {
                self.error(
                    loc,
                    "source is missing 'type' (expected constant, path, merge, transform or condition)",
                );
                return None;
            }
        };
        match kind {
            "constant" => {
                if !self.only_keys(map, CONSTANT_KEYS, loc, "constant source") {
                    return None;
                }
                let value = match map.get("value") {
                    Some(v) => self.literal(v, loc, "value")?,
                    None => {
                        self.error(loc, "constant source is missing 'value'");
                        return None;
                    }
                };
                Some(ValueSource::Constant { value })
            }
            "path" => {
                if !self.only_keys(map, PATH_KEYS, loc, "path source") {
                    return None;
                }
                let path = self.required_text(map, "path", loc)?;
                Some(ValueSource::Path { path })
            }
            "merge" => {
                if !self.only_keys(map, MERGE_KEYS, loc, "merge source") {
                    return None;
                }
                self.merge(map, loc)
            }
            "transform" => {
                if !self.only_keys(map, TRANSFORM_KEYS, loc, "transform source") {
                    return None;
                }
                self.transform(map, loc).map(ValueSource::Transform)
            }
            "condition" => {
                if !self.only_keys(map, CONDITION_KEYS, loc, "condition source") {
                    return None;
                }
                self.condition(map, loc, depth).map(ValueSource::Condition)
            }
            other => {
                self.error(loc, format!("unsupported source type '{other}'"));
                None
            }
        }
    }

    fn merge(&mut self, map: &JsonMap<String, Json>, loc: &str) -> Option<ValueSource> {
        let paths = match map.get("paths") {
            Some(Json::Array(items)) => {
                let mut paths = Vec::new();
                for item in items {
                    let Some(p) = item.as_str() else {
                        self.error(loc, "'paths' entries must be strings");
                        return None;
                    };
                    let p = p.trim();
                    if !p.is_empty() {
                        paths.push(p.to_string());
                    }
                }
                paths
            }
            _ => {
                self.error(loc, "merge source needs a 'paths' array");
                return None;
            }
        };
        if paths.is_empty() {
            self.error(loc, "merge source has no paths");
            return None;
        }
        let mode = match map.get("mode").and_then(Json::as_str) {
            None => MergeMode::default(),
            Some("concat") => MergeMode::Concat,
            Some("firstNonEmpty") => MergeMode::FirstNonEmpty,
            Some("array") => MergeMode::Array,
            Some(other) => {
                self.error(
                    loc,
                    format!("unsupported merge mode '{other}' (expected concat, firstNonEmpty or array)"),
                );
                return None;
            }
        };
        let separator = self.optional_text(map, "separator", loc)?.unwrap_or_default();
        Some(ValueSource::Merge {
            paths,
            mode,
            separator,
        })
    }

    fn transform(&mut self, map: &JsonMap<String, Json>, loc: &str) -> Option<TransformSource> {
        let path = self.required_text(map, "path", loc)?;
        let name = self.required_text(map, "transform", loc)?;
        let separator = self.optional_text(map, "separator", loc)?;
        let kind = match name.as_str() {
            "toLowerCase" => TransformKind::Lowercase,
            "toUpperCase" => TransformKind::Uppercase,
            "number" => TransformKind::Number,
            "boolean" => TransformKind::Boolean,
            "concat" => TransformKind::Concat {
                separator: separator.unwrap_or_default(),
            },
            "split" => {
                let token_index = match map.get("tokenIndex") {
                    None | Some(Json::Null) => 0,
                    Some(v) => match v.as_i64() {
                        Some(i) => i,
                        None => {
                            self.error(loc, "'tokenIndex' must be an integer");
                            return None;
                        }
                    },
                };
                let trim = match map.get("trimAfterSplit") {
                    None | Some(Json::Null) => false,
                    Some(Json::Bool(b)) => *b,
                    Some(_) => {
                        self.error(loc, "'trimAfterSplit' must be a boolean");
                        return None;
                    }
                };
                TransformKind::Split {
                    separator: separator.unwrap_or_else(|| ",".to_string()),
                    token_index,
                    trim,
                }
            }
            other => match other.strip_prefix("custom:").map(str::trim) {
                Some(custom) if !custom.is_empty() => TransformKind::Custom(custom.to_string()),
                _ => {
                    self.error(
                        loc,
                        format!(
                            "unsupported transform '{other}' (expected toLowerCase, toUpperCase, \
                             number, boolean, concat, split or custom:<name>)"
                        ),
                    );
                    return None;
                }
            },
        };
        Some(TransformSource { path, kind })
    }

    fn condition(&mut self, map: &JsonMap<String, Json>, loc: &str, depth: usize) -> Option<ConditionSource> {
        let expression = self.required_text(map, "expression", loc)?;
        let output = match map.get("outputMode").and_then(Json::as_str) {
            Some("match") => ConditionOutput::Match,
            None | Some("branch") => {
                let when_true = self.outcome(map, "trueValue", "trueSource", loc, depth)?;
                let when_false = self.outcome(map, "falseValue", "falseSource", loc, depth)?;
                let mut else_if = Vec::new();
                match map.get("elseIf") {
                    None | Some(Json::Null) => {}
                    Some(Json::Array(arms)) => {
                        for (i, arm) in arms.iter().enumerate() {
                            let arm_loc = format!("{loc}.elseIf[{i}]");
                            let Some(arm_map) = arm.as_object() else {
                                self.error(&arm_loc, "elseIf entry must be an object");
                                return None;
                            };
                            if !self.only_keys(arm_map, CONDITION_ARM_KEYS, &arm_loc, "elseIf entry") {
                                return None;
                            }
                            let expression = self.required_text(arm_map, "expression", &arm_loc)?;
                            let outcome = self.outcome(arm_map, "value", "source", &arm_loc, depth)?;
                            else_if.push(ConditionArm {
                                expression,
                                outcome,
                            });
                        }
                    }
                    Some(other) => {
                        self.error(loc, format!("'elseIf' must be an array, found {}", json_type(other)));
                        return None;
                    }
                }
                ConditionOutput::Branch {
                    when_true,
                    else_if,
                    when_false,
                }
            }
            Some(other) => {
                self.error(
                    loc,
                    format!("unsupported outputMode '{other}' (expected branch or match)"),
                );
                return None;
            }
        };
        Some(ConditionSource { expression, output })
    }

    /// `Some(None)` when neither key is present; `None` when invalid.
    fn outcome(
        &mut self,
        map: &JsonMap<String, Json>,
        value_key: &str,
        source_key: &str,
        loc: &str,
        depth: usize,
    ) -> Option<Option<Outcome>> {
        let value = match map.get(value_key) {
            None | Some(Json::Null) => None,
            Some(v) => Some(self.literal(v, loc, value_key)?),
        };
        let source = match map.get(source_key) {
            None | Some(Json::Null) => None,
            Some(raw) => Some(self.source(raw, &format!("{loc}.{source_key}"), depth + 1)?),
        };
        match (value, source) {
            (Some(_), Some(source)) => {
                self.error(
                    loc,
                    format!("both '{value_key}' and '{source_key}' are set; '{source_key}' is used"),
                );
                Some(Some(Outcome::Source(Box::new(source))))
            }
            (None, Some(source)) => Some(Some(Outcome::Source(Box::new(source)))),
            (Some(value), None) => Some(Some(Outcome::Value(value))),
            (None, None) => Some(None),
        }
    }

    // -- Scalars ------------------------------------------------

    fn output_paths(&mut self, map: &JsonMap<String, Json>, loc: &str) -> Option<Vec<String>> {
        let raw = match map.get("outputPaths") {
            None | Some(Json::Null) => return Some(Vec::new()),
            Some(Json::Array(items)) => items,
            Some(other) => {
                self.error(
                    loc,
                    format!("'outputPaths' must be an array of strings, found {}", json_type(other)),
                );
                return None;
            }
        };
        let mut paths: Vec<String> = Vec::new();
        for item in raw {
            let Some(p) = item.as_str() else {
                self.error(loc, "'outputPaths' entries must be strings");
                return None;
            };
            let cleaned = clean_output_path(p);
            if !cleaned.is_empty() && !paths.contains(&cleaned) {
                paths.push(cleaned);
            }
        }
        Some(paths)
    }

    fn required_text(&mut self, map: &JsonMap<String, Json>, key: &str, loc: &str) -> Option<String> {
        match map.get(key) {
            Some(Json::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Json::String(_)) => {
                self.error(loc, format!("'{key}' must not be empty"));
                None
            }
            Some(other) => {
                self.error(loc, format!("'{key}' must be a string, found {}", json_type(other)));
                None
            }
            None => {
                self.error(loc, format!("missing '{key}'"));
                None
            }
        }
    }

    /// Separators are kept verbatim (whitespace is meaningful).
    fn optional_text(&mut self, map: &JsonMap<String, Json>, key: &str, loc: &str) -> Option<Option<String>> {
        match map.get(key) {
            None | Some(Json::Null) => Some(None),
            Some(Json::String(s)) => Some(Some(s.clone())),
            Some(other) => {
                self.error(loc, format!("'{key}' must be a string, found {}", json_type(other)));
                None
            }
        }
    }

    /// Literal text for constants, defaults and condition values. Scalars
    /// are accepted and rendered as their literal text.
    fn literal(&mut self, v: &Json, loc: &str, key: &str) -> Option<String> {
        match v {
            Json::String(s) => Some(s.clone()),
            Json::Bool(b) => Some(b.to_string()),
            Json::Null => Some("null".to_string()),
            Json::Number(n) => Some(format_number(n.as_f64().unwrap_or(f64::NAN))),
            other => {
                self.error(loc, format!("'{key}' must be literal text, found {}", json_type(other)));
                None
            }
        }
    }
}

/// Trim and strip the `$.` prefix. `$` alone is kept (root write).
fn clean_output_path(path: &str) -> String {
    let trimmed = path.trim();
    trimmed
        .strip_prefix("$.")
        .map(str::trim)
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn norm(doc: Json) -> ConversionRules {
        normalize_rules(&doc)
    }

    #[test]
    fn field_paths_are_cleaned() {
        let r = norm(json!({"rules": [{
            "kind": "field",
            "outputPaths": [" $.user.name ", "user.name", "", "$"],
            "source": {"type": "path", "path": " name "}
        }]}));
        assert!(r.validation_errors.is_empty(), "{:?}", r.validation_errors);
        let RuleNode::Field(f) = &r.rules[0] else {
            panic!("expected field");
        };
        assert_eq!(f.output_paths, vec!["user.name", "$"]);
        assert_eq!(f.source, ValueSource::Path { path: "name".into() });
    }

    #[test]
    fn bad_json_text_gives_empty_rules() {
        let r = normalize_rules("{not json");
        assert!(r.rules.is_empty());
        assert_eq!(r.validation_errors.len(), 1);
        assert!(r.validation_errors[0].contains("not valid JSON"));
    }

    #[test]
    fn non_object_and_missing_rules() {
        assert_eq!(norm(json!([1])).validation_errors.len(), 1);
        let r = norm(json!({"inputFormat": "json"}));
        assert!(r.validation_errors[0].contains("missing the 'rules' array"));
    }

    #[test]
    fn legacy_property_rejects_document() {
        let r = norm(json!({"rules": [
            {"kind": "field", "outputPaths": ["a"], "source": {"type": "path", "path": "a"}},
            {"kind": "branch", "expression": "true", "then": [{"kind": "field", "outputPath": "x"}]}
        ]}));
        assert!(r.rules.is_empty());
        assert_eq!(r.validation_errors.len(), 1);
        let msg = &r.validation_errors[0];
        assert!(msg.contains("'outputPath'") && msg.contains("outputPaths") && msg.contains("schema 2"));
        assert!(msg.contains("rules[1].then[0]"));
    }

    #[test]
    fn legacy_type_on_rule_and_default_on_source() {
        let r = norm(json!({"rules": [{"type": "field"}]}));
        assert!(r.validation_errors[0].contains("'kind'"));
        let r = norm(json!({"rules": [{"kind": "field", "outputPaths": ["a"],
            "source": {"type": "path", "path": "a", "defaultValue": "x"}}]}));
        assert!(r.validation_errors[0].contains("defaultValue"));
        assert!(r.rules.is_empty());
    }

    #[test]
    fn unknown_property_drops_only_that_rule() {
        let r = norm(json!({"rules": [
            {"kind": "field", "outputPaths": ["a"], "source": {"type": "path", "path": "a"}, "extra": 1},
            {"kind": "field", "outputPaths": ["b"], "source": {"type": "path", "path": "b"}}
        ]}));
        assert_eq!(r.rules.len(), 1);
        assert_eq!(r.validation_errors, vec!["rules[0]: unknown property 'extra' on field rule"]);
    }

    #[test]
    fn unknown_top_level_property() {
        let r = norm(json!({"rules": [], "version": 2}));
        assert!(r.validation_errors[0].contains("'version'"));
    }

    #[test]
    fn fragments_are_spliced() {
        let r = norm(json!({
            "fragments": {"name": {"kind": "field", "outputPaths": ["n"], "source": {"type": "path", "path": "name"}}},
            "rules": [{"use": "name"}, {"use": "missing"}]
        }));
        assert_eq!(r.rules.len(), 1);
        assert_eq!(r.validation_errors, vec!["rules[1]: unknown fragment 'missing'"]);
    }

    #[test]
    fn self_referencing_fragment_is_a_cycle() {
        let r = norm(json!({
            "fragments": {"loop": {"kind": "branch", "expression": "true", "then": [{"use": "loop"}]}},
            "rules": [{"use": "loop"}]
        }));
        assert!(r
            .validation_errors
            .iter()
            .any(|e| e.contains("fragment cycle detected: loop \u{2192} loop")));
    }

    #[test]
    fn unused_fragment_cycle_is_still_reported() {
        let r = norm(json!({
            "fragments": {
                "a": {"kind": "branch", "expression": "true", "then": [{"use": "b"}]},
                "b": {"kind": "branch", "expression": "true", "then": [{"use": "a"}]}
            },
            "rules": []
        }));
        assert!(r
            .validation_errors
            .iter()
            .any(|e| e.contains("a \u{2192} b \u{2192} a")));
    }

    #[test]
    fn use_with_extra_keys() {
        let r = norm(json!({"fragments": {"f": {"kind": "field", "source": {"type": "constant", "value": "x"}}},
            "rules": [{"use": "f", "kind": "field"}]}));
        assert!(r.validation_errors[0].contains("cannot be combined"));
    }

    #[test]
    fn value_and_source_both_set_prefers_source() {
        let r = norm(json!({"rules": [{"kind": "field", "outputPaths": ["a"], "source": {
            "type": "condition", "expression": "true",
            "trueValue": "lit", "trueSource": {"type": "path", "path": "x"}
        }}]}));
        assert_eq!(r.rules.len(), 1);
        assert_eq!(r.validation_errors.len(), 1);
        let RuleNode::Field(f) = &r.rules[0] else { panic!() };
        let ValueSource::Condition(c) = &f.source else { panic!() };
        let ConditionOutput::Branch { when_true, .. } = &c.output else { panic!() };
        assert!(matches!(when_true, Some(Outcome::Source(_))));
    }

    #[test]
    fn scalar_literals_become_text() {
        let r = norm(json!({"rules": [{"kind": "field", "outputPaths": ["a"],
            "source": {"type": "constant", "value": 5}, "defaultValue": true}]}));
        let RuleNode::Field(f) = &r.rules[0] else { panic!() };
        assert_eq!(f.source, ValueSource::Constant { value: "5".into() });
        assert_eq!(f.default_value.as_deref(), Some("true"));
    }

    #[test]
    fn include_outside_bundler_is_reported() {
        let r = norm(json!({"include": ["x.json"], "rules": []}));
        assert!(r.validation_errors[0].starts_with("include:"));
    }

    #[test]
    fn split_defaults() {
        let r = norm(json!({"rules": [{"kind": "field", "outputPaths": ["a"],
            "source": {"type": "transform", "path": "x", "transform": "split"}}]}));
        let RuleNode::Field(f) = &r.rules[0] else { panic!() };
        assert_eq!(
            f.source,
            ValueSource::Transform(TransformSource {
                path: "x".into(),
                kind: TransformKind::Split {
                    separator: ",".into(),
                    token_index: 0,
                    trim: false
                }
            })
        );
    }

    #[test]
    fn typed_input_renormalizes_to_itself() {
        let once = norm(json!({
            "schemaVersion": "2.0.0",
            "outputFormat": "xml",
            "rules": [
                {"kind": "array", "inputPath": "items", "outputPaths": ["$.out"], "itemRules": [
                    {"kind": "field", "outputPaths": ["id"], "source": {"type": "merge", "paths": ["a", "b"], "mode": "firstNonEmpty"}}
                ]},
                {"kind": "field", "outputPaths": ["x"], "source": {"type": "bogus"}}
            ]
        }));
        let twice = normalize_rules(once.clone());
        assert_eq!(once, twice);
    }
}
