//! Rule tree executor.
//!
//! Walks rule nodes in order against one input document and builds the
//! output tree. A failing rule records an error and is skipped; siblings
//! and later rules still run.

use crate::predicate::{test, Expressions, Scope};
use crate::resolve::Resolver;
use crate::types::{ConversionResult, ExecError, ExecOptions};
use mapwright_core::coerce::parse_scalar;
use mapwright_core::path::set_path;
use mapwright_core::{ArrayRule, BranchRule, ConversionRules, FieldRule, RuleNode, Value};
use tracing::trace;

pub const MAX_RULE_DEPTH: usize = 64;

/// Run `rules` against `input`. Validation errors recorded during
/// normalization come first in the result's errors.
pub fn execute(rules: &ConversionRules, input: &Value, options: &ExecOptions) -> ConversionResult {
    execute_with(rules, input, options, &Expressions::new())
}

/// [`execute`] with pre-parsed expressions.
pub(crate) fn execute_with(
    rules: &ConversionRules,
    input: &Value,
    options: &ExecOptions,
    expressions: &Expressions,
) -> ConversionResult {
    let mut run = Run {
        resolver: Resolver::new(options, expressions),
        errors: rules.validation_errors.clone(),
        warnings: Vec::new(),
    };
    let mut output = Value::object();
    run.nodes(&rules.rules, &Scope::root(input), &mut output, "rules", 0);
    ConversionResult {
        output,
        errors: run.errors,
        warnings: run.warnings,
    }
}

struct Run<'a> {
    resolver: Resolver<'a>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Run<'_> {
    fn error(&mut self, loc: &str, err: ExecError) {
        self.errors.push(format!("{loc}: {err}"));
    }

    fn nodes(&mut self, nodes: &[RuleNode], scope: &Scope<'_>, out: &mut Value, prefix: &str, depth: usize) {
        if depth > MAX_RULE_DEPTH {
            self.error(prefix, ExecError::RuleDepth { limit: MAX_RULE_DEPTH });
            return;
        }
        for (i, node) in nodes.iter().enumerate() {
            let loc = format!("{prefix}[{i}]");
            trace!(rule = %loc, kind = node.kind(), "executing rule");
            match node {
                RuleNode::Field(f) => self.field(f, scope, out, &loc),
                RuleNode::Array(a) => self.array(a, scope, out, &loc, depth),
                RuleNode::Branch(b) => self.branch(b, scope, out, &loc, depth),
            }
        }
    }

    fn write(&mut self, out: &mut Value, paths: &[String], value: Value, loc: &str) {
        let policy = self.resolver.options.collision_policy;
        for path in paths {
            if let Err(e) = set_path(out, path, value.clone(), policy) {
                self.error(loc, e.into());
            }
        }
    }

    fn field(&mut self, rule: &FieldRule, scope: &Scope<'_>, out: &mut Value, loc: &str) {
        if rule.output_paths.is_empty() {
            self.error(loc, ExecError::MissingOutputPath);
            return;
        }
        let mut value = match self.resolver.resolve(&rule.source, scope, 0) {
            Ok(v) => v,
            Err(e) => {
                self.error(loc, e);
                return;
            }
        };
        if value.is_blank() {
            if let Some(default) = &rule.default_value {
                value = parse_scalar(default);
            }
        }
        self.write(out, &rule.output_paths, value, loc);
    }

    fn array(&mut self, rule: &ArrayRule, scope: &Scope<'_>, out: &mut Value, loc: &str, depth: usize) {
        if rule.output_paths.is_empty() {
            self.error(loc, ExecError::MissingOutputPath);
            return;
        }
        let items: Vec<&Value> = match scope.lookup(&rule.input_path) {
            None | Some(Value::Null) => {
                self.warnings.push(format!(
                    "{loc}: input path '{}' not found; array rule skipped",
                    rule.input_path
                ));
                return;
            }
            Some(Value::Array(items)) => items.iter().collect(),
            Some(single) if rule.coerce_single => vec![single],
            Some(other) => {
                self.error(
                    loc,
                    ExecError::NotAnArray {
                        path: rule.input_path.clone(),
                        found: other.type_name(),
                    },
                );
                return;
            }
        };

        let mut collected = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            if rule.item_rules.is_empty() {
                collected.push(item.clone());
                continue;
            }
            let mut item_out = Value::object();
            let prefix = format!("{loc}[item {i}].itemRules");
            self.nodes(&rule.item_rules, &scope.with_item(item), &mut item_out, &prefix, depth + 1);
            collected.push(item_out);
        }
        self.write(out, &rule.output_paths, Value::Array(collected), loc);
    }

    fn branch(&mut self, rule: &BranchRule, scope: &Scope<'_>, out: &mut Value, loc: &str, depth: usize) {
        match self.matches(&rule.expression, scope) {
            Ok(true) => return self.nodes(&rule.then, scope, out, &format!("{loc}.then"), depth + 1),
            Ok(false) => {}
            Err(e) => return self.error(loc, e),
        }
        for (j, arm) in rule.else_if.iter().enumerate() {
            let arm_loc = format!("{loc}.elseIf[{j}]");
            match self.matches(&arm.expression, scope) {
                Ok(true) => return self.nodes(&arm.then, scope, out, &format!("{arm_loc}.then"), depth + 1),
                Ok(false) => {}
                Err(e) => return self.error(&arm_loc, e),
            }
        }
        self.nodes(&rule.otherwise, scope, out, &format!("{loc}.else"), depth + 1);
    }

    fn matches(&self, expression: &str, scope: &Scope<'_>) -> Result<bool, ExecError> {
        let expr = self.resolver.expression(expression)?;
        Ok(test(expr.as_ref(), scope))
    }
}
