//! Static lint over normalized rules.
//!
//! Nothing is executed against real input. Constant branch expressions
//! are evaluated against an empty document to find arms that can never
//! run.

use crate::report::{codes, split_location, Diagnostic, Severity};
use mapwright_core::coerce::is_truthy;
use mapwright_core::{
    parse_expression, BranchRule, ConditionOutput, ConversionRules, Outcome, RuleNode, Value, ValueSource,
};
use mapwright_eval::{evaluate, Scope};
use std::collections::HashMap;
use tracing::debug;

/// Lint `rules`. Validation errors recorded during normalization are
/// reported first.
pub fn lint(rules: &ConversionRules) -> Vec<Diagnostic> {
    let mut out: Vec<Diagnostic> = rules
        .validation_errors
        .iter()
        .map(|e| {
            let (loc, msg) = split_location(e);
            Diagnostic::new(codes::VALIDATION_ERROR, Severity::Error, loc, msg)
        })
        .collect();
    let mut linter = Linter { out: &mut out };
    let mut seen = HashMap::new();
    linter.nodes(&rules.rules, "rules", &mut seen);
    debug!(findings = out.len(), "linted rules");
    out
}

/// Output path -> location of the rule that wrote it first.
type Writers = HashMap<String, String>;

struct Linter<'a> {
    out: &'a mut Vec<Diagnostic>,
}

impl Linter<'_> {
    fn nodes(&mut self, nodes: &[RuleNode], prefix: &str, seen: &mut Writers) {
        for (i, node) in nodes.iter().enumerate() {
            let loc = format!("{prefix}[{i}]");
            match node {
                RuleNode::Field(f) => {
                    if matches!(f.source, ValueSource::Path { .. }) && f.default_value.is_none() {
                        self.out.push(
                            Diagnostic::new(
                                codes::MISSING_DEFAULT,
                                Severity::Warning,
                                &loc,
                                "path source has no defaultValue; a missing input writes null",
                            )
                            .suggest("add a defaultValue"),
                        );
                    }
                    self.source(&f.source, &loc);
                    self.outputs(&f.output_paths, &loc, seen);
                }
                RuleNode::Array(a) => {
                    let mut item_scope = Writers::new();
                    self.nodes(&a.item_rules, &format!("{loc}.itemRules"), &mut item_scope);
                    self.outputs(&a.output_paths, &loc, seen);
                }
                RuleNode::Branch(b) => self.branch(b, &loc, seen),
            }
        }
    }

    fn outputs(&mut self, paths: &[String], loc: &str, seen: &mut Writers) {
        for path in paths {
            match seen.get(path) {
                Some(first) => self.out.push(
                    Diagnostic::new(
                        codes::DUPLICATE_OUTPUT_PATH,
                        Severity::Warning,
                        loc,
                        format!("output path '{path}' is already written by {first}"),
                    )
                    .suggest("remove one writer or set a collision policy"),
                ),
                None => {
                    seen.insert(path.clone(), loc.to_string());
                }
            }
        }
    }

    /// Arms are mutually exclusive, so each starts from the writes seen
    /// before the branch; afterwards every arm's writes count.
    fn branch(&mut self, b: &BranchRule, loc: &str, seen: &mut Writers) {
        let constant = self.expression(&b.expression, loc);
        match constant {
            Some(true) if !b.else_if.is_empty() || !b.otherwise.is_empty() => self.out.push(
                Diagnostic::new(
                    codes::UNREACHABLE_BRANCH,
                    Severity::Warning,
                    loc,
                    format!("expression '{}' is always true; elseIf/else never run", b.expression),
                )
                .suggest("drop the elseIf/else arms or fix the expression"),
            ),
            Some(false) if b.else_if.is_empty() && b.otherwise.is_empty() && !b.then.is_empty() => self.out.push(
                Diagnostic::new(
                    codes::DEAD_BRANCH,
                    Severity::Warning,
                    loc,
                    format!("expression '{}' is always false; then never runs", b.expression),
                )
                .suggest("remove the branch or fix the expression"),
            ),
            _ => {}
        }

        let before = seen.clone();
        let mut arms = Vec::new();

        let mut then_seen = before.clone();
        self.nodes(&b.then, &format!("{loc}.then"), &mut then_seen);
        arms.push(then_seen);
        for (j, arm) in b.else_if.iter().enumerate() {
            let arm_loc = format!("{loc}.elseIf[{j}]");
            self.expression(&arm.expression, &arm_loc);
            let mut arm_seen = before.clone();
            self.nodes(&arm.then, &format!("{arm_loc}.then"), &mut arm_seen);
            arms.push(arm_seen);
        }
        let mut else_seen = before;
        self.nodes(&b.otherwise, &format!("{loc}.else"), &mut else_seen);
        arms.push(else_seen);

        for arm in arms {
            for (path, writer) in arm {
                seen.entry(path).or_insert(writer);
            }
        }
    }

    fn source(&mut self, source: &ValueSource, loc: &str) {
        let ValueSource::Condition(c) = source else {
            return;
        };
        self.expression(&c.expression, loc);
        if let ConditionOutput::Branch {
            when_true,
            else_if,
            when_false,
        } = &c.output
        {
            for arm in else_if {
                self.expression(&arm.expression, loc);
            }
            let nested = when_true
                .iter()
                .chain(else_if.iter().filter_map(|arm| arm.outcome.as_ref()))
                .chain(when_false.iter());
            for outcome in nested {
                if let Outcome::Source(s) = outcome {
                    self.source(s, loc);
                }
            }
        }
    }

    /// Report a parse failure; for a constant expression, return its value.
    fn expression(&mut self, text: &str, loc: &str) -> Option<bool> {
        match parse_expression(text) {
            Ok(expr) if expr.is_constant() => {
                let empty = Value::Null;
                Some(is_truthy(&evaluate(&expr, &Scope::root(&empty))))
            }
            Ok(_) => None,
            Err(e) => {
                self.out.push(
                    Diagnostic::new(
                        codes::INVALID_EXPRESSION,
                        Severity::Error,
                        loc,
                        format!("invalid expression '{}': {}", text, e.message),
                    )
                    .suggest(e.to_string()),
                );
                None
            }
        }
    }
}
