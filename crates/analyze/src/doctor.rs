//! Rule doctor: lint plus runtime findings from a sample payload.

use crate::lint::lint;
use crate::report::{codes, has_errors, split_location, Diagnostic, DoctorReport, Severity};
use mapwright_core::{ConversionRules, Value};
use mapwright_eval::{execute, ExecOptions};
use std::collections::HashSet;
use tracing::debug;

/// Diagnose `rules`. With a `sample`, the rules are executed and their
/// errors and warnings become diagnostics; without one, an informational
/// finding records that runtime checks were skipped.
pub fn diagnose(rules: &ConversionRules, sample: Option<&Value>, options: &ExecOptions) -> DoctorReport {
    let mut diagnostics = lint(rules);

    match sample {
        Some(input) => {
            let result = execute(rules, input, options);
            let known: HashSet<&String> = rules.validation_errors.iter().collect();
            for error in result.errors.iter().filter(|e| !known.contains(e)) {
                let (loc, msg) = split_location(error);
                diagnostics.push(Diagnostic::new(codes::RUNTIME_ERROR, Severity::Error, loc, msg));
            }
            for warning in &result.warnings {
                let (loc, msg) = split_location(warning);
                diagnostics.push(Diagnostic::new(codes::RUNTIME_WARNING, Severity::Warning, loc, msg));
            }
        }
        None => diagnostics.push(Diagnostic::new(
            codes::RUNTIME_CHECKS_SKIPPED,
            Severity::Info,
            "",
            "no sample payload given; runtime checks skipped",
        )),
    }

    let safe_fixes = safe_fixes(&diagnostics);
    debug!(findings = diagnostics.len(), fixes = safe_fixes.len(), "diagnosed rules");
    DoctorReport {
        has_errors: has_errors(&diagnostics),
        diagnostics,
        safe_fixes,
    }
}

fn fix_for(code: &str) -> Option<&'static str> {
    Some(match code {
        codes::MISSING_DEFAULT => "add a defaultValue so a missing input does not write null",
        codes::DUPLICATE_OUTPUT_PATH => "write each output path from one rule, or move the writers into exclusive branch arms",
        codes::UNREACHABLE_BRANCH => "remove the elseIf/else arms of the always-true branch",
        codes::DEAD_BRANCH => "remove the always-false branch or correct its expression",
        codes::INVALID_EXPRESSION => "rewrite the expression using eq/==, not eq/!=, gt/>, gte/>=, lt/<, lte/<= or in [..]",
        codes::VALIDATION_ERROR => "fix the rule shape; the rule is dropped until then",
        codes::RUNTIME_ERROR => "check the rule against the sample input (array inputs may need coerceSingle)",
        codes::RUNTIME_WARNING => "confirm the input path exists in real payloads or remove the rule",
        _ => return None,
    })
}

/// One suggestion per (location, code), in diagnostic order.
fn safe_fixes(diagnostics: &[Diagnostic]) -> Vec<String> {
    let mut seen = HashSet::new();
    diagnostics
        .iter()
        .filter_map(|d| {
            let fix = fix_for(d.code)?;
            if !seen.insert((d.rule_path.as_str(), d.code)) {
                return None;
            }
            Some(if d.rule_path.is_empty() {
                fix.to_string()
            } else {
                format!("{}: {fix}", d.rule_path)
            })
        })
        .collect()
}
