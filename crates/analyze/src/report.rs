//! Diagnostic and report types shared by lint, doctor and compat.

use serde::Serialize;
use std::fmt;

/// Diagnostic codes. Stable strings; tooling matches on them.
pub mod codes {
    pub const MISSING_DEFAULT: &str = "missing-default";
    pub const DUPLICATE_OUTPUT_PATH: &str = "duplicate-output-path";
    pub const UNREACHABLE_BRANCH: &str = "unreachable-branch";
    pub const DEAD_BRANCH: &str = "dead-branch";
    pub const INVALID_EXPRESSION: &str = "invalid-expression";
    pub const VALIDATION_ERROR: &str = "validation-error";
    pub const RUNTIME_ERROR: &str = "runtime-error";
    pub const RUNTIME_WARNING: &str = "runtime-warning";
    pub const RUNTIME_CHECKS_SKIPPED: &str = "runtime-checks-skipped";
    pub const SCHEMA_VERSION_MISSING: &str = "schema-version-missing";
    pub const SCHEMA_VERSION_INVALID: &str = "schema-version-invalid";
    pub const RUNTIME_VERSION_INVALID: &str = "runtime-version-invalid";
    pub const SCHEMA_TOO_NEW: &str = "schema-too-new";
    pub const SCHEMA_OLDER_MAJOR: &str = "schema-older-major";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: Severity,
    /// Location in the rules document, e.g. `rules[1].then[0]`.
    pub rule_path: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn new(code: &'static str, severity: Severity, rule_path: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            severity,
            rule_path: rule_path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}: {}", self.severity, self.code, self.rule_path, self.message)?;
        if let Some(s) = &self.suggestion {
            write!(f, " (hint: {s})")?;
        }
        Ok(())
    }
}

/// Lint findings plus runtime findings from a sample run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorReport {
    pub diagnostics: Vec<Diagnostic>,
    pub has_errors: bool,
    /// Suggested edits, one per distinct finding. Nothing is applied.
    pub safe_fixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityReport {
    pub diagnostics: Vec<Diagnostic>,
    pub is_compatible: bool,
}

pub(crate) fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == Severity::Error)
}

/// Split `rules[0].then[1]: message` into location and message.
pub(crate) fn split_location(text: &str) -> (String, String) {
    match text.split_once(": ") {
        Some((loc, msg)) if is_location(loc) => {
            (loc.to_string(), msg.to_string())
        }
        _ => (String::new(), text.to_string()),
    }
}

fn is_location(loc: &str) -> bool {
    const TOP_LEVEL: [&str; 5] = ["schemaVersion", "inputFormat", "outputFormat", "include", "fragments"];
    loc.starts_with("rules[") || loc.starts_with("fragments.") || TOP_LEVEL.contains(&loc)
}
