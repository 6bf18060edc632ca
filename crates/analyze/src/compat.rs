//! `schemaVersion` compatibility against a runtime schema version.

use crate::report::{codes, has_errors, CompatibilityReport, Diagnostic, Severity};
use mapwright_core::ConversionRules;
use semver::Version;
use serde_json::Value as Json;

const LOCATION: &str = "schemaVersion";

/// Check a raw rules document's `schemaVersion` against `target`.
pub fn check_compatibility(doc: &Json, target: &str) -> CompatibilityReport {
    let declared = match doc.get("schemaVersion") {
        None | Some(Json::Null) => Declared::Missing,
        Some(Json::String(s)) => Declared::Text(s.trim()),
        Some(other) => Declared::NotText(other.to_string()),
    };
    check(declared, target)
}

/// Check already-normalized rules.
pub fn check_rules_compatibility(rules: &ConversionRules, target: &str) -> CompatibilityReport {
    let declared = match &rules.schema_version {
        Some(v) => Declared::Text(v.as_str()),
        None => Declared::Missing,
    };
    check(declared, target)
}

enum Declared<'a> {
    Missing,
    Text(&'a str),
    NotText(String),
}

fn check(declared: Declared<'_>, target: &str) -> CompatibilityReport {
    let mut diagnostics = Vec::new();

    let runtime = match Version::parse(target.trim()) {
        Ok(v) => Some(v),
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                codes::RUNTIME_VERSION_INVALID,
                Severity::Error,
                "",
                format!("runtime schema version '{target}' is not a semantic version: {e}"),
            ));
            None
        }
    };

    let rules_version = match declared {
        Declared::Missing => {
            diagnostics.push(
                Diagnostic::new(
                    codes::SCHEMA_VERSION_MISSING,
                    Severity::Warning,
                    LOCATION,
                    "rules document does not declare a schemaVersion",
                )
                .suggest(format!("add \"schemaVersion\": \"{}\"", mapwright_core::SCHEMA_VERSION)),
            );
            None
        }
        Declared::NotText(raw) => {
            diagnostics.push(Diagnostic::new(
                codes::SCHEMA_VERSION_INVALID,
                Severity::Error,
                LOCATION,
                format!("schemaVersion must be a string, found {raw}"),
            ));
            None
        }
        Declared::Text(text) => match Version::parse(text) {
            Ok(v) => Some(v),
            Err(e) => {
                diagnostics.push(
                    Diagnostic::new(
                        codes::SCHEMA_VERSION_INVALID,
                        Severity::Error,
                        LOCATION,
                        format!("schemaVersion '{text}' is not a semantic version: {e}"),
                    )
                    .suggest("use MAJOR.MINOR.PATCH, e.g. \"2.0.0\""),
                );
                None
            }
        },
    };

    if let (Some(rules_version), Some(runtime)) = (rules_version, runtime) {
        if rules_version > runtime {
            diagnostics.push(
                Diagnostic::new(
                    codes::SCHEMA_TOO_NEW,
                    Severity::Error,
                    LOCATION,
                    format!("rules target schema {rules_version}, newer than runtime {runtime}"),
                )
                .suggest("upgrade the runtime or lower schemaVersion"),
            );
        } else if rules_version.major < runtime.major {
            diagnostics.push(Diagnostic::new(
                codes::SCHEMA_OLDER_MAJOR,
                Severity::Info,
                LOCATION,
                format!(
                    "rules target schema {rules_version}, an older major version than runtime {runtime}"
                ),
            ));
        }
    }

    CompatibilityReport {
        is_compatible: !has_errors(&diagnostics),
        diagnostics,
    }
}
