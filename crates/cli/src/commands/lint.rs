use std::path::Path;
use std::process;

use mapwright_analyze::{lint, Severity};
use mapwright_core::normalize_rules;

use super::{load_rules, print_diagnostics, print_json};
use crate::OutputFormat;

/// Lint a rules document. Exits 1 when any finding is an error.
pub(crate) fn cmd_lint(rules: &Path, output: OutputFormat, quiet: bool) {
    let doc = load_rules(rules, output, quiet);
    let diagnostics = lint(&normalize_rules(&doc));

    match output {
        OutputFormat::Json => print_json(&diagnostics),
        OutputFormat::Text => {
            if !quiet {
                print_diagnostics(&diagnostics);
            }
        }
    }

    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        process::exit(1);
    }
}
