use std::path::Path;
use std::process;

use mapwright_analyze::check_compatibility;

use super::{load_rules, print_json};
use crate::OutputFormat;

/// Check `schemaVersion` against `target`. Exits 1 when incompatible.
pub(crate) fn cmd_compat(rules: &Path, target: &str, output: OutputFormat, quiet: bool) {
    let doc = load_rules(rules, output, quiet);
    let report = check_compatibility(&doc, target);

    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            if !quiet {
                for d in &report.diagnostics {
                    println!("{d}");
                }
                if report.is_compatible {
                    println!("compatible with schema {target}");
                } else {
                    println!("not compatible with schema {target}");
                }
            }
        }
    }

    if !report.is_compatible {
        process::exit(1);
    }
}
