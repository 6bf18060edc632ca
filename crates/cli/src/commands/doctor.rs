use std::path::Path;
use std::process;

use mapwright_analyze::diagnose;
use mapwright_core::{normalize_rules, parse_payload, CollisionPolicy};
use mapwright_eval::ExecOptions;

use super::{load_rules, print_diagnostics, print_json, read_input};
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_doctor(
    rules: &Path,
    sample: Option<&Path>,
    policy: CollisionPolicy,
    output: OutputFormat,
    quiet: bool,
) {
    let doc = load_rules(rules, output, quiet);
    let rules = normalize_rules(&doc);

    // The sample is parsed in the rules' own input format.
    let sample = sample.map(|path| {
        let text = read_input(Some(path), output, quiet);
        match parse_payload(&text, rules.input_format) {
            Ok(v) => v,
            Err(e) => {
                report_error(&format!("error parsing sample {}: {e}", path.display()), output, quiet);
                process::exit(1);
            }
        }
    });

    let options = ExecOptions::default().with_collision_policy(policy);
    let report = diagnose(&rules, sample.as_ref(), &options);

    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            if !quiet {
                print_diagnostics(&report.diagnostics);
                if !report.safe_fixes.is_empty() {
                    println!();
                    println!("Suggested fixes:");
                    for fix in &report.safe_fixes {
                        println!("  - {fix}");
                    }
                }
            }
        }
    }

    if report.has_errors {
        process::exit(1);
    }
}
