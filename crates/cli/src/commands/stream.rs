use std::path::Path;
use std::process;

use mapwright_core::{format_payload, CollisionPolicy};
use mapwright_eval::{convert_stream, CompiledPlan, ExecOptions, StreamOptions};

use super::{load_rules, open_input};
use crate::{report_error, OutputFormat};

/// Convert every item of a stream. Each converted item is printed on its
/// own line (compact output, or one JSON result object per line with
/// `--output json`). Exits 1 on a fatal stream error or when any item
/// failed.
pub(crate) fn cmd_stream(
    rules: &Path,
    input: Option<&Path>,
    stream: &StreamOptions,
    policy: CollisionPolicy,
    output: OutputFormat,
    quiet: bool,
) {
    let doc = load_rules(rules, output, quiet);
    let plan = CompiledPlan::compile(&doc);
    let options = ExecOptions::default().with_collision_policy(policy);
    let output_format = plan.rules().output_format;

    let reader = match open_input(input) {
        Ok(r) => r,
        Err(e) => {
            report_error(&format!("error opening input: {e}"), output, quiet);
            process::exit(1);
        }
    };
    let items = match convert_stream(reader, &plan, stream, &options) {
        Ok(items) => items,
        Err(e) => {
            report_error(&format!("stream error: {e}"), output, quiet);
            process::exit(1);
        }
    };

    let mut failed = 0usize;
    for (index, item) in items.enumerate() {
        let result = match item {
            Ok(r) => r,
            Err(e) => {
                report_error(&format!("stream error: {e}"), output, quiet);
                process::exit(1);
            }
        };
        if !result.is_ok() {
            failed += 1;
        }

        match output {
            OutputFormat::Json => match serde_json::to_string(&result) {
                Ok(line) => println!("{line}"),
                Err(e) => report_error(&format!("item {index}: serialization: {e}"), output, quiet),
            },
            OutputFormat::Text => {
                if result.is_ok() {
                    match format_payload(&result.output, output_format, false) {
                        Ok(body) => println!("{body}"),
                        Err(e) => {
                            failed += 1;
                            report_error(&format!("item {index}: {e}"), output, quiet);
                        }
                    }
                } else if !quiet {
                    for error in &result.errors {
                        eprintln!("item {index}: error: {error}");
                    }
                }
                if !quiet {
                    for warning in &result.warnings {
                        eprintln!("item {index}: warning: {warning}");
                    }
                }
            }
        }
    }

    if failed > 0 {
        report_error(&format!("{failed} item(s) failed"), output, quiet);
        process::exit(1);
    }
}
