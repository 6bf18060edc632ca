use std::path::Path;
use std::process;

use mapwright_core::CollisionPolicy;
use mapwright_eval::{CompiledPlan, ExecOptions};

use super::{load_rules, print_json, read_input};
use crate::{report_error, OutputFormat};

/// Convert one payload. The converted body goes to stdout; conversion
/// errors and warnings go to stderr and errors set exit status 1.
pub(crate) fn cmd_convert(
    rules: &Path,
    input: Option<&Path>,
    pretty: bool,
    policy: CollisionPolicy,
    output: OutputFormat,
    quiet: bool,
) {
    let doc = load_rules(rules, output, quiet);
    let plan = CompiledPlan::compile(&doc);
    let payload = read_input(input, output, quiet);
    let options = ExecOptions::default().with_collision_policy(policy);

    let conversion = match plan.convert(&payload, &options, pretty) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("conversion error: {e}"), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => print_json(&conversion.result),
        OutputFormat::Text => {
            println!("{}", conversion.body);
            if !quiet {
                for warning in &conversion.result.warnings {
                    eprintln!("warning: {warning}");
                }
                for error in &conversion.result.errors {
                    eprintln!("error: {error}");
                }
            }
        }
    }

    if !conversion.result.is_ok() {
        process::exit(1);
    }
}
