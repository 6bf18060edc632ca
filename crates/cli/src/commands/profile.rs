use std::path::Path;
use std::process;

use mapwright_core::CollisionPolicy;
use mapwright_eval::{profile, CompiledPlan, ExecOptions};

use super::{load_rules, print_json, read_input};
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_profile(
    rules: &Path,
    input: &Path,
    iterations: usize,
    policy: CollisionPolicy,
    output: OutputFormat,
    quiet: bool,
) {
    let doc = load_rules(rules, output, quiet);
    let plan = CompiledPlan::compile(&doc);
    let payload = read_input(Some(input), output, quiet);
    let options = ExecOptions::default().with_collision_policy(policy);

    let report = match profile(&plan, &payload, iterations, &options) {
        Ok(r) => r,
        Err(e) => {
            report_error(&format!("profile error: {e}"), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            let plan_id = report.cache_key.get(..12).unwrap_or(&report.cache_key);
            println!("Profile ({} iterations, plan {plan_id})", report.iterations);
            println!("  parse    mean {:>10.1} us", report.parse_mean_us);
            println!("  execute  mean {:>10.1} us", report.execute_mean_us);
            println!("  format   mean {:>10.1} us", report.format_mean_us);
            println!(
                "  total    min {:.1}  mean {:.1}  p50 {:.1}  p95 {:.1}  max {:.1} us",
                report.min_us, report.mean_us, report.p50_us, report.p95_us, report.max_us
            );
            if report.errors > 0 {
                println!("  conversion errors per run: {}", report.errors);
            }
        }
    }
}
