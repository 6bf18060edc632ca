//! Latency profiling for a compiled plan.

use crate::plan::CompiledPlan;
use crate::types::ExecOptions;
use mapwright_core::{format_payload, parse_payload, CodecError};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Timings in microseconds over `iterations` full conversions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReport {
    pub cache_key: String,
    pub iterations: usize,
    pub parse_mean_us: f64,
    pub execute_mean_us: f64,
    pub format_mean_us: f64,
    pub min_us: f64,
    pub max_us: f64,
    pub mean_us: f64,
    pub p50_us: f64,
    pub p95_us: f64,
    /// Errors reported by the last run.
    pub errors: usize,
}

/// Convert `payload` with `plan` `iterations` times (at least once),
/// timing each stage.
pub fn profile(
    plan: &CompiledPlan,
    payload: &str,
    iterations: usize,
    options: &ExecOptions,
) -> Result<ProfileReport, CodecError> {
    let iterations = iterations.max(1);
    let rules = plan.rules();
    let mut parse_total = Duration::ZERO;
    let mut execute_total = Duration::ZERO;
    let mut format_total = Duration::ZERO;
    let mut totals = Vec::with_capacity(iterations);
    let mut errors = 0;

    for _ in 0..iterations {
        let start = Instant::now();
        let input = parse_payload(payload, rules.input_format)?;
        let parsed = Instant::now();
        let result = plan.execute(&input, options);
        let executed = Instant::now();
        format_payload(&result.output, rules.output_format, false)?;
        let formatted = Instant::now();

        parse_total += parsed - start;
        execute_total += executed - parsed;
        format_total += formatted - executed;
        totals.push(micros(formatted - start));
        errors = result.errors.len();
    }

    totals.sort_by(|a, b| a.total_cmp(b));
    let n = iterations as f64;
    let report = ProfileReport {
        cache_key: plan.cache_key().to_string(),
        iterations,
        parse_mean_us: micros(parse_total) / n,
        execute_mean_us: micros(execute_total) / n,
        format_mean_us: micros(format_total) / n,
        min_us: totals[0],
        max_us: totals[totals.len() - 1],
        mean_us: totals.iter().sum::<f64>() / n,
        p50_us: percentile(&totals, 0.50),
        p95_us: percentile(&totals, 0.95),
        errors,
    };
    debug!(iterations, mean_us = report.mean_us, "profiled plan");
    Ok(report)
}

fn micros(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000_000.0
}

/// Nearest-rank percentile of sorted, non-empty samples.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
