//! Progress and summary output.

use std::fmt::Write as _;

use mailprobe_core::{BatchMetrics, CheckResult};
use serde::Serialize;

/// One-line progress for stderr.
#[must_use]
pub fn progress_line(metrics: &BatchMetrics) -> String {
    format!(
        "[{}] {}/{} checked | valid {} invalid {} error {} dead {} | {:.1}% failing | {:.1}s",
        metrics.state,
        metrics.attempts,
        metrics.total_inputs,
        metrics.valid,
        metrics.invalid,
        metrics.error,
        metrics.dead,
        metrics.error_rate,
        metrics.duration_seconds,
    )
}

/// Human-readable final report.
#[must_use]
pub fn summary(metrics: &BatchMetrics, results: &[CheckResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Batch {} ({})", metrics.batch_id, metrics.protocol);
    let _ = writeln!(out, "  state      {}", metrics.state);
    if let Some(reason) = metrics.stop_reason {
        let _ = writeln!(out, "  stopped by {reason}");
    }
    let _ = writeln!(
        out,
        "  checked    {} of {} in {:.1}s",
        metrics.attempts, metrics.total_inputs, metrics.duration_seconds
    );
    let _ = writeln!(
        out,
        "  results    valid {}  invalid {}  error {}  dead {}",
        metrics.valid, metrics.invalid, metrics.error, metrics.dead
    );
    if let (Some(min), Some(avg), Some(max)) = (
        metrics.min_latency_ms,
        metrics.avg_latency_ms,
        metrics.max_latency_ms,
    ) {
        let _ = writeln!(out, "  latency    min {min}ms  avg {avg:.0}ms  max {max}ms");
    }

    if results.is_empty() {
        return out;
    }
    let _ = writeln!(out);
    let width = results.iter().map(|r| r.subject.len()).max().unwrap_or(0);
    for result in results {
        let _ = writeln!(
            out,
            "  {:>6}  {:<width$}  {:<7}  {}",
            result.task_id,
            result.subject,
            result.status.as_str(),
            detail(result),
        );
    }
    out
}

fn detail(result: &CheckResult) -> String {
    match (&result.matched_candidate, result.latency_ms, result.error_kind) {
        (Some(candidate), Some(latency), _) => format!("{candidate} {latency}ms"),
        (_, _, Some(kind)) => match &result.error_detail {
            Some(detail) => format!("{}: {detail}", kind.as_str()),
            None => kind.as_str().to_string(),
        },
        (Some(candidate), None, None) => candidate.to_string(),
        _ => String::new(),
    }
}

#[derive(Serialize)]
struct Report<'a> {
    metrics: &'a BatchMetrics,
    results: &'a [CheckResult],
}

/// Machine-readable final report.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn json(metrics: &BatchMetrics, results: &[CheckResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&Report { metrics, results })
}
