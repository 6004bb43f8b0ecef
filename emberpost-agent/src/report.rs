//! Human-readable metric tables for dry-run, dump, and test output.
//!
//! Everything here goes to stdout; logs go to stderr.

use std::collections::BTreeMap;
use std::time::Duration;

use emberpost_core::AgentConfig;
use emberpost_pipeline::{ObservedValue, SourceStats};

/// Per-source stats paired with the source path, for the report header.
pub struct SourceReport {
    pub path: String,
    pub stats: SourceStats,
}

/// Print a snapshot (or peek) in the dry-run format: per-source stats
/// followed by the aggregated metric table.
pub fn print_snapshot(
    config: &AgentConfig,
    sources: &[SourceReport],
    metrics: &BTreeMap<String, ObservedValue>,
    elapsed: Duration,
    dry_run: bool,
) {
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let elapsed = Duration::from_secs(elapsed.as_secs());

    println!();
    println!("───────────────────────────────────────────────────────────");
    println!(" SNAPSHOT @ {now} ({} elapsed)", humantime::format_duration(elapsed));
    println!("───────────────────────────────────────────────────────────");

    for source in sources {
        println!(" Source: {}", source.path);
        println!("   Lines parsed:   {}", source.stats.lines_parsed);
        println!("   Lines matched:  {}", source.stats.lines_matched);
        println!("   Parse errors:   {}", source.stats.parse_errors);
        println!();
    }

    print_metric_table(config, metrics);

    if dry_run {
        println!(" [DRY-RUN] Would send to {}", config.server_url);
    }
    println!("───────────────────────────────────────────────────────────");
}

/// Print the `test` command result: line count plus the metric table.
pub fn print_test_results(
    config: &AgentConfig,
    metrics: &BTreeMap<String, ObservedValue>,
    lines_processed: usize,
) {
    println!("───────────────────────────────────────────────────────────");
    println!(" TEST RESULTS");
    println!("───────────────────────────────────────────────────────────");

    for source in &config.sources {
        println!(" Source config: {}", source.path);
        if let Some(format) = source.format {
            println!("   Format: {format}");
        }
        if let Some(pattern) = &source.pattern {
            println!("   Pattern: {pattern}");
        }
        println!();
    }

    println!(" Lines processed: {lines_processed}");
    println!();
    print_metric_table(config, metrics);
    println!("───────────────────────────────────────────────────────────");
}

/// Render the aggregated metric table in config order.
fn print_metric_table(config: &AgentConfig, metrics: &BTreeMap<String, ObservedValue>) {
    println!(" Aggregated Metrics:");
    println!(" ┌─────────────────────────────┬──────────┬────────────────┐");
    println!(" │ Metric                      │ Type     │ Value          │");
    println!(" ├─────────────────────────────┼──────────┼────────────────┤");

    for source in &config.sources {
        for metric in &source.metrics {
            let value = format_value(metrics.get(&metric.name));
            let kind = metric
                .kind
                .map(|k| k.to_string())
                .unwrap_or_default();
            println!(" │ {:<27} │ {:<8} │ {:>14} │", metric.name, kind, value);
        }
    }

    println!(" └─────────────────────────────┴──────────┴────────────────┘");
}

/// Format a metric value for display: integral floats without decimals,
/// other floats with two, set cardinalities as plain integers.
fn format_value(value: Option<&ObservedValue>) -> String {
    match value {
        None => "0".to_owned(),
        Some(ObservedValue::Count(n)) => n.to_string(),
        Some(ObservedValue::Float(v)) => {
            if *v == v.trunc() && v.is_finite() && v.abs() < 1e15 {
                format!("{}", *v as i64)
            } else {
                format!("{v:.2}")
            }
        }
    }
}
