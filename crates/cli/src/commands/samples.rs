//! Summaries of a raw training log

use anyhow::{Context, Result};
use autoscaler_lib::models::TrainingSample;
use autoscaler_lib::training::{empirical_p95, read_samples};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::Tabled;

use crate::output::{
    color_latency, color_ratio, format_ms, format_timestamp, print_json, print_table,
    print_warning, FieldRow, OutputFormat,
};

/// Aggregate view of a training log
#[derive(Debug, Serialize, PartialEq)]
pub struct SampleSummary {
    pub count: usize,
    pub first_ts: Option<String>,
    pub last_ts: Option<String>,
    pub success_rate: f64,
    pub mean_latency_ms: f64,
    pub p95_latency_ms: Option<f64>,
    pub max_latency_ms: f64,
    pub mean_rps: f64,
    pub max_rps: f64,
    /// Responses per status code
    pub status_codes: BTreeMap<u16, usize>,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Status")]
    code: String,
    #[tabled(rename = "Count")]
    count: usize,
}

pub fn summarize(samples: &[TrainingSample]) -> SampleSummary {
    let count = samples.len();
    let n = count.max(1) as f64;
    let latencies: Vec<f64> = samples.iter().map(|s| s.lat_ms).collect();

    let mut status_codes = BTreeMap::new();
    for sample in samples {
        *status_codes.entry(sample.code).or_insert(0) += 1;
    }

    SampleSummary {
        count,
        first_ts: samples.first().map(|s| s.ts.clone()),
        last_ts: samples.last().map(|s| s.ts.clone()),
        success_rate: samples.iter().filter(|s| s.ok).count() as f64 / n,
        mean_latency_ms: latencies.iter().sum::<f64>() / n,
        p95_latency_ms: empirical_p95(&latencies),
        max_latency_ms: latencies.iter().copied().fold(0.0, f64::max),
        mean_rps: samples.iter().map(|s| s.rps_5s).sum::<f64>() / n,
        max_rps: samples.iter().map(|s| s.rps_5s).fold(0.0, f64::max),
        status_codes,
    }
}

pub fn show_samples(path: &Path, target_p95_ms: f64, format: OutputFormat) -> Result<()> {
    let samples =
        read_samples(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let summary = summarize(&samples);

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!("{}", "Training Samples".bold());
            println!("{}", "=".repeat(50));
            println!("Log: {}", path.display().to_string().cyan());
            println!();

            if summary.count == 0 {
                print_warning("Log contains no samples");
                return Ok(());
            }

            let p95 = summary.p95_latency_ms.unwrap_or(0.0);
            print_table(vec![
                FieldRow::new("Samples", summary.count.to_string()),
                FieldRow::new(
                    "From",
                    summary.first_ts.as_deref().map(format_timestamp).unwrap_or_default(),
                ),
                FieldRow::new(
                    "To",
                    summary.last_ts.as_deref().map(format_timestamp).unwrap_or_default(),
                ),
                FieldRow::new("Success rate", color_ratio(summary.success_rate)),
                FieldRow::new("Mean latency", format_ms(summary.mean_latency_ms)),
                FieldRow::new("p95 latency", color_latency(p95, target_p95_ms)),
                FieldRow::new("Max latency", format_ms(summary.max_latency_ms)),
                FieldRow::new("Mean RPS (5s)", format!("{:.2}", summary.mean_rps)),
                FieldRow::new("Max RPS (5s)", format!("{:.2}", summary.max_rps)),
            ]);

            println!();
            print_table(
                summary
                    .status_codes
                    .iter()
                    .map(|(code, count)| StatusRow {
                        code: code.to_string(),
                        count: *count,
                    })
                    .collect(),
            );

            if p95 > target_p95_ms {
                println!();
                print_warning(&format!(
                    "p95 latency exceeds the {} target; labels carry the +1 latency bump",
                    format_ms(target_p95_ms)
                ));
            }
        }
    }

    Ok(())
}
