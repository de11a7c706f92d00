//! Offline training command

use anyhow::{Context, Result};
use autoscaler_lib::observability::StructuredLogger;
use autoscaler_lib::training::{TrainingConfig, TrainingPipeline};
use std::path::Path;

use crate::output::{color_ratio, format_ms, print_info, print_json, print_success, OutputFormat};

/// Probe the service, fit a model and write the bundle and raw samples
pub async fn run_training(
    config: TrainingConfig,
    model_path: &Path,
    samples_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let logger = StructuredLogger::new(config.base_url.clone());
    let pipeline = TrainingPipeline::from_config(config)?;

    if matches!(format, OutputFormat::Table) {
        let config = pipeline.config();
        print_info(&format!(
            "Probing {} at {:.1} qps for {}s",
            config.base_url,
            config.qps,
            config.duration.as_secs()
        ));
    }

    let report = pipeline
        .run(model_path, samples_path)
        .await
        .context("Training failed")?;

    logger.log_training_complete(
        report.sample_count,
        report.empirical_p95_ms,
        &report.model_path.display().to_string(),
    );

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_success(&format!("Saved model → {}", report.model_path.display()));
            print_success(&format!(
                "Wrote raw samples → {}",
                report.samples_path.display()
            ));
            println!(
                "Collected {} samples. Empirical p95 latency ≈ {} (success rate {})",
                report.sample_count,
                format_ms(report.empirical_p95_ms),
                color_ratio(report.success_rate)
            );
        }
    }

    Ok(())
}
