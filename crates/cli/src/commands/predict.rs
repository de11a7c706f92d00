//! Offline what-if prediction against a model bundle

use anyhow::{Context, Result};
use autoscaler_lib::models::FeatureVector;
use autoscaler_lib::predictor::ModelBundle;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use crate::output::{format_ms, print_json, OutputFormat};

/// Prediction for one hypothetical load
#[derive(Debug, Serialize)]
pub struct PredictionResult {
    pub throughput_rps: f64,
    pub latency_p95_ms: f64,
    /// Regression output before rounding and clamping
    pub raw: f64,
    pub replicas: u32,
    pub min_replicas: u32,
    pub max_replicas: u32,
}

pub fn predict(
    model_path: &Path,
    rps: f64,
    p95_ms: f64,
    min_replicas: u32,
    max_replicas: u32,
    format: OutputFormat,
) -> Result<()> {
    let bundle = ModelBundle::load(model_path)
        .with_context(|| format!("Failed to read {}", model_path.display()))?;
    let predictor = bundle.predictor(min_replicas, max_replicas)?;

    let features = FeatureVector::new(rps, p95_ms);
    let result = PredictionResult {
        throughput_rps: rps,
        latency_p95_ms: p95_ms,
        raw: predictor.predict_raw(&features),
        replicas: predictor.predict(&features),
        min_replicas,
        max_replicas,
    };

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            println!(
                "{} rps at p95 {} → {} replicas (raw {:.3}, bounds {}..={})",
                format!("{:.2}", result.throughput_rps).cyan(),
                format_ms(result.latency_p95_ms).cyan(),
                result.replicas.to_string().green().bold(),
                result.raw,
                result.min_replicas,
                result.max_replicas
            );
        }
    }

    Ok(())
}
