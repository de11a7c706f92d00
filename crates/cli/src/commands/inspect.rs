//! Show the contents of a model bundle

use anyhow::{Context, Result};
use autoscaler_lib::predictor::{ModelBundle, RegressionModel, Regressor};
use colored::Colorize;
use std::path::Path;

use crate::output::{format_ms, format_timestamp, print_json, print_table, FieldRow, OutputFormat};

pub fn inspect_model(model_path: &Path, format: OutputFormat) -> Result<()> {
    let bundle = ModelBundle::load(model_path)
        .with_context(|| format!("Failed to read {}", model_path.display()))?;

    match format {
        OutputFormat::Json => print_json(&bundle)?,
        OutputFormat::Table => {
            println!("{}", "Replica Model".bold());
            println!("{}", "=".repeat(50));
            println!("Path: {}", model_path.display().to_string().cyan());
            println!();
            print_table(bundle_rows(&bundle));
        }
    }

    Ok(())
}

fn bundle_rows(bundle: &ModelBundle) -> Vec<FieldRow> {
    let mut rows = vec![FieldRow::new("Kind", bundle.model.kind())];

    match &bundle.model {
        RegressionModel::Linear(linear) => {
            rows.push(FieldRow::new("Intercept", format!("{:.6}", linear.intercept)));
            for (name, coefficient) in ["Coef (throughput)", "Coef (p95 ms)"]
                .iter()
                .zip(&linear.coefficients)
            {
                rows.push(FieldRow::new(name, format!("{:.6}", coefficient)));
            }
        }
    }

    rows.extend([
        FieldRow::new("Target p95", format_ms(bundle.target_p95_ms)),
        FieldRow::new(
            "Target RPS / pod",
            format!("{:.2}", bundle.default_target_rps_per_pod),
        ),
        FieldRow::new("Trained at", format_timestamp(&bundle.trained_at)),
        FieldRow::new("Samples", bundle.sample_count.to_string()),
        FieldRow::new("Empirical p95", format_ms(bundle.empirical_p95_ms)),
    ]);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscaler_lib::predictor::LinearRegression;

    #[test]
    fn test_bundle_rows() {
        let bundle = ModelBundle {
            model: RegressionModel::Linear(LinearRegression {
                coefficients: vec![0.125, 0.0],
                intercept: 0.5,
            }),
            target_p95_ms: 400.0,
            default_target_rps_per_pod: 8.0,
            trained_at: "2024-05-01T10:00:00Z".to_string(),
            sample_count: 1500,
            empirical_p95_ms: 212.0,
        };

        let rows = bundle_rows(&bundle);
        let field = |name: &str| {
            rows.iter()
                .find(|r| r.field == name)
                .map(|r| r.value.clone())
                .unwrap()
        };

        assert_eq!(field("Kind"), "linear");
        assert_eq!(field("Coef (throughput)"), "0.125000");
        assert_eq!(field("Samples"), "1500");
        assert_eq!(field("Trained at"), "2024-05-01 10:00:00");
    }
}
