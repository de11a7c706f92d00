//! Ordinary least squares regression over the replica feature vector
//!
//! The normal equations are solved on centred data with Gauss-Jordan
//! elimination. Columns without usable variance get a zero coefficient, which
//! matches the minimum-norm least squares answer for constant features such
//! as the campaign-wide p95 written into every training row.

use super::Regressor;
use crate::error::{AutoscalerError, Result};
use crate::models::FeatureVector;
use serde::{Deserialize, Serialize};

const PIVOT_TOLERANCE: f64 = 1e-10;

/// Linear model `intercept + sum(coefficients[i] * x[i])`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegression {
    /// Fit by least squares
    pub fn fit(features: &[FeatureVector], labels: &[f64]) -> Result<Self> {
        if features.is_empty() {
            return Err(AutoscalerError::InsufficientTrainingData);
        }
        if features.len() != labels.len() {
            return Err(AutoscalerError::InvalidConfig(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }

        let k = FeatureVector::LEN;
        let n = features.len() as f64;
        let rows: Vec<[f64; FeatureVector::LEN]> = features.iter().map(|f| f.to_array()).collect();

        let mut x_mean = [0.0; FeatureVector::LEN];
        for row in &rows {
            for (mean, value) in x_mean.iter_mut().zip(row) {
                *mean += value / n;
            }
        }
        let y_mean = labels.iter().sum::<f64>() / n;

        // Centred X'X and X'y
        let mut xtx = vec![vec![0.0; k]; k];
        let mut xty = vec![0.0; k];
        for (row, y) in rows.iter().zip(labels) {
            let centred: Vec<f64> = row.iter().zip(&x_mean).map(|(v, m)| v - m).collect();
            let dy = y - y_mean;
            for i in 0..k {
                xty[i] += centred[i] * dy;
                for j in 0..k {
                    xtx[i][j] += centred[i] * centred[j];
                }
            }
        }

        let coefficients = solve_normal_equations(xtx, xty);
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(&x_mean)
                .map(|(c, m)| c * m)
                .sum::<f64>();

        Ok(Self {
            coefficients,
            intercept,
        })
    }

    pub fn evaluate(&self, features: &FeatureVector) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features.to_array())
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }
}

impl Regressor for LinearRegression {
    fn predict(&self, features: &FeatureVector) -> f64 {
        self.evaluate(features)
    }

    fn kind(&self) -> &str {
        "linear"
    }
}

/// Regressors that can be stored in a model bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressionModel {
    Linear(LinearRegression),
}

impl Regressor for RegressionModel {
    fn predict(&self, features: &FeatureVector) -> f64 {
        match self {
            RegressionModel::Linear(model) => model.predict(features),
        }
    }

    fn kind(&self) -> &str {
        match self {
            RegressionModel::Linear(model) => model.kind(),
        }
    }
}

/// Gauss-Jordan elimination with partial pivoting. Columns that never yield a
/// pivot are left free with a zero coefficient.
fn solve_normal_equations(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let k = b.len();
    let scale = (0..k).map(|i| a[i][i].abs()).fold(1.0, f64::max);
    let tolerance = scale * PIVOT_TOLERANCE;

    let mut pivots = Vec::with_capacity(k);
    let mut row = 0;
    for col in 0..k {
        if row >= k {
            break;
        }

        let best = (row..k)
            .max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))
            .unwrap_or(row);
        if a[best][col].abs() <= tolerance {
            continue;
        }
        a.swap(row, best);
        b.swap(row, best);

        for r in 0..k {
            if r == row {
                continue;
            }
            let factor = a[r][col] / a[row][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..k {
                a[r][c] -= factor * a[row][c];
            }
            b[r] -= factor * b[row];
        }

        pivots.push((row, col));
        row += 1;
    }

    let mut solution = vec![0.0; k];
    for (r, c) in pivots {
        solution[c] = b[r] / a[r][c];
    }
    solution
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_fit_recovers_two_feature_plane() {
        let features: Vec<FeatureVector> = [(1.0, 100.0), (2.0, 150.0), (4.0, 120.0), (7.0, 300.0), (3.0, 90.0)]
            .iter()
            .map(|&(rps, p95)| FeatureVector::new(rps, p95))
            .collect();
        let labels: Vec<f64> = features
            .iter()
            .map(|f| 1.0 + 2.0 * f.throughput + 0.01 * f.latency_percentile_ms)
            .collect();

        let model = LinearRegression::fit(&features, &labels).unwrap();
        assert!(approx(model.coefficients[0], 2.0), "{:?}", model);
        assert!(approx(model.coefficients[1], 0.01), "{:?}", model);
        assert!(approx(model.intercept, 1.0), "{:?}", model);
    }

    #[test]
    fn test_constant_feature_gets_zero_coefficient() {
        let features: Vec<FeatureVector> = (0..10)
            .map(|i| FeatureVector::new(i as f64 * 0.5, 450.0))
            .collect();
        let labels: Vec<f64> = features.iter().map(|f| 2.0 + 0.5 * f.throughput).collect();

        let model = LinearRegression::fit(&features, &labels).unwrap();
        assert!(approx(model.coefficients[0], 0.5));
        assert_eq!(model.coefficients[1], 0.0);
        assert!(approx(model.predict(&FeatureVector::new(4.0, 450.0)), 4.0));
    }

    #[test]
    fn test_single_sample_predicts_its_label() {
        let features = vec![FeatureVector::new(0.2, 80.0)];
        let model = LinearRegression::fit(&features, &[1.0]).unwrap();
        assert_eq!(model.coefficients, vec![0.0, 0.0]);
        assert_eq!(model.intercept, 1.0);
    }

    #[test]
    fn test_fit_rejects_empty_and_mismatched() {
        assert!(matches!(
            LinearRegression::fit(&[], &[]),
            Err(AutoscalerError::InsufficientTrainingData)
        ));
        let features = vec![FeatureVector::new(1.0, 1.0)];
        assert!(LinearRegression::fit(&features, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_collinear_features_still_fit() {
        // p95 moves in lockstep with throughput
        let features: Vec<FeatureVector> = (1..8)
            .map(|i| FeatureVector::new(i as f64, i as f64 * 10.0))
            .collect();
        let labels: Vec<f64> = (1..8).map(|i| i as f64).collect();

        let model = LinearRegression::fit(&features, &labels).unwrap();
        for (f, y) in features.iter().zip(&labels) {
            assert!(approx(model.predict(f), *y));
        }
    }

    #[test]
    fn test_regression_model_serde_tag() {
        let model = RegressionModel::Linear(LinearRegression {
            coefficients: vec![0.125, 0.0],
            intercept: 0.875,
        });
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["kind"], "linear");
        let back: RegressionModel = serde_json::from_value(json).unwrap();
        assert_eq!(back, model);
        assert_eq!(back.kind(), "linear");
    }
}
