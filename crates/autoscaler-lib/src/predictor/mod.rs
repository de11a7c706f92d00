//! Replica prediction from windowed load features

mod bundle;
mod regression;

pub use bundle::{
    ModelBundle, BUNDLE_FORMAT_VERSION, DEFAULT_TARGET_P95_MS, DEFAULT_TARGET_RPS_PER_POD,
};
pub use regression::{LinearRegression, RegressionModel};

use crate::error::{AutoscalerError, Result};
use crate::models::FeatureVector;
use std::sync::Arc;

/// Trait for regression implementations
pub trait Regressor: Send + Sync {
    /// Continuous replica estimate for a feature vector
    fn predict(&self, features: &FeatureVector) -> f64;

    /// Short model identifier for logs and metrics
    fn kind(&self) -> &str;
}

/// Maps features to an integer replica count within configured bounds.
///
/// Stateless apart from the immutable model, so it can be shared freely.
#[derive(Clone)]
pub struct ReplicaPredictor {
    model: Arc<dyn Regressor>,
    min_replicas: u32,
    max_replicas: u32,
}

impl ReplicaPredictor {
    pub fn new(model: Arc<dyn Regressor>, min_replicas: u32, max_replicas: u32) -> Result<Self> {
        if min_replicas == 0 {
            return Err(AutoscalerError::InvalidConfig(
                "min_replicas must be at least 1".to_string(),
            ));
        }
        if min_replicas > max_replicas {
            return Err(AutoscalerError::InvalidConfig(format!(
                "min_replicas ({}) exceeds max_replicas ({})",
                min_replicas, max_replicas
            )));
        }
        Ok(Self {
            model,
            min_replicas,
            max_replicas,
        })
    }

    /// Raw regression output before rounding and clamping
    pub fn predict_raw(&self, features: &FeatureVector) -> f64 {
        self.model.predict(features)
    }

    pub fn predict(&self, features: &FeatureVector) -> u32 {
        clamp_replicas(
            self.predict_raw(features),
            self.min_replicas,
            self.max_replicas,
        )
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.min_replicas, self.max_replicas)
    }

    pub fn model_kind(&self) -> &str {
        self.model.kind()
    }
}

impl std::fmt::Debug for ReplicaPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaPredictor")
            .field("model", &self.model.kind())
            .field("min_replicas", &self.min_replicas)
            .field("max_replicas", &self.max_replicas)
            .finish()
    }
}

/// `ceil(raw)` clamped to `[min, max]`; NaN maps to `min`
pub fn clamp_replicas(raw: f64, min: u32, max: u32) -> u32 {
    let rounded = raw.ceil();
    if rounded.is_nan() {
        return min;
    }
    rounded.clamp(min as f64, max as f64) as u32
}
