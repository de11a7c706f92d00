//! Model bundle persistence
//!
//! The bundle is written once by training and read once at controller
//! startup. On disk it is a JSON envelope carrying a format version and the
//! SHA-256 of the serialized bundle, validated before the model is used.

use super::regression::RegressionModel;
use super::ReplicaPredictor;
use crate::error::{AutoscalerError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Current on-disk bundle format
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Latency SLA assumed when a bundle does not record one
pub const DEFAULT_TARGET_P95_MS: f64 = 400.0;

/// Throughput-per-replica assumed when a bundle does not record one
pub const DEFAULT_TARGET_RPS_PER_POD: f64 = 8.0;

/// Trained model plus the targets it was trained against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub model: RegressionModel,
    #[serde(default = "default_target_p95_ms")]
    pub target_p95_ms: f64,
    #[serde(default = "default_target_rps_per_pod")]
    pub default_target_rps_per_pod: f64,
    /// RFC 3339 timestamp of the training run
    #[serde(default)]
    pub trained_at: String,
    #[serde(default)]
    pub sample_count: usize,
    /// Campaign-wide p95 latency observed during training
    #[serde(default)]
    pub empirical_p95_ms: f64,
}

#[derive(Serialize, Deserialize)]
struct BundleFile {
    format_version: u32,
    checksum: String,
    bundle: ModelBundle,
}

fn default_target_p95_ms() -> f64 {
    DEFAULT_TARGET_P95_MS
}

fn default_target_rps_per_pod() -> f64 {
    DEFAULT_TARGET_RPS_PER_POD
}

impl ModelBundle {
    /// Write the bundle, replacing any existing file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let envelope = BundleFile {
            format_version: BUNDLE_FORMAT_VERSION,
            checksum: compute_checksum(&serde_json::to_vec(self)?),
            bundle: self.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;

        info!(
            path = %path.display(),
            checksum = %envelope.checksum,
            "Model bundle saved"
        );
        Ok(())
    }

    /// Read and validate a bundle
    pub fn load(path: &Path) -> Result<Self> {
        let load_error = |reason: String| AutoscalerError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| load_error(e.to_string()))?;
        let envelope: BundleFile =
            serde_json::from_slice(&bytes).map_err(|e| load_error(format!("malformed bundle: {}", e)))?;

        if envelope.format_version != BUNDLE_FORMAT_VERSION {
            return Err(load_error(format!(
                "unsupported format version {} (expected {})",
                envelope.format_version, BUNDLE_FORMAT_VERSION
            )));
        }

        let actual = compute_checksum(&serde_json::to_vec(&envelope.bundle)?);
        if actual != envelope.checksum {
            return Err(AutoscalerError::ModelChecksum {
                expected: envelope.checksum,
                actual,
            });
        }

        Ok(envelope.bundle)
    }

    /// Build a predictor clamped to `[min_replicas, max_replicas]`
    pub fn predictor(&self, min_replicas: u32, max_replicas: u32) -> Result<ReplicaPredictor> {
        ReplicaPredictor::new(Arc::new(self.model.clone()), min_replicas, max_replicas)
    }
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
