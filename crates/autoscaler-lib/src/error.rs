//! Error taxonomy for the autoscaler core
//!
//! Per-tick failures (probe, scaler call) are recovered inside the control
//! loop and only surface as diagnostics. Startup failures (training data,
//! model load, configuration) are returned to the caller and are fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the autoscaler core
#[derive(Debug, Error)]
pub enum AutoscalerError {
    /// The workload scaler rejected or failed the request
    #[error("Failed to scale {namespace}/{deployment} to {replicas} replicas: {reason}")]
    ScalerCall {
        namespace: String,
        deployment: String,
        replicas: u32,
        reason: String,
    },

    /// The workload scaler did not answer within the request timeout
    #[error("Scaler call for {namespace}/{deployment} timed out after {timeout_ms}ms")]
    ScalerTimeout {
        namespace: String,
        deployment: String,
        timeout_ms: u128,
    },

    /// The training campaign produced nothing to fit
    #[error("No training samples collected; cannot fit a replica model")]
    InsufficientTrainingData,

    /// The model bundle is missing or malformed
    #[error("Failed to load model bundle {path:?}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// The model bundle contents do not match the recorded checksum
    #[error("Model bundle checksum mismatch: expected {expected}, got {actual}")]
    ModelChecksum { expected: String, actual: String },

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AutoscalerError {
    /// Returns true for failures that the control loop recovers from on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AutoscalerError::ScalerCall { .. } | AutoscalerError::ScalerTimeout { .. }
        )
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, AutoscalerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let call = AutoscalerError::ScalerCall {
            namespace: "default".to_string(),
            deployment: "api".to_string(),
            replicas: 3,
            reason: "forbidden".to_string(),
        };
        assert!(call.is_transient());
        assert!(!AutoscalerError::InsufficientTrainingData.is_transient());
    }

    #[test]
    fn test_error_messages_name_the_target() {
        let err = AutoscalerError::ScalerTimeout {
            namespace: "shop".to_string(),
            deployment: "checkout".to_string(),
            timeout_ms: 10_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("shop/checkout"));
        assert!(msg.contains("10000ms"));
    }
}
