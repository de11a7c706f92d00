//! Core data models for the replica autoscaler

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A single synthetic request against the probe target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSample {
    /// Wall-clock latency in milliseconds, bounded by the probe timeout
    pub latency_ms: f64,
    pub success: bool,
    /// HTTP status, or the failure sentinel on transport errors
    pub status_code: u16,
    pub timestamp: Instant,
}

/// Input to the replica regression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Probe events per second over the throughput window
    pub throughput: f64,
    /// Latency percentile in milliseconds
    pub latency_percentile_ms: f64,
}

impl FeatureVector {
    /// Number of features fed to the regressor
    pub const LEN: usize = 2;

    pub fn new(throughput: f64, latency_percentile_ms: f64) -> Self {
        Self {
            throughput,
            latency_percentile_ms,
        }
    }

    pub fn to_array(&self) -> [f64; Self::LEN] {
        [self.throughput, self.latency_percentile_ms]
    }
}

/// One line of the raw training log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    /// RFC 3339 UTC timestamp of the probe
    pub ts: String,
    pub lat_ms: f64,
    pub code: u16,
    #[serde(with = "flag")]
    pub ok: bool,
    /// Throughput over the trailing 5s window at the time of the probe
    pub rps_5s: f64,
}

/// The workload the actuator scales
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingTarget {
    pub namespace: String,
    pub deployment: String,
}

impl ScalingTarget {
    pub fn new(namespace: impl Into<String>, deployment: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            deployment: deployment.into(),
        }
    }
}

impl std::fmt::Display for ScalingTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.deployment)
    }
}

/// Booleans stored as 1/0 in the training log
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Flag {
            Int(u8),
            Bool(bool),
        }

        match Flag::deserialize(deserializer)? {
            Flag::Int(v) => Ok(v != 0),
            Flag::Bool(b) => Ok(b),
        }
    }
}
