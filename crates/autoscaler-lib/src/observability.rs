//! Observability infrastructure for the autoscaler
//!
//! Provides:
//! - Prometheus metrics (probe latency, load estimates, replica decisions, scaler calls)
//! - Structured JSON logging with tracing

use crate::actuator::ActuationOutcome;
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge, Encoder, Gauge, GaugeVec, Histogram,
    IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for probe latency (in seconds)
const PROBE_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.4, 0.5, 0.75, 1.0, 2.0, 3.0, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct ControllerMetricsInner {
    probe_latency_seconds: Histogram,
    probe_failures: IntCounter,
    throughput_rps: Gauge,
    latency_p95_ms: Gauge,
    desired_replicas: IntGauge,
    applied_replicas: IntGauge,
    scale_decisions: IntCounterVec,
    scale_errors: IntCounter,
    ticks: IntCounter,
    model_info: GaugeVec,
}

impl ControllerMetricsInner {
    fn new() -> Self {
        Self {
            probe_latency_seconds: register_histogram!(
                "replica_autoscaler_probe_latency_seconds",
                "Latency of synthetic probes against the target service",
                PROBE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register probe_latency_seconds"),

            probe_failures: register_int_counter!(
                "replica_autoscaler_probe_failures_total",
                "Probes that timed out, failed to connect or returned non-200"
            )
            .expect("Failed to register probe_failures"),

            throughput_rps: register_gauge!(
                "replica_autoscaler_throughput_rps",
                "Probe throughput over the sliding window"
            )
            .expect("Failed to register throughput_rps"),

            latency_p95_ms: register_gauge!(
                "replica_autoscaler_latency_p95_ms",
                "Estimated p95 probe latency in milliseconds"
            )
            .expect("Failed to register latency_p95_ms"),

            desired_replicas: register_int_gauge!(
                "replica_autoscaler_desired_replicas",
                "Replica count predicted on the latest tick"
            )
            .expect("Failed to register desired_replicas"),

            applied_replicas: register_int_gauge!(
                "replica_autoscaler_applied_replicas",
                "Replica count last accepted by the workload scaler"
            )
            .expect("Failed to register applied_replicas"),

            scale_decisions: register_int_counter_vec!(
                "replica_autoscaler_scale_decisions_total",
                "Actuation decisions by outcome",
                &["outcome"]
            )
            .expect("Failed to register scale_decisions"),

            scale_errors: register_int_counter!(
                "replica_autoscaler_scale_errors_total",
                "Scaler calls that failed or timed out"
            )
            .expect("Failed to register scale_errors"),

            ticks: register_int_counter!(
                "replica_autoscaler_ticks_total",
                "Control loop ticks executed"
            )
            .expect("Failed to register ticks"),

            model_info: register_gauge_vec!(
                "replica_autoscaler_model_info",
                "Information about the loaded replica model",
                &["kind", "trained_at"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Controller metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ControllerMetrics {
    _private: (),
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControllerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_probe(&self, latency_ms: f64, success: bool) {
        self.inner().probe_latency_seconds.observe(latency_ms / 1000.0);
        if !success {
            self.inner().probe_failures.inc();
        }
    }

    pub fn set_load(&self, throughput_rps: f64, latency_p95_ms: f64) {
        self.inner().throughput_rps.set(throughput_rps);
        self.inner().latency_p95_ms.set(latency_p95_ms);
    }

    pub fn set_desired_replicas(&self, replicas: u32) {
        self.inner().desired_replicas.set(i64::from(replicas));
    }

    /// Count an actuation decision and track the applied replica count
    pub fn record_outcome(&self, outcome: &ActuationOutcome) {
        let inner = self.inner();
        inner
            .scale_decisions
            .with_label_values(&[outcome.label()])
            .inc();
        match outcome {
            ActuationOutcome::Applied { replicas, .. } => {
                inner.applied_replicas.set(i64::from(*replicas));
            }
            ActuationOutcome::Failed { .. } => inner.scale_errors.inc(),
            _ => {}
        }
    }

    pub fn inc_ticks(&self) {
        self.inner().ticks.inc();
    }

    /// Update loaded model info
    pub fn set_model_info(&self, kind: &str, trained_at: &str) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[kind, trained_at])
            .set(1.0);
    }

    /// Render the process registry in the Prometheus text format
    pub fn encode(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for controller events
///
/// Provides consistent JSON-formatted logging for scaling actions,
/// model loading and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    workload: String,
}

impl StructuredLogger {
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
        }
    }

    /// Log a replica decision that reached the scaler
    pub fn log_scaled(
        &self,
        previous: Option<u32>,
        replicas: u32,
        throughput_rps: f64,
        latency_p95_ms: f64,
    ) {
        info!(
            event = "scaled",
            workload = %self.workload,
            previous_replicas = ?previous,
            replicas = replicas,
            rps = throughput_rps,
            p95_ms = latency_p95_ms,
            "Scaled to {} replicas (rps={:.2}, p95={:.1}ms)",
            replicas,
            throughput_rps,
            latency_p95_ms
        );
    }

    /// Log a scaler failure
    pub fn log_scale_failed(&self, desired: u32, error: &str) {
        warn!(
            event = "scale_failed",
            workload = %self.workload,
            desired_replicas = desired,
            error = %error,
            "Failed to apply replica count"
        );
    }

    /// Log a loaded model bundle
    pub fn log_model_loaded(&self, path: &str, kind: &str, target_p95_ms: f64, trained_at: &str) {
        info!(
            event = "model_loaded",
            workload = %self.workload,
            path = %path,
            kind = %kind,
            target_p95_ms = target_p95_ms,
            trained_at = %trained_at,
            "Replica model loaded"
        );
    }

    /// Log a finished training campaign
    pub fn log_training_complete(&self, samples: usize, empirical_p95_ms: f64, model_path: &str) {
        info!(
            event = "training_complete",
            workload = %self.workload,
            samples = samples,
            empirical_p95_ms = empirical_p95_ms,
            model_path = %model_path,
            "Training finished"
        );
    }

    /// Log controller startup
    pub fn log_startup(&self, version: &str, scaler: &str) {
        info!(
            event = "controller_started",
            workload = %self.workload,
            controller_version = %version,
            scaler = %scaler,
            "Replica controller started"
        );
    }

    /// Log controller shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            workload = %self.workload,
            reason = %reason,
            "Replica controller shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_controller_metrics_creation() {
        // Metrics live in the process-wide registry; handles share one instance
        let metrics = ControllerMetrics::new();
        let again = metrics.clone();

        metrics.observe_probe(120.0, true);
        metrics.observe_probe(3000.0, false);
        metrics.set_load(0.3, 480.0);
        metrics.set_desired_replicas(4);
        again.inc_ticks();
        metrics.set_model_info("linear", "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_record_outcome_tracks_applied_replicas() {
        let metrics = ControllerMetrics::new();
        metrics.record_outcome(&ActuationOutcome::Applied {
            replicas: 6,
            previous: Some(3),
        });
        metrics.record_outcome(&ActuationOutcome::CoolingDown {
            desired: 2,
            remaining: Duration::from_secs(5),
        });
        // Other tests share the registry, so only lower bounds hold
        for label in ["applied", "cooling_down"] {
            assert!(
                metrics
                    .inner()
                    .scale_decisions
                    .with_label_values(&[label])
                    .get()
                    >= 1
            );
        }
    }

    #[test]
    fn test_encode_includes_registered_metrics() {
        let metrics = ControllerMetrics::new();
        metrics.inc_ticks();

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains("replica_autoscaler_ticks_total"));
        assert!(text.contains("# TYPE replica_autoscaler_probe_latency_seconds histogram"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("shop/checkout");
        assert_eq!(logger.workload, "shop/checkout");
    }
}
