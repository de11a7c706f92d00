//! Online control loop
//!
//! One tick is strictly sequential: probe, record, estimate, predict,
//! actuate. Ticks never overlap. Cancellation is observed between ticks, so
//! an in-flight probe or scaler call always completes (both are bounded by
//! their own timeouts).

use crate::actuator::{ActuationOutcome, ScalingActuator};
use crate::estimator::{
    SlidingWindowEstimator, DEFAULT_HISTORY_CAPACITY, DEFAULT_WINDOW, MIN_PERCENTILE_SAMPLES,
};
use crate::health::{components, HealthRegistry};
use crate::models::{FeatureVector, ProbeSample};
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::predictor::ReplicaPredictor;
use crate::probe::Probe;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

/// Default delay between ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(15);

/// Configuration for the control loop
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Delay between the end of one tick and the start of the next
    pub interval: Duration,
    /// Throughput window horizon
    pub window: Duration,
    /// Latencies kept for percentile estimation
    pub history_capacity: usize,
    /// Latencies required before the percentile replaces the latest sample
    pub min_percentile_samples: usize,
    /// Latency percentile fed to the predictor
    pub percentile: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TICK_INTERVAL,
            window: DEFAULT_WINDOW,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            min_percentile_samples: MIN_PERCENTILE_SAMPLES,
            percentile: 95.0,
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub sample: ProbeSample,
    pub features: FeatureVector,
    pub desired_replicas: u32,
    pub outcome: ActuationOutcome,
}

/// Counters accumulated over the life of the loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub probe_failures: u64,
    pub scale_actions: u64,
    pub scale_failures: u64,
}

/// Periodic probe → predict → actuate loop for one workload
pub struct ControlLoop {
    prober: Arc<dyn Probe>,
    estimator: SlidingWindowEstimator,
    predictor: ReplicaPredictor,
    actuator: ScalingActuator,
    config: ControlConfig,
    health: HealthRegistry,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
    stats: LoopStats,
}

impl ControlLoop {
    /// Create a new control loop
    pub fn new(
        prober: Arc<dyn Probe>,
        predictor: ReplicaPredictor,
        actuator: ScalingActuator,
        config: ControlConfig,
    ) -> Self {
        let estimator = SlidingWindowEstimator::new(
            config.window,
            config.history_capacity,
            config.min_percentile_samples,
        );
        let logger = StructuredLogger::new(actuator.target().to_string());

        Self {
            prober,
            estimator,
            predictor,
            actuator,
            config,
            health: HealthRegistry::new(),
            metrics: ControllerMetrics::new(),
            logger,
            stats: LoopStats::default(),
        }
    }

    /// Report component health into a shared registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    /// Run until a shutdown signal arrives (or its sender is dropped)
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> LoopStats {
        info!(
            workload = %self.actuator.target(),
            interval_secs = self.config.interval.as_secs_f64(),
            window_secs = self.config.window.as_secs_f64(),
            min_replicas = self.predictor.bounds().0,
            max_replicas = self.predictor.bounds().1,
            "Starting control loop"
        );

        loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => break,
            }

            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.recv() => break,
            }
        }

        info!(
            ticks = self.stats.ticks,
            scale_actions = self.stats.scale_actions,
            "Shutting down control loop"
        );
        self.stats
    }

    /// Execute one tick
    pub async fn tick(&mut self) -> TickReport {
        let sample = self.prober.probe().await;
        self.observe_probe(&sample).await;

        self.estimator.record(&sample);
        let features = self.estimator.features(self.config.percentile);
        self.metrics
            .set_load(features.throughput, features.latency_percentile_ms);

        let desired_replicas = self.predict(&features).await;
        self.metrics.set_desired_replicas(desired_replicas);

        let outcome = self.actuator.actuate(desired_replicas).await;
        self.observe_outcome(&outcome, &features).await;

        self.stats.ticks += 1;
        self.metrics.inc_ticks();

        debug!(
            rps = features.throughput,
            p95_ms = features.latency_percentile_ms,
            desired = desired_replicas,
            outcome = outcome.label(),
            "Control tick complete"
        );

        TickReport {
            sample,
            features,
            desired_replicas,
            outcome,
        }
    }

    /// Clamped prediction; a non-finite raw output degrades the predictor
    async fn predict(&self, features: &FeatureVector) -> u32 {
        let raw = self.predictor.predict_raw(features);
        let result = if raw.is_finite() {
            Ok(())
        } else {
            warn!(
                rps = features.throughput,
                p95_ms = features.latency_percentile_ms,
                raw,
                "Model produced a non-finite replica count"
            );
            Err(format!("model output {} for rps {:.3}", raw, features.throughput))
        };
        self.health.report(components::PREDICTOR, result).await;
        self.predictor.predict(features)
    }

    async fn observe_probe(&mut self, sample: &ProbeSample) {
        self.metrics.observe_probe(sample.latency_ms, sample.success);
        let result = if sample.success {
            Ok(())
        } else {
            self.stats.probe_failures += 1;
            Err(format!(
                "probe failed with status {} after {:.0}ms",
                sample.status_code, sample.latency_ms
            ))
        };
        self.health.report(components::PROBER, result).await;
    }

    async fn observe_outcome(&mut self, outcome: &ActuationOutcome, features: &FeatureVector) {
        self.metrics.record_outcome(outcome);
        match outcome {
            ActuationOutcome::Applied { replicas, previous } => {
                self.stats.scale_actions += 1;
                self.logger.log_scaled(
                    *previous,
                    *replicas,
                    features.throughput,
                    features.latency_percentile_ms,
                );
                self.health.report(components::SCALER, Ok(())).await;
            }
            ActuationOutcome::Failed { desired, error } => {
                self.stats.scale_failures += 1;
                self.logger.log_scale_failed(*desired, error);
                self.health
                    .report(components::SCALER, Err(error.clone()))
                    .await;
            }
            ActuationOutcome::Unchanged { .. } | ActuationOutcome::CoolingDown { .. } => {}
        }
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn estimator(&self) -> &SlidingWindowEstimator {
        &self.estimator
    }

    pub fn actuator(&self) -> &ScalingActuator {
        &self.actuator
    }
}

/// Builder for creating the control loop
pub struct ControlLoopBuilder {
    prober: Option<Arc<dyn Probe>>,
    predictor: Option<ReplicaPredictor>,
    actuator: Option<ScalingActuator>,
    health: Option<HealthRegistry>,
    config: ControlConfig,
}

impl ControlLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            prober: None,
            predictor: None,
            actuator: None,
            health: None,
            config: ControlConfig::default(),
        }
    }

    pub fn prober(mut self, prober: Arc<dyn Probe>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn predictor(mut self, predictor: ReplicaPredictor) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn actuator(mut self, actuator: ScalingActuator) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Set the tick interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the throughput window
    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    pub fn config(mut self, config: ControlConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the control loop
    pub fn build(self) -> Result<ControlLoop> {
        let prober = self
            .prober
            .ok_or_else(|| anyhow::anyhow!("Prober is required"))?;
        let predictor = self
            .predictor
            .ok_or_else(|| anyhow::anyhow!("Predictor is required"))?;
        let actuator = self
            .actuator
            .ok_or_else(|| anyhow::anyhow!("Actuator is required"))?;
        if self.config.window.is_zero() {
            anyhow::bail!("Throughput window must be non-zero");
        }

        let control = ControlLoop::new(prober, predictor, actuator, self.config);
        Ok(match self.health {
            Some(health) => control.with_health(health),
            None => control,
        })
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
