//! Core library for latency-aware replica autoscaling
//!
//! This crate provides:
//! - Synthetic HTTP probing of the target service
//! - Sliding-window throughput and latency estimation
//! - Regression-based replica prediction and model bundles
//! - Cooldown-gated actuation against a workload scaler
//! - The online control loop and the offline training campaign
//! - Health checks and observability

pub mod actuator;
pub mod api;
pub mod control;
pub mod error;
pub mod estimator;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod probe;
pub mod training;

pub use actuator::{
    ActuationOutcome, ActuatorState, DryRunScaler, KubeScaler, ScalingActuator, WorkloadScaler,
};
pub use control::{ControlConfig, ControlLoop, ControlLoopBuilder, LoopStats, TickReport};
pub use error::AutoscalerError;
pub use estimator::SlidingWindowEstimator;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ControllerMetrics, StructuredLogger};
pub use predictor::{ModelBundle, ReplicaPredictor};
pub use probe::{HttpProber, Probe};
pub use training::{TrainingConfig, TrainingPipeline, TrainingReport};
