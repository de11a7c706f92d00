//! Health tracking for the controller process
//!
//! The control loop reports each component operation here. A single failure
//! degrades a component; a streak of failures marks it unhealthy, which fails
//! liveness and readiness.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive failures after which a component is reported unhealthy
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Component names for health tracking
pub mod components {
    /// Synthetic probes against the target service
    pub const PROBER: &str = "prober";
    /// Loaded replica model
    pub const PREDICTOR: &str = "predictor";
    /// Workload scaler API
    pub const SCALER: &str = "scaler";
}

/// Health status, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Recent failures, loop still making progress
    Degraded,
    /// Failure streak reached the threshold
    Unhealthy,
}

/// Latest report for one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn fresh() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    fn record(&mut self, result: Result<(), String>, threshold: u32) {
        self.last_check_timestamp = chrono::Utc::now().timestamp();
        match result {
            Ok(()) => {
                self.status = ComponentStatus::Healthy;
                self.message = None;
                self.consecutive_failures = 0;
            }
            Err(message) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.status = if self.consecutive_failures >= threshold {
                    ComponentStatus::Unhealthy
                } else {
                    ComponentStatus::Degraded
                };
                self.message = Some(message);
            }
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status across components
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared registry of component health plus the process readiness flag
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
    failure_threshold: u32,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::with_failure_threshold(DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn with_failure_threshold(failure_threshold: u32) -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub async fn register(&self, name: &str) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::fresh());
    }

    /// Record the outcome of one component operation
    pub async fn report(&self, name: &str, result: Result<(), String>) {
        let mut components = self.components.write().await;
        components
            .entry(name.to_string())
            .or_insert_with(ComponentHealth::fresh)
            .record(result, self.failure_threshold);
    }

    pub async fn status(&self, name: &str) -> Option<ComponentStatus> {
        self.components.read().await.get(name).map(|h| h.status)
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Controller not yet initialized".to_string()),
            };
        }

        let components = self.components.read().await;
        let mut unhealthy: Vec<&str> = components
            .iter()
            .filter(|(_, h)| h.status == ComponentStatus::Unhealthy)
            .map(|(name, _)| name.as_str())
            .collect();
        if unhealthy.is_empty() {
            return ReadinessResponse {
                ready: true,
                reason: None,
            };
        }

        unhealthy.sort_unstable();
        ReadinessResponse {
            ready: false,
            reason: Some(format!("Unhealthy: {}", unhealthy.join(", "))),
        }
    }
}
