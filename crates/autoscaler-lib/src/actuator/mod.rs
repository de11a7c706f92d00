//! Scaling actuation with hysteresis and cooldown
//!
//! The actuator owns the only mutable scaling state in the controller: the
//! last replica count it applied and when. Decisions follow a small state
//! machine:
//!
//! ```text
//! Idle     no action yet          -> act on the first decision
//! Cooling  inside cooldown window -> hold changed decisions
//! Ready    cooldown elapsed       -> act on changed decisions
//! ```
//!
//! A desired count equal to the last applied one is a no-op in every state.
//! A failed scaler call leaves the state untouched, so the next eligible tick
//! retries.

mod kubernetes;

pub use kubernetes::KubeScaler;

use crate::error::{AutoscalerError, Result};
use crate::models::ScalingTarget;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default minimum interval between two scaling actions
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Default bound on a single scaler request
pub const DEFAULT_SCALER_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for APIs that can set a workload's replica count
#[async_trait]
pub trait WorkloadScaler: Send + Sync {
    /// Set the replica count to an explicit value. Must be idempotent.
    async fn set_replicas(&self, namespace: &str, deployment: &str, replicas: u32) -> Result<()>;

    /// Read the currently requested replica count, if known
    async fn current_replicas(&self, namespace: &str, deployment: &str) -> Result<Option<u32>>;

    fn name(&self) -> &str;
}

/// Scaler that only logs what it would do
#[derive(Debug, Default)]
pub struct DryRunScaler {
    last: AtomicU32,
}

impl DryRunScaler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkloadScaler for DryRunScaler {
    async fn set_replicas(&self, namespace: &str, deployment: &str, replicas: u32) -> Result<()> {
        info!(
            namespace = %namespace,
            deployment = %deployment,
            replicas = replicas,
            "Dry run: would scale deployment"
        );
        self.last.store(replicas, Ordering::SeqCst);
        Ok(())
    }

    async fn current_replicas(&self, _namespace: &str, _deployment: &str) -> Result<Option<u32>> {
        match self.last.load(Ordering::SeqCst) {
            0 => Ok(None),
            n => Ok(Some(n)),
        }
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

/// Where the actuator stands relative to its cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorState {
    /// No scaling action has been applied yet
    Idle,
    /// Within the cooldown window of the last action
    Cooling,
    /// Eligible to act on a changed decision
    Ready,
}

/// Result of one actuation decision
#[derive(Debug, Clone, PartialEq)]
pub enum ActuationOutcome {
    /// The scaler accepted the new replica count
    Applied {
        replicas: u32,
        previous: Option<u32>,
    },
    /// Desired count already applied
    Unchanged { replicas: u32 },
    /// Desired count differs but the cooldown has not elapsed
    CoolingDown { desired: u32, remaining: Duration },
    /// The scaler call failed; state was not updated
    Failed { desired: u32, error: String },
}

impl ActuationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ActuationOutcome::Applied { .. })
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            ActuationOutcome::Applied { .. } => "applied",
            ActuationOutcome::Unchanged { .. } => "unchanged",
            ActuationOutcome::CoolingDown { .. } => "cooling_down",
            ActuationOutcome::Failed { .. } => "failed",
        }
    }
}

/// Applies replica decisions to a workload
pub struct ScalingActuator {
    scaler: Arc<dyn WorkloadScaler>,
    target: ScalingTarget,
    cooldown: Duration,
    request_timeout: Duration,
    last_applied: Option<u32>,
    last_action: Option<Instant>,
}

impl ScalingActuator {
    pub fn new(scaler: Arc<dyn WorkloadScaler>, target: ScalingTarget, cooldown: Duration) -> Self {
        Self {
            scaler,
            target,
            cooldown,
            request_timeout: DEFAULT_SCALER_TIMEOUT,
            last_applied: None,
            last_action: None,
        }
    }

    /// Set the bound on each scaler request
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn target(&self) -> &ScalingTarget {
        &self.target
    }

    pub fn last_applied(&self) -> Option<u32> {
        self.last_applied
    }

    pub fn state(&self, now: Instant) -> ActuatorState {
        match self.last_action {
            None => ActuatorState::Idle,
            Some(last) if now.saturating_duration_since(last) < self.cooldown => {
                ActuatorState::Cooling
            }
            Some(_) => ActuatorState::Ready,
        }
    }

    pub async fn actuate(&mut self, desired: u32) -> ActuationOutcome {
        self.actuate_at(desired, Instant::now()).await
    }

    /// Decide on `desired` as of `now`, calling the scaler if warranted
    pub async fn actuate_at(&mut self, desired: u32, now: Instant) -> ActuationOutcome {
        if let (Some(last), Some(last_action)) = (self.last_applied, self.last_action) {
            if desired == last {
                return ActuationOutcome::Unchanged { replicas: desired };
            }

            let since = now.saturating_duration_since(last_action);
            if since < self.cooldown {
                let remaining = self.cooldown - since;
                debug!(
                    workload = %self.target,
                    desired = desired,
                    last_applied = last,
                    remaining_secs = remaining.as_secs_f64(),
                    "Scaling suppressed by cooldown"
                );
                return ActuationOutcome::CoolingDown { desired, remaining };
            }
        }

        match self.call_scaler(desired).await {
            Ok(()) => {
                let previous = self.last_applied.replace(desired);
                self.last_action = Some(now);
                ActuationOutcome::Applied {
                    replicas: desired,
                    previous,
                }
            }
            Err(e) => {
                warn!(
                    workload = %self.target,
                    scaler = %self.scaler.name(),
                    desired = desired,
                    error = %e,
                    "Scaler call failed, will retry on next eligible tick"
                );
                ActuationOutcome::Failed {
                    desired,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn call_scaler(&self, replicas: u32) -> Result<()> {
        let call = self
            .scaler
            .set_replicas(&self.target.namespace, &self.target.deployment, replicas);

        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AutoscalerError::ScalerTimeout {
                namespace: self.target.namespace.clone(),
                deployment: self.target.deployment.clone(),
                timeout_ms: self.request_timeout.as_millis(),
            }),
        }
    }
}
