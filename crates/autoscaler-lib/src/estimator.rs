//! Sliding-window throughput and latency percentile estimation
//!
//! The estimator owns two bounded containers: a time-ordered window of probe
//! timestamps used for throughput, and a ring of recent latencies used for
//! the percentile estimate. Nothing outside the estimator mutates them.

use crate::models::{FeatureVector, ProbeSample};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Throughput horizon for the online control loop
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Throughput horizon used while collecting training data
pub const TRAINING_WINDOW: Duration = Duration::from_secs(5);

/// Number of latencies retained for percentile estimation
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Minimum latencies before a percentile is considered meaningful
pub const MIN_PERCENTILE_SAMPLES: usize = 20;

/// Time-bounded window of event timestamps
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    horizon: Duration,
    events: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            events: VecDeque::new(),
        }
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Record an event. Timestamps are expected in non-decreasing order.
    pub fn push(&mut self, timestamp: Instant) {
        self.events.push_back(timestamp);
    }

    /// Drop events older than the horizon relative to `now`
    pub fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.events.front() {
            if now.saturating_duration_since(oldest) > self.horizon {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Events per second over the horizon, after eviction
    pub fn rate(&mut self, now: Instant) -> f64 {
        self.evict(now);
        let horizon_secs = self.horizon.as_secs_f64();
        if self.events.is_empty() || horizon_secs <= 0.0 {
            return 0.0;
        }
        self.events.len() as f64 / horizon_secs
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instant> {
        self.events.iter()
    }
}

/// Ring of recent latency observations
#[derive(Debug, Clone)]
pub struct LatencyHistory {
    capacity: usize,
    min_samples: usize,
    values: VecDeque<f64>,
}

impl LatencyHistory {
    pub fn new(capacity: usize, min_samples: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            min_samples,
            values: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, latency_ms: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(latency_ms);
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether enough samples exist for a real percentile
    pub fn has_sufficient_data(&self) -> bool {
        self.values.len() >= self.min_samples.max(2)
    }

    /// Percentile estimate in milliseconds.
    ///
    /// Falls back to the most recent latency below the minimum sample count,
    /// and to `0.0` when empty.
    pub fn percentile(&self, p: f64) -> f64 {
        if !self.has_sufficient_data() {
            return self.latest().unwrap_or(0.0);
        }
        let values: Vec<f64> = self.values.iter().copied().collect();
        quantile_exclusive(&values, p).unwrap_or(0.0)
    }
}

/// Percentile via the exclusive quantile method.
///
/// Cut points sit at `q * (n + 1)` over the sorted data and are linearly
/// interpolated, with the lower index clamped to `[1, n - 1]`. For `p = 95`
/// this is the 19th of 20 quantile cut points. Needs at least two values.
pub fn quantile_exclusive(values: &[f64], p: f64) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q = (p / 100.0).clamp(0.0, 1.0);
    let position = q * (n + 1) as f64;
    let j = (position.floor() as usize).clamp(1, n - 1);
    let fraction = position - j as f64;

    let lower = sorted[j - 1];
    let upper = sorted[j];
    Some(lower + (upper - lower) * fraction)
}

/// Windowed throughput and latency estimator
#[derive(Debug, Clone)]
pub struct SlidingWindowEstimator {
    window: SlidingWindow,
    history: LatencyHistory,
}

impl SlidingWindowEstimator {
    pub fn new(horizon: Duration, history_capacity: usize, min_samples: usize) -> Self {
        Self {
            window: SlidingWindow::new(horizon),
            history: LatencyHistory::new(history_capacity, min_samples),
        }
    }

    /// Estimator with the online defaults (10s window, 200 latencies, 20 minimum)
    pub fn with_horizon(horizon: Duration) -> Self {
        Self::new(horizon, DEFAULT_HISTORY_CAPACITY, MIN_PERCENTILE_SAMPLES)
    }

    pub fn record(&mut self, sample: &ProbeSample) {
        self.window.push(sample.timestamp);
        self.history.push(sample.latency_ms);
    }

    /// Throughput as of `now`
    pub fn throughput_at(&mut self, now: Instant) -> f64 {
        self.window.rate(now)
    }

    pub fn throughput(&mut self) -> f64 {
        self.throughput_at(Instant::now())
    }

    pub fn latency_percentile(&self, p: f64) -> f64 {
        self.history.percentile(p)
    }

    /// Feature vector for the regressor as of `now`
    pub fn features_at(&mut self, now: Instant, percentile: f64) -> FeatureVector {
        FeatureVector::new(self.throughput_at(now), self.latency_percentile(percentile))
    }

    pub fn features(&mut self, percentile: f64) -> FeatureVector {
        self.features_at(Instant::now(), percentile)
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn history(&self) -> &LatencyHistory {
        &self.history
    }
}

impl Default for SlidingWindowEstimator {
    fn default() -> Self {
        Self::with_horizon(DEFAULT_WINDOW)
    }
}
