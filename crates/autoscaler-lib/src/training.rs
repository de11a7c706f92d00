//! Offline training campaign
//!
//! Probes the service at a fixed rate for a fixed duration, labels every
//! sample with a heuristic replica count, fits a linear model and writes both
//! the model bundle and the raw samples (one JSON object per line).

use crate::error::{AutoscalerError, Result};
use crate::estimator::{quantile_exclusive, SlidingWindow, TRAINING_WINDOW};
use crate::models::{FeatureVector, TrainingSample};
use crate::predictor::{
    LinearRegression, ModelBundle, RegressionModel, DEFAULT_TARGET_P95_MS,
    DEFAULT_TARGET_RPS_PER_POD,
};
use crate::probe::{HttpProber, Probe, TRAINING_PROBE_TIMEOUT};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9091";
pub const DEFAULT_DURATION: Duration = Duration::from_secs(300);
pub const DEFAULT_QPS: f64 = 5.0;
pub const DEFAULT_MODEL_PATH: &str = "replica_model.json";
pub const DEFAULT_SAMPLES_PATH: &str = "training_data.jsonl";

/// Lower bounds applied to divisors
const MIN_QPS: f64 = 0.001;
const MIN_RPS_PER_POD: f64 = 0.1;

/// Parameters of one training campaign
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub base_url: String,
    pub duration: Duration,
    /// Probing rate; the delay between probes is `1 / qps`
    pub qps: f64,
    pub target_p95_ms: f64,
    /// Heuristic throughput one replica handles
    pub target_rps_per_pod: f64,
    pub probe_timeout: Duration,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            duration: DEFAULT_DURATION,
            qps: DEFAULT_QPS,
            target_p95_ms: DEFAULT_TARGET_P95_MS,
            target_rps_per_pod: DEFAULT_TARGET_RPS_PER_POD,
            probe_timeout: TRAINING_PROBE_TIMEOUT,
        }
    }
}

impl TrainingConfig {
    /// Delay inserted after every probe
    pub fn interarrival(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.qps.max(MIN_QPS))
    }
}

/// Summary of a finished campaign
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub sample_count: usize,
    pub empirical_p95_ms: f64,
    /// Fraction of probes answered with 200
    pub success_rate: f64,
    pub model_path: PathBuf,
    pub samples_path: PathBuf,
}

/// Heuristic replica label for one sample.
///
/// `max(1, ceil(rps / rps_per_pod))`, plus one when the campaign-wide p95
/// exceeds the latency target.
pub fn label_for(rps: f64, global_p95_ms: f64, config: &TrainingConfig) -> f64 {
    let per_pod = config.target_rps_per_pod.max(MIN_RPS_PER_POD);
    let base = (rps / per_pod).ceil().max(1.0);
    let latency_bump = if global_p95_ms > config.target_p95_ms {
        1.0
    } else {
        0.0
    };
    base + latency_bump
}

/// p95 over every latency of the campaign; a single sample is its own p95
pub fn empirical_p95(latencies: &[f64]) -> Option<f64> {
    match latencies {
        [] => None,
        [only] => Some(*only),
        values => quantile_exclusive(values, 95.0),
    }
}

/// Collects samples, fits and persists a replica model
pub struct TrainingPipeline {
    prober: Arc<dyn Probe>,
    config: TrainingConfig,
}

impl TrainingPipeline {
    pub fn new(prober: Arc<dyn Probe>, config: TrainingConfig) -> Self {
        Self { prober, config }
    }

    /// Pipeline probing `config.base_url` over HTTP
    pub fn from_config(config: TrainingConfig) -> anyhow::Result<Self> {
        let prober = HttpProber::new(&config.base_url, config.probe_timeout)?;
        Ok(Self::new(Arc::new(prober), config))
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Probe at the configured rate until the duration elapses
    pub async fn collect(&self) -> Result<Vec<TrainingSample>> {
        let interarrival = self.config.interarrival();
        let end = Instant::now()
            .checked_add(self.config.duration)
            .ok_or_else(|| {
                AutoscalerError::InvalidConfig(format!(
                    "training duration of {}s is out of range",
                    self.config.duration.as_secs()
                ))
            })?;
        let mut window = SlidingWindow::new(TRAINING_WINDOW);
        let mut samples = Vec::new();

        info!(
            url = %self.config.base_url,
            duration_secs = self.config.duration.as_secs_f64(),
            qps = self.config.qps,
            "Collecting training samples"
        );

        while Instant::now() < end {
            let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
            let sample = self.prober.probe().await;

            let now = Instant::now();
            window.push(now);
            let rps_5s = window.rate(now);

            debug!(
                latency_ms = sample.latency_ms,
                status = sample.status_code,
                rps = rps_5s,
                "Training probe"
            );
            samples.push(TrainingSample {
                ts,
                lat_ms: sample.latency_ms,
                code: sample.status_code,
                ok: sample.success,
                rps_5s,
            });

            tokio::time::sleep(interarrival).await;
        }

        Ok(samples)
    }

    /// Label `samples` and fit a model bundle
    pub fn fit(&self, samples: &[TrainingSample]) -> Result<ModelBundle> {
        let latencies: Vec<f64> = samples.iter().map(|s| s.lat_ms).collect();
        let p95 = empirical_p95(&latencies).ok_or(AutoscalerError::InsufficientTrainingData)?;

        let features: Vec<FeatureVector> = samples
            .iter()
            .map(|s| FeatureVector::new(s.rps_5s, p95))
            .collect();
        let labels: Vec<f64> = samples
            .iter()
            .map(|s| label_for(s.rps_5s, p95, &self.config))
            .collect();

        let model = LinearRegression::fit(&features, &labels)?;

        Ok(ModelBundle {
            model: RegressionModel::Linear(model),
            target_p95_ms: self.config.target_p95_ms,
            default_target_rps_per_pod: self.config.target_rps_per_pod,
            trained_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            sample_count: samples.len(),
            empirical_p95_ms: p95,
        })
    }

    /// Run the full campaign and write its artifacts
    pub async fn run(&self, model_path: &Path, samples_path: &Path) -> Result<TrainingReport> {
        let samples = self.collect().await?;
        let bundle = self.fit(&samples)?;

        bundle.save(model_path)?;
        write_samples(samples_path, &samples)?;

        let succeeded = samples.iter().filter(|s| s.ok).count();
        Ok(TrainingReport {
            sample_count: samples.len(),
            empirical_p95_ms: bundle.empirical_p95_ms,
            success_rate: succeeded as f64 / samples.len() as f64,
            model_path: model_path.to_path_buf(),
            samples_path: samples_path.to_path_buf(),
        })
    }
}

/// Write samples as JSON lines, replacing any existing file
pub fn write_samples(path: &Path, samples: &[TrainingSample]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for sample in samples {
        serde_json::to_writer(&mut writer, sample)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a JSON lines sample log, skipping blank lines
pub fn read_samples(path: &Path) -> Result<Vec<TrainingSample>> {
    let reader = BufReader::new(File::open(path)?);
    let mut samples = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        samples.push(serde_json::from_str(&line)?);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProbeSample;
    use crate::probe::FAILURE_STATUS;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Prober cycling through fixed latencies; every fourth probe fails
    struct ScriptedProbe {
        latencies: Vec<f64>,
        calls: AtomicUsize,
        fail_every: Option<usize>,
    }

    impl ScriptedProbe {
        fn new(latencies: Vec<f64>) -> Self {
            Self {
                latencies,
                calls: AtomicUsize::new(0),
                fail_every: None,
            }
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self) -> ProbeSample {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let success = self.fail_every.map_or(true, |k| (n + 1) % k != 0);
            ProbeSample {
                latency_ms: self.latencies[n % self.latencies.len()],
                success,
                status_code: if success { 200 } else { FAILURE_STATUS },
                timestamp: Instant::now(),
            }
        }
    }

    fn config(duration_secs: u64, qps: f64) -> TrainingConfig {
        TrainingConfig {
            duration: Duration::from_secs(duration_secs),
            qps,
            ..TrainingConfig::default()
        }
    }

    fn sample(lat_ms: f64, rps_5s: f64) -> TrainingSample {
        TrainingSample {
            ts: "2024-05-01T10:00:00Z".to_string(),
            lat_ms,
            code: 200,
            ok: true,
            rps_5s,
        }
    }

    #[test]
    fn test_training_config_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:9091");
        assert_eq!(config.duration, Duration::from_secs(300));
        assert_eq!(config.qps, 5.0);
        assert_eq!(config.target_p95_ms, 400.0);
        assert_eq!(config.target_rps_per_pod, 8.0);
        assert_eq!(config.interarrival(), Duration::from_millis(200));
    }

    #[test]
    fn test_interarrival_with_zero_qps() {
        let config = config(1, 0.0);
        assert!((config.interarrival().as_secs_f64() - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_label_heuristic() {
        let config = TrainingConfig::default();
        assert_eq!(label_for(0.0, 100.0, &config), 1.0);
        assert_eq!(label_for(7.9, 100.0, &config), 1.0);
        assert_eq!(label_for(8.1, 100.0, &config), 2.0);
        assert_eq!(label_for(20.0, 100.0, &config), 3.0);
        assert_eq!(label_for(20.0, 450.0, &config), 4.0);
        // Exactly at target is not "too slow"
        assert_eq!(label_for(1.0, 400.0, &config), 1.0);
    }

    #[test]
    fn test_label_floors_rps_per_pod() {
        let config = TrainingConfig {
            target_rps_per_pod: 0.0,
            ..TrainingConfig::default()
        };
        assert_eq!(label_for(0.25, 0.0, &config), 3.0);
    }

    #[test]
    fn test_empirical_p95() {
        assert_eq!(empirical_p95(&[]), None);
        assert_eq!(empirical_p95(&[250.0]), Some(250.0));

        let mut latencies = vec![100.0; 19];
        latencies.push(500.0);
        assert!((empirical_p95(&latencies).unwrap() - 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_without_samples_fails() {
        let pipeline = TrainingPipeline::new(
            Arc::new(ScriptedProbe::new(vec![100.0])),
            TrainingConfig::default(),
        );
        assert!(matches!(
            pipeline.fit(&[]),
            Err(AutoscalerError::InsufficientTrainingData)
        ));
    }

    #[test]
    fn test_fit_single_sample() {
        let pipeline = TrainingPipeline::new(
            Arc::new(ScriptedProbe::new(vec![100.0])),
            TrainingConfig::default(),
        );
        let bundle = pipeline.fit(&[sample(250.0, 0.2)]).unwrap();

        assert_eq!(bundle.sample_count, 1);
        assert_eq!(bundle.empirical_p95_ms, 250.0);
        let predictor = bundle.predictor(1, 10).unwrap();
        assert_eq!(predictor.predict(&FeatureVector::new(0.2, 250.0)), 1);
    }

    #[test]
    fn test_fit_learns_throughput_slope() {
        let pipeline = TrainingPipeline::new(
            Arc::new(ScriptedProbe::new(vec![100.0])),
            TrainingConfig::default(),
        );
        let samples: Vec<TrainingSample> = (0..40)
            .map(|i| sample(100.0, f64::from(i)))
            .collect();
        let bundle = pipeline.fit(&samples).unwrap();
        let predictor = bundle.predictor(1, 10).unwrap();

        assert_eq!(bundle.target_p95_ms, 400.0);
        assert_eq!(bundle.default_target_rps_per_pod, 8.0);
        // Heavier load never yields fewer replicas
        let low = predictor.predict(&FeatureVector::new(2.0, 100.0));
        let high = predictor.predict(&FeatureVector::new(30.0, 100.0));
        assert!(high > low, "low={} high={}", low, high);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_paces_probes() {
        let probe = Arc::new(ScriptedProbe::new(vec![100.0]));
        let pipeline = TrainingPipeline::new(probe.clone(), config(2, 5.0));

        let samples = pipeline.collect().await.unwrap();

        assert_eq!(samples.len(), 10);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 10);
        for (i, s) in samples.iter().enumerate() {
            assert!((s.rps_5s - (i + 1) as f64 / 5.0).abs() < 1e-9);
            assert!(s.ts.ends_with('Z'));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_window_expires_after_five_seconds() {
        let probe = Arc::new(ScriptedProbe::new(vec![100.0]));
        let pipeline = TrainingPipeline::new(probe, config(20, 1.0));

        let samples = pipeline.collect().await.unwrap();

        assert_eq!(samples.len(), 20);
        // Probes at t and t-1..t-5 remain once the window is full
        assert!((samples.last().unwrap().rps_5s - 6.0 / 5.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_writes_artifacts() {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("replica_model.json");
        let samples_path = dir.path().join("training_data.jsonl");

        let probe = ScriptedProbe {
            latencies: vec![100.0, 120.0, 900.0, 110.0],
            calls: AtomicUsize::new(0),
            fail_every: Some(4),
        };
        let pipeline = TrainingPipeline::new(Arc::new(probe), config(4, 5.0));

        let report = pipeline.run(&model_path, &samples_path).await.unwrap();

        assert_eq!(report.sample_count, 20);
        assert!((report.success_rate - 0.75).abs() < 1e-9);
        assert_eq!(report.model_path, model_path);

        let bundle = ModelBundle::load(&model_path).unwrap();
        assert_eq!(bundle.sample_count, 20);
        assert_eq!(bundle.empirical_p95_ms, report.empirical_p95_ms);

        let logged = read_samples(&samples_path).unwrap();
        assert_eq!(logged.len(), 20);
        assert_eq!(logged.iter().filter(|s| !s.ok).count(), 5);
        assert!(logged.iter().filter(|s| !s.ok).all(|s| s.code == 599));

        let raw = std::fs::read_to_string(&samples_path).unwrap();
        assert!(raw.lines().next().unwrap().contains("\"ok\":1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_zero_duration_fails() {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("model.json");
        let pipeline = TrainingPipeline::new(
            Arc::new(ScriptedProbe::new(vec![100.0])),
            config(0, 5.0),
        );

        let result = pipeline
            .run(&model_path, &dir.path().join("samples.jsonl"))
            .await;

        assert!(matches!(result, Err(AutoscalerError::InsufficientTrainingData)));
        assert!(!model_path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_duration_is_rejected() {
        let probe = Arc::new(ScriptedProbe::new(vec![100.0]));
        let pipeline = TrainingPipeline::new(probe.clone(), config(u64::MAX, 5.0));

        let result = pipeline.collect().await;

        assert!(matches!(result, Err(AutoscalerError::InvalidConfig(_))));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_read_samples_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("samples.jsonl");
        std::fs::write(
            &path,
            "{\"ts\":\"a\",\"lat_ms\":1.0,\"code\":200,\"ok\":1,\"rps_5s\":0.2}\n\n",
        )
        .unwrap();

        let samples = read_samples(&path).unwrap();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].ok);
    }
}
