//! Controller configuration
//!
//! Values come from, lowest precedence first: built-in defaults, an optional
//! config file, `REPLICA_CONTROLLER_*` environment variables, command-line
//! flags.

use anyhow::{Context, Result};
use autoscaler_lib::control::ControlConfig;
use autoscaler_lib::models::ScalingTarget;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "REPLICA_CONTROLLER";

/// Command-line arguments
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "replica-controller")]
#[command(about = "Latency-aware replica autoscaler for a Kubernetes Deployment")]
#[command(version)]
pub struct Args {
    /// Optional config file (TOML, YAML or JSON)
    #[arg(long, env = "REPLICA_CONTROLLER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the service to probe
    #[arg(long)]
    pub service_url: Option<String>,

    /// Namespace of the scaled Deployment
    #[arg(long = "kube-namespace", visible_alias = "namespace")]
    pub namespace: Option<String>,

    /// Name of the scaled Deployment
    #[arg(long)]
    pub deployment: Option<String>,

    /// Trained model bundle
    #[arg(long)]
    pub model_path: Option<String>,

    /// Seconds between control ticks
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Throughput window in seconds
    #[arg(long)]
    pub rps_window_secs: Option<f64>,

    #[arg(long)]
    pub min_replicas: Option<u32>,

    #[arg(long)]
    pub max_replicas: Option<u32>,

    /// Minimum seconds between two scaling actions
    #[arg(long)]
    pub cooldown_secs: Option<u64>,

    #[arg(long)]
    pub probe_timeout_secs: Option<f64>,

    #[arg(long)]
    pub scaler_timeout_secs: Option<f64>,

    /// Port for the health and metrics server
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Log scaling decisions without touching the cluster
    #[arg(long)]
    pub dry_run: bool,
}

/// Controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_service_url")]
    pub service_url: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_deployment")]
    pub deployment: String,

    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_rps_window")]
    pub rps_window_secs: f64,

    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,

    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,

    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: f64,

    #[serde(default = "default_scaler_timeout")]
    pub scaler_timeout_secs: f64,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub dry_run: bool,
}

fn default_service_url() -> String {
    "http://ghanapostgps-api.ghanapostgps.svc.cluster.local".to_string()
}

fn default_namespace() -> String {
    "ghanapostgps".to_string()
}

fn default_deployment() -> String {
    "ghanapostgps-api".to_string()
}

fn default_model_path() -> PathBuf {
    PathBuf::from(autoscaler_lib::training::DEFAULT_MODEL_PATH)
}

fn default_interval() -> u64 {
    15
}

fn default_rps_window() -> f64 {
    10.0
}

fn default_min_replicas() -> u32 {
    1
}

fn default_max_replicas() -> u32 {
    10
}

fn default_cooldown() -> u64 {
    60
}

fn default_probe_timeout() -> f64 {
    3.0
}

fn default_scaler_timeout() -> f64 {
    10.0
}

fn default_api_port() -> u16 {
    8080
}

impl ControllerConfig {
    /// Load configuration from file, environment and flags
    pub fn load(args: &Args) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option("service_url", args.service_url.clone())?
            .set_override_option("namespace", args.namespace.clone())?
            .set_override_option("deployment", args.deployment.clone())?
            .set_override_option("model_path", args.model_path.clone())?
            .set_override_option("interval_secs", args.interval_secs)?
            .set_override_option("rps_window_secs", args.rps_window_secs)?
            .set_override_option("min_replicas", args.min_replicas.map(u64::from))?
            .set_override_option("max_replicas", args.max_replicas.map(u64::from))?
            .set_override_option("cooldown_secs", args.cooldown_secs)?
            .set_override_option("probe_timeout_secs", args.probe_timeout_secs)?
            .set_override_option("scaler_timeout_secs", args.scaler_timeout_secs)?
            .set_override_option("api_port", args.api_port.map(u64::from))?
            .set_override_option("dry_run", args.dry_run.then_some(true))?
            .build()
            .context("Failed to read controller configuration")?;

        let config: ControllerConfig = config
            .try_deserialize()
            .context("Invalid controller configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the control loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.min_replicas == 0 {
            anyhow::bail!("min_replicas must be at least 1");
        }
        if self.min_replicas > self.max_replicas {
            anyhow::bail!(
                "min_replicas ({}) exceeds max_replicas ({})",
                self.min_replicas,
                self.max_replicas
            );
        }
        if self.interval_secs == 0 {
            anyhow::bail!("interval_secs must be positive");
        }
        for (name, value) in [
            ("rps_window_secs", self.rps_window_secs),
            ("probe_timeout_secs", self.probe_timeout_secs),
            ("scaler_timeout_secs", self.scaler_timeout_secs),
        ] {
            if !(value.is_finite() && value > 0.0) {
                anyhow::bail!("{} must be a positive number, got {}", name, value);
            }
            Duration::try_from_secs_f64(value)
                .with_context(|| format!("{} is out of range: {}", name, value))?;
        }
        Ok(())
    }

    pub fn target(&self) -> ScalingTarget {
        ScalingTarget::new(&self.namespace, &self.deployment)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.probe_timeout_secs)
    }

    pub fn scaler_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.scaler_timeout_secs)
    }

    pub fn control_config(&self) -> ControlConfig {
        ControlConfig {
            interval: Duration::from_secs(self.interval_secs),
            window: Duration::from_secs_f64(self.rps_window_secs),
            ..ControlConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::load(&Args::default()).unwrap();

        assert_eq!(config.namespace, "ghanapostgps");
        assert_eq!(config.deployment, "ghanapostgps-api");
        assert_eq!(
            config.service_url,
            "http://ghanapostgps-api.ghanapostgps.svc.cluster.local"
        );
        assert_eq!(config.model_path, PathBuf::from("replica_model.json"));
        assert_eq!(config.interval_secs, 15);
        assert_eq!(config.rps_window_secs, 10.0);
        assert_eq!((config.min_replicas, config.max_replicas), (1, 10));
        assert_eq!(config.cooldown(), Duration::from_secs(60));
        assert_eq!(config.probe_timeout(), Duration::from_secs(3));
        assert_eq!(config.scaler_timeout(), Duration::from_secs(10));
        assert!(!config.dry_run);
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "namespace = \"shop\"\ndeployment = \"checkout\"\nmax_replicas = 4\ncooldown_secs = 30"
        )
        .unwrap();

        let args = Args::parse_from([
            "replica-controller",
            "--config",
            file.path().to_str().unwrap(),
            "--deployment",
            "cart",
            "--dry-run",
        ]);
        let config = ControllerConfig::load(&args).unwrap();

        assert_eq!(config.target().to_string(), "shop/cart");
        assert_eq!(config.max_replicas, 4);
        assert_eq!(config.cooldown_secs, 30);
        assert!(config.dry_run);
    }

    #[test]
    fn test_control_config_from_flags() {
        let args = Args::parse_from([
            "replica-controller",
            "--interval-secs",
            "5",
            "--rps-window-secs",
            "2.5",
        ]);
        let control = ControllerConfig::load(&args).unwrap().control_config();

        assert_eq!(control.interval, Duration::from_secs(5));
        assert_eq!(control.window, Duration::from_millis(2500));
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let args = Args::parse_from([
            "replica-controller",
            "--min-replicas",
            "5",
            "--max-replicas",
            "2",
        ]);
        assert!(ControllerConfig::load(&args).is_err());

        let args = Args::parse_from(["replica-controller", "--min-replicas", "0"]);
        assert!(ControllerConfig::load(&args).is_err());
    }

    #[test]
    fn test_huge_durations_rejected() {
        for flag in ["--rps-window-secs", "--probe-timeout-secs", "--scaler-timeout-secs"] {
            let args = Args::parse_from(["replica-controller", flag, "1e30"]);
            let err = ControllerConfig::load(&args).unwrap_err();
            assert!(err.to_string().contains("out of range"), "{}: {}", flag, err);
        }
    }
}
