//! Replica autoscaler CLI
//!
//! A command-line tool for training replica models, inspecting model
//! bundles, trying predictions offline and summarising raw training logs.

mod commands;
mod output;

use anyhow::Result;
use autoscaler_lib::predictor::{DEFAULT_TARGET_P95_MS, DEFAULT_TARGET_RPS_PER_POD};
use autoscaler_lib::probe::TRAINING_PROBE_TIMEOUT;
use autoscaler_lib::training::{
    TrainingConfig, DEFAULT_BASE_URL, DEFAULT_MODEL_PATH, DEFAULT_QPS, DEFAULT_SAMPLES_PATH,
};
use clap::{Parser, Subcommand};
use commands::{inspect, predict, samples, train};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Replica autoscaler CLI
#[derive(Parser)]
#[command(name = "replicactl")]
#[command(author, version, about = "CLI for the latency-aware replica autoscaler", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe a service, fit a replica model and save it
    Train {
        /// Service base URL
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// How long to collect data (seconds)
        #[arg(long, default_value_t = 300)]
        duration_secs: u64,

        /// Probing rate (requests per second)
        #[arg(long, default_value_t = DEFAULT_QPS)]
        qps: f64,

        /// Latency SLA target (p95 in milliseconds)
        #[arg(long, default_value_t = DEFAULT_TARGET_P95_MS)]
        target_p95_ms: f64,

        /// Heuristic baseline throughput per pod for labels
        #[arg(long, default_value_t = DEFAULT_TARGET_RPS_PER_POD)]
        target_rps_per_pod: f64,

        /// Path to save the trained model
        #[arg(long, default_value = DEFAULT_MODEL_PATH)]
        outfile: PathBuf,

        /// Path to save the raw samples
        #[arg(long, default_value = DEFAULT_SAMPLES_PATH)]
        samples_out: PathBuf,
    },

    /// Show the contents of a model bundle
    Inspect {
        #[arg(long, default_value = DEFAULT_MODEL_PATH)]
        model_path: PathBuf,
    },

    /// Predict the replica count for a hypothetical load
    Predict {
        #[arg(long, default_value = DEFAULT_MODEL_PATH)]
        model_path: PathBuf,

        /// Throughput in requests per second
        #[arg(long)]
        rps: f64,

        /// p95 latency in milliseconds
        #[arg(long)]
        p95_ms: f64,

        #[arg(long, default_value_t = 1)]
        min_replicas: u32,

        #[arg(long, default_value_t = 10)]
        max_replicas: u32,
    },

    /// Summarise a raw training log
    Samples {
        #[arg(long, default_value = DEFAULT_SAMPLES_PATH)]
        path: PathBuf,

        /// Latency target to compare the p95 against
        #[arg(long, default_value_t = DEFAULT_TARGET_P95_MS)]
        target_p95_ms: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Train {
            base_url,
            duration_secs,
            qps,
            target_p95_ms,
            target_rps_per_pod,
            outfile,
            samples_out,
        } => {
            let config = TrainingConfig {
                base_url,
                duration: Duration::from_secs(duration_secs),
                qps,
                target_p95_ms,
                target_rps_per_pod,
                probe_timeout: TRAINING_PROBE_TIMEOUT,
            };
            train::run_training(config, &outfile, &samples_out, cli.format).await?;
        }
        Commands::Inspect { model_path } => {
            inspect::inspect_model(&model_path, cli.format)?;
        }
        Commands::Predict {
            model_path,
            rps,
            p95_ms,
            min_replicas,
            max_replicas,
        } => {
            predict::predict(
                &model_path,
                rps,
                p95_ms,
                min_replicas,
                max_replicas,
                cli.format,
            )?;
        }
        Commands::Samples {
            path,
            target_p95_ms,
        } => {
            samples::show_samples(&path, target_p95_ms, cli.format)?;
        }
    }

    Ok(())
}
