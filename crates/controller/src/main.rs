//! Replica controller - latency-aware autoscaler for one Deployment
//!
//! Probes the target service, estimates throughput and tail latency over a
//! sliding window, predicts a replica count with a trained model and applies
//! it to the Deployment's scale subresource.

use anyhow::{Context, Result};
use autoscaler_lib::{
    actuator::{DryRunScaler, KubeScaler, ScalingActuator, WorkloadScaler},
    api,
    control::ControlLoopBuilder,
    health::{components, HealthRegistry},
    observability::{ControllerMetrics, StructuredLogger},
    predictor::ModelBundle,
    probe::HttpProber,
};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting replica-controller");

    // Load configuration
    let args = config::Args::parse();
    let config = config::ControllerConfig::load(&args)?;
    info!(
        workload = %config.target(),
        service_url = %config.service_url,
        min_replicas = config.min_replicas,
        max_replicas = config.max_replicas,
        dry_run = config.dry_run,
        "Controller configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::PROBER).await;
    health_registry.register(components::PREDICTOR).await;
    health_registry.register(components::SCALER).await;

    let metrics = ControllerMetrics::new();
    let logger = StructuredLogger::new(config.target().to_string());

    // The model is loaded exactly once; without it there is nothing to run
    let bundle = ModelBundle::load(&config.model_path).with_context(|| {
        format!("Failed to load model bundle {}", config.model_path.display())
    })?;
    let predictor = bundle.predictor(config.min_replicas, config.max_replicas)?;
    metrics.set_model_info(predictor.model_kind(), &bundle.trained_at);
    logger.log_model_loaded(
        &config.model_path.display().to_string(),
        predictor.model_kind(),
        bundle.target_p95_ms,
        &bundle.trained_at,
    );

    let scaler: Arc<dyn WorkloadScaler> = if config.dry_run {
        Arc::new(DryRunScaler::new())
    } else {
        Arc::new(
            KubeScaler::try_default()
                .await
                .context("Failed to create Kubernetes client")?,
        )
    };
    logger.log_startup(CONTROLLER_VERSION, scaler.name());

    let prober = HttpProber::new(&config.service_url, config.probe_timeout())?;
    let actuator = ScalingActuator::new(scaler, config.target(), config.cooldown())
        .with_request_timeout(config.scaler_timeout());

    let control = ControlLoopBuilder::new()
        .prober(Arc::new(prober))
        .predictor(predictor)
        .actuator(actuator)
        .health(health_registry.clone())
        .config(config.control_config())
        .build()?;

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    let api_port = config.api_port;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %e, "API server failed");
        }
    });

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(control.run(shutdown_rx));

    // Mark controller as ready once the model is loaded and the loop started
    health_registry.set_ready(true).await;

    let reason = shutdown_signal().await?;
    logger.log_shutdown(reason);
    health_registry.set_ready(false).await;

    // The loop finishes its in-flight tick before observing the signal
    let _ = shutdown_tx.send(());
    let stats = loop_handle.await.context("Control loop panicked")?;
    info!(
        ticks = stats.ticks,
        scale_actions = stats.scale_actions,
        scale_failures = stats.scale_failures,
        probe_failures = stats.probe_failures,
        "Control loop stopped"
    );

    api_handle.abort();
    Ok(())
}

/// Wait for SIGINT or (on Unix) SIGTERM
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT received")
            }
            _ = terminate.recv() => Ok("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("SIGINT received")
    }
}
