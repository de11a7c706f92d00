//! Integration tests for the controller API endpoints

use autoscaler_lib::{
    actuator::ActuationOutcome,
    api::{create_router, AppState},
    health::{components, HealthRegistry, DEFAULT_FAILURE_THRESHOLD},
    observability::ControllerMetrics,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::PROBER).await;
    health_registry.register(components::PREDICTOR).await;
    health_registry.register(components::SCALER).await;

    let metrics = ControllerMetrics::new();
    let state = Arc::new(AppState::new(health_registry, metrics));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn body_text(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let response = get(app, "/healthz").await;

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_scaler_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .report(components::SCALER, Err("deployments.apps is forbidden".to_string()))
        .await;

    let response = get(app, "/healthz").await;

    // A failed scaler call is retried on the next tick, so still 200
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["scaler"]["message"],
        "deployments.apps is forbidden"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    for _ in 0..DEFAULT_FAILURE_THRESHOLD {
        state
            .health_registry
            .report(components::SCALER, Err("deployments.apps is forbidden".to_string()))
            .await;
    }

    let response = get(app, "/healthz").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let health = body_json(response).await;
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(
        health["components"]["scaler"]["consecutive_failures"],
        DEFAULT_FAILURE_THRESHOLD
    );
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    let response = get(app, "/readyz").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], false);
    assert_eq!(readiness["reason"], "Controller not yet initialized");
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let response = get(app, "/readyz").await;

    assert_eq!(response.status(), StatusCode::OK);
    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;
    for _ in 0..DEFAULT_FAILURE_THRESHOLD {
        state
            .health_registry
            .report(components::PROBER, Err("probe failed with status 599".to_string()))
            .await;
    }

    let response = get(app, "/readyz").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let readiness = body_json(response).await;
    assert_eq!(readiness["reason"], "Unhealthy: prober");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_probe(85.0, true);
    state.metrics.set_load(1.2, 310.0);
    state.metrics.set_desired_replicas(3);
    state.metrics.record_outcome(&ActuationOutcome::Applied {
        replicas: 3,
        previous: None,
    });
    state.metrics.set_model_info("linear", "2024-05-01T10:00:00Z");

    let response = get(app, "/metrics").await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let metrics_text = body_text(response).await;
    assert!(metrics_text.contains("replica_autoscaler_probe_latency_seconds"));
    assert!(metrics_text.contains("replica_autoscaler_throughput_rps"));
    assert!(metrics_text.contains("replica_autoscaler_latency_p95_ms"));
    assert!(metrics_text.contains("replica_autoscaler_desired_replicas"));
    assert!(metrics_text.contains("replica_autoscaler_scale_decisions_total{outcome=\"applied\"}"));
    assert!(metrics_text.contains("replica_autoscaler_model_info"));
}

#[tokio::test]
async fn test_metrics_contains_histogram_buckets() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_probe(12.0, true);
    state.metrics.observe_probe(240.0, true);
    state.metrics.observe_probe(3000.0, false);

    let metrics_text = body_text(get(app, "/metrics").await).await;

    assert!(metrics_text.contains("replica_autoscaler_probe_latency_seconds_bucket"));
    assert!(metrics_text.contains("replica_autoscaler_probe_latency_seconds_count"));
    assert!(metrics_text.contains("replica_autoscaler_probe_latency_seconds_sum"));
    assert!(metrics_text.contains("replica_autoscaler_probe_failures_total"));
}

#[tokio::test]
async fn test_healthz_includes_component_details() {
    let (app, _state) = setup_test_app().await;

    let health = body_json(get(app, "/healthz").await).await;

    assert!(health["components"].is_object());
    assert!(health["components"]["prober"].is_object());
    assert!(health["components"]["predictor"].is_object());
    assert!(health["components"]["scaler"].is_object());
}
