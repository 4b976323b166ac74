//! Integration tests for the agent API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use profiler_agent::api::{create_router, AppState};
use profiler_lib::{
    config::AlertConfiguration,
    error::UploadError,
    health::{components, HealthRegistry},
    observability::ProfilerMetrics,
    upload::{StaticAppId, UploadRequest, UploadTransport},
    AlertingConfigHandle, AlertingConfiguration, Signal, UploadPipeline, UploadResult,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct AcceptingTransport;

#[async_trait]
impl UploadTransport for AcceptingTransport {
    async fn upload(&self, _request: UploadRequest) -> Result<UploadResult, UploadError> {
        Ok(UploadResult::succeeded(None, 0))
    }
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register_pipeline().await;

    let state = Arc::new(AppState::new(
        health_registry,
        ProfilerMetrics::new(),
        AlertingConfigHandle::default(),
    ));
    let router = create_router(state.clone());

    (router, state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    for name in components::ALL {
        assert!(health["components"][name].is_object(), "missing {name}");
    }
}

#[tokio::test]
async fn test_healthz_stays_ok_when_uploads_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::UPLOADER, "3 consecutive upload failures")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_capture_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::CAPTURE, "profiler command not found")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_ready_flag() {
    let (app, state) = setup_test_app().await;

    let (status, readiness) = get_json(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::SAMPLER, "procfs unreadable")
        .await;

    let (status, _) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_status_reports_idle_pipeline() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get_json(app, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["triggers_enabled"], false);
    assert_eq!(body["capturing"], false);
    assert_eq!(body["captures_started"], 0);
    assert_eq!(body["uploads_in_flight"], 0);
}

#[tokio::test]
async fn test_status_reflects_configuration_and_pipeline() {
    let health_registry = HealthRegistry::new();
    let configuration = AlertingConfigHandle::default();
    let pipeline = Arc::new(UploadPipeline::new(
        Arc::new(AcceptingTransport),
        Arc::new(StaticAppId::new("app")),
    ));
    let state = Arc::new(
        AppState::new(
            health_registry,
            ProfilerMetrics::new(),
            configuration.clone(),
        )
        .with_pipeline(pipeline),
    );
    let app = create_router(state);

    let cpu = AlertConfiguration::builder(Signal::Cpu)
        .enabled(true)
        .threshold(80.0)
        .profile_duration(Duration::from_secs(60))
        .build()
        .unwrap();
    let alerting = AlertingConfiguration::builder()
        .cpu_alert(cpu)
        .build()
        .unwrap();
    configuration.replace(alerting);

    let (status, body) = get_json(app, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["triggers_enabled"], true);
    assert_eq!(body["uploads_in_flight"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state.metrics.inc_samples(3);
    state.metrics.inc_breaches(Signal::Cpu);
    state.metrics.observe_upload_latency(0.2);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("profiler_samples_total"));
    assert!(metrics_text.contains("profiler_breaches_total{signal=\"CPU\"}"));
    assert!(metrics_text.contains("profiler_upload_latency_seconds_bucket"));
    assert!(metrics_text.contains("profiler_upload_latency_seconds_count"));
}
