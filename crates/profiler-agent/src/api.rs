//! HTTP API for health checks, pipeline status and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use profiler_lib::{
    health::HealthRegistry, observability::ProfilerMetrics, platform, AlertingConfigHandle,
    CollectionScheduler, UploadPipeline,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ProfilerMetrics,
    pub configuration: AlertingConfigHandle,
    pub scheduler: Option<Arc<CollectionScheduler>>,
    pub pipeline: Option<Arc<UploadPipeline>>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: ProfilerMetrics,
        configuration: AlertingConfigHandle,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            configuration,
            scheduler: None,
            pipeline: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<CollectionScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Arc<UploadPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }
}

/// Snapshot of the trigger pipeline
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub platform: Option<&'static str>,
    pub triggers_enabled: bool,
    pub capturing: bool,
    pub captures_started: u64,
    pub uploads_in_flight: usize,
}

/// Health check: 200 while operational, 503 when a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Readiness check: 200 once wired and no component is unhealthy
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let configuration = state.configuration.current();
    let scheduler = state.scheduler.as_deref();
    let pipeline = state.pipeline.as_deref();

    Json(StatusResponse {
        platform: platform::platform_description(),
        triggers_enabled: configuration.has_an_enabled_trigger(chrono::Utc::now()),
        capturing: scheduler.map_or(false, CollectionScheduler::is_capturing),
        captures_started: scheduler.map_or(0, CollectionScheduler::capture_count),
        uploads_in_flight: pipeline.map_or(0, UploadPipeline::in_flight),
    })
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    let status_code = match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            buffer.clear();
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status_code,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until shutdown is signalled
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
