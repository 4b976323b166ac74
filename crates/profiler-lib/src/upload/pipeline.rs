//! Upload pipeline
//!
//! Takes finished artifacts, resolves the app id, ships them through the
//! transport on a spawned task and notifies the caller on success. The
//! artifact file is deleted once the upload reaches a terminal outcome.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::app_id::{normalize_app_id, AppIdSupplier};
use super::transport::{UploadRequest, UploadTransport};
use crate::error::UploadErrorKind;
use crate::health::{components, FailureStreak, HealthRegistry};
use crate::models::{AlertBreach, CaptureArtifact};
use crate::observability::{ProfilerMetrics, StructuredLogger};
use crate::scheduler::{ArtifactSink, UploadCompleteHandler};

pub struct UploadPipeline {
    transport: Arc<dyn UploadTransport>,
    app_id: Arc<dyn AppIdSupplier>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    metrics: ProfilerMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    streak: Arc<Mutex<FailureStreak>>,
}

impl UploadPipeline {
    pub fn new(transport: Arc<dyn UploadTransport>, app_id: Arc<dyn AppIdSupplier>) -> Self {
        Self {
            transport,
            app_id,
            in_flight: Mutex::new(Vec::new()),
            metrics: ProfilerMetrics::new(),
            logger: StructuredLogger::new("profiler"),
            health: None,
            streak: Arc::new(Mutex::new(FailureStreak::new())),
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.logger = StructuredLogger::new(service);
        self
    }

    /// Uploads not yet finished
    pub fn in_flight(&self) -> usize {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.len()
    }

    /// Queue an artifact for upload and return immediately.
    ///
    /// `on_complete` runs at most once, only after a successful upload, and
    /// before the completion is logged.
    pub fn upload(
        &self,
        breach: AlertBreach,
        timestamp: DateTime<Utc>,
        artifact: CaptureArtifact,
        on_complete: UploadCompleteHandler,
    ) {
        let Some(app_id) = normalize_app_id(&self.app_id.app_id()) else {
            error!(
                profile_id = %breach.profile_id,
                "Not uploading profile due to lack of app id"
            );
            self.metrics.inc_uploads_failed(UploadErrorKind::MissingAppId);
            self.track(tokio::spawn(artifact.dispose()));
            return;
        };

        let request = UploadRequest {
            artifact_id: breach.profile_id,
            app_id,
            label: breach.label(),
            timestamp,
            file: artifact.path().to_path_buf(),
            cpu_metric: breach.cpu_metric,
            memory_usage: breach.memory_usage,
        };

        let transport = Arc::clone(&self.transport);
        let metrics = self.metrics.clone();
        let logger = self.logger.clone();
        let health = self.health.clone();
        let streak = Arc::clone(&self.streak);

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = transport.upload(request).await;
            metrics.observe_upload_latency(started.elapsed().as_secs_f64());

            let transition = match outcome {
                Ok(result) => {
                    metrics.inc_uploads_succeeded();
                    let stamp_id = result.stamp_id.clone();
                    let bytes = result.uploaded_bytes;
                    on_complete(result);
                    logger.log_upload_complete(&breach, stamp_id.as_deref(), bytes);
                    streak.lock().unwrap_or_else(|e| e.into_inner()).success()
                }
                Err(e) => {
                    let kind = e.kind();
                    metrics.inc_uploads_failed(kind);
                    logger.log_upload_failed(&breach, kind, &e.to_string());
                    streak
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .failure(e.to_string())
                }
            };

            if let (Some(health), Some(registry)) = (transition, health) {
                registry.update(components::UPLOADER, health).await;
            }

            artifact.dispose().await;
        });

        self.track(task);
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(task);
    }

    /// Wait up to `timeout` for in-flight uploads. Returns how many were
    /// abandoned still running.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let mut handles = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *in_flight)
        };
        if handles.is_empty() {
            return 0;
        }
        info!(pending = handles.len(), "Waiting for in-flight uploads");

        let drained = tokio::time::timeout(timeout, async {
            for handle in handles.iter_mut() {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Upload task failed");
                }
            }
        })
        .await;

        if drained.is_ok() {
            return 0;
        }

        let abandoned = handles.iter().filter(|h| !h.is_finished()).count();
        warn!(abandoned = abandoned, "Abandoning uploads still in flight");
        abandoned
    }
}

impl ArtifactSink for UploadPipeline {
    fn submit(&self, artifact: CaptureArtifact, on_complete: UploadCompleteHandler) {
        let breach = artifact.breach.clone();
        let timestamp = artifact.started_at;
        self.upload(breach, timestamp, artifact, on_complete);
    }
}
