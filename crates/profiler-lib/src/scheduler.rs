//! Collection scheduling
//!
//! Turns breaches into bounded capture windows. At most one window is open
//! system-wide; breaches that arrive while it is open, or while their signal
//! is cooling down after a previous capture, are discarded. A window closes
//! at its deadline or early on shutdown, and only a complete recording is
//! handed to the artifact sink.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::{CaptureBackend, CaptureHandle};
use crate::health::{components, HealthRegistry};
use crate::models::{AlertBreach, CaptureArtifact, Signal, UploadResult};
use crate::observability::{ProfilerMetrics, StructuredLogger};

/// Called once per finished upload with its outcome
pub type UploadCompleteHandler = Box<dyn FnOnce(UploadResult) + Send + 'static>;

/// Caller-supplied listener shared by every capture
pub type CompletionListener = Arc<dyn Fn(UploadResult) + Send + Sync + 'static>;

/// Destination of finished artifacts
pub trait ArtifactSink: Send + Sync {
    /// Take ownership of the artifact; must not block
    fn submit(&self, artifact: CaptureArtifact, on_complete: UploadCompleteHandler);
}

/// What the scheduler did with a breach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachOutcome {
    Started,
    DiscardedActive,
    DiscardedCooldown,
    Failed,
}

pub struct CollectionScheduler {
    backend: Arc<dyn CaptureBackend>,
    sink: Arc<dyn ArtifactSink>,
    listener: Option<CompletionListener>,
    /// Single capture slot, taken with compare-and-set
    active: AtomicBool,
    last_capture_end: DashMap<Signal, Instant>,
    captures: AtomicU64,
    stop_tx: watch::Sender<bool>,
    window: Mutex<Option<JoinHandle<()>>>,
    metrics: ProfilerMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl CollectionScheduler {
    pub fn builder() -> CollectionSchedulerBuilder {
        CollectionSchedulerBuilder::new()
    }

    /// Captures started since creation
    pub fn capture_count(&self) -> u64 {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn is_capturing(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Consume breaches until the channel closes or shutdown is signalled
    pub async fn run(
        self: Arc<Self>,
        mut breaches: mpsc::Receiver<AlertBreach>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Starting collection scheduler");
        if let Some(registry) = &self.health {
            registry.set_healthy(components::SCHEDULER).await;
        }

        loop {
            tokio::select! {
                breach = breaches.recv() => match breach {
                    Some(breach) => {
                        self.handle_breach(breach).await;
                    }
                    None => {
                        warn!("Breach channel closed, no further captures");
                        if let Some(registry) = &self.health {
                            registry
                                .set_unhealthy(components::SCHEDULER, "Breach channel closed")
                                .await;
                        }
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("Shutting down collection scheduler");
                    break;
                }
            }
        }

        self.stop_active().await;
    }

    /// Open a capture window for the breach unless policy forbids it
    pub async fn handle_breach(self: &Arc<Self>, breach: AlertBreach) -> BreachOutcome {
        if self.active.load(Ordering::SeqCst) {
            return self.discard(&breach, BreachOutcome::DiscardedActive);
        }

        if self.in_cooldown(&breach) {
            return self.discard(&breach, BreachOutcome::DiscardedCooldown);
        }

        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.discard(&breach, BreachOutcome::DiscardedActive);
        }

        let max_duration = breach.alert_configuration.profile_duration();
        let handle = match self.backend.start_capture(breach.signal, max_duration).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(signal = %breach.signal, error = %e, "Failed to start capture");
                self.logger.log_capture_failed(&breach, &e.to_string());
                self.set_capture_health(Some(e.to_string())).await;
                self.active.store(false, Ordering::SeqCst);
                return BreachOutcome::Failed;
            }
        };

        self.captures.fetch_add(1, Ordering::SeqCst);
        self.metrics.inc_captures(breach.signal);
        self.logger
            .log_capture_started(&breach, handle.id, max_duration.as_secs());

        let deadline = Instant::now() + max_duration;
        let scheduler = Arc::clone(self);
        let window = tokio::spawn(async move {
            scheduler.close_window(handle, breach, deadline).await;
        });
        *self.window.lock().unwrap_or_else(|e| e.into_inner()) = Some(window);

        BreachOutcome::Started
    }

    fn in_cooldown(&self, breach: &AlertBreach) -> bool {
        let cooldown = breach.alert_configuration.cooldown();
        self.last_capture_end
            .get(&breach.signal)
            .map(|ended| ended.elapsed() < cooldown)
            .unwrap_or(false)
    }

    fn discard(&self, breach: &AlertBreach, outcome: BreachOutcome) -> BreachOutcome {
        let reason = match outcome {
            BreachOutcome::DiscardedCooldown => "cooldown",
            _ => "capture_active",
        };
        self.metrics.inc_breaches_discarded(reason);
        self.logger.log_breach_discarded(breach, reason);
        outcome
    }

    async fn close_window(&self, handle: CaptureHandle, breach: AlertBreach, deadline: Instant) {
        let mut stop_rx = self.stop_tx.subscribe();
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = stop_rx.wait_for(|stop| *stop) => {
                info!(capture_id = handle.id, "Stopping capture early");
            }
        }

        let capture_id = handle.id;
        let signal = breach.signal;
        match self.backend.stop_capture(handle).await {
            Ok(recorded) => {
                let elapsed = (Utc::now() - recorded.started_at)
                    .to_std()
                    .unwrap_or_default();
                self.metrics.observe_capture_duration(elapsed.as_secs_f64());
                self.logger
                    .log_capture_finished(&breach, capture_id, recorded.size_bytes);

                let artifact = recorded.into_artifact(breach, Utc::now());
                self.sink.submit(artifact, self.completion_handler());
                self.set_capture_health(None).await;
            }
            Err(e) => {
                self.logger.log_capture_failed(&breach, &e.to_string());
                self.set_capture_health(Some(e.to_string())).await;
            }
        }

        self.last_capture_end.insert(signal, Instant::now());
        self.active.store(false, Ordering::SeqCst);
        debug!(capture_id, "Capture slot released");
    }

    fn completion_handler(&self) -> UploadCompleteHandler {
        match &self.listener {
            Some(listener) => {
                let listener = Arc::clone(listener);
                Box::new(move |result| listener(result))
            }
            None => Box::new(|result| {
                debug!(success = result.success, "Upload finished with no listener");
            }),
        }
    }

    async fn set_capture_health(&self, error: Option<String>) {
        let Some(registry) = &self.health else {
            return;
        };
        match error {
            Some(message) => registry.set_degraded(components::CAPTURE, message).await,
            None => registry.set_healthy(components::CAPTURE).await,
        }
    }

    /// Close any open window now and wait for its hand-off
    pub async fn stop_active(&self) {
        self.stop_tx.send_replace(true);
        let window = self.window.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(window) = window {
            if let Err(e) = window.await {
                warn!(error = %e, "Capture window task failed");
            }
        }
    }
}

/// Builder for [`CollectionScheduler`]
pub struct CollectionSchedulerBuilder {
    backend: Option<Arc<dyn CaptureBackend>>,
    sink: Option<Arc<dyn ArtifactSink>>,
    listener: Option<CompletionListener>,
    health: Option<HealthRegistry>,
    service: String,
}

impl CollectionSchedulerBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            sink: None,
            listener: None,
            health: None,
            service: "profiler".to_string(),
        }
    }

    pub fn backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn completion_listener(mut self, listener: CompletionListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn build(self) -> Result<Arc<CollectionScheduler>> {
        let backend = self
            .backend
            .ok_or_else(|| anyhow::anyhow!("Capture backend is required"))?;
        let sink = self
            .sink
            .ok_or_else(|| anyhow::anyhow!("Artifact sink is required"))?;
        let (stop_tx, _) = watch::channel(false);

        Ok(Arc::new(CollectionScheduler {
            backend,
            sink,
            listener: self.listener,
            active: AtomicBool::new(false),
            last_capture_end: DashMap::new(),
            captures: AtomicU64::new(0),
            stop_tx,
            window: Mutex::new(None),
            metrics: ProfilerMetrics::new(),
            logger: StructuredLogger::new(self.service),
            health: self.health,
        }))
    }
}

impl Default for CollectionSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
