//! Observability infrastructure for the profiler
//!
//! Provides:
//! - Prometheus metrics (samples, breaches, captures, uploads and their latencies)
//! - Structured JSON logging of pipeline events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::error::UploadErrorKind;
use crate::models::{AlertBreach, Signal};

/// Buckets for capture windows, which run from seconds to minutes
const CAPTURE_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Buckets for artifact uploads
const UPLOAD_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ProfilerMetricsInner> = OnceLock::new();

struct ProfilerMetricsInner {
    samples: IntCounter,
    sampling_errors: IntCounterVec,
    breaches: IntCounterVec,
    breaches_discarded: IntCounterVec,
    captures: IntCounterVec,
    uploads_succeeded: IntCounter,
    uploads_failed: IntCounterVec,
    capture_duration_seconds: Histogram,
    upload_latency_seconds: Histogram,
}

impl ProfilerMetricsInner {
    fn new() -> Self {
        Self {
            samples: register_int_counter!(
                "profiler_samples_total",
                "Metric samples read from stats readers"
            )
            .expect("Failed to register samples_total"),

            sampling_errors: register_int_counter_vec!(
                "profiler_sampling_errors_total",
                "Stats reader updates that failed",
                &["reader"]
            )
            .expect("Failed to register sampling_errors_total"),

            breaches: register_int_counter_vec!(
                "profiler_breaches_total",
                "Alert breaches emitted by the evaluator",
                &["signal"]
            )
            .expect("Failed to register breaches_total"),

            breaches_discarded: register_int_counter_vec!(
                "profiler_breaches_discarded_total",
                "Breaches dropped by the scheduler",
                &["reason"]
            )
            .expect("Failed to register breaches_discarded_total"),

            captures: register_int_counter_vec!(
                "profiler_captures_total",
                "Capture windows started",
                &["signal"]
            )
            .expect("Failed to register captures_total"),

            uploads_succeeded: register_int_counter!(
                "profiler_uploads_succeeded_total",
                "Artifacts accepted by the ingestion endpoint"
            )
            .expect("Failed to register uploads_succeeded_total"),

            uploads_failed: register_int_counter_vec!(
                "profiler_uploads_failed_total",
                "Uploads that ended without success",
                &["kind"]
            )
            .expect("Failed to register uploads_failed_total"),

            capture_duration_seconds: register_histogram!(
                "profiler_capture_duration_seconds",
                "Wall time of completed capture windows",
                CAPTURE_BUCKETS.to_vec()
            )
            .expect("Failed to register capture_duration_seconds"),

            upload_latency_seconds: register_histogram!(
                "profiler_upload_latency_seconds",
                "Time from upload start to terminal outcome",
                UPLOAD_BUCKETS.to_vec()
            )
            .expect("Failed to register upload_latency_seconds"),
        }
    }
}

/// Profiler metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct ProfilerMetrics {
    _private: (),
}

impl Default for ProfilerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfilerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ProfilerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ProfilerMetricsInner {
        GLOBAL_METRICS.get_or_init(ProfilerMetricsInner::new)
    }

    pub fn inc_samples(&self, count: usize) {
        self.inner().samples.inc_by(count as u64);
    }

    pub fn inc_sampling_errors(&self, reader: &str) {
        self.inner()
            .sampling_errors
            .with_label_values(&[reader])
            .inc();
    }

    pub fn inc_breaches(&self, signal: Signal) {
        self.inner()
            .breaches
            .with_label_values(&[signal.as_str()])
            .inc();
    }

    pub fn inc_breaches_discarded(&self, reason: &str) {
        self.inner()
            .breaches_discarded
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_captures(&self, signal: Signal) {
        self.inner()
            .captures
            .with_label_values(&[signal.as_str()])
            .inc();
    }

    pub fn observe_capture_duration(&self, duration_secs: f64) {
        self.inner().capture_duration_seconds.observe(duration_secs);
    }

    pub fn inc_uploads_succeeded(&self) {
        self.inner().uploads_succeeded.inc();
    }

    pub fn inc_uploads_failed(&self, kind: UploadErrorKind) {
        self.inner()
            .uploads_failed
            .with_label_values(&[&kind.to_string()])
            .inc();
    }

    pub fn observe_upload_latency(&self, duration_secs: f64) {
        self.inner().upload_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for pipeline events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_breach(&self, breach: &AlertBreach) {
        info!(
            event = "breach_emitted",
            service = %self.service,
            signal = %breach.signal,
            profile_id = %breach.profile_id,
            alert_value = breach.alert_value,
            cpu_metric = breach.cpu_metric,
            memory_usage = breach.memory_usage,
            "Alert breach emitted"
        );
    }

    pub fn log_breach_discarded(&self, breach: &AlertBreach, reason: &str) {
        tracing::debug!(
            event = "breach_discarded",
            service = %self.service,
            signal = %breach.signal,
            profile_id = %breach.profile_id,
            reason = %reason,
            "Breach discarded"
        );
    }

    pub fn log_capture_started(
        &self,
        breach: &AlertBreach,
        capture_id: u64,
        max_duration_secs: u64,
    ) {
        info!(
            event = "capture_started",
            service = %self.service,
            signal = %breach.signal,
            profile_id = %breach.profile_id,
            capture_id = capture_id,
            max_duration_secs = max_duration_secs,
            "Profile capture started"
        );
    }

    pub fn log_capture_finished(&self, breach: &AlertBreach, capture_id: u64, size_bytes: u64) {
        info!(
            event = "capture_finished",
            service = %self.service,
            signal = %breach.signal,
            profile_id = %breach.profile_id,
            capture_id = capture_id,
            size_bytes = size_bytes,
            "Profile capture finished"
        );
    }

    pub fn log_capture_failed(&self, breach: &AlertBreach, reason: &str) {
        warn!(
            event = "capture_failed",
            service = %self.service,
            signal = %breach.signal,
            profile_id = %breach.profile_id,
            reason = %reason,
            "Profile capture produced no artifact"
        );
    }

    pub fn log_upload_complete(&self, breach: &AlertBreach, stamp_id: Option<&str>, bytes: u64) {
        info!(
            event = "upload_complete",
            service = %self.service,
            signal = %breach.signal,
            profile_id = %breach.profile_id,
            stamp_id = ?stamp_id,
            uploaded_bytes = bytes,
            "Uploading of profile complete"
        );
    }

    pub fn log_upload_failed(&self, breach: &AlertBreach, kind: UploadErrorKind, reason: &str) {
        error!(
            event = "upload_failed",
            service = %self.service,
            signal = %breach.signal,
            profile_id = %breach.profile_id,
            kind = %kind,
            reason = %reason,
            "Failed to upload profile"
        );
    }

    pub fn log_startup(&self, version: &str, platform: Option<&str>) {
        info!(
            event = "profiler_started",
            service = %self.service,
            version = %version,
            platform = ?platform,
            "Profiler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "profiler_shutdown",
            service = %self.service,
            reason = %reason,
            "Profiler shutting down"
        );
    }
}
