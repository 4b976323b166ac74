//! Core data models for the profiling trigger pipeline

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::config::AlertConfiguration;
use crate::error::UploadErrorKind;

/// Prefix of the label attached to uploaded artifacts
const LABEL_PREFIX: &str = "PROFILE";

/// Source of a breach. The first four are sampled resource metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Cpu,
    Memory,
    TcpRx,
    TcpTx,
    /// Operator-issued collection plan
    Manual,
    /// Periodic default collection
    Periodic,
    /// Request-level alerts, carried in configuration only
    Request,
}

impl Signal {
    /// Signals produced by stats readers
    pub const SAMPLED: [Signal; 4] = [Signal::Cpu, Signal::Memory, Signal::TcpRx, Signal::TcpTx];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Cpu => "CPU",
            Signal::Memory => "MEMORY",
            Signal::TcpRx => "TCP_RX",
            Signal::TcpTx => "TCP_TX",
            Signal::Manual => "MANUAL",
            Signal::Periodic => "PERIODIC",
            Signal::Request => "REQUEST",
        }
    }

    pub fn is_sampled(&self) -> bool {
        Self::SAMPLED.contains(self)
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time value read from a stats reader
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub signal: Signal,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(signal: Signal, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            signal,
            value,
            timestamp,
        }
    }
}

/// A detection event that should result in a capture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertBreach {
    pub signal: Signal,
    pub profile_id: Uuid,
    /// Value that crossed the threshold (0 for manual and periodic breaches)
    pub alert_value: f64,
    pub cpu_metric: f64,
    pub memory_usage: f64,
    pub timestamp: DateTime<Utc>,
    /// Configuration that fired, gives the capture duration and cooldown
    pub alert_configuration: AlertConfiguration,
}

impl AlertBreach {
    pub fn new(
        alert_configuration: AlertConfiguration,
        alert_value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            signal: alert_configuration.signal(),
            profile_id: Uuid::new_v4(),
            alert_value,
            cpu_metric: 0.0,
            memory_usage: 0.0,
            timestamp,
            alert_configuration,
        }
    }

    pub fn with_cpu_metric(mut self, cpu_metric: f64) -> Self {
        self.cpu_metric = cpu_metric;
        self
    }

    pub fn with_memory_usage(mut self, memory_usage: f64) -> Self {
        self.memory_usage = memory_usage;
        self
    }

    /// Label attached to the uploaded artifact, e.g. `PROFILE-CPU`
    pub fn label(&self) -> String {
        format!("{}-{}", LABEL_PREFIX, self.signal)
    }
}

/// Output of a finished capture window, owned by whoever holds it
#[derive(Debug)]
pub struct CaptureArtifact {
    path: PathBuf,
    pub size_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub breach: AlertBreach,
}

impl CaptureArtifact {
    pub fn new(
        path: PathBuf,
        size_bytes: u64,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        breach: AlertBreach,
    ) -> Self {
        Self {
            path,
            size_bytes,
            started_at,
            finished_at,
            breach,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the backing file. Consumes the artifact.
    pub async fn dispose(self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to delete capture artifact"
                );
            }
        }
    }
}

/// Terminal outcome of an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<UploadErrorKind>,
    /// Identifier assigned by the ingestion endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stamp_id: Option<String>,
    pub uploaded_bytes: u64,
}

impl UploadResult {
    pub fn succeeded(stamp_id: Option<String>, uploaded_bytes: u64) -> Self {
        Self {
            success: true,
            error_kind: None,
            stamp_id,
            uploaded_bytes,
        }
    }

    pub fn failed(kind: UploadErrorKind) -> Self {
        Self {
            success: false,
            error_kind: Some(kind),
            stamp_id: None,
            uploaded_bytes: 0,
        }
    }
}
