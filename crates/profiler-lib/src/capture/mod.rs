//! Profile capture backends
//!
//! A backend records a profile of the host process for a bounded window.
//! The scheduler decides when windows open and close; the backend only
//! starts and stops recordings and reports where the output landed.

mod command;

pub use command::{CommandCaptureBackend, CommandCaptureConfig};

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CaptureError;
use crate::models::{AlertBreach, CaptureArtifact, Signal};

/// A recording in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHandle {
    pub id: u64,
    pub signal: Signal,
    /// Where the backend writes the recording
    pub output: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// A finished, complete recording not yet tied to a breach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCapture {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub started_at: DateTime<Utc>,
}

impl RecordedCapture {
    pub fn into_artifact(self, breach: AlertBreach, finished_at: DateTime<Utc>) -> CaptureArtifact {
        CaptureArtifact::new(
            self.path,
            self.size_bytes,
            self.started_at,
            finished_at,
            breach,
        )
    }
}

#[async_trait]
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begin recording; the recording must not outlive `max_duration`
    async fn start_capture(
        &self,
        signal: Signal,
        max_duration: Duration,
    ) -> Result<CaptureHandle, CaptureError>;

    /// End a recording. Fails with [`CaptureError::Incomplete`] when the
    /// output cannot be trusted, in which case it has been discarded.
    async fn stop_capture(&self, handle: CaptureHandle) -> Result<RecordedCapture, CaptureError>;
}
