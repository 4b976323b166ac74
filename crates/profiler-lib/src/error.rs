//! Error types for the profiling trigger pipeline

use std::path::PathBuf;

use thiserror::Error;

use crate::models::Signal;

/// Raised while building an alerting configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{signal} alert is enabled but has no threshold")]
    MissingThreshold { signal: Signal },

    #[error("{signal} alert threshold {threshold} must be a finite, non-negative number")]
    InvalidThreshold { signal: Signal, threshold: f64 },

    #[error("{signal} alert is enabled but has a zero profile duration")]
    ZeroProfileDuration { signal: Signal },

    #[error("expected a {expected} alert configuration, got {found}")]
    SignalMismatch { expected: Signal, found: Signal },

    #[error("immediate collection plan has no settings moniker")]
    MissingSettingsMoniker,

    #[error("periodic sampling is enabled with a zero interval")]
    ZeroSamplingInterval,
}

/// Raised by a stats reader when the OS state could not be read at all
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl StatsError {
    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        StatsError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Raised by a capture backend
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to launch capture command `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("capture {id} is not known to this backend")]
    UnknownCapture { id: u64 },

    #[error("capture {id} was stopped before it completed, output discarded")]
    Incomplete { id: u64 },

    #[error("capture {id} exited with {status}")]
    CommandFailed { id: u64, status: String },

    #[error("capture {id} produced no output at {path}")]
    MissingOutput { id: u64, path: PathBuf },

    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raised while transmitting an artifact
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid ingestion endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("failed to read artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("ingestion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upload failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<UploadError>,
    },
}

impl UploadError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            UploadError::Status { status, .. } => *status == 429 || *status >= 500,
            UploadError::InvalidEndpoint(_)
            | UploadError::Io(_)
            | UploadError::RetriesExhausted { .. } => false,
        }
    }

    /// Coarse classification used in upload results and logs
    pub fn kind(&self) -> UploadErrorKind {
        match self {
            UploadError::InvalidEndpoint(_) | UploadError::Io(_) => UploadErrorKind::Local,
            UploadError::Request(_) => UploadErrorKind::Network,
            UploadError::Status { .. } => UploadErrorKind::Rejected,
            UploadError::RetriesExhausted { .. } => UploadErrorKind::RetriesExhausted,
        }
    }
}

/// Classification of a failed upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadErrorKind {
    MissingAppId,
    Local,
    Network,
    Rejected,
    RetriesExhausted,
}

impl std::fmt::Display for UploadErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UploadErrorKind::MissingAppId => "missing_app_id",
            UploadErrorKind::Local => "local",
            UploadErrorKind::Network => "network",
            UploadErrorKind::Rejected => "rejected",
            UploadErrorKind::RetriesExhausted => "retries_exhausted",
        };
        f.write_str(s)
    }
}
