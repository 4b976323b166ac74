//! Transport seam between the pipeline and the ingestion endpoint

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::UploadError;
use crate::models::UploadResult;

/// Everything the transport needs to ship one artifact
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub artifact_id: Uuid,
    pub app_id: String,
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub file: PathBuf,
    pub cpu_metric: f64,
    pub memory_usage: f64,
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Ship the file; retries are the transport's own business
    async fn upload(&self, request: UploadRequest) -> Result<UploadResult, UploadError>;
}
