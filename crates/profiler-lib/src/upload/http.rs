//! HTTP upload transport for the profile ingestion endpoint
//!
//! Each artifact is POSTed as an octet stream to
//! `{endpoint}/api/profiles/{app_id}/artifacts/{artifact_id}` with its
//! metadata in the query string and a SHA-256 digest header. Transient
//! failures are retried with exponential backoff.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use super::transport::{UploadRequest, UploadTransport};
use crate::error::UploadError;
use crate::models::UploadResult;

/// Header carrying the hex SHA-256 of the body
pub const DIGEST_HEADER: &str = "x-content-sha256";

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Ingestion endpoint base URL
    pub endpoint: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Total attempts per artifact, first one included
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Cap on the delay between retries
    pub max_backoff: Duration,
    /// Platform label sent with each artifact
    pub platform: Option<String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            platform: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IngestionResponse {
    #[serde(rename = "stampId")]
    stamp_id: Option<String>,
}

pub struct HttpUploadTransport {
    client: Client,
    base_url: Url,
    config: HttpTransportConfig,
}

impl HttpUploadTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(&config.endpoint).context("Invalid ingestion endpoint URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!(
                "Ingestion endpoint `{}` cannot carry a path",
                config.endpoint
            );
        }

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn builder() -> HttpUploadTransportBuilder {
        HttpUploadTransportBuilder::new()
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn artifact_url(&self, request: &UploadRequest) -> Result<Url, UploadError> {
        let mut url = self.base_url.clone();
        {
            // Each segment is percent-encoded, so ids cannot alter the path
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments
                .pop_if_empty()
                .extend(["api", "profiles", request.app_id.as_str(), "artifacts"])
                .push(&request.artifact_id.to_string());
        }

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("label", &request.label)
                .append_pair("timestamp", &request.timestamp.to_rfc3339())
                .append_pair("cpu", &request.cpu_metric.to_string())
                .append_pair("memory", &request.memory_usage.to_string());
            if let Some(platform) = &self.config.platform {
                query.append_pair("os", platform);
            }
        }

        Ok(url)
    }

    async fn send_once(
        &self,
        url: Url,
        body: Vec<u8>,
        digest: &str,
    ) -> Result<Option<String>, UploadError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(DIGEST_HEADER, digest)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str::<IngestionResponse>(&text)
            .ok()
            .and_then(|r| r.stamp_id))
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn upload(&self, request: UploadRequest) -> Result<UploadResult, UploadError> {
        let url = self.artifact_url(&request)?;
        let body = tokio::fs::read(&request.file).await?;
        let digest = hex::encode(Sha256::digest(&body));
        let size = body.len() as u64;

        let max_attempts = self.config.max_retries.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.send_once(url.clone(), body.clone(), &digest).await {
                Ok(stamp_id) => {
                    debug!(
                        artifact_id = %request.artifact_id,
                        attempt = attempt,
                        bytes = size,
                        "Artifact accepted"
                    );
                    return Ok(UploadResult::succeeded(stamp_id, size));
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(UploadError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        artifact_id = %request.artifact_id,
                        error = %e,
                        attempt = attempt,
                        next_backoff_ms = backoff.as_millis() as u64,
                        "Upload attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, self.config.max_backoff);
                }
            }
        }
    }
}

/// Builder for [`HttpUploadTransport`]
pub struct HttpUploadTransportBuilder {
    config: HttpTransportConfig,
    endpoint: Option<String>,
}

impl HttpUploadTransportBuilder {
    pub fn new() -> Self {
        Self {
            config: HttpTransportConfig::default(),
            endpoint: None,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.config.initial_backoff = backoff;
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.config.max_backoff = backoff;
        self
    }

    pub fn platform(mut self, platform: Option<impl Into<String>>) -> Self {
        self.config.platform = platform.map(Into::into);
        self
    }

    pub fn build(self) -> Result<HttpUploadTransport> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| anyhow::anyhow!("endpoint is required"))?;
        HttpUploadTransport::new(HttpTransportConfig {
            endpoint,
            ..self.config
        })
    }
}

impl Default for HttpUploadTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
