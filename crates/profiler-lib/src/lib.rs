//! Adaptive profiling library
//!
//! This crate provides the core functionality for:
//! - Sampling process CPU, memory and TCP queue statistics
//! - Evaluating samples against alert thresholds and schedules
//! - Running a single capture window per breach
//! - Uploading finished captures to the ingestion endpoint
//! - Health checks and observability

pub mod alerting;
pub mod capture;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod platform;
pub mod sampler;
pub mod scheduler;
pub mod stats;
pub mod upload;

pub use alerting::AlertEvaluator;
pub use config::{AlertConfiguration, AlertingConfigHandle, AlertingConfiguration};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ProfilerMetrics, StructuredLogger};
pub use platform::OsPlatform;
pub use scheduler::{ArtifactSink, CollectionScheduler};
pub use upload::UploadPipeline;
