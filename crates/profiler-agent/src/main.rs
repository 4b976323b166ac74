//! Profiler agent - adaptive profiling trigger and upload pipeline
//!
//! Samples this host's process statistics, opens a capture window when an
//! alert fires and ships the recording to the ingestion endpoint.

use anyhow::Result;
use profiler_agent::{api, config};
use profiler_lib::{
    capture::{CommandCaptureBackend, CommandCaptureConfig},
    health::HealthRegistry,
    observability::{ProfilerMetrics, StructuredLogger},
    platform,
    sampler::SamplingLoopBuilder,
    stats::create_stats_readers,
    upload::{HttpUploadTransport, SharedAppId, UploadPipeline},
    AlertingConfigHandle, CollectionScheduler, UploadResult,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting profiler-agent");

    let config = config::AgentConfig::load()?;
    let alerting = config.alerting_configuration()?;
    let configuration = AlertingConfigHandle::new(alerting);

    let os = platform::current_platform();
    let logger = StructuredLogger::new(&config.service_name);
    logger.log_startup(AGENT_VERSION, os.map(|p| p.description()));

    let health_registry = HealthRegistry::new();
    health_registry.register_pipeline().await;
    let metrics = ProfilerMetrics::new();

    // Uploads
    let app_id = SharedAppId::new();
    match &config.app_id {
        Some(id) => app_id.set(id.clone()),
        None => warn!("No app id configured, captures will not be uploaded"),
    }
    let transport = HttpUploadTransport::builder()
        .endpoint(&config.ingestion_endpoint)
        .max_retries(config.upload_max_retries)
        .request_timeout(config.upload_timeout())
        .platform(os.map(|p| p.description()))
        .build()?;
    let pipeline = Arc::new(
        UploadPipeline::new(Arc::new(transport), Arc::new(app_id))
            .with_health(health_registry.clone())
            .with_service(&config.service_name),
    );

    // Captures
    tokio::fs::create_dir_all(&config.capture_dir).await?;
    let backend = CommandCaptureBackend::new(CommandCaptureConfig::new(
        &config.capture_program,
        config.capture_args(),
        &config.capture_dir,
    ));
    let scheduler = CollectionScheduler::builder()
        .backend(Arc::new(backend))
        .sink(pipeline.clone())
        .completion_listener(Arc::new(|result: UploadResult| {
            info!(
                stamp_id = result.stamp_id.as_deref().unwrap_or(""),
                bytes = result.uploaded_bytes,
                "Profile available"
            );
        }))
        .health(health_registry.clone())
        .service(&config.service_name)
        .build()?;

    // Sampling
    let (sampling_loop, breaches) = SamplingLoopBuilder::new()
        .readers(create_stats_readers(os, &config.proc_root))
        .configuration(configuration.clone())
        .interval(config.sampling_interval())
        .buffer_size(config.breach_buffer)
        .health(health_registry.clone())
        .service(&config.service_name)
        .build()?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let app_state = Arc::new(
        api::AppState::new(health_registry.clone(), metrics, configuration)
            .with_scheduler(scheduler.clone())
            .with_pipeline(pipeline.clone()),
    );

    let sampler_handle = tokio::spawn(sampling_loop.run(shutdown_tx.subscribe()));
    let scheduler_handle = tokio::spawn(scheduler.run(breaches, shutdown_tx.subscribe()));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    let _ = sampler_handle.await;
    let _ = scheduler_handle.await;
    let abandoned = pipeline.shutdown(config.shutdown_timeout()).await;
    if abandoned > 0 {
        warn!(
            abandoned = abandoned,
            "Shut down with uploads still in flight"
        );
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server stopped with error"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
