//! Fixed-cadence sampling loop
//!
//! Owns the stats readers and the alert evaluator. Every tick it refreshes
//! each reader once, runs the samples through the evaluator and forwards
//! breaches to the collection scheduler over a bounded channel, so capture
//! I/O never runs inline with sampling.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alerting::AlertEvaluator;
use crate::clock::{Clock, SystemClock};
use crate::config::AlertingConfigHandle;
use crate::health::{components, FailureStreak, HealthRegistry};
use crate::models::{AlertBreach, MetricSample};
use crate::observability::{ProfilerMetrics, StructuredLogger};
use crate::stats::StatsReader;

/// Configuration for the sampling loop
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    /// Time between sampling cycles (default: 5 seconds)
    pub interval: Duration,
    /// Capacity of the breach channel to the scheduler
    pub buffer_size: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            buffer_size: 16,
        }
    }
}

/// Outcome of one sampling cycle
#[derive(Debug, Default)]
pub struct CycleResults {
    pub samples: usize,
    pub errors: usize,
    pub breaches: usize,
    pub dropped: usize,
}

pub struct SamplingLoop {
    readers: Vec<Box<dyn StatsReader>>,
    evaluator: AlertEvaluator,
    clock: Arc<dyn Clock>,
    config: SamplingConfig,
    breach_tx: mpsc::Sender<AlertBreach>,
    metrics: ProfilerMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    streak: FailureStreak,
}

impl SamplingLoop {
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            readers = self.readers.len(),
            "Starting sampling loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle_count = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let results = self.sample_once().await;
                    cycle_count += 1;

                    if cycle_count % 12 == 0 {
                        debug!(
                            samples = results.samples,
                            errors = results.errors,
                            breaches = results.breaches,
                            elapsed_ms = start.elapsed().as_millis(),
                            "Sampling cycle complete"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down sampling loop");
                    break;
                }
            }
        }
    }

    /// Refresh every reader once and evaluate the samples
    pub async fn sample_once(&mut self) -> CycleResults {
        let mut results = CycleResults::default();
        let now = self.clock.now();
        let mut samples: Vec<MetricSample> = Vec::new();
        let mut last_error = None;

        for reader in self.readers.iter_mut() {
            match reader.update().await {
                Ok(()) => samples.extend(reader.samples(now)),
                Err(e) => {
                    results.errors += 1;
                    self.metrics.inc_sampling_errors(reader.name());
                    warn!(reader = reader.name(), error = %e, "Failed to read stats");
                    last_error = Some(e.to_string());
                }
            }
        }

        results.samples = samples.len();
        self.metrics.inc_samples(samples.len());
        self.report_health(last_error).await;

        for breach in self.evaluator.evaluate_cycle(&samples) {
            results.breaches += 1;
            self.metrics.inc_breaches(breach.signal);
            self.logger.log_breach(&breach);

            match self.breach_tx.try_send(breach) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(breach)) => {
                    results.dropped += 1;
                    self.metrics.inc_breaches_discarded("channel_full");
                    warn!(signal = %breach.signal, "Breach channel full, dropping breach");
                }
                Err(mpsc::error::TrySendError::Closed(breach)) => {
                    results.dropped += 1;
                    warn!(signal = %breach.signal, "Scheduler is gone, dropping breach");
                }
            }
        }

        results
    }

    async fn report_health(&mut self, last_error: Option<String>) {
        let transition = match last_error {
            Some(message) => self.streak.failure(message),
            None => self.streak.success(),
        };
        if let (Some(health), Some(registry)) = (transition, &self.health) {
            registry.update(components::SAMPLER, health).await;
        }
    }
}

/// Builder for creating the sampling loop
pub struct SamplingLoopBuilder {
    readers: Vec<Box<dyn StatsReader>>,
    config_handle: Option<AlertingConfigHandle>,
    clock: Arc<dyn Clock>,
    config: SamplingConfig,
    health: Option<HealthRegistry>,
    service: String,
}

impl SamplingLoopBuilder {
    pub fn new() -> Self {
        Self {
            readers: Vec::new(),
            config_handle: None,
            clock: Arc::new(SystemClock),
            config: SamplingConfig::default(),
            health: None,
            service: "profiler".to_string(),
        }
    }

    pub fn reader(mut self, reader: Box<dyn StatsReader>) -> Self {
        self.readers.push(reader);
        self
    }

    pub fn readers(mut self, readers: Vec<Box<dyn StatsReader>>) -> Self {
        self.readers.extend(readers);
        self
    }

    /// Set the shared alerting configuration
    pub fn configuration(mut self, handle: AlertingConfigHandle) -> Self {
        self.config_handle = Some(handle);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
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

    pub fn build(self) -> Result<(SamplingLoop, mpsc::Receiver<AlertBreach>)> {
        let handle = self
            .config_handle
            .ok_or_else(|| anyhow::anyhow!("Alerting configuration is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Sampling interval must be greater than zero");
        }
        if self.config.buffer_size == 0 {
            anyhow::bail!("Breach buffer size must be greater than zero");
        }

        let (breach_tx, breach_rx) = mpsc::channel(self.config.buffer_size);
        let evaluator = AlertEvaluator::new(handle, Arc::clone(&self.clock));

        let sampling_loop = SamplingLoop {
            readers: self.readers,
            evaluator,
            clock: self.clock,
            config: self.config,
            breach_tx,
            metrics: ProfilerMetrics::new(),
            logger: StructuredLogger::new(self.service),
            health: self.health,
            streak: FailureStreak::new(),
        };

        Ok((sampling_loop, breach_rx))
    }
}

impl Default for SamplingLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
