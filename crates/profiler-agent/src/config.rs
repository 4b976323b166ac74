//! Agent configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use profiler_lib::config::{
    AlertConfiguration, AlertingConfiguration, CollectionPlanConfiguration, DefaultConfiguration,
    EngineMode,
};
use profiler_lib::Signal;
use serde::Deserialize;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Service name attached to structured log events
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Root of the procfs mount the stats readers use
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,

    /// Sampling cadence in seconds
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval_secs: u64,

    /// Breaches buffered between sampler and scheduler
    #[serde(default = "default_breach_buffer")]
    pub breach_buffer: usize,

    #[serde(default)]
    pub cpu_alert_enabled: bool,
    #[serde(default = "default_threshold")]
    pub cpu_threshold: f64,
    #[serde(default = "default_profile_duration")]
    pub cpu_profile_duration_secs: u64,
    #[serde(default = "default_cooldown")]
    pub cpu_cooldown_secs: u64,

    #[serde(default)]
    pub memory_alert_enabled: bool,
    #[serde(default = "default_threshold")]
    pub memory_threshold: f64,
    #[serde(default = "default_profile_duration")]
    pub memory_profile_duration_secs: u64,
    #[serde(default = "default_cooldown")]
    pub memory_cooldown_secs: u64,

    /// Periodic default collection
    #[serde(default)]
    pub periodic_enabled: bool,
    #[serde(default = "default_periodic_interval")]
    pub periodic_interval_secs: u64,
    #[serde(default = "default_profile_duration")]
    pub periodic_profile_duration_secs: u64,

    /// Immediate collection plan; disabled unless a moniker is set
    #[serde(default)]
    pub plan_moniker: Option<String>,
    /// RFC 3339 expiration of the plan
    #[serde(default)]
    pub plan_expiration: Option<String>,
    #[serde(default = "default_profile_duration")]
    pub plan_duration_secs: u64,

    /// Profile ingestion endpoint
    #[serde(default = "default_ingestion_endpoint")]
    pub ingestion_endpoint: String,

    /// Application id; uploads are skipped until one is known
    #[serde(default)]
    pub app_id: Option<String>,

    #[serde(default = "default_upload_retries")]
    pub upload_max_retries: u32,
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,

    /// Profiler command; `{pid}`, `{output}` and `{duration}` are expanded
    #[serde(default = "default_capture_program")]
    pub capture_program: String,
    /// Whitespace-separated argument template
    #[serde(default = "default_capture_args")]
    pub capture_args: String,
    #[serde(default = "default_capture_dir")]
    pub capture_dir: PathBuf,

    /// How long shutdown waits for in-flight uploads
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_service_name() -> String {
    "profiler-agent".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_sampling_interval() -> u64 {
    5
}

fn default_breach_buffer() -> usize {
    16
}

fn default_threshold() -> f64 {
    80.0
}

fn default_profile_duration() -> u64 {
    120
}

fn default_cooldown() -> u64 {
    300
}

fn default_periodic_interval() -> u64 {
    3600
}

fn default_ingestion_endpoint() -> String {
    "http://localhost:9090".to_string()
}

fn default_upload_retries() -> u32 {
    3
}

fn default_upload_timeout() -> u64 {
    60
}

fn default_capture_program() -> String {
    "perf".to_string()
}

fn default_capture_args() -> String {
    "record -g -p {pid} -o {output} -- sleep {duration}".to_string()
}

fn default_capture_dir() -> PathBuf {
    std::env::temp_dir().join("profiler-agent")
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl AgentConfig {
    /// Load configuration from `PROFILER_*` environment variables
    pub fn load() -> Result<Self> {
        let env = config::Environment::with_prefix("PROFILER")
            .try_parsing(true);
        Self::from_source(env)
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder().add_source(source).build()?;
        config
            .try_deserialize()
            .context("Invalid profiler agent configuration")
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn capture_args(&self) -> Vec<String> {
        self.capture_args
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Build the validated alerting snapshot these settings describe
    pub fn alerting_configuration(&self) -> Result<AlertingConfiguration> {
        let cpu = AlertConfiguration::builder(Signal::Cpu)
            .enabled(self.cpu_alert_enabled)
            .threshold(self.cpu_threshold)
            .profile_duration(Duration::from_secs(self.cpu_profile_duration_secs))
            .cooldown(Duration::from_secs(self.cpu_cooldown_secs))
            .build()?;

        let memory = AlertConfiguration::builder(Signal::Memory)
            .enabled(self.memory_alert_enabled)
            .threshold(self.memory_threshold)
            .profile_duration(Duration::from_secs(self.memory_profile_duration_secs))
            .cooldown(Duration::from_secs(self.memory_cooldown_secs))
            .build()?;

        let periodic = DefaultConfiguration::new(
            self.periodic_enabled,
            Duration::from_secs(self.periodic_interval_secs),
            Duration::from_secs(self.periodic_profile_duration_secs),
        )?;

        let mut builder = AlertingConfiguration::builder()
            .cpu_alert(cpu)
            .memory_alert(memory)
            .default_configuration(periodic);

        if let Some(moniker) = &self.plan_moniker {
            let expiration = match &self.plan_expiration {
                Some(raw) => DateTime::parse_from_rfc3339(raw)
                    .with_context(|| format!("Invalid plan expiration `{raw}`"))?
                    .with_timezone(&Utc),
                None => anyhow::bail!("plan_expiration is required with plan_moniker"),
            };
            builder = builder.collection_plan(CollectionPlanConfiguration::new(
                true,
                EngineMode::Immediate,
                expiration,
                Duration::from_secs(self.plan_duration_secs),
                moniker.clone(),
            )?);
        }

        Ok(builder.build()?)
    }
}
