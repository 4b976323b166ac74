//! Immutable alerting configuration snapshots
//!
//! Every type here is validated when built and never mutated afterwards.
//! A configuration change is a new snapshot swapped in through
//! [`super::AlertingConfigHandle`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::Signal;

/// Default interval between periodic default collections (1 hour)
pub const DEFAULT_SAMPLING_INTERVAL_SECS: u64 = 60 * 60;

/// Default duration of a periodic default collection
pub const DEFAULT_SAMPLING_PROFILE_DURATION_SECS: u64 = 120;

/// Thresholds and capture window for one signal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertConfiguration {
    signal: Signal,
    enabled: bool,
    threshold: f64,
    profile_duration_secs: u64,
    cooldown_secs: u64,
}

impl AlertConfiguration {
    pub fn builder(signal: Signal) -> AlertConfigurationBuilder {
        AlertConfigurationBuilder::new(signal)
    }

    /// A disabled alert for the given signal
    pub fn disabled(signal: Signal) -> Self {
        Self {
            signal,
            enabled: false,
            threshold: 0.0,
            profile_duration_secs: 0,
            cooldown_secs: 0,
        }
    }

    /// Configuration carried by breaches raised from a collection plan
    pub fn manual(profile_duration: Duration) -> Self {
        Self {
            signal: Signal::Manual,
            enabled: true,
            threshold: 0.0,
            profile_duration_secs: profile_duration.as_secs(),
            cooldown_secs: 0,
        }
    }

    /// Configuration carried by periodic default collection breaches
    pub fn periodic(profile_duration: Duration) -> Self {
        Self {
            signal: Signal::Periodic,
            enabled: true,
            threshold: 0.0,
            profile_duration_secs: profile_duration.as_secs(),
            cooldown_secs: 0,
        }
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn profile_duration(&self) -> Duration {
        Duration::from_secs(self.profile_duration_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Builder for [`AlertConfiguration`]
#[derive(Debug, Clone)]
pub struct AlertConfigurationBuilder {
    signal: Signal,
    enabled: bool,
    threshold: Option<f64>,
    profile_duration: Duration,
    cooldown: Duration,
}

impl AlertConfigurationBuilder {
    fn new(signal: Signal) -> Self {
        Self {
            signal,
            enabled: false,
            threshold: None,
            profile_duration: Duration::ZERO,
            cooldown: Duration::ZERO,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn profile_duration(mut self, duration: Duration) -> Self {
        self.profile_duration = duration;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn build(self) -> Result<AlertConfiguration, ConfigError> {
        let threshold = match (self.threshold, self.enabled) {
            (Some(t), _) => t,
            (None, true) => {
                return Err(ConfigError::MissingThreshold {
                    signal: self.signal,
                })
            }
            (None, false) => 0.0,
        };

        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold {
                signal: self.signal,
                threshold,
            });
        }

        if self.enabled && self.profile_duration.as_secs() == 0 {
            return Err(ConfigError::ZeroProfileDuration {
                signal: self.signal,
            });
        }

        Ok(AlertConfiguration {
            signal: self.signal,
            enabled: self.enabled,
            threshold,
            profile_duration_secs: self.profile_duration.as_secs(),
            cooldown_secs: self.cooldown.as_secs(),
        })
    }
}

/// Periodic "default" collection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultConfiguration {
    sampling_enabled: bool,
    sampling_interval_secs: u64,
    sampling_profile_duration_secs: u64,
}

impl DefaultConfiguration {
    pub fn new(
        sampling_enabled: bool,
        sampling_interval: Duration,
        sampling_profile_duration: Duration,
    ) -> Result<Self, ConfigError> {
        if sampling_enabled && sampling_interval.as_secs() == 0 {
            return Err(ConfigError::ZeroSamplingInterval);
        }
        if sampling_enabled && sampling_profile_duration.as_secs() == 0 {
            return Err(ConfigError::ZeroProfileDuration {
                signal: Signal::Periodic,
            });
        }

        Ok(Self {
            sampling_enabled,
            sampling_interval_secs: sampling_interval.as_secs(),
            sampling_profile_duration_secs: sampling_profile_duration.as_secs(),
        })
    }

    pub fn is_sampling_enabled(&self) -> bool {
        self.sampling_enabled
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs)
    }

    pub fn sampling_profile_duration(&self) -> Duration {
        Duration::from_secs(self.sampling_profile_duration_secs)
    }
}

impl Default for DefaultConfiguration {
    fn default() -> Self {
        Self {
            sampling_enabled: false,
            sampling_interval_secs: DEFAULT_SAMPLING_INTERVAL_SECS,
            sampling_profile_duration_secs: DEFAULT_SAMPLING_PROFILE_DURATION_SECS,
        }
    }
}

/// Collection plan engine mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Immediate,
    Periodic,
    Off,
}

/// Operator-issued, time-bounded request to force a capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionPlanConfiguration {
    single: bool,
    mode: EngineMode,
    expiration: DateTime<Utc>,
    immediate_profiling_duration_secs: u64,
    /// Identity of the plan; a plan fires at most once per moniker
    settings_moniker: String,
}

impl CollectionPlanConfiguration {
    pub fn new(
        single: bool,
        mode: EngineMode,
        expiration: DateTime<Utc>,
        immediate_profiling_duration: Duration,
        settings_moniker: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let settings_moniker = settings_moniker.into();

        if single && mode == EngineMode::Immediate {
            if settings_moniker.trim().is_empty() {
                return Err(ConfigError::MissingSettingsMoniker);
            }
            if immediate_profiling_duration.as_secs() == 0 {
                return Err(ConfigError::ZeroProfileDuration {
                    signal: Signal::Manual,
                });
            }
        }

        Ok(Self {
            single,
            mode,
            expiration,
            immediate_profiling_duration_secs: immediate_profiling_duration.as_secs(),
            settings_moniker,
        })
    }

    /// A plan that never fires
    pub fn disabled() -> Self {
        Self {
            single: false,
            mode: EngineMode::Off,
            expiration: DateTime::<Utc>::MIN_UTC,
            immediate_profiling_duration_secs: 0,
            settings_moniker: String::new(),
        }
    }

    pub fn is_single(&self) -> bool {
        self.single
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    pub fn immediate_profiling_duration(&self) -> Duration {
        Duration::from_secs(self.immediate_profiling_duration_secs)
    }

    pub fn settings_moniker(&self) -> &str {
        &self.settings_moniker
    }

    /// Single, immediate and not yet expired
    pub fn is_enabled_manual_trigger(&self, now: DateTime<Utc>) -> bool {
        self.single && self.mode == EngineMode::Immediate && now < self.expiration
    }
}

impl Default for CollectionPlanConfiguration {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Aggregate configuration of the alerting subsystem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertingConfiguration {
    cpu_alert: AlertConfiguration,
    memory_alert: AlertConfiguration,
    tcp_rx_alert: AlertConfiguration,
    tcp_tx_alert: AlertConfiguration,
    request_alerts: Vec<AlertConfiguration>,
    default_configuration: DefaultConfiguration,
    collection_plan: CollectionPlanConfiguration,
}

impl AlertingConfiguration {
    pub fn builder() -> AlertingConfigurationBuilder {
        AlertingConfigurationBuilder::default()
    }

    /// Everything off; the state a subsystem starts in
    pub fn disabled() -> Self {
        Self {
            cpu_alert: AlertConfiguration::disabled(Signal::Cpu),
            memory_alert: AlertConfiguration::disabled(Signal::Memory),
            tcp_rx_alert: AlertConfiguration::disabled(Signal::TcpRx),
            tcp_tx_alert: AlertConfiguration::disabled(Signal::TcpTx),
            request_alerts: Vec::new(),
            default_configuration: DefaultConfiguration::default(),
            collection_plan: CollectionPlanConfiguration::disabled(),
        }
    }

    pub fn cpu_alert(&self) -> &AlertConfiguration {
        &self.cpu_alert
    }

    pub fn memory_alert(&self) -> &AlertConfiguration {
        &self.memory_alert
    }

    pub fn tcp_rx_alert(&self) -> &AlertConfiguration {
        &self.tcp_rx_alert
    }

    pub fn tcp_tx_alert(&self) -> &AlertConfiguration {
        &self.tcp_tx_alert
    }

    pub fn request_alerts(&self) -> &[AlertConfiguration] {
        &self.request_alerts
    }

    pub fn default_configuration(&self) -> &DefaultConfiguration {
        &self.default_configuration
    }

    pub fn collection_plan(&self) -> &CollectionPlanConfiguration {
        &self.collection_plan
    }

    /// Alert configuration for a sampled signal
    pub fn alert_for(&self, signal: Signal) -> Option<&AlertConfiguration> {
        match signal {
            Signal::Cpu => Some(&self.cpu_alert),
            Signal::Memory => Some(&self.memory_alert),
            Signal::TcpRx => Some(&self.tcp_rx_alert),
            Signal::TcpTx => Some(&self.tcp_tx_alert),
            Signal::Manual | Signal::Periodic | Signal::Request => None,
        }
    }

    /// Whether anything can currently produce a capture. Periodic default
    /// sampling is not counted. Evaluated against `now` on every call.
    pub fn has_an_enabled_trigger(&self, now: DateTime<Utc>) -> bool {
        self.cpu_alert.is_enabled()
            || self.memory_alert.is_enabled()
            || self.collection_plan.is_enabled_manual_trigger(now)
    }

    pub fn has_request_alert_configuration(&self) -> bool {
        !self.request_alerts.is_empty()
    }
}

impl Default for AlertingConfiguration {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Builder for [`AlertingConfiguration`]; unset parts stay disabled
#[derive(Debug, Clone, Default)]
pub struct AlertingConfigurationBuilder {
    cpu_alert: Option<AlertConfiguration>,
    memory_alert: Option<AlertConfiguration>,
    tcp_rx_alert: Option<AlertConfiguration>,
    tcp_tx_alert: Option<AlertConfiguration>,
    request_alerts: Vec<AlertConfiguration>,
    default_configuration: Option<DefaultConfiguration>,
    collection_plan: Option<CollectionPlanConfiguration>,
}

impl AlertingConfigurationBuilder {
    pub fn cpu_alert(mut self, alert: AlertConfiguration) -> Self {
        self.cpu_alert = Some(alert);
        self
    }

    pub fn memory_alert(mut self, alert: AlertConfiguration) -> Self {
        self.memory_alert = Some(alert);
        self
    }

    pub fn tcp_rx_alert(mut self, alert: AlertConfiguration) -> Self {
        self.tcp_rx_alert = Some(alert);
        self
    }

    pub fn tcp_tx_alert(mut self, alert: AlertConfiguration) -> Self {
        self.tcp_tx_alert = Some(alert);
        self
    }

    pub fn request_alert(mut self, alert: AlertConfiguration) -> Self {
        self.request_alerts.push(alert);
        self
    }

    pub fn default_configuration(mut self, config: DefaultConfiguration) -> Self {
        self.default_configuration = Some(config);
        self
    }

    pub fn collection_plan(mut self, plan: CollectionPlanConfiguration) -> Self {
        self.collection_plan = Some(plan);
        self
    }

    pub fn build(self) -> Result<AlertingConfiguration, ConfigError> {
        let cpu_alert = expect_signal(self.cpu_alert, Signal::Cpu)?;
        let memory_alert = expect_signal(self.memory_alert, Signal::Memory)?;
        let tcp_rx_alert = expect_signal(self.tcp_rx_alert, Signal::TcpRx)?;
        let tcp_tx_alert = expect_signal(self.tcp_tx_alert, Signal::TcpTx)?;

        for alert in &self.request_alerts {
            if alert.signal() != Signal::Request {
                return Err(ConfigError::SignalMismatch {
                    expected: Signal::Request,
                    found: alert.signal(),
                });
            }
        }

        Ok(AlertingConfiguration {
            cpu_alert,
            memory_alert,
            tcp_rx_alert,
            tcp_tx_alert,
            request_alerts: self.request_alerts,
            default_configuration: self.default_configuration.unwrap_or_default(),
            collection_plan: self.collection_plan.unwrap_or_default(),
        })
    }
}

fn expect_signal(
    alert: Option<AlertConfiguration>,
    expected: Signal,
) -> Result<AlertConfiguration, ConfigError> {
    match alert {
        None => Ok(AlertConfiguration::disabled(expected)),
        Some(alert) if alert.signal() == expected => Ok(alert),
        Some(alert) => Err(ConfigError::SignalMismatch {
            expected,
            found: alert.signal(),
        }),
    }
}
