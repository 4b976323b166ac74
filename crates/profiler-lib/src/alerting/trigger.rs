//! Per-signal threshold state machine

use chrono::{DateTime, Utc};

use crate::config::AlertConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    BelowThreshold,
    /// Above threshold without emitting, only reachable while disabled
    AboveThreshold,
    /// A breach was emitted; nothing fires before `until`
    Cooldown { until: DateTime<Utc> },
}

/// Threshold logic for one sampled signal.
///
/// `BelowThreshold -> AboveThreshold -> (breach) -> Cooldown -> BelowThreshold`.
/// The cooldown spans the capture window plus the configured cooldown,
/// measured from the breach.
#[derive(Debug, Clone)]
pub struct AlertTrigger {
    config: AlertConfiguration,
    state: TriggerState,
}

impl AlertTrigger {
    pub fn new(config: AlertConfiguration) -> Self {
        Self {
            config,
            state: TriggerState::BelowThreshold,
        }
    }

    pub fn config(&self) -> &AlertConfiguration {
        &self.config
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Feed one sample; returns true when a breach must be emitted
    pub fn observe(&mut self, value: f64, now: DateTime<Utc>) -> bool {
        if let TriggerState::Cooldown { until } = self.state {
            if now < until {
                return false;
            }
            self.state = TriggerState::BelowThreshold;
        }

        if value <= self.config.threshold() {
            self.state = TriggerState::BelowThreshold;
            return false;
        }

        if !self.config.is_enabled() {
            self.state = TriggerState::AboveThreshold;
            return false;
        }

        let span = self.config.profile_duration() + self.config.cooldown();
        let until = chrono::Duration::from_std(span)
            .ok()
            .and_then(|span| now.checked_add_signed(span))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.state = TriggerState::Cooldown { until };
        true
    }
}
