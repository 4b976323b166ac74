//! Alerting configuration
//!
//! Snapshots are immutable. The external configuration loader swaps whole
//! snapshots through [`AlertingConfigHandle`]; readers never observe a
//! half-applied change.

mod alerting;

pub use alerting::{
    AlertConfiguration, AlertConfigurationBuilder, AlertingConfiguration,
    AlertingConfigurationBuilder, CollectionPlanConfiguration, DefaultConfiguration, EngineMode,
    DEFAULT_SAMPLING_INTERVAL_SECS, DEFAULT_SAMPLING_PROFILE_DURATION_SECS,
};

use std::sync::{Arc, RwLock};

use tracing::info;

/// Shared, atomically swappable reference to the current configuration
#[derive(Debug, Clone)]
pub struct AlertingConfigHandle {
    current: Arc<RwLock<Arc<AlertingConfiguration>>>,
}

impl AlertingConfigHandle {
    pub fn new(initial: AlertingConfiguration) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// The snapshot in effect right now
    pub fn current(&self) -> Arc<AlertingConfiguration> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Install a new snapshot, returning the previous one
    pub fn replace(&self, next: AlertingConfiguration) -> Arc<AlertingConfiguration> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let previous = std::mem::replace(&mut *guard, Arc::new(next));
        info!("Alerting configuration replaced");
        previous
    }
}

impl Default for AlertingConfigHandle {
    fn default() -> Self {
        Self::new(AlertingConfiguration::disabled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signal;
    use std::time::Duration;

    #[test]
    fn test_replace_swaps_snapshot() {
        let handle = AlertingConfigHandle::default();
        let before = handle.current();

        let cpu = AlertConfiguration::builder(Signal::Cpu)
            .enabled(true)
            .threshold(80.0)
            .profile_duration(Duration::from_secs(30))
            .build()
            .unwrap();
        let next = AlertingConfiguration::builder()
            .cpu_alert(cpu)
            .build()
            .unwrap();

        let previous = handle.replace(next);

        assert!(Arc::ptr_eq(&before, &previous));
        assert!(handle.current().cpu_alert().is_enabled());
        // The old snapshot is untouched
        assert!(!before.cpu_alert().is_enabled());
    }

    #[test]
    fn test_clones_share_state() {
        let handle = AlertingConfigHandle::default();
        let other = handle.clone();
        other.replace(AlertingConfiguration::disabled());

        assert!(Arc::ptr_eq(&handle.current(), &other.current()));
    }
}
