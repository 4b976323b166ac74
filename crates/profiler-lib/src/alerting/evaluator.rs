//! Alert evaluation
//!
//! The evaluator is driven by the sampling loop once per cycle. It picks up
//! configuration changes, runs every sample through its signal's trigger and
//! raises manual and periodic breaches that do not depend on thresholds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use super::rolling::RollingAverage;
use super::trigger::AlertTrigger;
use crate::clock::Clock;
use crate::config::{AlertConfiguration, AlertingConfigHandle, AlertingConfiguration};
use crate::models::{AlertBreach, MetricSample, Signal};

pub struct AlertEvaluator {
    config: AlertingConfigHandle,
    clock: Arc<dyn Clock>,
    /// Snapshot the triggers were last built from
    applied: Option<Arc<AlertingConfiguration>>,
    triggers: HashMap<Signal, AlertTrigger>,
    averages: HashMap<Signal, RollingAverage>,
    /// Settings monikers of collection plans that already fired
    manual_triggers_executed: HashSet<String>,
    next_periodic: Option<DateTime<Utc>>,
}

impl AlertEvaluator {
    pub fn new(config: AlertingConfigHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            applied: None,
            triggers: HashMap::new(),
            averages: HashMap::new(),
            manual_triggers_executed: HashSet::new(),
            next_periodic: None,
        }
    }

    /// Current configuration snapshot
    pub fn configuration(&self) -> Arc<AlertingConfiguration> {
        self.config.current()
    }

    /// Apply the current snapshot if it changed, then check the manual plan
    pub fn refresh_configuration(&mut self) -> Vec<AlertBreach> {
        let current = self.config.current();
        let now = self.clock.now();

        let changed = match &self.applied {
            Some(applied) => !Arc::ptr_eq(applied, &current) && **applied != *current,
            None => true,
        };

        if changed {
            self.apply(&current, now);
        }
        self.applied = Some(Arc::clone(&current));

        self.evaluate_manual_trigger(&current, now)
            .into_iter()
            .collect()
    }

    fn apply(&mut self, config: &AlertingConfiguration, now: DateTime<Utc>) {
        for signal in Signal::SAMPLED {
            let Some(next) = config.alert_for(signal) else {
                continue;
            };
            let unchanged = self
                .triggers
                .get(&signal)
                .map(|t| t.config() == next)
                .unwrap_or(false);
            if !unchanged {
                debug!(
                    signal = %signal,
                    enabled = next.is_enabled(),
                    "Rebuilding alert trigger"
                );
                self.triggers.insert(signal, AlertTrigger::new(next.clone()));
            }
        }

        let sampling = config.default_configuration();
        let previous = self.applied.as_ref().map(|a| a.default_configuration());
        if previous != Some(sampling) {
            self.next_periodic = if sampling.is_sampling_enabled() {
                chrono::Duration::from_std(sampling.sampling_interval())
                    .ok()
                    .and_then(|interval| now.checked_add_signed(interval))
            } else {
                None
            };
        }

        info!(
            cpu_enabled = config.cpu_alert().is_enabled(),
            memory_enabled = config.memory_alert().is_enabled(),
            periodic_enabled = sampling.is_sampling_enabled(),
            "Applied alerting configuration"
        );
    }

    fn evaluate_manual_trigger(
        &mut self,
        config: &AlertingConfiguration,
        now: DateTime<Utc>,
    ) -> Option<AlertBreach> {
        let plan = config.collection_plan();
        if !plan.is_enabled_manual_trigger(now)
            || self
                .manual_triggers_executed
                .contains(plan.settings_moniker())
        {
            return None;
        }

        self.manual_triggers_executed
            .insert(plan.settings_moniker().to_string());
        info!(
            settings_moniker = %plan.settings_moniker(),
            "Collection plan requested an immediate profile"
        );

        let alert = AlertConfiguration::manual(plan.immediate_profiling_duration());
        Some(self.breach(alert, 0.0, now))
    }

    /// Feed a single sample; returns a breach if its trigger fired
    pub fn track(&mut self, sample: MetricSample) -> Option<AlertBreach> {
        trace!(signal = %sample.signal, value = sample.value, "Tracking sample");

        self.averages
            .entry(sample.signal)
            .or_default()
            .add_sample(sample.timestamp, sample.value);

        let trigger = self.triggers.get_mut(&sample.signal)?;
        if !trigger.observe(sample.value, sample.timestamp) {
            return None;
        }

        let alert = trigger.config().clone();
        Some(self.breach(alert, sample.value, sample.timestamp))
    }

    /// Run one evaluation cycle over the samples read this tick
    pub fn evaluate_cycle(&mut self, samples: &[MetricSample]) -> Vec<AlertBreach> {
        let mut breaches = self.refresh_configuration();

        for sample in samples {
            if let Some(breach) = self.track(*sample) {
                breaches.push(breach);
            }
        }

        if let Some(breach) = self.evaluate_periodic(self.clock.now()) {
            breaches.push(breach);
        }

        breaches
    }

    fn evaluate_periodic(&mut self, now: DateTime<Utc>) -> Option<AlertBreach> {
        let due = self.next_periodic?;
        if now < due {
            return None;
        }

        let sampling = self.applied.as_ref()?.default_configuration().clone();
        self.next_periodic = chrono::Duration::from_std(sampling.sampling_interval())
            .ok()
            .and_then(|interval| now.checked_add_signed(interval));

        let alert = AlertConfiguration::periodic(sampling.sampling_profile_duration());
        Some(self.breach(alert, 0.0, now))
    }

    fn breach(
        &self,
        alert: AlertConfiguration,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> AlertBreach {
        let cpu = self.rolling_average(Signal::Cpu).unwrap_or(0.0);
        let memory = self.rolling_average(Signal::Memory).unwrap_or(0.0);
        AlertBreach::new(alert, value, timestamp)
            .with_cpu_metric(cpu)
            .with_memory_usage(memory)
    }

    /// Rolling average of a signal over the recent window
    pub fn rolling_average(&self, signal: Signal) -> Option<f64> {
        self.averages.get(&signal).and_then(|a| a.average())
    }

    /// Whether anything can currently produce a capture
    pub fn has_an_enabled_trigger(&self) -> bool {
        self.config
            .current()
            .has_an_enabled_trigger(self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{CollectionPlanConfiguration, DefaultConfiguration, EngineMode};
    use std::time::Duration;

    fn cpu_alert(threshold: f64) -> AlertConfiguration {
        AlertConfiguration::builder(Signal::Cpu)
            .enabled(true)
            .threshold(threshold)
            .profile_duration(Duration::from_secs(30))
            .cooldown(Duration::from_secs(300))
            .build()
            .unwrap()
    }

    fn evaluator_with(
        config: AlertingConfiguration,
    ) -> (AlertEvaluator, ManualClock, AlertingConfigHandle) {
        let clock = ManualClock::default();
        let handle = AlertingConfigHandle::new(config);
        let evaluator = AlertEvaluator::new(handle.clone(), Arc::new(clock.clone()));
        (evaluator, clock, handle)
    }

    fn sample(clock: &ManualClock, signal: Signal, value: f64) -> MetricSample {
        MetricSample::new(signal, value, clock.now())
    }

    #[test]
    fn test_one_breach_per_crossing() {
        let config = AlertingConfiguration::builder()
            .cpu_alert(cpu_alert(80.0))
            .build()
            .unwrap();
        let (mut evaluator, clock, _) = evaluator_with(config);

        let mut breaches = Vec::new();
        for value in [50.0, 85.0, 90.0, 40.0] {
            let s = sample(&clock, Signal::Cpu, value);
            breaches.extend(evaluator.evaluate_cycle(&[s]));
            clock.advance(Duration::from_secs(5));
        }

        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].signal, Signal::Cpu);
        assert_eq!(breaches[0].alert_value, 85.0);
    }

    #[test]
    fn test_breach_carries_rolling_averages() {
        let config = AlertingConfiguration::builder()
            .cpu_alert(cpu_alert(80.0))
            .build()
            .unwrap();
        let (mut evaluator, clock, _) = evaluator_with(config);

        evaluator.evaluate_cycle(&[
            sample(&clock, Signal::Cpu, 70.0),
            sample(&clock, Signal::Memory, 40.0),
        ]);
        clock.advance(Duration::from_secs(5));
        let breaches = evaluator.evaluate_cycle(&[
            sample(&clock, Signal::Cpu, 90.0),
            sample(&clock, Signal::Memory, 60.0),
        ]);

        assert_eq!(breaches.len(), 1);
        // Cpu is tracked before its trigger fires; memory has only its first sample
        assert_eq!(breaches[0].cpu_metric, 80.0);
        assert_eq!(breaches[0].memory_usage, 40.0);
    }

    #[test]
    fn test_disabled_signal_never_breaches() {
        let (mut evaluator, clock, _) = evaluator_with(AlertingConfiguration::disabled());

        let breaches = evaluator.evaluate_cycle(&[sample(&clock, Signal::Cpu, 100.0)]);

        assert!(breaches.is_empty());
        assert_eq!(evaluator.rolling_average(Signal::Cpu), Some(100.0));
    }

    #[test]
    fn test_manual_plan_fires_once_per_moniker() {
        let clock_start = Utc::now();
        let plan = |moniker: &str| {
            CollectionPlanConfiguration::new(
                true,
                EngineMode::Immediate,
                clock_start + chrono::Duration::minutes(10),
                Duration::from_secs(120),
                moniker,
            )
            .unwrap()
        };
        let config = AlertingConfiguration::builder()
            .collection_plan(plan("first"))
            .build()
            .unwrap();
        let (mut evaluator, clock, handle) = evaluator_with(config);
        clock.set(clock_start);

        let breaches = evaluator.evaluate_cycle(&[]);
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].signal, Signal::Manual);
        assert_eq!(
            breaches[0].alert_configuration.profile_duration(),
            Duration::from_secs(120)
        );

        assert!(evaluator.evaluate_cycle(&[]).is_empty());

        // Same moniker re-sent in a new snapshot does not fire again
        handle.replace(
            AlertingConfiguration::builder()
                .collection_plan(plan("first"))
                .build()
                .unwrap(),
        );
        assert!(evaluator.evaluate_cycle(&[]).is_empty());

        handle.replace(
            AlertingConfiguration::builder()
                .collection_plan(plan("second"))
                .build()
                .unwrap(),
        );
        assert_eq!(evaluator.evaluate_cycle(&[]).len(), 1);
    }

    #[test]
    fn test_expired_plan_does_not_fire() {
        let now = Utc::now();
        let plan = CollectionPlanConfiguration::new(
            true,
            EngineMode::Immediate,
            now - chrono::Duration::seconds(1),
            Duration::from_secs(120),
            "late",
        )
        .unwrap();
        let config = AlertingConfiguration::builder()
            .collection_plan(plan)
            .build()
            .unwrap();
        let (mut evaluator, clock, _) = evaluator_with(config);
        clock.set(now);

        assert!(evaluator.evaluate_cycle(&[]).is_empty());
        assert!(!evaluator.has_an_enabled_trigger());
    }

    #[test]
    fn test_periodic_breach_every_interval() {
        let sampling =
            DefaultConfiguration::new(true, Duration::from_secs(60), Duration::from_secs(20))
                .unwrap();
        let config = AlertingConfiguration::builder()
            .default_configuration(sampling)
            .build()
            .unwrap();
        let (mut evaluator, clock, _) = evaluator_with(config);

        assert!(evaluator.evaluate_cycle(&[]).is_empty());

        clock.advance(Duration::from_secs(59));
        assert!(evaluator.evaluate_cycle(&[]).is_empty());

        clock.advance(Duration::from_secs(1));
        let breaches = evaluator.evaluate_cycle(&[]);
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].signal, Signal::Periodic);
        assert_eq!(
            breaches[0].alert_configuration.profile_duration(),
            Duration::from_secs(20)
        );

        clock.advance(Duration::from_secs(30));
        assert!(evaluator.evaluate_cycle(&[]).is_empty());
        clock.advance(Duration::from_secs(30));
        assert_eq!(evaluator.evaluate_cycle(&[]).len(), 1);
    }

    #[test]
    fn test_unchanged_trigger_keeps_cooldown_across_reload() {
        let config = AlertingConfiguration::builder()
            .cpu_alert(cpu_alert(80.0))
            .build()
            .unwrap();
        let (mut evaluator, clock, handle) = evaluator_with(config.clone());

        assert_eq!(
            evaluator
                .evaluate_cycle(&[sample(&clock, Signal::Cpu, 95.0)])
                .len(),
            1
        );

        // Equal snapshot swapped in: the trigger stays in cooldown
        handle.replace(config);
        clock.advance(Duration::from_secs(5));
        assert!(evaluator
            .evaluate_cycle(&[sample(&clock, Signal::Cpu, 95.0)])
            .is_empty());

        // Changed threshold rebuilds the trigger
        handle.replace(
            AlertingConfiguration::builder()
                .cpu_alert(cpu_alert(70.0))
                .build()
                .unwrap(),
        );
        clock.advance(Duration::from_secs(5));
        assert_eq!(
            evaluator
                .evaluate_cycle(&[sample(&clock, Signal::Cpu, 95.0)])
                .len(),
            1
        );
    }
}
