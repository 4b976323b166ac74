//! Time-windowed average of recent samples

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Window used for the cpu and memory figures attached to breaches
pub const DEFAULT_ROLLING_WINDOW: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct RollingAverage {
    samples: VecDeque<(DateTime<Utc>, f64)>,
    window: chrono::Duration,
}

impl RollingAverage {
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window: chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::seconds(120)),
        }
    }

    pub fn add_sample(&mut self, timestamp: DateTime<Utc>, value: f64) {
        self.expire_old_samples(timestamp);
        self.samples.push_back((timestamp, value));
    }

    fn expire_old_samples(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while let Some((ts, _)) = self.samples.front() {
            if *ts < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Mean of the samples in the window, `None` when empty
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|(_, v)| v).sum();
        Some(sum / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for RollingAverage {
    fn default() -> Self {
        Self::new(DEFAULT_ROLLING_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_average() {
        assert_eq!(RollingAverage::default().average(), None);
    }

    #[test]
    fn test_old_samples_expire() {
        let mut avg = RollingAverage::new(Duration::from_secs(60));
        let t0 = Utc::now();

        avg.add_sample(t0, 10.0);
        avg.add_sample(t0 + chrono::Duration::seconds(30), 20.0);
        assert_eq!(avg.average(), Some(15.0));

        avg.add_sample(t0 + chrono::Duration::seconds(91), 60.0);
        assert_eq!(avg.len(), 1);
        assert_eq!(avg.average(), Some(60.0));
    }
}
