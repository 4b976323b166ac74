//! Process CPU usage from `/proc/self/stat`
//!
//! CPU percent is the growth of utime+stime between two updates divided by
//! the wall time between them, normalized by the logical CPU count.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::{read_proc_file, StatsReader};
use crate::error::StatsError;
use crate::models::{MetricSample, Signal};

/// Kernel clock ticks per second exposed to userspace
const USER_HZ: f64 = 100.0;

/// Offsets of utime and stime counted from the field after the command name
const UTIME_INDEX: usize = 11;
const STIME_INDEX: usize = 12;

/// Extract utime + stime in clock ticks
pub(crate) fn parse_process_ticks(content: &str) -> Option<u64> {
    // The command name may itself contain spaces and parentheses
    let after_comm = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();

    let utime: u64 = fields.get(UTIME_INDEX)?.parse().ok()?;
    let stime: u64 = fields.get(STIME_INDEX)?.parse().ok()?;
    Some(utime + stime)
}

/// Count `cpuN` rows of `/proc/stat`
pub(crate) fn count_cpus(content: &str) -> usize {
    content
        .lines()
        .filter(|line| {
            line.strip_prefix("cpu")
                .and_then(|rest| rest.chars().next())
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        })
        .count()
}

/// CPU percent over an interval, clamped to 0..=100
pub(crate) fn cpu_percent(delta_ticks: u64, elapsed: Duration, cpus: usize) -> Option<f64> {
    let elapsed = elapsed.as_secs_f64();
    if elapsed <= 0.0 {
        return None;
    }
    let cpu_seconds = delta_ticks as f64 / USER_HZ;
    let percent = cpu_seconds / elapsed / cpus.max(1) as f64 * 100.0;
    Some(percent.clamp(0.0, 100.0))
}

pub struct LinuxCpuStatsReader {
    self_stat_path: PathBuf,
    stat_path: PathBuf,
    cpus: Option<usize>,
    last: Option<(u64, Instant)>,
    percent: Option<f64>,
}

impl LinuxCpuStatsReader {
    pub fn new(proc_root: impl AsRef<Path>) -> Self {
        let proc_root = proc_root.as_ref();
        Self {
            self_stat_path: proc_root.join("self").join("stat"),
            stat_path: proc_root.join("stat"),
            cpus: None,
            last: None,
            percent: None,
        }
    }

    /// Process CPU percent from the last two updates
    pub fn cpu_percent(&self) -> Option<f64> {
        self.percent
    }

    fn record(&mut self, ticks: u64, at: Instant, cpus: usize) {
        if let Some((last_ticks, last_at)) = self.last {
            let delta = ticks.saturating_sub(last_ticks);
            if let Some(percent) = cpu_percent(delta, at.duration_since(last_at), cpus) {
                self.percent = Some(percent);
            }
        }
        self.last = Some((ticks, at));
    }
}

#[async_trait]
impl StatsReader for LinuxCpuStatsReader {
    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn update(&mut self) -> Result<(), StatsError> {
        let cpus = match self.cpus {
            Some(cpus) => cpus,
            None => {
                let cpus = count_cpus(&read_proc_file(&self.stat_path).await?).max(1);
                self.cpus = Some(cpus);
                cpus
            }
        };

        let content = read_proc_file(&self.self_stat_path).await?;
        let ticks = parse_process_ticks(&content)
            .ok_or_else(|| StatsError::parse(&self.self_stat_path, "missing utime/stime fields"))?;

        self.record(ticks, Instant::now(), cpus);
        Ok(())
    }

    fn samples(&self, now: DateTime<Utc>) -> Vec<MetricSample> {
        self.percent
            .map(|value| MetricSample::new(Signal::Cpu, value, now))
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SELF_STAT: &str = "4242 (java (main)) S 1 4242 4242 0 -1 4194560 9000 0 12 0 \
                             150 50 0 0 20 0 35 0 1000 5000000 3000 18446744073709551615";

    #[test]
    fn test_parse_ticks_with_parenthesized_name() {
        assert_eq!(parse_process_ticks(SELF_STAT), Some(200));
    }

    #[test]
    fn test_parse_ticks_truncated() {
        assert_eq!(parse_process_ticks("1 (sh) S 1 2 3"), None);
        assert_eq!(parse_process_ticks("garbage"), None);
    }

    #[test]
    fn test_count_cpus_ignores_aggregate_row() {
        let stat = "cpu  100 0 100 1000 0 0 0 0 0 0\n\
                    cpu0 50 0 50 500 0 0 0 0 0 0\n\
                    cpu1 50 0 50 500 0 0 0 0 0 0\n\
                    intr 12345\n";
        assert_eq!(count_cpus(stat), 2);
    }

    #[test]
    fn test_percent_over_interval() {
        // 200 ticks = 2s of CPU over 10s on 2 cpus
        let percent = cpu_percent(200, Duration::from_secs(10), 2).unwrap();
        assert!((percent - 10.0).abs() < 1e-9);

        assert_eq!(cpu_percent(10_000, Duration::from_secs(1), 1), Some(100.0));
        assert_eq!(cpu_percent(10, Duration::ZERO, 1), None);
    }

    #[test]
    fn test_first_record_yields_no_sample() {
        let mut reader = LinuxCpuStatsReader::new("/nonexistent");
        let t0 = Instant::now();

        reader.record(100, t0, 1);
        assert!(reader.samples(Utc::now()).is_empty());

        reader.record(150, t0 + Duration::from_secs(1), 1);
        let samples = reader.samples(Utc::now());
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].signal, Signal::Cpu);
        assert!((samples[0].value - 50.0).abs() < 1e-9);
    }
}
