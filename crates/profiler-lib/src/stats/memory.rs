//! Process memory usage: resident set size as a share of total memory

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{read_proc_file, StatsReader};
use crate::error::StatsError;
use crate::models::{MetricSample, Signal};

/// Read a `Key:   value kB` line from a procfs status-style file
pub(crate) fn parse_kb_field(content: &str, key: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

pub struct LinuxMemoryStatsReader {
    status_path: PathBuf,
    meminfo_path: PathBuf,
    percent: Option<f64>,
}

impl LinuxMemoryStatsReader {
    pub fn new(proc_root: impl AsRef<Path>) -> Self {
        let proc_root = proc_root.as_ref();
        Self {
            status_path: proc_root.join("self").join("status"),
            meminfo_path: proc_root.join("meminfo"),
            percent: None,
        }
    }

    pub fn memory_percent(&self) -> Option<f64> {
        self.percent
    }
}

#[async_trait]
impl StatsReader for LinuxMemoryStatsReader {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn update(&mut self) -> Result<(), StatsError> {
        let status = read_proc_file(&self.status_path).await?;
        let meminfo = read_proc_file(&self.meminfo_path).await?;

        let rss_kb = parse_kb_field(&status, "VmRSS")
            .ok_or_else(|| StatsError::parse(&self.status_path, "no VmRSS line"))?;
        let total_kb = parse_kb_field(&meminfo, "MemTotal")
            .filter(|total| *total > 0)
            .ok_or_else(|| StatsError::parse(&self.meminfo_path, "no usable MemTotal line"))?;

        self.percent = Some((rss_kb as f64 / total_kb as f64 * 100.0).clamp(0.0, 100.0));
        Ok(())
    }

    fn samples(&self, now: DateTime<Utc>) -> Vec<MetricSample> {
        self.percent
            .map(|value| MetricSample::new(Signal::Memory, value, now))
            .into_iter()
            .collect()
    }
}
