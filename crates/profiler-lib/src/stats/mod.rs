//! Process resource statistics
//!
//! A [`StatsReader`] refreshes its accumulators from OS state once per
//! [`StatsReader::update`] call and serves the last snapshot without further
//! I/O. Readers are owned by the sampling task and are not shared.
//!
//! The concrete readers are selected per platform by [`create_stats_readers`].

mod cpu;
mod memory;
mod tcp;

#[cfg(test)]
mod tests;

pub use cpu::LinuxCpuStatsReader;
pub use memory::LinuxMemoryStatsReader;
pub use tcp::{parse_tcp_table, LinuxTcpStatsReader, TcpStats, TcpTable};

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StatsError;
use crate::models::MetricSample;
use crate::platform::OsPlatform;

/// Poller for one family of process metrics
#[async_trait]
pub trait StatsReader: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Read OS state once and recompute the snapshot
    async fn update(&mut self) -> Result<(), StatsError>;

    /// Samples from the last snapshot, stamped with `now`
    fn samples(&self, now: DateTime<Utc>) -> Vec<MetricSample>;
}

/// Reader for platforms with no statistics source
#[derive(Debug, Default)]
pub struct NoopStatsReader;

#[async_trait]
impl StatsReader for NoopStatsReader {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn update(&mut self) -> Result<(), StatsError> {
        Ok(())
    }

    fn samples(&self, _now: DateTime<Utc>) -> Vec<MetricSample> {
        Vec::new()
    }
}

/// Build the readers available on `platform`, rooted at `proc_root`
pub fn create_stats_readers(
    platform: Option<OsPlatform>,
    proc_root: &Path,
) -> Vec<Box<dyn StatsReader>> {
    match platform {
        Some(OsPlatform::Linux) => {
            tracing::info!(proc_root = %proc_root.display(), "Using procfs stats readers");
            vec![
                Box::new(LinuxCpuStatsReader::new(proc_root)),
                Box::new(LinuxMemoryStatsReader::new(proc_root)),
                Box::new(LinuxTcpStatsReader::new(proc_root)),
            ]
        }
        Some(other) => {
            tracing::warn!(
                platform = other.description(),
                "No stats readers for platform, alerts will not fire"
            );
            vec![Box::new(NoopStatsReader)]
        }
        None => {
            tracing::warn!("Unknown platform, alerts will not fire");
            vec![Box::new(NoopStatsReader)]
        }
    }
}

/// Read a procfs file into a string
pub(crate) async fn read_proc_file(path: &Path) -> Result<String, StatsError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StatsError::Io {
            path: path.to_path_buf(),
            source,
        })
}
