//! TCP queue totals from `/proc/net/tcp`
//!
//! Each row carries `tx_queue:rx_queue` in hex as its fifth column. The
//! reader sums both queues over every socket of the table.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{read_proc_file, StatsReader};
use crate::error::StatsError;
use crate::models::{MetricSample, Signal};

const QUEUE_COLUMN: usize = 4;

/// Summed socket queue sizes in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpStats {
    pub total_received_queue: u64,
    pub total_transmit_queue: u64,
}

/// Result of parsing one tcp table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpTable {
    pub stats: TcpStats,
    /// Rows skipped because they could not be parsed
    pub malformed_rows: usize,
}

/// Sum the queue columns of a `/proc/net/tcp` style table
pub fn parse_tcp_table(content: &str) -> TcpTable {
    let mut table = TcpTable::default();

    for line in content.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        match columns.first() {
            None => continue,
            Some(&"sl") => continue,
            Some(_) => {}
        }

        let summed = columns
            .get(QUEUE_COLUMN)
            .and_then(|c| parse_queues(c))
            .and_then(|(tx, rx)| table.stats.checked_add(tx, rx));
        match summed {
            Some(stats) => table.stats = stats,
            None => table.malformed_rows += 1,
        }
    }

    table
}

impl TcpStats {
    /// Totals with one more socket's queues, `None` on overflow
    fn checked_add(&self, tx: u64, rx: u64) -> Option<Self> {
        Some(Self {
            total_transmit_queue: self.total_transmit_queue.checked_add(tx)?,
            total_received_queue: self.total_received_queue.checked_add(rx)?,
        })
    }
}

/// Queues are 32-bit in the kernel; wider fields are corrupt
fn parse_queues(column: &str) -> Option<(u64, u64)> {
    let (tx, rx) = column.split_once(':')?;
    let tx = u32::from_str_radix(tx, 16).ok()?;
    let rx = u32::from_str_radix(rx, 16).ok()?;
    Some((u64::from(tx), u64::from(rx)))
}

/// Reads `net/tcp` and, when present, `net/tcp6`
pub struct LinuxTcpStatsReader {
    tcp_path: PathBuf,
    tcp6_path: PathBuf,
    stats: Option<TcpStats>,
}

impl LinuxTcpStatsReader {
    pub fn new(proc_root: impl AsRef<Path>) -> Self {
        let net = proc_root.as_ref().join("net");
        Self {
            tcp_path: net.join("tcp"),
            tcp6_path: net.join("tcp6"),
            stats: None,
        }
    }

    /// Totals from the last update, `None` before the first one
    pub fn tcp_stats(&self) -> Option<TcpStats> {
        self.stats
    }
}

#[async_trait]
impl StatsReader for LinuxTcpStatsReader {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn update(&mut self) -> Result<(), StatsError> {
        let mut table = parse_tcp_table(&read_proc_file(&self.tcp_path).await?);

        // IPv6 sockets are optional, the kernel may be built without them
        if let Ok(content) = tokio::fs::read_to_string(&self.tcp6_path).await {
            let v6 = parse_tcp_table(&content);
            match table.stats.checked_add(
                v6.stats.total_transmit_queue,
                v6.stats.total_received_queue,
            ) {
                Some(stats) => table.stats = stats,
                None => warn!("tcp6 queue totals overflowed, ignoring tcp6"),
            }
            table.malformed_rows += v6.malformed_rows;
        }

        if table.malformed_rows > 0 {
            debug!(
                malformed_rows = table.malformed_rows,
                "Skipped malformed tcp table rows"
            );
        }

        self.stats = Some(table.stats);
        Ok(())
    }

    fn samples(&self, now: DateTime<Utc>) -> Vec<MetricSample> {
        match self.stats {
            Some(stats) => vec![
                MetricSample::new(Signal::TcpRx, stats.total_received_queue as f64, now),
                MetricSample::new(Signal::TcpTx, stats.total_transmit_queue as f64, now),
            ],
            None => Vec::new(),
        }
    }
}
