//! Reader tests against a mock procfs tree

#[cfg(test)]
mod mock_proc_tests {
    use crate::error::StatsError;
    use crate::models::Signal;
    use crate::platform::OsPlatform;
    use crate::stats::{
        create_stats_readers, LinuxCpuStatsReader, LinuxMemoryStatsReader, LinuxTcpStatsReader,
        StatsReader, TcpStats,
    };
    use chrono::Utc;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::fs;

    const TCP_TABLE: &str = include_str!("../../tests/fixtures/proc_net_tcp");

    /// Helper to create a mock /proc tree for the current process
    async fn create_mock_proc(temp_dir: &TempDir) -> PathBuf {
        let root = temp_dir.path().to_path_buf();
        fs::create_dir_all(root.join("self")).await.unwrap();
        fs::create_dir_all(root.join("net")).await.unwrap();

        fs::write(
            root.join("stat"),
            "cpu  10 0 10 100 0 0 0 0 0 0\ncpu0 5 0 5 50 0 0 0 0 0 0\ncpu1 5 0 5 50 0 0 0 0 0 0\n",
        )
        .await
        .unwrap();
        fs::write(
            root.join("self").join("stat"),
            "77 (profiled app) S 1 77 77 0 -1 0 0 0 0 0 300 100 0 0 20 0 8 0 100 0 0\n",
        )
        .await
        .unwrap();
        fs::write(
            root.join("self").join("status"),
            "Name:\tprofiled\nVmRSS:\t  524288 kB\nThreads:\t8\n",
        )
        .await
        .unwrap();
        fs::write(
            root.join("meminfo"),
            "MemTotal:        2097152 kB\nMemFree:          1048576 kB\n",
        )
        .await
        .unwrap();
        fs::write(root.join("net").join("tcp"), TCP_TABLE)
            .await
            .unwrap();

        root
    }

    #[tokio::test]
    async fn test_tcp_reader_sums_valid_rows() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_mock_proc(&temp_dir).await;

        let mut reader = LinuxTcpStatsReader::new(&root);
        assert!(reader.tcp_stats().is_none());

        reader.update().await.unwrap();

        assert_eq!(
            reader.tcp_stats(),
            Some(TcpStats {
                total_received_queue: 42,
                total_transmit_queue: 512,
            })
        );

        let samples = reader.samples(Utc::now());
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].signal, Signal::TcpRx);
        assert_eq!(samples[0].value, 42.0);
        assert_eq!(samples[1].signal, Signal::TcpTx);
        assert_eq!(samples[1].value, 512.0);
    }

    #[tokio::test]
    async fn test_tcp_reader_adds_ipv6_table() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_mock_proc(&temp_dir).await;
        fs::write(
            root.join("net").join("tcp6"),
            "  sl  local_address                         remote_address                        st tx_queue rx_queue\n\
             \x20  0: 00000000000000000000000000000000:1F90 00000000000000000000000000000000:0000 0A 00000100:00000001 00:00000000\n",
        )
        .await
        .unwrap();

        let mut reader = LinuxTcpStatsReader::new(&root);
        reader.update().await.unwrap();

        let stats = reader.tcp_stats().unwrap();
        assert_eq!(stats.total_transmit_queue, 512 + 256);
        assert_eq!(stats.total_received_queue, 43);
    }

    #[tokio::test]
    async fn test_memory_reader_percent() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_mock_proc(&temp_dir).await;

        let mut reader = LinuxMemoryStatsReader::new(&root);
        reader.update().await.unwrap();

        assert_eq!(reader.memory_percent(), Some(25.0));
        let samples = reader.samples(Utc::now());
        assert_eq!(samples[0].signal, Signal::Memory);
    }

    #[tokio::test]
    async fn test_cpu_reader_first_update_has_no_sample() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_mock_proc(&temp_dir).await;

        let mut reader = LinuxCpuStatsReader::new(&root);
        reader.update().await.unwrap();

        assert!(reader.cpu_percent().is_none());
        assert!(reader.samples(Utc::now()).is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();

        let mut reader = LinuxMemoryStatsReader::new(temp_dir.path());
        let err = reader.update().await.unwrap_err();

        assert!(matches!(err, StatsError::Io { .. }));
    }

    #[tokio::test]
    async fn test_unparseable_status_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_mock_proc(&temp_dir).await;
        fs::write(root.join("self").join("status"), "Name:\tprofiled\n")
            .await
            .unwrap();

        let mut reader = LinuxMemoryStatsReader::new(&root);
        let err = reader.update().await.unwrap_err();

        assert!(matches!(err, StatsError::Parse { .. }));
    }

    #[test]
    fn test_factory_by_platform() {
        let proc_root = std::path::Path::new("/proc");

        let linux = create_stats_readers(Some(OsPlatform::Linux), proc_root);
        let names: Vec<&str> = linux.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["cpu", "memory", "tcp"]);

        let windows = create_stats_readers(Some(OsPlatform::Windows), proc_root);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].name(), "noop");

        let unknown = create_stats_readers(None, proc_root);
        assert_eq!(unknown[0].name(), "noop");
    }
}
