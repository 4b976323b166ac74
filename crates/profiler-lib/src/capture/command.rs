//! Capture backend driven by an external profiler command
//!
//! The command line is a template. `{pid}` expands to the host process id,
//! `{output}` to the file the recording must be written to and
//! `{duration}` to the window length in whole seconds. The command is
//! expected to exit on its own once the window is over.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{CaptureBackend, CaptureHandle, RecordedCapture};
use crate::error::CaptureError;
use crate::models::Signal;

#[derive(Debug, Clone)]
pub struct CommandCaptureConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Directory that receives recordings
    pub output_dir: PathBuf,
    /// How long a stop waits for the command to exit
    pub grace_period: Duration,
    pub pid: u32,
}

impl CommandCaptureConfig {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            output_dir: output_dir.into(),
            grace_period: Duration::from_secs(10),
            pid: std::process::id(),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

pub struct CommandCaptureBackend {
    config: CommandCaptureConfig,
    next_id: AtomicU64,
    running: DashMap<u64, Child>,
}

impl CommandCaptureBackend {
    pub fn new(config: CommandCaptureConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            running: DashMap::new(),
        }
    }

    /// Recordings currently running
    pub fn active(&self) -> usize {
        self.running.len()
    }

    fn expand_args(&self, output: &std::path::Path, max_duration: Duration) -> Vec<String> {
        let pid = self.config.pid.to_string();
        let output = output.display().to_string();
        let duration = max_duration.as_secs().to_string();

        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{pid}", &pid)
                    .replace("{output}", &output)
                    .replace("{duration}", &duration)
            })
            .collect()
    }

    async fn discard(&self, path: &std::path::Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to discard capture output");
            }
        }
    }
}

#[async_trait]
impl CaptureBackend for CommandCaptureBackend {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn start_capture(
        &self,
        signal: Signal,
        max_duration: Duration,
    ) -> Result<CaptureHandle, CaptureError> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let output = self.config.output_dir.join(format!(
            "capture-{}-{}.data",
            id,
            signal.as_str().to_lowercase()
        ));

        let child = Command::new(&self.config.program)
            .args(self.expand_args(&output, max_duration))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        debug!(capture_id = id, pid = ?child.id(), "Capture command launched");
        self.running.insert(id, child);

        Ok(CaptureHandle {
            id,
            signal,
            output,
            started_at: Utc::now(),
        })
    }

    async fn stop_capture(&self, handle: CaptureHandle) -> Result<RecordedCapture, CaptureError> {
        let (_, mut child) = self
            .running
            .remove(&handle.id)
            .ok_or(CaptureError::UnknownCapture { id: handle.id })?;

        let waited = match tokio::time::timeout(self.config.grace_period, child.wait()).await {
            Ok(waited) => waited,
            Err(_) => {
                warn!(
                    capture_id = handle.id,
                    "Capture command still running, killing it"
                );
                if let Err(e) = child.kill().await {
                    warn!(capture_id = handle.id, error = %e, "Failed to kill capture command");
                }
                self.discard(&handle.output).await;
                return Err(CaptureError::Incomplete { id: handle.id });
            }
        };

        self.finish(handle, waited).await
    }
}

impl CommandCaptureBackend {
    /// Turn the command's exit into a recording; any failure discards the output
    async fn finish(
        &self,
        handle: CaptureHandle,
        waited: std::io::Result<ExitStatus>,
    ) -> Result<RecordedCapture, CaptureError> {
        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                self.discard(&handle.output).await;
                return Err(CaptureError::Io(e));
            }
        };

        if !status.success() {
            self.discard(&handle.output).await;
            return Err(CaptureError::CommandFailed {
                id: handle.id,
                status: status.to_string(),
            });
        }

        let Ok(metadata) = tokio::fs::metadata(&handle.output).await else {
            return Err(CaptureError::MissingOutput {
                id: handle.id,
                path: handle.output,
            });
        };

        Ok(RecordedCapture {
            path: handle.output,
            size_bytes: metadata.len(),
            started_at: handle.started_at,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell_backend(dir: &TempDir, script: &str) -> CommandCaptureBackend {
        CommandCaptureBackend::new(
            CommandCaptureConfig::new(
                "sh",
                vec!["-c".to_string(), script.to_string()],
                dir.path(),
            )
            .with_grace_period(Duration::from_millis(500)),
        )
    }

    #[test]
    fn test_placeholders_expanded() {
        let backend = CommandCaptureBackend::new(CommandCaptureConfig {
            program: "jcmd".to_string(),
            args: vec![
                "{pid}".to_string(),
                "JFR.start".to_string(),
                "duration={duration}s".to_string(),
                "filename={output}".to_string(),
            ],
            output_dir: PathBuf::from("/tmp/captures"),
            grace_period: Duration::from_secs(1),
            pid: 4242,
        });

        let args = backend.expand_args(
            std::path::Path::new("/tmp/captures/capture-1-cpu.data"),
            Duration::from_secs(30),
        );

        assert_eq!(
            args,
            vec![
                "4242",
                "JFR.start",
                "duration=30s",
                "filename=/tmp/captures/capture-1-cpu.data"
            ]
        );
    }

    #[tokio::test]
    async fn test_successful_capture() {
        let dir = TempDir::new().unwrap();
        let backend = shell_backend(&dir, "printf profile > {output}");

        let handle = backend
            .start_capture(Signal::Cpu, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(backend.active(), 1);
        assert!(handle.output.ends_with("capture-1-cpu.data"));

        let recorded = backend.stop_capture(handle).await.unwrap();
        assert_eq!(recorded.size_bytes, 7);
        assert_eq!(backend.active(), 0);
    }

    #[tokio::test]
    async fn test_failed_command() {
        let dir = TempDir::new().unwrap();
        let backend = shell_backend(&dir, "printf partial > {output}; exit 3");

        let handle = backend
            .start_capture(Signal::Memory, Duration::from_secs(1))
            .await
            .unwrap();
        let output = handle.output.clone();

        let err = backend.stop_capture(handle).await.unwrap_err();
        assert!(matches!(err, CaptureError::CommandFailed { .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_wait_error_discards_output() {
        let dir = TempDir::new().unwrap();
        let backend = shell_backend(&dir, "true");
        let output = dir.path().join("capture-7-cpu.data");
        std::fs::write(&output, b"partial").unwrap();

        let handle = CaptureHandle {
            id: 7,
            signal: Signal::Cpu,
            output: output.clone(),
            started_at: Utc::now(),
        };
        let waited = Err(std::io::Error::new(std::io::ErrorKind::Other, "wait failed"));

        let err = backend.finish(handle, waited).await.unwrap_err();
        assert!(matches!(err, CaptureError::Io(_)));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_still_running_is_incomplete() {
        let dir = TempDir::new().unwrap();
        let backend = shell_backend(&dir, "printf partial > {output}; sleep 30");

        let handle = backend
            .start_capture(Signal::Manual, Duration::from_secs(30))
            .await
            .unwrap();
        let output = handle.output.clone();

        let err = backend.stop_capture(handle).await.unwrap_err();
        assert!(matches!(err, CaptureError::Incomplete { id: 1 }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_missing_output() {
        let dir = TempDir::new().unwrap();
        let backend = shell_backend(&dir, "true");

        let handle = backend
            .start_capture(Signal::Periodic, Duration::from_secs(1))
            .await
            .unwrap();

        let err = backend.stop_capture(handle).await.unwrap_err();
        assert!(matches!(err, CaptureError::MissingOutput { .. }));
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let dir = TempDir::new().unwrap();
        let backend = shell_backend(&dir, "true");

        let err = backend
            .stop_capture(CaptureHandle {
                id: 99,
                signal: Signal::Cpu,
                output: dir.path().join("nothing"),
                started_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::UnknownCapture { id: 99 }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = TempDir::new().unwrap();
        let backend = CommandCaptureBackend::new(CommandCaptureConfig::new(
            "definitely-not-a-profiler-binary",
            Vec::new(),
            dir.path(),
        ));

        let err = backend
            .start_capture(Signal::Cpu, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Spawn { .. }));
    }
}
