//! ---
//! awm_section: "02-telemetry-acquisition"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Telemetry acquisition pipeline and job scheduling."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use airwatch_common::config::AcquisitionConfig;

/// Upper bound on upstream text quoted into log lines.
const LOG_TRUNCATE: usize = 1000;

/// Failure modes of one metering-reader invocation.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("failed to spawn reader process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("reader process exceeded the {0:?} wall-clock budget")]
    Timeout(Duration),
    #[error("reader process exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("reader emitted {bytes} bytes, over the {limit} byte cap")]
    OversizedOutput { bytes: usize, limit: usize },
}

/// Captured output of a successful reader invocation.
#[derive(Debug, Clone)]
pub struct ReaderOutput {
    pub stdout: String,
    pub elapsed: Duration,
}

/// Invokes the external metering-reader process.
///
/// The reader takes no arguments beyond its configured command line and must
/// emit exactly one JSON document on stdout. A stuck reader is bounded by
/// the wall-clock timeout here, not by caller-side cancellation.
#[derive(Debug, Clone)]
pub struct MeterReader {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    max_output_bytes: usize,
}

impl MeterReader {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
        max_output_bytes: usize,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self::new(
            config.reader_command.clone(),
            config.reader_args.clone(),
            config.reader_timeout,
            config.max_output_bytes,
        )
    }

    /// Run the reader once. Dropping the in-flight future (on timeout)
    /// kills the child process.
    pub async fn invoke(&self) -> Result<ReaderOutput, ReaderError> {
        let started = Instant::now();
        debug!(command = %self.command, "invoking metering reader");

        let output_future = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output_future)
            .await
            .map_err(|_| ReaderError::Timeout(self.timeout))?
            .map_err(ReaderError::Spawn)?;

        let elapsed = started.elapsed();
        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(stderr = %truncate(&stderr), "reader stderr output");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReaderError::NonZeroExit {
                code: output.status.code(),
                stderr: truncate(&stderr).into_owned(),
            });
        }

        if output.stdout.len() > self.max_output_bytes {
            return Err(ReaderError::OversizedOutput {
                bytes: output.stdout.len(),
                limit: self.max_output_bytes,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(bytes = stdout.len(), elapsed_ms = elapsed.as_millis() as u64, "reader completed");
        Ok(ReaderOutput { stdout, elapsed })
    }
}

fn truncate(text: &str) -> std::borrow::Cow<'_, str> {
    if text.len() <= LOG_TRUNCATE {
        std::borrow::Cow::Borrowed(text)
    } else {
        let mut end = LOG_TRUNCATE;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        std::borrow::Cow::Owned(format!("{}...", &text[..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(command: &str, args: &[&str], timeout_ms: u64) -> MeterReader {
        MeterReader::new(
            command,
            args.iter().map(|s| s.to_string()).collect(),
            Duration::from_millis(timeout_ms),
            1024,
        )
    }

    #[tokio::test]
    async fn captures_stdout_of_a_clean_exit() {
        let output = reader("echo", &["{\"status\":\"success\"}"], 5000)
            .invoke()
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "{\"status\":\"success\"}");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_process_error() {
        let err = reader("false", &[], 5000).invoke().await.unwrap_err();
        assert!(matches!(err, ReaderError::NonZeroExit { .. }));
    }

    #[tokio::test]
    async fn slow_reader_is_bounded_by_the_timeout() {
        let started = Instant::now();
        let err = reader("sleep", &["5"], 100).invoke().await.unwrap_err();
        assert!(matches!(err, ReaderError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn oversized_output_is_rejected() {
        let big = "x".repeat(4096);
        let err = reader("echo", &[big.as_str()], 5000)
            .invoke()
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::OversizedOutput { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let err = reader("/nonexistent/meter-reader", &[], 1000)
            .invoke()
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::Spawn(_)));
    }
}
