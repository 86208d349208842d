//! ---
//! awm_section: "02-telemetry-acquisition"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Telemetry acquisition pipeline and job scheduling."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{error, info, warn};

use airwatch_common::config::AcquisitionConfig;
use airwatch_common::feeds::{InsertOutcome, TelemetrySink};
use airwatch_common::retry::{retry_with_policy, RetryPolicy};
use airwatch_common::time::elapsed_seconds;
use airwatch_metrics::AcquisitionMetrics;

use crate::payload::ReaderPayload;
use crate::reader::{MeterReader, ReaderError};
use crate::validate::transform_batch;

/// Outcome discriminator of one acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStatus {
    Success,
    NoValidData,
    NoInternet,
    DeviceError,
    DeviceDisconnected,
    Timeout,
    ProcessError,
    Unknown,
}

impl AcquisitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionStatus::Success => "success",
            AcquisitionStatus::NoValidData => "no_valid_data",
            AcquisitionStatus::NoInternet => "no_internet",
            AcquisitionStatus::DeviceError => "device_error",
            AcquisitionStatus::DeviceDisconnected => "device_disconnected",
            AcquisitionStatus::Timeout => "timeout",
            AcquisitionStatus::ProcessError => "process_error",
            AcquisitionStatus::Unknown => "unknown",
        }
    }
}

/// Structured summary of one acquisition cycle. Every expected failure mode
/// is a status here, never an `Err`.
#[derive(Debug, Clone)]
pub struct AcquisitionReport {
    pub status: AcquisitionStatus,
    pub inserted: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub elapsed: Duration,
    pub message: Option<String>,
}

impl AcquisitionReport {
    fn empty(status: AcquisitionStatus, elapsed: Duration, message: Option<String>) -> Self {
        Self {
            status,
            inserted: 0,
            duplicates: 0,
            invalid: 0,
            elapsed,
            message,
        }
    }
}

/// The acquisition pipeline: invoke the reader, decode its payload,
/// validate readings, and persist the batch with bounded retry.
pub struct AcquisitionPipeline<S: TelemetrySink> {
    reader: MeterReader,
    sink: Arc<S>,
    insert_policy: RetryPolicy,
    metrics: Option<AcquisitionMetrics>,
}

impl<S: TelemetrySink> AcquisitionPipeline<S> {
    pub fn new(
        reader: MeterReader,
        sink: Arc<S>,
        insert_policy: RetryPolicy,
        metrics: Option<AcquisitionMetrics>,
    ) -> Self {
        Self {
            reader,
            sink,
            insert_policy,
            metrics,
        }
    }

    pub fn from_config(
        config: &AcquisitionConfig,
        sink: Arc<S>,
        metrics: Option<AcquisitionMetrics>,
    ) -> Self {
        Self::new(
            MeterReader::from_config(config),
            sink,
            RetryPolicy::linear(config.insert_attempts, config.insert_backoff),
            metrics,
        )
    }

    /// Run one cycle. `Err` is reserved for genuinely unexpected failures;
    /// everything the reader or the store can plausibly do wrong comes back
    /// as a report status.
    pub async fn run(&self) -> Result<AcquisitionReport> {
        let started = Instant::now();

        let output = match self.reader.invoke().await {
            Ok(output) => output,
            Err(err @ ReaderError::Timeout(_)) => {
                warn!(error = %err, "metering reader timed out");
                return Ok(AcquisitionReport::empty(
                    AcquisitionStatus::Timeout,
                    started.elapsed(),
                    Some(err.to_string()),
                ));
            }
            Err(err) => {
                warn!(error = %err, "metering reader failed");
                return Ok(AcquisitionReport::empty(
                    AcquisitionStatus::ProcessError,
                    started.elapsed(),
                    Some(err.to_string()),
                ));
            }
        };

        let report = match ReaderPayload::decode(&output.stdout) {
            ReaderPayload::Success {
                execution_time,
                data,
            } => {
                self.ingest(data, execution_time, started).await
            }
            ReaderPayload::NoInternet { message, .. } => {
                info!(message = %message, "reader reports no internet connectivity");
                AcquisitionReport::empty(
                    AcquisitionStatus::NoInternet,
                    started.elapsed(),
                    Some(message),
                )
            }
            ReaderPayload::ApiError { message, .. } => {
                warn!(message = %message, "metering device api error");
                AcquisitionReport::empty(
                    AcquisitionStatus::DeviceError,
                    started.elapsed(),
                    Some(message),
                )
            }
            ReaderPayload::DeviceDisconnected {
                message,
                suggestion,
                ..
            } => {
                info!(message = %message, suggestion = ?suggestion, "metering device disconnected");
                AcquisitionReport::empty(
                    AcquisitionStatus::DeviceDisconnected,
                    started.elapsed(),
                    Some(message),
                )
            }
            ReaderPayload::Unknown { raw } => {
                error!(raw = %raw, "unrecognised reader payload");
                AcquisitionReport::empty(
                    AcquisitionStatus::Unknown,
                    started.elapsed(),
                    Some(raw),
                )
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(report.status.as_str(), report.elapsed.as_secs_f64());
        }
        Ok(report)
    }

    async fn ingest(
        &self,
        data: Vec<crate::payload::RawReading>,
        execution_time: Option<f64>,
        started: Instant,
    ) -> AcquisitionReport {
        let submitted = data.len();
        let (valid, invalid) = transform_batch(&data);
        if !invalid.is_empty() {
            warn!(
                rejected = invalid.len(),
                first_reason = %invalid[0].reason,
                "readings rejected during validation"
            );
        }

        if valid.is_empty() {
            return AcquisitionReport {
                status: AcquisitionStatus::NoValidData,
                inserted: 0,
                duplicates: 0,
                invalid: invalid.len(),
                elapsed: started.elapsed(),
                message: None,
            };
        }

        let outcome = match retry_with_policy(self.insert_policy, "telemetry-insert", |_| {
            std::future::ready(self.sink.insert_batch(&valid))
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                // Degrade to a zero-inserted result; the data for this cycle
                // is lost but the next tick starts clean.
                error!(error = %err, records = valid.len(), "all telemetry insert attempts failed");
                InsertOutcome::default()
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_batch(outcome.inserted, outcome.duplicates, invalid.len());
        }

        let elapsed = started.elapsed();
        info!(
            submitted,
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            invalid = invalid.len(),
            reader_secs = ?execution_time,
            elapsed_secs = elapsed_seconds(elapsed),
            "acquisition batch processed"
        );

        AcquisitionReport {
            status: AcquisitionStatus::Success,
            inserted: outcome.inserted,
            duplicates: outcome.duplicates,
            invalid: invalid.len(),
            elapsed,
            message: None,
        }
    }
}

impl<S: TelemetrySink> std::fmt::Debug for AcquisitionPipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionPipeline")
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}
