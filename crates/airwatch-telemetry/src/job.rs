//! ---
//! awm_section: "02-telemetry-acquisition"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Telemetry acquisition pipeline and job scheduling."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use airwatch_common::config::AcquisitionConfig;
use airwatch_common::feeds::TelemetrySink;
use airwatch_common::retry::{retry_with_policy, RetryPolicy};
use airwatch_metrics::AcquisitionMetrics;

use crate::pipeline::AcquisitionPipeline;

/// Releases the job's busy flag on every exit path of a cycle.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fires the acquisition pipeline on a fixed interval.
///
/// The busy flag is owned by this job instance. At most one cycle is ever
/// in flight: a tick arriving while the previous cycle still runs is
/// skipped outright, with no queueing and no second invocation.
pub struct AcquisitionJob<S: TelemetrySink + 'static> {
    pipeline: Arc<AcquisitionPipeline<S>>,
    interval: Duration,
    cycle_policy: RetryPolicy,
    busy: Arc<AtomicBool>,
    metrics: Option<AcquisitionMetrics>,
}

impl<S: TelemetrySink + 'static> AcquisitionJob<S> {
    pub fn new(
        pipeline: AcquisitionPipeline<S>,
        interval: Duration,
        cycle_policy: RetryPolicy,
        metrics: Option<AcquisitionMetrics>,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            interval,
            cycle_policy,
            busy: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }

    pub fn from_config(
        config: &AcquisitionConfig,
        pipeline: AcquisitionPipeline<S>,
        metrics: Option<AcquisitionMetrics>,
    ) -> Self {
        Self::new(
            pipeline,
            config.interval,
            RetryPolicy::linear(config.cycle_attempts, config.cycle_backoff),
            metrics,
        )
    }

    /// Start the tick loop. The loop ends on shutdown broadcast; a cycle
    /// already in flight at shutdown runs to completion on its own task.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs_f64(), "acquisition job scheduled");

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("acquisition job shutdown");
                        break;
                    }
                    _ = interval.tick() => {
                        if self
                            .busy
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_err()
                        {
                            debug!("previous acquisition cycle still running; skipping tick");
                            if let Some(metrics) = &self.metrics {
                                metrics.record_tick_skipped();
                            }
                            continue;
                        }

                        let guard = BusyGuard(self.busy.clone());
                        let pipeline = self.pipeline.clone();
                        let policy = self.cycle_policy;
                        tokio::spawn(async move {
                            let _guard = guard;
                            run_cycle(pipeline, policy).await;
                        });
                    }
                }
            }
        })
    }
}

async fn run_cycle<S: TelemetrySink>(pipeline: Arc<AcquisitionPipeline<S>>, policy: RetryPolicy) {
    let result = retry_with_policy(policy, "acquisition-cycle", |_| {
        let pipeline = pipeline.clone();
        async move { pipeline.run().await }
    })
    .await;

    match result {
        Ok(report) => {
            info!(
                status = report.status.as_str(),
                inserted = report.inserted,
                duplicates = report.duplicates,
                invalid = report.invalid,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "acquisition cycle complete"
            );
        }
        Err(err) => {
            error!(error = %err, "acquisition cycle failed after exhausting retries");
        }
    }
}
