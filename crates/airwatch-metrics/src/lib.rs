//! ---
//! awm_section: "03-persistence-logging"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Metrics collection and export utilities."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint. Returns `text/plain` metrics even on large registries.
async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_str(encoder.format_type())
                    .unwrap_or_else(|_| HeaderValue::from_static("text/plain")),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics published by the telemetry acquisition subsystem.
#[derive(Clone)]
pub struct AcquisitionMetrics {
    cycles_total: IntCounterVec,
    ticks_skipped: IntCounter,
    records_inserted: IntCounter,
    records_duplicate: IntCounter,
    records_invalid: IntCounter,
    cycle_duration: Histogram,
}

impl AcquisitionMetrics {
    /// Register all acquisition metrics with the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let cycles_total = IntCounterVec::new(
            Opts::new(
                "airwatch_acquisition_cycles_total",
                "Acquisition cycles completed, labelled by outcome status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let ticks_skipped = IntCounter::with_opts(Opts::new(
            "airwatch_acquisition_ticks_skipped_total",
            "Scheduler ticks skipped because the previous cycle was still running",
        ))?;
        registry.register(Box::new(ticks_skipped.clone()))?;

        let records_inserted = IntCounter::with_opts(Opts::new(
            "airwatch_telemetry_records_inserted_total",
            "Telemetry records successfully persisted",
        ))?;
        registry.register(Box::new(records_inserted.clone()))?;

        let records_duplicate = IntCounter::with_opts(Opts::new(
            "airwatch_telemetry_records_duplicate_total",
            "Telemetry records suppressed as duplicates on insert",
        ))?;
        registry.register(Box::new(records_duplicate.clone()))?;

        let records_invalid = IntCounter::with_opts(Opts::new(
            "airwatch_telemetry_records_invalid_total",
            "Raw readings rejected during validation",
        ))?;
        registry.register(Box::new(records_invalid.clone()))?;

        let buckets = prometheus::exponential_buckets(0.05, 2.0, 12)
            .context("failed to construct histogram buckets")?;
        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new(
                "airwatch_acquisition_cycle_seconds",
                "Wall-clock duration of one acquisition cycle",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(cycle_duration.clone()))?;

        Ok(Self {
            cycles_total,
            ticks_skipped,
            records_inserted,
            records_duplicate,
            records_invalid,
            cycle_duration,
        })
    }

    pub fn record_cycle(&self, status: &str, seconds: f64) {
        self.cycles_total.with_label_values(&[status]).inc();
        self.cycle_duration.observe(seconds);
    }

    pub fn record_tick_skipped(&self) {
        self.ticks_skipped.inc();
    }

    pub fn record_batch(&self, inserted: usize, duplicates: usize, invalid: usize) {
        self.records_inserted.inc_by(inserted as u64);
        self.records_duplicate.inc_by(duplicates as u64);
        self.records_invalid.inc_by(invalid as u64);
    }
}

impl std::fmt::Debug for AcquisitionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionMetrics").finish_non_exhaustive()
    }
}

/// Metrics published by the reconciliation/classification service.
#[derive(Clone)]
pub struct MonitorMetrics {
    critical_rooms: IntGauge,
    alerts_raised: IntCounter,
    sensor_failures: IntCounter,
    schedule_failures: IntCounter,
}

impl MonitorMetrics {
    /// Register all monitor metrics with the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let critical_rooms = IntGauge::with_opts(Opts::new(
            "airwatch_critical_rooms",
            "Rooms currently classified critical (AC on while vacant)",
        ))?;
        registry.register(Box::new(critical_rooms.clone()))?;

        let alerts_raised = IntCounter::with_opts(Opts::new(
            "airwatch_alerts_raised_total",
            "Waste alerts opened by the deduplication state machine",
        ))?;
        registry.register(Box::new(alerts_raised.clone()))?;

        let sensor_failures = IntCounter::with_opts(Opts::new(
            "airwatch_sensor_query_failures_total",
            "Sensor refresh cycles that degraded all rooms to AC-off",
        ))?;
        registry.register(Box::new(sensor_failures.clone()))?;

        let schedule_failures = IntCounter::with_opts(Opts::new(
            "airwatch_schedule_fetch_failures_total",
            "Schedule refresh cycles that degraded rooms to vacant",
        ))?;
        registry.register(Box::new(schedule_failures.clone()))?;

        Ok(Self {
            critical_rooms,
            alerts_raised,
            sensor_failures,
            schedule_failures,
        })
    }

    pub fn set_critical_rooms(&self, count: usize) {
        self.critical_rooms.set(count as i64);
    }

    pub fn record_alert_raised(&self) {
        self.alerts_raised.inc();
    }

    pub fn record_sensor_failure(&self) {
        self.sensor_failures.inc();
    }

    pub fn record_schedule_failure(&self) {
        self.schedule_failures.inc();
    }
}

impl std::fmt::Debug for MonitorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorMetrics").finish_non_exhaustive()
    }
}

pub use prometheus;
