//! ---
//! awm_section: "05-runtime-daemon"
//! awm_subsection: "binary"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Binary entrypoint for the AirWatch daemon."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use airwatch_common::config::AppConfig;
use airwatch_common::logging::init_tracing;
use airwatch_metrics::{new_registry, spawn_http_server, AcquisitionMetrics, MonitorMetrics};
use airwatch_monitor::RoomStatusService;
use airwatch_storage::{AlertLog, ScheduleFeed, TelemetryLog};
use airwatch_telemetry::{AcquisitionJob, AcquisitionPipeline};

mod api;

const TELEMETRY_FILE: &str = "telemetry.jsonl";
const ALERTS_FILE: &str = "alerts.jsonl";
const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Parser)]
#[command(author, version, about = "AirWatch daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the monitoring daemon")]
    Run,
    #[command(about = "Delete telemetry older than the retention threshold and exit")]
    Sweep {
        #[arg(long, help = "Override the configured retention threshold in days")]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.prod.toml"));
    candidates.push(PathBuf::from("configs/example.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    init_tracing("airwatchd", &config.logging)?;
    info!(config_path = %loaded.source.display(), "configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
        Commands::Sweep { days } => run_sweep(config, days),
    }
}

fn open_telemetry_log(config: &AppConfig) -> Result<TelemetryLog> {
    Ok(TelemetryLog::open(
        &config.storage.data_dir.join(TELEMETRY_FILE),
        config.monitor.sensor_freshness,
        config.storage.query_limit,
    )?)
}

fn run_sweep(config: AppConfig, days: Option<u32>) -> Result<()> {
    let telemetry = open_telemetry_log(&config)?;
    let days = days.unwrap_or(config.storage.retention_days);
    let deleted = telemetry.sweep_older_than(days)?;
    info!(deleted, days, "retention sweep complete");
    println!("Deleted: {} (older than {} days)", deleted, days);
    Ok(())
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let registry = new_registry();
    let acquisition_metrics = AcquisitionMetrics::new(registry.clone())?;
    let monitor_metrics = MonitorMetrics::new(registry.clone())?;

    let metrics_server = if config.metrics.enabled {
        match spawn_http_server(registry.clone(), config.metrics.listen) {
            Ok(server) => {
                info!(address = %server.addr(), "metrics exporter enabled");
                Some(server)
            }
            Err(err) => {
                warn!(error = %err, "failed to start metrics exporter");
                None
            }
        }
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let telemetry_log = Arc::new(open_telemetry_log(&config)?);
    let alert_log = Arc::new(AlertLog::open(&config.storage.data_dir.join(ALERTS_FILE))?);
    let schedule_feed = Arc::new(ScheduleFeed::new(&config.monitor.schedule_feed));

    let (shutdown_tx, _) = broadcast::channel(16);

    let pipeline = AcquisitionPipeline::from_config(
        &config.acquisition,
        telemetry_log.clone(),
        Some(acquisition_metrics.clone()),
    );
    let job = AcquisitionJob::from_config(&config.acquisition, pipeline, Some(acquisition_metrics));
    let job_task = job.spawn(shutdown_tx.subscribe());

    let service = Arc::new(RoomStatusService::new(
        &config.monitor,
        schedule_feed,
        telemetry_log.clone(),
        alert_log.clone(),
        Some(monitor_metrics),
    ));
    let monitor_handle = service.clone().spawn(shutdown_tx.subscribe());

    let sweep_task = spawn_retention_sweep(
        telemetry_log.clone(),
        config.storage.retention_days,
        shutdown_tx.subscribe(),
    );

    let api_server = if config.api.enabled {
        match api::spawn_api_server(
            service.clone(),
            telemetry_log.clone(),
            alert_log.clone(),
            config.api.listen,
        ) {
            Ok(server) => {
                info!(address = %server.addr(), "api server listening");
                Some(server)
            }
            Err(err) => {
                warn!(error = %err, "failed to start api server; monitoring continues");
                None
            }
        }
    } else {
        info!("api server disabled by configuration");
        None
    };

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    let _ = shutdown_tx.send(());

    if let Err(err) = job_task.await {
        warn!(error = %err, "acquisition job join error");
    }
    monitor_handle.join().await;
    if let Err(err) = sweep_task.await {
        warn!(error = %err, "retention sweep task join error");
    }
    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    if let Some(server) = api_server {
        server.shutdown().await?;
    }

    info!("daemon shutdown complete");
    Ok(())
}

fn spawn_retention_sweep(
    telemetry: Arc<TelemetryLog>,
    retention_days: u32,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = interval.tick() => {
                    match telemetry.sweep_older_than(retention_days) {
                        Ok(0) => {}
                        Ok(deleted) => info!(deleted, retention_days, "retention sweep complete"),
                        Err(err) => warn!(error = %err, "retention sweep failed"),
                    }
                }
            }
        }
    })
}
