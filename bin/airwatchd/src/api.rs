//! ---
//! awm_section: "05-runtime-daemon"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Read-only query API for the display layer."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use airwatch_common::model::{AlertRecord, TelemetryRecord};
use airwatch_monitor::{RoomStatus, RoomStatusService};
use airwatch_storage::{AlertLog, ScheduleFeed, TelemetryLog};

type Service = RoomStatusService<ScheduleFeed, TelemetryLog, AlertLog>;

struct ApiState {
    service: Arc<Service>,
    telemetry: Arc<TelemetryLog>,
    alerts: Arc<AlertLog>,
}

/// Serve the read-only query endpoints consumed by the display layer. All
/// three return data the core has already reconciled or stored; nothing
/// here mutates state.
pub fn spawn_api_server(
    service: Arc<Service>,
    telemetry: Arc<TelemetryLog>,
    alerts: Arc<AlertLog>,
    addr: SocketAddr,
) -> Result<ApiServer> {
    let state = Arc::new(ApiState {
        service,
        telemetry,
        alerts,
    });
    let app = Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/alerts", get(alerts_handler))
        .route("/api/telemetry", get(telemetry_handler))
        .with_state(state);

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind api listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure api listener as non-blocking")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %addr, "api server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("api server encountered an error")?;
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task,
    })
}

async fn status_handler(State(state): State<Arc<ApiState>>) -> Json<Vec<RoomStatus>> {
    Json(state.service.current_status())
}

async fn alerts_handler(State(state): State<Arc<ApiState>>) -> Json<Vec<AlertRecord>> {
    Json(state.alerts.history())
}

async fn telemetry_handler(State(state): State<Arc<ApiState>>) -> Json<Vec<TelemetryRecord>> {
    Json(state.telemetry.recent())
}

/// Handle to the running query API.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
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
