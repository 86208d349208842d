//! ---
//! awm_section: "04-occupancy-monitoring"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Occupancy reconciliation and alert deduplication."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use airwatch_common::config::{Floor, MonitorConfig};
use airwatch_common::feeds::{AlertSink, ScheduleSource, SensorSource};
use airwatch_common::model::{AcState, Classification, OccupancyState, ScheduleEntry};
use airwatch_metrics::MonitorMetrics;

use crate::alerts::{AlertDeduper, AlertTransition};
use crate::occupancy::OccupancyOracle;
use crate::projector::SensorProjector;

/// Reconciled per-room status exposed read-only to the display layer.
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room: String,
    pub floor: Floor,
    pub ac_state: AcState,
    pub occupancy: OccupancyState,
    pub classification: Classification,
    pub power_w: f64,
}

#[derive(Debug, Clone)]
struct RoomSlot {
    floor: Floor,
    ac_state: AcState,
    occupancy: OccupancyState,
    classification: Classification,
    power_w: f64,
}

/// The authoritative room-status service.
///
/// Two pollers share this instance: the slow one refreshes the schedule
/// cache, the fast one refreshes sensor state and recomputes every room's
/// classification, driving the alert state machine. They write disjoint
/// state; each lock section is short and never spans store IO.
pub struct RoomStatusService<Sch, Sen, Al>
where
    Sch: ScheduleSource + 'static,
    Sen: SensorSource + 'static,
    Al: AlertSink + 'static,
{
    oracle: OccupancyOracle,
    projector: SensorProjector,
    schedule_source: Arc<Sch>,
    sensor_source: Arc<Sen>,
    alert_sink: Arc<Al>,
    schedule_interval: Duration,
    sensor_interval: Duration,
    schedules: Mutex<HashMap<String, Vec<ScheduleEntry>>>,
    table: Mutex<IndexMap<String, RoomSlot>>,
    deduper: Mutex<AlertDeduper>,
    metrics: Option<MonitorMetrics>,
}

impl<Sch, Sen, Al> RoomStatusService<Sch, Sen, Al>
where
    Sch: ScheduleSource + 'static,
    Sen: SensorSource + 'static,
    Al: AlertSink + 'static,
{
    pub fn new(
        config: &MonitorConfig,
        schedule_source: Arc<Sch>,
        sensor_source: Arc<Sen>,
        alert_sink: Arc<Al>,
        metrics: Option<MonitorMetrics>,
    ) -> Self {
        let table: IndexMap<String, RoomSlot> = config
            .rooms
            .iter()
            .map(|room| {
                (
                    room.room.clone(),
                    RoomSlot {
                        floor: room.floor,
                        ac_state: AcState::Off,
                        occupancy: OccupancyState::Vacant,
                        classification: Classification::Idle,
                        power_w: 0.0,
                    },
                )
            })
            .collect();

        Self {
            oracle: OccupancyOracle::new(config.occupancy_margin),
            projector: SensorProjector::from_config(config),
            schedule_source,
            sensor_source,
            alert_sink,
            schedule_interval: config.schedule_interval,
            sensor_interval: config.sensor_interval,
            schedules: Mutex::new(HashMap::new()),
            table: Mutex::new(table),
            deduper: Mutex::new(AlertDeduper::new()),
            metrics,
        }
    }

    /// Slow-poller step: replace the schedule cache from the feed. A fetch
    /// failure clears the cache so affected rooms degrade to vacant; the
    /// loop itself never aborts.
    pub fn refresh_schedules(&self) {
        match self.schedule_source.fetch_all() {
            Ok(entries) => {
                let mut grouped: HashMap<String, Vec<ScheduleEntry>> = HashMap::new();
                let total = entries.len();
                for entry in entries {
                    grouped.entry(entry.room.clone()).or_default().push(entry);
                }
                *self.schedules.lock() = grouped;
                debug!(entries = total, "schedule cache refreshed");
            }
            Err(err) => {
                warn!(error = %err, "schedule fetch failed; degrading to vacant");
                if let Some(metrics) = &self.metrics {
                    metrics.record_schedule_failure();
                }
                self.schedules.lock().clear();
            }
        }
    }

    /// Fast-poller step at the current wall-clock time.
    pub fn refresh_sensors(&self) {
        self.refresh_sensors_at(Local::now().naive_local());
    }

    /// Fast-poller step: project AC state, recompute every room's
    /// classification from the two cached inputs, and drive the alert
    /// machine. A sensor-query failure degrades every room to `off` rather
    /// than retaining a stale `on`.
    pub fn refresh_sensors_at(&self, now: NaiveDateTime) {
        let projected = match self.sensor_source.latest_per_channel() {
            Ok(latest) => self.projector.project(&latest),
            Err(err) => {
                warn!(error = %err, "sensor query failed; degrading all rooms to off");
                if let Some(metrics) = &self.metrics {
                    metrics.record_sensor_failure();
                }
                IndexMap::new()
            }
        };

        let schedules = self.schedules.lock().clone();
        let mut critical_rooms = 0usize;
        let mut raised = Vec::new();
        {
            let mut table = self.table.lock();
            let mut deduper = self.deduper.lock();
            for (room, slot) in table.iter_mut() {
                let (ac_state, power_w) = projected
                    .get(room)
                    .copied()
                    .unwrap_or((AcState::Off, 0.0));
                let entries = schedules.get(room).map(Vec::as_slice).unwrap_or(&[]);
                let occupancy = if self.oracle.is_occupied(entries, now) {
                    OccupancyState::Occupied
                } else {
                    OccupancyState::Vacant
                };
                let classification = Classification::derive(ac_state, occupancy);

                slot.ac_state = ac_state;
                slot.power_w = power_w;
                slot.occupancy = occupancy;
                slot.classification = classification;
                if classification == Classification::Critical {
                    critical_rooms += 1;
                }

                match deduper.observe(room, classification) {
                    AlertTransition::Raised => raised.push(room.clone()),
                    AlertTransition::Cleared => {
                        debug!(room = %room, "critical condition cleared");
                    }
                    AlertTransition::StillOpen | AlertTransition::Idle => {}
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.set_critical_rooms(critical_rooms);
        }

        // Alert persistence is best-effort: a failing sink must never block
        // or retry the classification cycle.
        for room in raised {
            info!(room = %room, "raising waste alert");
            if let Some(metrics) = &self.metrics {
                metrics.record_alert_raised();
            }
            let message = format!(
                "Room {} has the air conditioning running while vacant.",
                room
            );
            if let Err(err) = self.alert_sink.create(&room, &message) {
                warn!(room = %room, error = %err, "failed to persist alert; continuing");
            }
        }
    }

    /// Snapshot of the reconciled per-room classification.
    pub fn current_status(&self) -> Vec<RoomStatus> {
        self.table
            .lock()
            .iter()
            .map(|(room, slot)| RoomStatus {
                room: room.clone(),
                floor: slot.floor,
                ac_state: slot.ac_state,
                occupancy: slot.occupancy,
                classification: slot.classification,
                power_w: slot.power_w,
            })
            .collect()
    }

    /// Start both pollers. Each runs until the shutdown broadcast fires.
    pub fn spawn(self: Arc<Self>, shutdown: broadcast::Receiver<()>) -> MonitorHandle {
        let schedule_service = self.clone();
        let mut schedule_shutdown = shutdown.resubscribe();
        let schedule_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(schedule_service.schedule_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = schedule_shutdown.recv() => {
                        debug!("schedule poller shutdown");
                        break;
                    }
                    _ = interval.tick() => {
                        schedule_service.refresh_schedules();
                    }
                }
            }
        });

        let sensor_service = self;
        let mut sensor_shutdown = shutdown;
        let sensor_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sensor_service.sensor_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = sensor_shutdown.recv() => {
                        debug!("sensor poller shutdown");
                        break;
                    }
                    _ = interval.tick() => {
                        sensor_service.refresh_sensors();
                    }
                }
            }
        });

        info!("room status service started");
        MonitorHandle {
            schedule_task,
            sensor_task,
        }
    }
}

impl<Sch, Sen, Al> std::fmt::Debug for RoomStatusService<Sch, Sen, Al>
where
    Sch: ScheduleSource + 'static,
    Sen: SensorSource + 'static,
    Al: AlertSink + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomStatusService").finish_non_exhaustive()
    }
}

/// Handle over the two poller tasks.
#[derive(Debug)]
pub struct MonitorHandle {
    schedule_task: JoinHandle<()>,
    sensor_task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Await both pollers after shutdown has been signalled.
    pub async fn join(self) {
        if let Err(err) = self.schedule_task.await {
            error!(error = %err, "schedule poller join error");
        }
        if let Err(err) = self.sensor_task.await {
            error!(error = %err, "sensor poller join error");
        }
    }
}
