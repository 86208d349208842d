//! ---
//! awm_section: "15-testing-qa-runbook"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Integration tests for the room status service."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::bail;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use parking_lot::Mutex;

use airwatch_common::config::{ChannelMapEntry, Floor, MonitorConfig, RoomConfig};
use airwatch_common::feeds::{AlertSink, ScheduleSource, SensorSource};
use airwatch_common::model::{
    AcState, AlertRecord, Classification, PowerSample, ScheduleEntry, Weekday,
};
use airwatch_monitor::RoomStatusService;

struct FakeSchedule {
    fail: AtomicBool,
    entries: Mutex<Vec<ScheduleEntry>>,
}

impl FakeSchedule {
    fn new(entries: Vec<ScheduleEntry>) -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            entries: Mutex::new(entries),
        })
    }
}

impl ScheduleSource for FakeSchedule {
    fn fetch_all(&self) -> anyhow::Result<Vec<ScheduleEntry>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("schedule service unreachable");
        }
        Ok(self.entries.lock().clone())
    }
}

struct FakeSensor {
    fail: AtomicBool,
    samples: Mutex<HashMap<u32, PowerSample>>,
}

impl FakeSensor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            samples: Mutex::new(HashMap::new()),
        })
    }

    fn set_power(&self, channel: u32, watts: f64) {
        self.samples.lock().insert(
            channel,
            PowerSample {
                usage_w: watts,
                timestamp: Utc::now(),
            },
        );
    }
}

impl SensorSource for FakeSensor {
    fn latest_per_channel(&self) -> anyhow::Result<HashMap<u32, PowerSample>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("device unreachable");
        }
        Ok(self.samples.lock().clone())
    }
}

struct FakeAlerts {
    fail: AtomicBool,
    created: Mutex<Vec<AlertRecord>>,
}

impl FakeAlerts {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
        })
    }
}

impl AlertSink for FakeAlerts {
    fn create(&self, room: &str, message: &str) -> anyhow::Result<AlertRecord> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("alert store down");
        }
        let record = AlertRecord {
            room: room.to_owned(),
            message: message.to_owned(),
            created_at: Utc::now(),
        };
        self.created.lock().push(record.clone());
        Ok(record)
    }
}

fn config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.rooms = vec![
        RoomConfig {
            room: "C14".into(),
            floor: Floor::Upper,
        },
        RoomConfig {
            room: "C13".into(),
            floor: Floor::Upper,
        },
        RoomConfig {
            room: "C1".into(),
            floor: Floor::Lower,
        },
    ];
    config.channels = vec![
        ChannelMapEntry {
            channel: 1,
            room: "C14".into(),
        },
        ChannelMapEntry {
            channel: 2,
            room: "C13".into(),
        },
    ];
    config
}

fn slot(room: &str, start: (u32, u32), end: (u32, u32)) -> ScheduleEntry {
    ScheduleEntry {
        room: room.into(),
        weekday: Weekday::Monday,
        start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
        end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
    }
}

fn monday_at(hour: u32, minute: u32) -> NaiveDateTime {
    // 2024-05-06 is a Monday.
    NaiveDate::from_ymd_opt(2024, 5, 6)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn classification_of(
    statuses: &[airwatch_monitor::RoomStatus],
    room: &str,
) -> Classification {
    statuses
        .iter()
        .find(|status| status.room == room)
        .unwrap()
        .classification
}

#[test]
fn classification_reflects_schedule_and_power() {
    let schedule = FakeSchedule::new(vec![slot("C13", (8, 0), (9, 0))]);
    let sensor = FakeSensor::new();
    let alerts = FakeAlerts::new();
    sensor.set_power(1, 500.0);
    sensor.set_power(2, 300.0);

    let service = RoomStatusService::new(
        &config(),
        schedule,
        sensor,
        alerts.clone(),
        None,
    );
    service.refresh_schedules();
    service.refresh_sensors_at(monday_at(8, 30));

    let statuses = service.current_status();
    assert_eq!(classification_of(&statuses, "C14"), Classification::Critical);
    assert_eq!(classification_of(&statuses, "C13"), Classification::Normal);
    assert_eq!(classification_of(&statuses, "C1"), Classification::Idle);

    let created = alerts.created.lock();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].room, "C14");
    assert!(created[0].message.contains("C14"));
}

#[test]
fn occupied_room_with_ac_off_needs_attention() {
    let schedule = FakeSchedule::new(vec![slot("C13", (8, 0), (9, 0))]);
    let sensor = FakeSensor::new();
    sensor.set_power(2, 0.2);
    let service = RoomStatusService::new(
        &config(),
        schedule,
        sensor,
        FakeAlerts::new(),
        None,
    );
    service.refresh_schedules();
    service.refresh_sensors_at(monday_at(8, 30));

    let statuses = service.current_status();
    assert_eq!(
        classification_of(&statuses, "C13"),
        Classification::Attention
    );
}

#[test]
fn sensor_failure_degrades_all_rooms_to_off() {
    let schedule = FakeSchedule::new(Vec::new());
    let sensor = FakeSensor::new();
    let alerts = FakeAlerts::new();
    sensor.set_power(1, 900.0);

    let service = RoomStatusService::new(
        &config(),
        schedule,
        sensor.clone(),
        alerts.clone(),
        None,
    );
    service.refresh_schedules();
    service.refresh_sensors_at(monday_at(10, 0));
    assert_eq!(
        classification_of(&service.current_status(), "C14"),
        Classification::Critical
    );

    sensor.fail.store(true, Ordering::SeqCst);
    service.refresh_sensors_at(monday_at(10, 1));

    let statuses = service.current_status();
    assert!(statuses.iter().all(|s| s.ac_state == AcState::Off));
    assert!(statuses.iter().all(|s| s.power_w == 0.0));
    assert_eq!(alerts.created.lock().len(), 1);
}

#[test]
fn schedule_failure_degrades_rooms_to_vacant() {
    let schedule = FakeSchedule::new(vec![slot("C13", (8, 0), (9, 0))]);
    let sensor = FakeSensor::new();
    let service = RoomStatusService::new(
        &config(),
        schedule.clone(),
        sensor,
        FakeAlerts::new(),
        None,
    );
    service.refresh_schedules();
    service.refresh_sensors_at(monday_at(8, 30));
    assert_eq!(
        classification_of(&service.current_status(), "C13"),
        Classification::Attention
    );

    schedule.fail.store(true, Ordering::SeqCst);
    service.refresh_schedules();
    service.refresh_sensors_at(monday_at(8, 31));
    assert_eq!(
        classification_of(&service.current_status(), "C13"),
        Classification::Idle
    );
}

#[test]
fn sustained_critical_raises_exactly_two_alerts_across_a_flap() {
    let schedule = FakeSchedule::new(Vec::new());
    let sensor = FakeSensor::new();
    let alerts = FakeAlerts::new();
    let service = RoomStatusService::new(
        &config(),
        schedule,
        sensor.clone(),
        alerts.clone(),
        None,
    );
    service.refresh_schedules();

    // critical, critical, critical, idle, critical
    for (minute, watts) in [(0u32, 400.0), (1, 400.0), (2, 400.0), (3, 0.0), (4, 400.0)] {
        sensor.set_power(1, watts);
        service.refresh_sensors_at(monday_at(10, minute));
    }

    assert_eq!(alerts.created.lock().len(), 2);
}

#[test]
fn alert_sink_failure_never_disturbs_the_state_machine() {
    let schedule = FakeSchedule::new(Vec::new());
    let sensor = FakeSensor::new();
    let alerts = FakeAlerts::new();
    alerts.fail.store(true, Ordering::SeqCst);
    sensor.set_power(1, 800.0);

    let service = RoomStatusService::new(
        &config(),
        schedule,
        sensor,
        alerts.clone(),
        None,
    );
    service.refresh_schedules();
    service.refresh_sensors_at(monday_at(10, 0));
    // Still flagged: the second cycle must not attempt a duplicate alert.
    service.refresh_sensors_at(monday_at(10, 1));

    assert_eq!(alerts.created.lock().len(), 0);
    assert_eq!(
        classification_of(&service.current_status(), "C14"),
        Classification::Critical
    );
}

#[test]
fn status_covers_every_configured_room() {
    let service = RoomStatusService::new(
        &config(),
        FakeSchedule::new(Vec::new()),
        FakeSensor::new(),
        FakeAlerts::new(),
        None,
    );
    let statuses = service.current_status();
    assert_eq!(statuses.len(), 3);
    assert!(statuses
        .iter()
        .all(|s| s.classification == Classification::Idle));
    assert!(statuses.iter().any(|s| s.floor == Floor::Lower));
}
