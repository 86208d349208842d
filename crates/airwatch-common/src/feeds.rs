//! ---
//! awm_section: "01-core-runtime"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Shared primitives and utilities for the AirWatch runtime."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
//! Seam traits between the monitoring core and its external collaborators.
//! The schedule service and the telemetry/alert stores are modelled as
//! already-correct data services; the core only ever consumes these traits,
//! which keeps every failure path mockable in tests.

use std::collections::HashMap;

use anyhow::Result;

use crate::model::{AlertRecord, PowerSample, ScheduleEntry, TelemetryRecord};

/// Outcome of a batched telemetry insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Records actually written.
    pub inserted: usize,
    /// Records suppressed because an identical record already exists.
    pub duplicates: usize,
}

/// Write side of the telemetry store, consumed by the acquisition pipeline.
pub trait TelemetrySink: Send + Sync {
    /// Insert a batch unordered. Duplicates are suppressed, not fatal.
    fn insert_batch(&self, records: &[TelemetryRecord]) -> Result<InsertOutcome>;
}

/// Read side of the telemetry store, consumed by the sensor projector.
pub trait SensorSource: Send + Sync {
    /// Latest fresh reading per channel. An empty map is a valid answer;
    /// an `Err` means the store itself could not be queried.
    fn latest_per_channel(&self) -> Result<HashMap<u32, PowerSample>>;
}

/// The external schedule service's read-only feed.
pub trait ScheduleSource: Send + Sync {
    fn fetch_all(&self) -> Result<Vec<ScheduleEntry>>;
}

/// Append-only alert history store.
pub trait AlertSink: Send + Sync {
    fn create(&self, room: &str, message: &str) -> Result<AlertRecord>;
}
