//! ---
//! awm_section: "01-core-runtime"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Shared primitives and utilities for the AirWatch runtime."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::fmt;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// School weekday. Schedules only exist for Monday through Friday; weekend
/// dates resolve to no weekday at all and therefore to vacancy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Weekday {
    /// Map a calendar weekday onto the schedule enum. Saturday and Sunday
    /// have no schedule representation.
    pub fn from_chrono(day: chrono::Weekday) -> Option<Self> {
        match day {
            chrono::Weekday::Mon => Some(Weekday::Monday),
            chrono::Weekday::Tue => Some(Weekday::Tuesday),
            chrono::Weekday::Wed => Some(Weekday::Wednesday),
            chrono::Weekday::Thu => Some(Weekday::Thursday),
            chrono::Weekday::Fri => Some(Weekday::Friday),
            chrono::Weekday::Sat | chrono::Weekday::Sun => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated power reading for a single metering channel.
///
/// Field names on the wire keep the metering device's casing so stored
/// records stay interchangeable with the reader output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub device_gid: i64,
    pub channel_num: u32,
    pub channel_name: String,
    #[serde(rename = "usage_kWh")]
    pub usage_kwh: f64,
    #[serde(rename = "usage_W")]
    pub usage_w: f64,
    pub percentage: f64,
}

impl TelemetryRecord {
    /// Identity used for duplicate suppression on insert.
    pub fn dedup_key(&self) -> (i64, u32, i64) {
        (
            self.device_gid,
            self.channel_num,
            self.timestamp.timestamp_millis(),
        )
    }
}

/// A single class-schedule slot for a room. Owned by the external schedule
/// service; read-only inside AirWatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub room: String,
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ScheduleEntry {
    /// Structural invariant: a slot must start before it ends.
    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(anyhow!(
                "schedule entry for room '{}' on {} has start {} >= end {}",
                self.room,
                self.weekday,
                self.start,
                self.end
            ));
        }
        Ok(())
    }
}

/// Observed state of a room's air conditioning circuit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AcState {
    On,
    Off,
}

impl AcState {
    pub fn is_on(&self) -> bool {
        matches!(self, AcState::On)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AcState::On => "on",
            AcState::Off => "off",
        }
    }
}

/// Schedule-derived occupancy of a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyState {
    Occupied,
    Vacant,
}

impl OccupancyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyState::Occupied => "occupied",
            OccupancyState::Vacant => "vacant",
        }
    }
}

/// Four-way room classification derived from AC state and occupancy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// AC running in a vacant room: energy is being wasted.
    Critical,
    /// AC running in an occupied room.
    Normal,
    /// Room occupied but the AC is off.
    Attention,
    /// Nothing running, nobody scheduled.
    Idle,
}

impl Classification {
    /// The classification table is total over both inputs.
    pub fn derive(ac: AcState, occupancy: OccupancyState) -> Self {
        match (ac, occupancy) {
            (AcState::On, OccupancyState::Vacant) => Classification::Critical,
            (AcState::On, OccupancyState::Occupied) => Classification::Normal,
            (AcState::Off, OccupancyState::Occupied) => Classification::Attention,
            (AcState::Off, OccupancyState::Vacant) => Classification::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Critical => "critical",
            Classification::Normal => "normal",
            Classification::Attention => "attention",
            Classification::Idle => "idle",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted waste alert. Append-only; resolutions are implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub room: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Most recent power observation for a metering channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub usage_w: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn classification_table_is_exact() {
        assert_eq!(
            Classification::derive(AcState::On, OccupancyState::Vacant),
            Classification::Critical
        );
        assert_eq!(
            Classification::derive(AcState::On, OccupancyState::Occupied),
            Classification::Normal
        );
        assert_eq!(
            Classification::derive(AcState::Off, OccupancyState::Occupied),
            Classification::Attention
        );
        assert_eq!(
            Classification::derive(AcState::Off, OccupancyState::Vacant),
            Classification::Idle
        );
    }

    #[test]
    fn weekend_has_no_schedule_weekday() {
        assert_eq!(Weekday::from_chrono(chrono::Weekday::Sat), None);
        assert_eq!(Weekday::from_chrono(chrono::Weekday::Sun), None);
        assert_eq!(
            Weekday::from_chrono(chrono::Weekday::Wed),
            Some(Weekday::Wednesday)
        );
    }

    #[test]
    fn record_serializes_with_device_casing() {
        let record = TelemetryRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap(),
            device_gid: 464590,
            channel_num: 3,
            channel_name: "C10".into(),
            usage_kwh: 0.1234,
            usage_w: 812.55,
            percentage: 41.2,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("usage_kWh").is_some());
        assert!(value.get("usage_W").is_some());
        let back: TelemetryRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn schedule_entry_rejects_inverted_range() {
        let entry = ScheduleEntry {
            room: "C7".into(),
            weekday: Weekday::Monday,
            start: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        };
        assert!(entry.validate().is_err());
    }
}
