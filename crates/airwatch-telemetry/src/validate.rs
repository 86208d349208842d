//! ---
//! awm_section: "02-telemetry-acquisition"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Telemetry acquisition pipeline and job scheduling."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use airwatch_common::model::TelemetryRecord;

use crate::payload::RawReading;

/// Accepted legacy timestamp formats, tried in order after RFC 3339 and
/// numeric epochs. The list is deliberately explicit so acceptance behaviour
/// stays auditable.
pub const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
];

/// Epoch values at or above this magnitude are interpreted as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

const MAX_CHANNEL_NAME_LEN: usize = 50;

/// A reading rejected during validation, kept with its reason and original
/// payload for diagnosis. Rejection never aborts the batch.
#[derive(Debug, Clone)]
pub struct InvalidReading {
    pub index: usize,
    pub reason: String,
    pub raw: RawReading,
}

/// Transform and validate a raw batch independently per record. Only an
/// unparseable timestamp rejects a record; every numeric field is coerced
/// and clamped into range instead.
pub fn transform_batch(readings: &[RawReading]) -> (Vec<TelemetryRecord>, Vec<InvalidReading>) {
    let mut valid = Vec::with_capacity(readings.len());
    let mut invalid = Vec::new();

    for (index, raw) in readings.iter().enumerate() {
        let Some(timestamp) = parse_timestamp(raw.timestamp.as_ref()) else {
            invalid.push(InvalidReading {
                index,
                reason: "unparseable timestamp".to_owned(),
                raw: raw.clone(),
            });
            continue;
        };

        let channel_num = match coerce_i64(raw.channel_num.as_ref()) {
            Some(n) if n >= 1 => n as u32,
            _ => (index + 1) as u32,
        };
        let channel_name = match raw.channel_name.as_ref().and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => cap_name(name.trim()),
            _ => format!("channel-{}", index + 1),
        };

        valid.push(TelemetryRecord {
            timestamp,
            device_gid: coerce_i64(raw.device_gid.as_ref()).unwrap_or(0).max(0),
            channel_num,
            channel_name,
            usage_kwh: round_to(non_negative(coerce_f64(raw.usage_kwh.as_ref())), 4),
            usage_w: round_to(non_negative(coerce_f64(raw.usage_w.as_ref())), 2),
            percentage: round_to(non_negative(coerce_f64(raw.percentage.as_ref())).min(100.0), 1),
        });
    }

    (valid, invalid)
}

/// Parse a timestamp value, first match wins: RFC 3339, numeric epoch
/// (seconds or milliseconds), then each entry of [`TIMESTAMP_FORMATS`]
/// interpreted as UTC.
pub fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(number) => {
            let epoch = number.as_f64()?;
            if !epoch.is_finite() || epoch <= 0.0 {
                return None;
            }
            let millis = if epoch >= EPOCH_MILLIS_THRESHOLD as f64 {
                epoch as i64
            } else {
                (epoch * 1000.0) as i64
            };
            DateTime::<Utc>::from_timestamp_millis(millis)
        }
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            for format in TIMESTAMP_FORMATS {
                if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                    return Some(naive.and_utc());
                }
            }
            None
        }
        _ => None,
    }
}

fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn coerce_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn non_negative(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.max(0.0),
        _ => 0.0,
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn cap_name(name: &str) -> String {
    if name.chars().count() <= MAX_CHANNEL_NAME_LEN {
        name.to_owned()
    } else {
        name.chars().take(MAX_CHANNEL_NAME_LEN).collect()
    }
}
