//! ---
//! awm_section: "01-core-runtime"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Shared primitives and utilities for the AirWatch runtime."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{NaiveTime, Timelike};

/// Seconds elapsed since midnight for the provided wall-clock time.
pub fn seconds_of_day(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight())
}

/// Render a duration as fractional seconds for report payloads and logs.
pub fn elapsed_seconds(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_of_day_counts_from_midnight() {
        let t = NaiveTime::from_hms_opt(8, 0, 30).unwrap();
        assert_eq!(seconds_of_day(t), 8 * 3600 + 30);
    }

    #[test]
    fn elapsed_seconds_rounds_to_centis() {
        assert_eq!(elapsed_seconds(Duration::from_millis(1234)), 1.23);
    }
}
