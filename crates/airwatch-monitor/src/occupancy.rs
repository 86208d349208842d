//! ---
//! awm_section: "04-occupancy-monitoring"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Occupancy reconciliation and alert deduplication."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{Datelike, NaiveDateTime};

use airwatch_common::model::{ScheduleEntry, Weekday};
use airwatch_common::time::seconds_of_day;

/// Decides room occupancy from schedule entries and the current time.
///
/// Pure: no clock access, no side effects. Callers pass `now` explicitly,
/// which keeps every boundary condition testable.
#[derive(Debug, Clone, Copy)]
pub struct OccupancyOracle {
    margin: Duration,
}

impl OccupancyOracle {
    /// `margin` widens every slot on both ends, tolerating classes that
    /// start a little early or run a little late.
    pub fn new(margin: Duration) -> Self {
        Self { margin }
    }

    /// A room is occupied iff `now` falls within `[start - margin,
    /// end + margin]` of any entry on `now`'s weekday. Weekend dates and
    /// rooms without entries are vacant by definition.
    pub fn is_occupied(&self, entries: &[ScheduleEntry], now: NaiveDateTime) -> bool {
        let Some(weekday) = Weekday::from_chrono(now.weekday()) else {
            return false;
        };
        let now_secs = seconds_of_day(now.time());
        let margin_secs = self.margin.as_secs() as i64;

        entries.iter().any(|entry| {
            if entry.weekday != weekday {
                return false;
            }
            let start = seconds_of_day(entry.start) - margin_secs;
            let end = seconds_of_day(entry.end) + margin_secs;
            now_secs >= start && now_secs <= end
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn monday_slot() -> ScheduleEntry {
        ScheduleEntry {
            room: "C7".into(),
            weekday: Weekday::Monday,
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        }
    }

    fn monday_at(hour: u32, minute: u32) -> NaiveDateTime {
        // 2024-05-06 is a Monday.
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn margin_widens_the_slot_on_both_ends() {
        let oracle = OccupancyOracle::new(Duration::from_secs(300));
        let entries = [monday_slot()];
        assert!(oracle.is_occupied(&entries, monday_at(7, 56)));
        assert!(!oracle.is_occupied(&entries, monday_at(7, 54)));
        assert!(oracle.is_occupied(&entries, monday_at(9, 4)));
        assert!(!oracle.is_occupied(&entries, monday_at(9, 6)));
    }

    #[test]
    fn margin_boundary_is_inclusive() {
        let oracle = OccupancyOracle::new(Duration::from_secs(300));
        let entries = [monday_slot()];
        assert!(oracle.is_occupied(&entries, monday_at(7, 55)));
        assert!(oracle.is_occupied(&entries, monday_at(9, 5)));
    }

    #[test]
    fn other_weekdays_do_not_match() {
        let oracle = OccupancyOracle::new(Duration::from_secs(300));
        let entries = [monday_slot()];
        let tuesday = NaiveDate::from_ymd_opt(2024, 5, 7)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert!(!oracle.is_occupied(&entries, tuesday));
    }

    #[test]
    fn weekend_is_always_vacant() {
        let oracle = OccupancyOracle::new(Duration::from_secs(300));
        let entries = [monday_slot()];
        let saturday = NaiveDate::from_ymd_opt(2024, 5, 11)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert!(!oracle.is_occupied(&entries, saturday));
    }

    #[test]
    fn no_entries_means_vacant() {
        let oracle = OccupancyOracle::new(Duration::from_secs(300));
        assert!(!oracle.is_occupied(&[], monday_at(8, 30)));
    }

    #[test]
    fn any_matching_entry_suffices() {
        let oracle = OccupancyOracle::new(Duration::from_secs(300));
        let mut second = monday_slot();
        second.start = NaiveTime::from_hms_opt(11, 0, 0).unwrap();
        second.end = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let entries = [monday_slot(), second];
        assert!(oracle.is_occupied(&entries, monday_at(11, 30)));
    }
}
