//! ---
//! awm_section: "04-occupancy-monitoring"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Occupancy reconciliation and alert deduplication."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::collections::HashSet;

use airwatch_common::model::Classification;

/// Transition produced by one observation of a room's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    /// The room just entered the critical condition: raise exactly one alert.
    Raised,
    /// The room remains critical: the open alert covers it, raise nothing.
    StillOpen,
    /// The critical condition cleared: no record is written for this.
    Cleared,
    /// Nothing open, nothing critical.
    Idle,
}

/// Per-room {idle, flagged} state machine turning sustained critical
/// classifications into at most one open alert per room.
///
/// The notified set lives here and nowhere else; the classification step is
/// its single writer. Nothing is persisted — after a restart every critical
/// room simply alerts once more.
#[derive(Debug, Default)]
pub struct AlertDeduper {
    notified: HashSet<String>,
}

impl AlertDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the room's state with its latest classification.
    pub fn observe(&mut self, room: &str, classification: Classification) -> AlertTransition {
        let critical = classification == Classification::Critical;
        let flagged = self.notified.contains(room);
        match (critical, flagged) {
            (true, false) => {
                self.notified.insert(room.to_owned());
                AlertTransition::Raised
            }
            (true, true) => AlertTransition::StillOpen,
            (false, true) => {
                self.notified.remove(room);
                AlertTransition::Cleared
            }
            (false, false) => AlertTransition::Idle,
        }
    }

    /// Whether the room currently holds an open critical condition.
    pub fn is_flagged(&self, room: &str) -> bool {
        self.notified.contains(room)
    }

    /// Number of rooms currently flagged.
    pub fn open_count(&self) -> usize {
        self.notified.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airwatch_common::model::Classification::{Attention, Critical, Idle, Normal};

    #[test]
    fn critical_run_raises_exactly_once_until_cleared() {
        let mut deduper = AlertDeduper::new();
        let sequence = [Critical, Critical, Critical, Normal, Critical];
        let raised = sequence
            .iter()
            .filter(|class| deduper.observe("C6", **class) == AlertTransition::Raised)
            .count();
        assert_eq!(raised, 2);
    }

    #[test]
    fn clearing_reports_once_and_writes_nothing() {
        let mut deduper = AlertDeduper::new();
        assert_eq!(deduper.observe("C6", Critical), AlertTransition::Raised);
        assert_eq!(deduper.observe("C6", Idle), AlertTransition::Cleared);
        assert_eq!(deduper.observe("C6", Idle), AlertTransition::Idle);
        assert!(!deduper.is_flagged("C6"));
    }

    #[test]
    fn non_critical_classifications_never_flag() {
        let mut deduper = AlertDeduper::new();
        for class in [Normal, Attention, Idle] {
            assert_eq!(deduper.observe("C6", class), AlertTransition::Idle);
        }
        assert_eq!(deduper.open_count(), 0);
    }

    #[test]
    fn rooms_are_tracked_independently() {
        let mut deduper = AlertDeduper::new();
        assert_eq!(deduper.observe("C6", Critical), AlertTransition::Raised);
        assert_eq!(deduper.observe("C7", Critical), AlertTransition::Raised);
        assert_eq!(deduper.observe("C6", Normal), AlertTransition::Cleared);
        assert!(deduper.is_flagged("C7"));
        assert_eq!(deduper.open_count(), 1);
    }
}
