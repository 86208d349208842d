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

use indexmap::IndexMap;

use airwatch_common::config::MonitorConfig;
use airwatch_common::model::{AcState, PowerSample};

/// Projects the latest per-channel power readings onto per-room AC state
/// through the static channel→room table.
#[derive(Debug, Clone)]
pub struct SensorProjector {
    map: IndexMap<u32, String>,
    on_threshold_w: f64,
}

impl SensorProjector {
    pub fn new(map: IndexMap<u32, String>, on_threshold_w: f64) -> Self {
        Self {
            map,
            on_threshold_w,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.channel_room_map(), config.on_threshold_w)
    }

    /// State for every mapped room. A channel without a fresh reading
    /// projects an explicit `Off` at 0 W — the safe default under device or
    /// connectivity failure; a stale `on` is never assumed. Readings for
    /// unmapped channels are ignored.
    pub fn project(&self, latest: &HashMap<u32, PowerSample>) -> IndexMap<String, (AcState, f64)> {
        let mut states = IndexMap::with_capacity(self.map.len());
        for (channel, room) in &self.map {
            let projected = match latest.get(channel) {
                Some(sample) if sample.usage_w > self.on_threshold_w => {
                    (AcState::On, sample.usage_w)
                }
                Some(sample) => (AcState::Off, sample.usage_w),
                None => (AcState::Off, 0.0),
            };
            states.insert(room.clone(), projected);
        }
        states
    }
}
