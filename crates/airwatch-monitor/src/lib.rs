//! ---
//! awm_section: "04-occupancy-monitoring"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Occupancy reconciliation and alert deduplication."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
//! The reconciliation core: merges schedule-derived occupancy with
//! sensor-derived AC state into a per-room classification, and turns
//! sustained critical classifications into deduplicated alerts.

pub mod alerts;
pub mod occupancy;
pub mod projector;
pub mod service;

pub use alerts::{AlertDeduper, AlertTransition};
pub use occupancy::OccupancyOracle;
pub use projector::SensorProjector;
pub use service::{MonitorHandle, RoomStatus, RoomStatusService};
