//! ---
//! awm_section: "01-core-runtime"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Shared primitives and utilities for the AirWatch runtime."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
//! Core shared primitives for the AirWatch workspace. This crate exposes
//! configuration loading, logging bootstrap, the shared data model, the
//! feed/sink seam traits, and the bounded-retry helper consumed across the
//! workspace.

pub mod config;
pub mod feeds;
pub mod logging;
pub mod model;
pub mod retry;
pub mod time;

pub use config::{
    AcquisitionConfig, ApiConfig, AppConfig, ChannelMapEntry, Floor, LoggingConfig, MetricsConfig,
    MonitorConfig, RoomConfig, StorageConfig,
};
pub use feeds::{AlertSink, InsertOutcome, ScheduleSource, SensorSource, TelemetrySink};
pub use logging::{init_tracing, LogFormat};
pub use model::{
    AcState, AlertRecord, Classification, OccupancyState, PowerSample, ScheduleEntry,
    TelemetryRecord, Weekday,
};
pub use retry::{retry_with_policy, RetryPolicy};
