//! ---
//! awm_section: "03-persistence-logging"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Storage abstractions and file bindings."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! File-backed stores for AirWatch: the append-only telemetry log, the
//! append-only alert history, and the read-only schedule feed.

/// Result alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Error type for the storage subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Wrapper for IO errors encountered while reading/writing store files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub mod alert_log;
pub mod schedule_file;
pub mod telemetry_log;

pub use alert_log::AlertLog;
pub use schedule_file::ScheduleFeed;
pub use telemetry_log::TelemetryLog;
