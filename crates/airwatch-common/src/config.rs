//! ---
//! awm_section: "01-core-runtime"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Shared primitives and utilities for the AirWatch runtime."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_reader_command() -> String {
    "python3".to_owned()
}

fn default_reader_args() -> Vec<String> {
    vec!["scripts/read_meter.py".to_owned()]
}

fn default_acquisition_interval() -> Duration {
    Duration::from_secs(900)
}

fn default_reader_timeout() -> Duration {
    Duration::from_secs(45)
}

fn default_max_output_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_cycle_attempts() -> usize {
    2
}

fn default_cycle_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_insert_attempts() -> usize {
    3
}

fn default_insert_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_schedule_feed() -> PathBuf {
    PathBuf::from("configs/schedule_feed.json")
}

fn default_schedule_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_sensor_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_occupancy_margin() -> Duration {
    Duration::from_secs(300)
}

fn default_on_threshold_w() -> f64 {
    1.0
}

fn default_sensor_freshness() -> Duration {
    Duration::from_secs(600)
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("target/data")
}

fn default_retention_days() -> u32 {
    30
}

fn default_query_limit() -> usize {
    100
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9898"
        .parse()
        .expect("valid default metrics address")
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default api address")
}

/// Primary configuration object for the AirWatch runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "AIRWATCH_CONFIG";

    /// Load configuration from disk, respecting the `AIRWATCH_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants across all sections.
    pub fn validate(&self) -> Result<()> {
        self.acquisition.validate()?;
        self.monitor.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings for the metering-reader invocation and the acquisition job.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Program invoked to read the metering device.
    #[serde(default = "default_reader_command")]
    pub reader_command: String,
    #[serde(default = "default_reader_args")]
    pub reader_args: Vec<String>,
    /// Fixed interval between acquisition ticks.
    #[serde(default = "default_acquisition_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub interval: Duration,
    /// Wall-clock budget for one reader invocation.
    #[serde(default = "default_reader_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub reader_timeout: Duration,
    /// Upper bound on the reader's stdout size.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Attempt budget for one acquisition cycle.
    #[serde(default = "default_cycle_attempts")]
    pub cycle_attempts: usize,
    #[serde(default = "default_cycle_backoff")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cycle_backoff: Duration,
    /// Attempt budget for the batched telemetry insert.
    #[serde(default = "default_insert_attempts")]
    pub insert_attempts: usize,
    #[serde(default = "default_insert_backoff")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub insert_backoff: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            reader_command: default_reader_command(),
            reader_args: default_reader_args(),
            interval: default_acquisition_interval(),
            reader_timeout: default_reader_timeout(),
            max_output_bytes: default_max_output_bytes(),
            cycle_attempts: default_cycle_attempts(),
            cycle_backoff: default_cycle_backoff(),
            insert_attempts: default_insert_attempts(),
            insert_backoff: default_insert_backoff(),
        }
    }
}

impl AcquisitionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reader_command.trim().is_empty() {
            return Err(anyhow!("acquisition.reader_command must not be empty"));
        }
        if self.interval.is_zero() {
            return Err(anyhow!("acquisition.interval must be positive"));
        }
        if self.reader_timeout.is_zero() {
            return Err(anyhow!("acquisition.reader_timeout must be positive"));
        }
        if self.max_output_bytes == 0 {
            return Err(anyhow!("acquisition.max_output_bytes must be positive"));
        }
        if self.cycle_attempts == 0 || self.insert_attempts == 0 {
            return Err(anyhow!("acquisition attempt budgets must be at least 1"));
        }
        Ok(())
    }
}

/// Which floor a room sits on. Carried through to the status query so a
/// display layer can group rooms without re-deriving anything.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Floor {
    Upper,
    Lower,
}

impl Floor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Floor::Upper => "upper",
            Floor::Lower => "lower",
        }
    }
}

/// One monitored room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub room: String,
    pub floor: Floor,
}

/// Static wiring of one metering channel to a room's AC circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMapEntry {
    pub channel: u32,
    pub room: String,
}

/// Settings for the reconciliation/classification service.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub rooms: Vec<RoomConfig>,
    #[serde(default)]
    pub channels: Vec<ChannelMapEntry>,
    /// JSON export path of the external schedule service.
    #[serde(default = "default_schedule_feed")]
    pub schedule_feed: PathBuf,
    /// Slow poller cadence: schedule refresh.
    #[serde(default = "default_schedule_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub schedule_interval: Duration,
    /// Fast poller cadence: sensor refresh and classification.
    #[serde(default = "default_sensor_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub sensor_interval: Duration,
    /// Tolerance applied before a slot starts and after it ends.
    #[serde(default = "default_occupancy_margin")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub occupancy_margin: Duration,
    /// Power threshold above which a channel counts as AC-on.
    #[serde(default = "default_on_threshold_w")]
    pub on_threshold_w: f64,
    /// Readings older than this never drive an `on` state.
    #[serde(default = "default_sensor_freshness")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub sensor_freshness: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rooms: Vec::new(),
            channels: Vec::new(),
            schedule_feed: default_schedule_feed(),
            schedule_interval: default_schedule_interval(),
            sensor_interval: default_sensor_interval(),
            occupancy_margin: default_occupancy_margin(),
            on_threshold_w: default_on_threshold_w(),
            sensor_freshness: default_sensor_freshness(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rooms.is_empty() {
            return Err(anyhow!("monitor.rooms must declare at least one room"));
        }
        if self.schedule_interval.is_zero() || self.sensor_interval.is_zero() {
            return Err(anyhow!("monitor poll intervals must be positive"));
        }
        if !self.on_threshold_w.is_finite() || self.on_threshold_w < 0.0 {
            return Err(anyhow!("monitor.on_threshold_w must be a non-negative number"));
        }
        let mut seen = IndexMap::new();
        for entry in &self.channels {
            if let Some(previous) = seen.insert(entry.channel, entry.room.clone()) {
                return Err(anyhow!(
                    "channel {} is mapped twice (rooms '{}' and '{}')",
                    entry.channel,
                    previous,
                    entry.room
                ));
            }
            if !self.rooms.iter().any(|r| r.room == entry.room) {
                return Err(anyhow!(
                    "channel {} maps to undeclared room '{}'",
                    entry.channel,
                    entry.room
                ));
            }
        }
        Ok(())
    }

    /// Channel number → room id, in declaration order.
    pub fn channel_room_map(&self) -> IndexMap<u32, String> {
        self.channels
            .iter()
            .map(|entry| (entry.channel, entry.room.clone()))
            .collect()
    }
}

/// Settings for the on-disk stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Telemetry older than this many days is swept.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Most-recent-N bound applied to telemetry queries.
    #[serde(default = "default_query_limit")]
    pub query_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            retention_days: default_retention_days(),
            query_limit: default_query_limit(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retention_days == 0 {
            return Err(anyhow!("storage.retention_days must be at least 1"));
        }
        if self.query_limit == 0 {
            return Err(anyhow!("storage.query_limit must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[monitor.rooms]]
        room = "C7"
        floor = "upper"

        [[monitor.channels]]
        channel = 5
        room = "C7"
    "#;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: AppConfig = MINIMAL.parse().unwrap();
        assert_eq!(config.acquisition.reader_timeout, Duration::from_secs(45));
        assert_eq!(config.acquisition.cycle_attempts, 2);
        assert_eq!(config.monitor.sensor_interval, Duration::from_secs(15));
        assert_eq!(config.monitor.occupancy_margin, Duration::from_secs(300));
        assert_eq!(config.storage.retention_days, 30);
        let map = config.monitor.channel_room_map();
        assert_eq!(map.get(&5).map(String::as_str), Some("C7"));
    }

    #[test]
    fn rejects_channel_to_undeclared_room() {
        let raw = r#"
            [[monitor.rooms]]
            room = "C7"
            floor = "upper"

            [[monitor.channels]]
            channel = 2
            room = "C9"
        "#;
        assert!(raw.parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_duplicate_channel_mapping() {
        let raw = r#"
            [[monitor.rooms]]
            room = "C7"
            floor = "upper"

            [[monitor.rooms]]
            room = "C8"
            floor = "upper"

            [[monitor.channels]]
            channel = 2
            room = "C7"

            [[monitor.channels]]
            channel = 2
            room = "C8"
        "#;
        assert!(raw.parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_empty_room_list() {
        let raw = r#"
            [acquisition]
            reader_command = "python3"
        "#;
        assert!(raw.parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_zero_intervals() {
        let raw = r#"
            [monitor]
            sensor_interval = 0

            [[monitor.rooms]]
            room = "C7"
            floor = "upper"
        "#;
        assert!(raw.parse::<AppConfig>().is_err());
    }
}
