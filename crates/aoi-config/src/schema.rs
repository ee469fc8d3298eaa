use serde::Deserialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub base_path: String,
    pub structure: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationLogic {
    #[serde(default)]
    pub run_fpy: bool,
    #[serde(default)]
    pub run_lossmap: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    pub station_order: Vec<String>,
    #[serde(default)]
    pub flip_config: HashMap<String, bool>,
    #[serde(default)]
    pub station_recipe: HashMap<String, String>,
    #[serde(default)]
    pub station_logic: HashMap<String, StationLogic>,
}

impl ProcessingConfig {
    /// Position of `station` in `station_order`, used to name the
    /// `LOSS{idx}` map subdirectory and to find the previous station.
    pub fn station_index(&self, station: &str) -> Option<usize> {
        self.station_order.iter().position(|s| s == station)
    }

    pub fn is_first_station(&self, station: &str) -> bool {
        self.station_index(station) == Some(0)
    }

    pub fn previous_station(&self, station: &str) -> Option<&str> {
        let idx = self.station_index(station)?;
        idx.checked_sub(1).and_then(|i| self.station_order.get(i)).map(String::as_str)
    }

    pub fn flip(&self, station: &str) -> bool {
        self.flip_config.get(station).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefectRules {
    #[serde(default)]
    pub good: HashSet<String>,
    #[serde(default)]
    pub bad: HashSet<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub scan_interval: u64,
    pub rescan_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Schedule {
    pub time: String,
    #[serde(default)]
    pub days: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImmediateMoveConfig {
    #[serde(default = "default_immediate_file_types")]
    pub file_types: Vec<String>,
}

fn default_immediate_file_types() -> Vec<String> {
    vec!["csv".to_string(), "map".to_string()]
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DelayedMoveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_delayed_file_types")]
    pub file_types: Vec<String>,
    pub schedule: Option<Schedule>,
}

fn default_delayed_file_types() -> Vec<String> {
    vec!["org".to_string(), "roi".to_string()]
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryMechanismConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    #[serde(default)]
    pub retry_intervals_minutes: Vec<u64>,
    #[serde(default)]
    pub retry_on_partial_failure: bool,
}

fn default_max_retry_count() -> u32 {
    5
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutoMoveConfig {
    #[serde(default)]
    pub enabled: bool,
    pub target_product: Option<String>,
    #[serde(default)]
    pub immediate: ImmediateMoveConfig,
    #[serde(default)]
    pub delayed: DelayedMoveConfig,
    #[serde(default)]
    pub retry_mechanism: RetryMechanismConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalStorageThresholds {
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold_percent: f64,
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold_percent: f64,
}

fn default_warning_threshold() -> f64 {
    80.0
}

fn default_critical_threshold() -> f64 {
    90.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveRule {
    #[serde(default)]
    pub enabled: bool,
    pub min_age_days: u32,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduledArchiveConfig {
    #[serde(default)]
    pub archive_rules: HashMap<String, ArchiveRule>,
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageMonitoringConfig {
    #[serde(default = "default_scan_interval_seconds")]
    pub scan_interval_seconds: u64,
    #[serde(default = "default_error_retry_interval_seconds")]
    pub error_retry_interval_seconds: u64,
    #[serde(default = "default_scheduler_check_interval_seconds")]
    pub scheduler_check_interval_seconds: u64,
}

fn default_scan_interval_seconds() -> u64 {
    300
}

fn default_error_retry_interval_seconds() -> u64 {
    60
}

fn default_scheduler_check_interval_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileFormat {
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiveStorageConfig {
    pub path: Option<String>,
    #[serde(default)]
    pub structure: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageManagementConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub local_storage: LocalStorageThresholds,
    #[serde(default)]
    pub archive_storage: ArchiveStorageConfig,
    #[serde(default)]
    pub scheduled_archive: ScheduledArchiveConfig,
    #[serde(default)]
    pub monitoring: StorageMonitoringConfig,
    #[serde(default)]
    pub file_formats: HashMap<String, FileFormat>,
}
