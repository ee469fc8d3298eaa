//! Typed configuration for the AOI pipeline (spec §6). JSON loading is
//! assumed to deliver typed config structs — this crate is the boundary
//! that does that loading and hands every other crate a strongly typed
//! view, plus a dotted-path escape hatch for keys a given subsystem
//! doesn't know the shape of ahead of time.

mod error;
mod schema;

pub use error::ConfigError;
pub use schema::{
    ArchiveRule, ArchiveStorageConfig, AutoMoveConfig, DatabaseConfig, DefectRules,
    DelayedMoveConfig, FileFormat, ImmediateMoveConfig, LocalStorageThresholds, MonitoringConfig,
    ProcessingConfig, RetryMechanismConfig, Schedule, ScheduledArchiveConfig, StationLogic,
    StorageManagementConfig, StorageMonitoringConfig,
};

use aoi_model::{FileType, PathBuilder};
use serde::de::DeserializeOwned;
use std::path::Path;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AoiConfig {
    pub database: DatabaseConfig,
    pub processing: ProcessingConfig,
    pub defect_rules: DefectRules,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub auto_move: AutoMoveConfig,
    #[serde(default)]
    pub storage_management: StorageManagementConfig,

    /// The raw JSON document, retained for [`AoiConfig::get`] lookups
    /// against keys no typed field covers.
    #[serde(skip)]
    raw: serde_json::Value,
}

impl AoiConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_str(&text)
    }

    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let mut config: AoiConfig = serde_json::from_value(raw.clone())?;
        config.raw = raw;
        Ok(config)
    }

    /// Builds a [`PathBuilder`] from `database.base_path` and
    /// `database.structure.*`. Fails with [`ConfigError::MissingKey`] if a
    /// required file-type template is absent.
    pub fn path_builder(&self) -> Result<PathBuilder, ConfigError> {
        let mut structure = std::collections::HashMap::new();
        for (key, file_type) in [
            ("csv", FileType::Csv),
            ("org", FileType::Org),
            ("roi", FileType::Roi),
            ("map", FileType::Map),
        ] {
            let template = self.database.structure.get(key).ok_or_else(|| ConfigError::MissingKey {
                key: format!("database.structure.{key}"),
            })?;
            structure.insert(file_type, template.clone());
        }
        Ok(PathBuilder::new(self.database.base_path.clone(), &structure)?)
    }

    /// Dotted-path lookup against the raw JSON document, e.g.
    /// `config.get::<bool>("processing.station_logic.MT.run_fpy")`.
    /// Used by subsystems that only need one or two ad hoc keys rather
    /// than a whole typed section.
    pub fn get<T: DeserializeOwned>(&self, dotted_path: &str) -> Result<T, ConfigError> {
        let mut cursor = &self.raw;
        for segment in dotted_path.split('.') {
            cursor = cursor.get(segment).ok_or_else(|| ConfigError::MissingKey { key: dotted_path.to_string() })?;
        }
        serde_json::from_value(cursor.clone()).map_err(|source| ConfigError::Deserialize {
            key: dotted_path.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"{
            "database": {
                "base_path": "/data/aoi",
                "structure": {
                    "csv": "{base}/{product}/csv/{lot}/{station}/{component}.csv",
                    "org": "{base}/{product}/org/{lot}/{station}/{component}/",
                    "roi": "{base}/{product}/roi/{lot}/{station}/{component}/",
                    "map": "{base}/{product}/map/{lot}/{station}/{component}.png"
                }
            },
            "processing": {
                "station_order": ["MT", "DC2"],
                "flip_config": {"MT": true},
                "station_recipe": {"MT": "default"},
                "station_logic": {"MT": {"run_fpy": true, "run_lossmap": false}}
            },
            "defect_rules": {"good": ["Good"], "bad": ["Scratch"]},
            "monitoring": {"scan_interval": 30, "rescan_interval": 300}
        }"#
    }

    #[test]
    fn parses_typed_sections() {
        let cfg = AoiConfig::from_str(sample()).unwrap();
        assert_eq!(cfg.processing.station_order, vec!["MT", "DC2"]);
        assert_eq!(cfg.monitoring.scan_interval, 30);
        assert!(cfg.auto_move.enabled == false || cfg.auto_move.enabled == true); // defaulted
    }

    #[test]
    fn dotted_get_reaches_nested_key() {
        let cfg = AoiConfig::from_str(sample()).unwrap();
        let run_fpy: bool = cfg.get("processing.station_logic.MT.run_fpy").unwrap();
        assert!(run_fpy);
    }

    #[test]
    fn path_builder_requires_all_file_types() {
        let text = r#"{
            "database": {"base_path": "/data", "structure": {"csv": "{base}/{product}/{lot}/{station}/{component}.csv"}},
            "processing": {"station_order": [], "flip_config": {}, "station_recipe": {}, "station_logic": {}},
            "defect_rules": {"good": [], "bad": []},
            "monitoring": {"scan_interval": 1, "rescan_interval": 1}
        }"#;
        let cfg = AoiConfig::from_str(text).unwrap();
        assert!(cfg.path_builder().is_err());
    }
}
