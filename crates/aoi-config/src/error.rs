use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("required config key missing: {key}")]
    MissingKey { key: String },

    #[error("config key {key} has the wrong shape: {source}")]
    Deserialize { key: String, source: serde_json::Error },

    #[error(transparent)]
    Model(#[from] aoi_model::ModelError),
}
