use thiserror::Error;

pub type Result<T> = std::result::Result<T, MigrationError>;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("failed to read/write {path}: {source}")]
    Io { path: std::path::PathBuf, source: std::io::Error },

    #[error("retry-state file corrupt: {0}")]
    StateCorrupt(serde_json::Error),

    #[error("invalid schedule time {0:?}, expected HH:MM")]
    InvalidScheduleTime(String),

    #[error(transparent)]
    Pipeline(#[from] aoi_orchestration::PipelineError),
}
