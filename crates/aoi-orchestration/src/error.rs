//! Error taxonomy for the pipeline layer (spec §7). `ErrorCategory`
//! classifies each variant for retry logic the way the teacher's
//! `OrchestratorError`/`ErrorCategory` pair does.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("required config key missing: {0}")]
    ConfigMissing(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("file unreadable: {path}: {source}")]
    FileUnreadable { path: PathBuf, source: std::io::Error },

    #[error("schema mismatch in {path}: {reason}")]
    SchemaMismatch { path: PathBuf, reason: String },

    #[error("alignment check failed for {path}: {message}")]
    AlignmentFail { path: PathBuf, message: String },

    #[error("alignment check errored for {path}: {message}")]
    AlignmentError { path: PathBuf, message: String },

    #[error("render failed for {path}: {message}")]
    RenderFailure { path: PathBuf, message: String },

    #[error("move failed (partial path) for component {component_id}: {message}")]
    MoveFailurePartial { component_id: String, message: String },

    #[error("move failed (hard) for component {component_id} after retry budget exhausted: {message}")]
    MoveFailureHard { component_id: String, message: String },

    #[error("archive failed: {0}")]
    ArchiveFailure(String),

    #[error("cache corrupt, rescan triggered: {0}")]
    CacheCorrupt(String),

    #[error("task was cancelled")]
    Cancelled,

    #[error(transparent)]
    Catalog(#[from] aoi_catalog::CatalogError),

    #[error(transparent)]
    Config(#[from] aoi_config::ConfigError),

    #[error(transparent)]
    Model(#[from] aoi_model::ModelError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classifies a failure for retry/reporting purposes, independent of its
/// concrete variant — mirrors the teacher's transient/permanent/
/// infrastructure split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCategory {
    Transient,
    Permanent,
    Infrastructure,
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::FileNotFound(_)
            | PipelineError::FileUnreadable { .. }
            | PipelineError::MoveFailurePartial { .. } => ErrorCategory::Transient,

            PipelineError::SchemaMismatch { .. }
            | PipelineError::AlignmentFail { .. }
            | PipelineError::AlignmentError { .. }
            | PipelineError::ConfigMissing(_)
            | PipelineError::Cancelled => ErrorCategory::Permanent,

            PipelineError::RenderFailure { .. }
            | PipelineError::MoveFailureHard { .. }
            | PipelineError::ArchiveFailure(_)
            | PipelineError::CacheCorrupt(_)
            | PipelineError::Io(_) => ErrorCategory::Infrastructure,

            PipelineError::Catalog(_) | PipelineError::Config(_) | PipelineError::Model(_) | PipelineError::Csv(_) => {
                ErrorCategory::Infrastructure
            }
        }
    }
}
