use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("missing path template for file type: {0}")]
    MissingTemplate(String),

    #[error("invalid path template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
