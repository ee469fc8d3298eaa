use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("lot not found: {0}")]
    LotNotFound(String),

    #[error("component not found: {product}/{lot}/{station}/{component}")]
    ComponentNotFound { product: String, lot: String, station: String, component: String },

    #[error("failed to read cache file {path}: {source}")]
    CacheIo { path: std::path::PathBuf, source: std::io::Error },

    #[error("cache file is corrupt, triggering rescan: {0}")]
    CacheCorrupt(serde_json::Error),

    #[error("filesystem scan error at {path}: {source}")]
    ScanIo { path: std::path::PathBuf, source: std::io::Error },

    #[error(transparent)]
    Model(#[from] aoi_model::ModelError),
}
