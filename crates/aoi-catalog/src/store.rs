//! Persistence port for the Catalog, mirroring `CodeSnapshotStore`'s
//! domain/infrastructure split: the `Catalog` depends only on
//! `CatalogStore`, never on `serde_json`/`std::fs` directly.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use aoi_model::{Component, Lot, Product};

/// Everything the Catalog needs to fully reconstruct its in-memory state,
/// serialized as one JSON document (spec §4.1: "the cache file stores
/// products, lots ... and the (product,original)→internal map").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub products: HashMap<String, Product>,
    pub lots: HashMap<String, Lot>,
    /// Keyed by `(product_id, lot_id, station, component_id)` joined with `\u{1f}`.
    pub components: HashMap<String, Component>,
    /// `(product_id, original_lot_id)` joined with `\u{1f}` → internal `lot_id`.
    pub lot_key_map: HashMap<String, String>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load(&self) -> Result<Option<CatalogSnapshot>>;
    async fn save(&self, snapshot: &CatalogSnapshot) -> Result<()>;
}

/// Default adapter: one JSON file on disk, matching the spec's explicit
/// non-goal of "no SQL database" for the cache.
pub struct JsonFileCatalogStore {
    path: std::path::PathBuf,
}

impl JsonFileCatalogStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogStore for JsonFileCatalogStore {
    async fn load(&self) -> Result<Option<CatalogSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|source| crate::error::CatalogError::CacheIo { path: self.path.clone(), source })?;
        match serde_json::from_str(&text) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                tracing::error!(path = %self.path.display(), error = %err, "cache file unparseable");
                Err(crate::error::CatalogError::CacheCorrupt(err))
            }
        }
    }

    async fn save(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| crate::error::CatalogError::CacheIo { path: parent.to_path_buf(), source })?;
        }
        let text = serde_json::to_string_pretty(snapshot).map_err(crate::error::CatalogError::CacheCorrupt)?;
        std::fs::write(&self.path, text)
            .map_err(|source| crate::error::CatalogError::CacheIo { path: self.path.clone(), source })
    }
}

pub(crate) fn component_key(product: &str, lot_id: &str, station: &str, component_id: &str) -> String {
    format!("{product}\u{1f}{lot_id}\u{1f}{station}\u{1f}{component_id}")
}

pub(crate) fn lot_lookup_key(product: &str, original_lot_id: &str) -> String {
    format!("{product}\u{1f}{original_lot_id}")
}
