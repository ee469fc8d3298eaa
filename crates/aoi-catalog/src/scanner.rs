//! FilesystemScanner (spec §4.2): walks `<root>/<product>/{csv,processed_csv}`
//! and merges both trees plus sibling artifact probes into Catalog
//! components.

use crate::catalog::Catalog;
use crate::error::Result;
use crate::store::CatalogStore;
use aoi_model::Component;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn aoi_filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]+_([A-Z0-9]+)_\d{12}\.csv$").unwrap())
}

fn component_id_from_filename(filename: &str) -> String {
    if let Some(caps) = aoi_filename_pattern().captures(filename) {
        return caps[1].to_string();
    }
    Path::new(filename).file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| filename.to_string())
}

pub struct FilesystemScanner {
    root: PathBuf,
    station_order: Vec<String>,
}

impl FilesystemScanner {
    pub fn new(root: impl Into<PathBuf>, station_order: Vec<String>) -> Self {
        Self { root: root.into(), station_order }
    }

    fn lossmap_index(&self, station: &str) -> Option<usize> {
        let idx = self.station_order.iter().position(|s| s == station)?;
        if idx == 0 {
            None
        } else {
            Some(idx)
        }
    }

    /// Scans the whole root and populates `catalog` via `AddComponent`.
    /// Unreadable directories are logged and skipped; the scan always
    /// completes.
    pub async fn scan_into<S: CatalogStore>(&self, catalog: &Catalog<S>) -> Result<()> {
        if !self.root.exists() {
            tracing::warn!(root = %self.root.display(), "storage root does not exist, nothing to scan");
            return Ok(());
        }
        let products = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(root = %self.root.display(), error = %err, "cannot list storage root");
                return Ok(());
            }
        };

        for product_entry in products.filter_map(|e| e.ok()) {
            if !product_entry.path().is_dir() {
                continue;
            }
            let product_id = product_entry.file_name().to_string_lossy().to_string();
            self.scan_product(catalog, &product_id, &product_entry.path()).await;
        }
        Ok(())
    }

    async fn scan_product<S: CatalogStore>(&self, catalog: &Catalog<S>, product_id: &str, product_root: &Path) {
        let canonical_root = product_root.join("csv");
        let raw_root = product_root.join("processed_csv");

        let mut found: std::collections::HashMap<(String, String, String), Component> = std::collections::HashMap::new();

        self.collect_csv_tree(&canonical_root, &mut found, true);
        self.collect_csv_tree(&raw_root, &mut found, false);

        for ((original_lot_id, station, component_id), mut component) in found {
            self.probe_artifacts(product_id, &original_lot_id, &station, &component_id, product_root, &mut component);
            if let Err(err) = catalog.add_component(product_id, &original_lot_id, component).await {
                tracing::error!(product = product_id, lot = original_lot_id, station, component_id, error = %err, "failed to add scanned component");
            }
        }
    }

    /// `canonical = true` fills `csv_path`; `canonical = false` fills
    /// `original_csv_path`. When both trees produce the same component key
    /// the two calls merge into one `Component` via the map's entry API.
    fn collect_csv_tree(
        &self,
        tree_root: &Path,
        found: &mut std::collections::HashMap<(String, String, String), Component>,
        canonical: bool,
    ) {
        if !tree_root.exists() {
            return;
        }
        let Ok(lot_dirs) = std::fs::read_dir(tree_root) else {
            tracing::warn!(path = %tree_root.display(), "cannot read csv tree");
            return;
        };
        for lot_entry in lot_dirs.filter_map(|e| e.ok()) {
            if !lot_entry.path().is_dir() {
                continue;
            }
            let original_lot_id = lot_entry.file_name().to_string_lossy().to_string();
            let Ok(station_dirs) = std::fs::read_dir(lot_entry.path()) else {
                tracing::warn!(path = %lot_entry.path().display(), "cannot read lot directory");
                continue;
            };
            for station_entry in station_dirs.filter_map(|e| e.ok()) {
                if !station_entry.path().is_dir() {
                    continue;
                }
                let station = station_entry.file_name().to_string_lossy().to_string();
                let Ok(files) = std::fs::read_dir(station_entry.path()) else {
                    tracing::warn!(path = %station_entry.path().display(), "cannot read station directory");
                    continue;
                };
                for file_entry in files.filter_map(|e| e.ok()) {
                    let path = file_entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                        continue;
                    }
                    let Ok(metadata) = file_entry.metadata() else { continue };
                    if metadata.len() == 0 {
                        tracing::warn!(path = %path.display(), "skipping zero-byte csv");
                        continue;
                    }
                    let filename = path.file_name().unwrap().to_string_lossy().to_string();
                    let component_id = component_id_from_filename(&filename);
                    let key = (original_lot_id.clone(), station.clone(), component_id.clone());
                    let component = found
                        .entry(key)
                        .or_insert_with(|| Component::new(component_id.clone(), String::new(), station.clone()));
                    if canonical {
                        component.csv_path = Some(path.clone());
                        component.processed_filename = Some(filename);
                    } else {
                        component.original_csv_path = Some(path.clone());
                        component.original_filename = Some(filename);
                        if component.csv_path.is_none() {
                            component.csv_path = Some(path);
                        }
                    }
                }
            }
        }
    }

    fn probe_artifacts(
        &self,
        product_id: &str,
        original_lot_id: &str,
        station: &str,
        component_id: &str,
        product_root: &Path,
        component: &mut Component,
    ) {
        let org_dir = product_root.join("org").join(original_lot_id).join(station).join(component_id);
        if org_dir.is_dir() {
            component.org_path = Some(org_dir);
        }

        let basemap = product_root.join("map").join(original_lot_id).join(station).join(format!("{component_id}.png"));
        if basemap.is_file() {
            component.basemap_path = Some(basemap);
        }

        if let Some(idx) = self.lossmap_index(station) {
            let lossmap = product_root
                .join("map")
                .join(original_lot_id)
                .join(format!("LOSS{idx}"))
                .join(format!("{component_id}.png"));
            if lossmap.is_file() {
                component.lossmap_path = Some(lossmap);
            }
        }

        let fpy = product_root.join("map").join(original_lot_id).join("FPY").join(format!("{component_id}.png"));
        if fpy.is_file() {
            component.fpy_path = Some(fpy);
        }

        let _ = product_id;
    }
}
