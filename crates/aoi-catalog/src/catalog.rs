//! In-memory Catalog (spec §4.1). Owns the three indexes plus the
//! `(product,original)→internal lot_id` map; every mutation goes through
//! `Add/Update/RemoveComponent` and triggers a synchronous rewrite of the
//! backing [`CatalogStore`] (write-through, matching the teacher's
//! lock-guarded state + persist-inside-the-critical-section pattern).

use crate::error::{CatalogError, Result};
use crate::scanner::FilesystemScanner;
use crate::store::{component_key, lot_lookup_key, CatalogSnapshot, CatalogStore};
use aoi_model::{Component, Lot, Product};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<String, Product>,
    lots: HashMap<String, Lot>,
    components: HashMap<String, Component>,
    lot_key_map: HashMap<String, String>,
}

impl From<CatalogSnapshot> for CatalogState {
    fn from(snapshot: CatalogSnapshot) -> Self {
        Self {
            products: snapshot.products,
            lots: snapshot.lots,
            components: snapshot.components,
            lot_key_map: snapshot.lot_key_map,
        }
    }
}

impl CatalogState {
    fn to_snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            products: self.products.clone(),
            lots: self.lots.clone(),
            components: self.components.clone(),
            lot_key_map: self.lot_key_map.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentStats {
    pub total_components: usize,
    pub total_lots: usize,
    pub total_products: usize,
    pub components_with_basemap: usize,
    pub components_with_lossmap: usize,
    pub components_with_fpy: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StationOrderReport {
    pub ok: bool,
    pub details: Vec<String>,
}

pub struct Catalog<S: CatalogStore> {
    state: RwLock<CatalogState>,
    store: Arc<S>,
}

impl<S: CatalogStore> Catalog<S> {
    pub async fn load(store: Arc<S>) -> Result<Self> {
        let state = match store.load().await {
            Ok(Some(snapshot)) => CatalogState::from(snapshot),
            Ok(None) => CatalogState::default(),
            Err(CatalogError::CacheCorrupt(err)) => {
                tracing::warn!(error = %err, "cache corrupt, starting from empty catalog pending rescan");
                CatalogState::default()
            }
            Err(other) => return Err(other),
        };
        Ok(Self { state: RwLock::new(state), store })
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = self.state.read().to_snapshot();
        self.store.save(&snapshot).await
    }

    pub async fn save(&self) -> Result<()> {
        self.persist().await
    }

    pub fn get_products(&self) -> Vec<Product> {
        self.state.read().products.values().cloned().collect()
    }

    pub fn get_product(&self, product_id: &str) -> Result<Product> {
        self.state
            .read()
            .products
            .get(product_id)
            .cloned()
            .ok_or_else(|| CatalogError::ProductNotFound(product_id.to_string()))
    }

    pub fn get_lots_by_product(&self, product_id: &str) -> Vec<Lot> {
        self.state
            .read()
            .lots
            .values()
            .filter(|lot| lot.product_id == product_id)
            .cloned()
            .collect()
    }

    /// Accepts an internal `lot_id`, a bare `original_lot_id` (first match
    /// wins across products, with a warning), or a `{product}_{original}`
    /// compound id.
    pub fn get_lot(&self, id_or_original: &str) -> Result<Lot> {
        let state = self.state.read();
        if let Some(lot) = state.lots.get(id_or_original) {
            return Ok(lot.clone());
        }
        let matches: Vec<&Lot> = state.lots.values().filter(|lot| lot.original_lot_id == id_or_original).collect();
        if let Some(first) = matches.first() {
            if matches.len() > 1 {
                tracing::warn!(original_lot_id = id_or_original, candidates = matches.len(), "ambiguous original_lot_id, using first match");
            }
            return Ok((*first).clone());
        }
        Err(CatalogError::LotNotFound(id_or_original.to_string()))
    }

    /// Read-only lookup of the *current* internal `lot_id` for
    /// `(product_id, original_lot_id)`, without creating a Lot if the pair
    /// has never been observed under that product. Used to re-resolve a
    /// component's owner after `add_component` has re-homed it under a
    /// different product's lot (e.g. once a migration move has relocated
    /// it), since a stale `lot_id` snapshotted before that move may now
    /// point at an empty or unrelated Lot.
    pub fn current_lot_id(&self, product_id: &str, original_lot_id: &str) -> Result<String> {
        let state = self.state.read();
        state
            .lot_key_map
            .get(&lot_lookup_key(product_id, original_lot_id))
            .cloned()
            .ok_or_else(|| CatalogError::LotNotFound(original_lot_id.to_string()))
    }

    fn resolve_lot_id(state: &CatalogState, lot_id_or_original: &str) -> Option<String> {
        if state.lots.contains_key(lot_id_or_original) {
            return Some(lot_id_or_original.to_string());
        }
        state
            .lots
            .values()
            .find(|lot| lot.original_lot_id == lot_id_or_original)
            .map(|lot| lot.lot_id.clone())
    }

    pub fn get_stations_by_lot(&self, lot_id_or_original: &str) -> Result<HashSet<String>> {
        let lot = self.get_lot(lot_id_or_original)?;
        Ok(lot.station_names.into_iter().collect())
    }

    pub fn get_components_by_lot_station(&self, lot_id_or_original: &str, station: &str) -> Vec<Component> {
        let state = self.state.read();
        let Some(lot_id) = Self::resolve_lot_id(&state, lot_id_or_original) else {
            return Vec::new();
        };
        state
            .components
            .values()
            .filter(|c| c.lot_id == lot_id && c.station == station)
            .cloned()
            .collect()
    }

    pub fn get_component(&self, lot_id_or_original: &str, station: &str, component_id: &str) -> Result<Component> {
        let state = self.state.read();
        let lot_id = Self::resolve_lot_id(&state, lot_id_or_original)
            .ok_or_else(|| CatalogError::LotNotFound(lot_id_or_original.to_string()))?;
        let Some(lot) = state.lots.get(&lot_id) else {
            return Err(CatalogError::LotNotFound(lot_id_or_original.to_string()));
        };
        let key = component_key(&lot.product_id, &lot_id, station, component_id);
        state.components.get(&key).cloned().ok_or_else(|| CatalogError::ComponentNotFound {
            product: lot.product_id.clone(),
            lot: lot_id,
            station: station.to_string(),
            component: component_id.to_string(),
        })
    }

    /// Resolves `(product_id, original_lot_id)` to the internal `lot_id`,
    /// creating the Product/Lot on first observation and applying the
    /// `{product}_{original}` disambiguation rule when `original_lot_id`
    /// already belongs to a different product.
    fn ensure_lot(state: &mut CatalogState, product_id: &str, original_lot_id: &str) -> String {
        let lookup_key = lot_lookup_key(product_id, original_lot_id);
        if let Some(lot_id) = state.lot_key_map.get(&lookup_key) {
            return lot_id.clone();
        }

        let collides = state.lots.values().any(|lot| lot.original_lot_id == original_lot_id && lot.product_id != product_id);
        let lot_id = if collides {
            format!("{product_id}_{original_lot_id}")
        } else {
            original_lot_id.to_string()
        };

        state
            .products
            .entry(product_id.to_string())
            .or_insert_with(|| Product::new(product_id));
        state.products.get_mut(product_id).unwrap().lot_ids.insert(lot_id.clone());

        state
            .lots
            .entry(lot_id.clone())
            .or_insert_with(|| Lot::new(lot_id.clone(), original_lot_id, product_id));
        state.lot_key_map.insert(lookup_key, lot_id.clone());
        lot_id
    }

    /// Inserts or replaces a Component. A component with no path fields
    /// populated is never cached (spec §3 essential invariant).
    pub async fn add_component(&self, product_id: &str, original_lot_id: &str, mut component: Component) -> Result<()> {
        if !component.has_any_path() {
            return Ok(());
        }
        {
            let mut state = self.state.write();
            let lot_id = Self::ensure_lot(&mut state, product_id, original_lot_id);
            component.lot_id = lot_id.clone();
            state.lots.get_mut(&lot_id).unwrap().station_names.insert(component.station.clone());
            state.lots.get_mut(&lot_id).unwrap().modified = Utc::now();
            let key = component_key(product_id, &lot_id, &component.station, &component.component_id);
            state.components.insert(key, component);
        }
        self.persist().await
    }

    pub async fn update_component(&self, product_id: &str, lot_id: &str, station: &str, component_id: &str, f: impl FnOnce(&mut Component)) -> Result<()> {
        {
            let mut state = self.state.write();
            let key = component_key(product_id, lot_id, station, component_id);
            let component = state.components.get_mut(&key).ok_or_else(|| CatalogError::ComponentNotFound {
                product: product_id.to_string(),
                lot: lot_id.to_string(),
                station: station.to_string(),
                component: component_id.to_string(),
            })?;
            f(component);
            component.touch();
        }
        self.persist().await
    }

    pub async fn remove_component(&self, product_id: &str, lot_id: &str, station: &str, component_id: &str) -> Result<()> {
        {
            let mut state = self.state.write();
            let key = component_key(product_id, lot_id, station, component_id);
            state.components.remove(&key);
        }
        self.persist().await
    }

    pub fn component_stats(&self) -> ComponentStats {
        let state = self.state.read();
        ComponentStats {
            total_components: state.components.len(),
            total_lots: state.lots.len(),
            total_products: state.products.len(),
            components_with_basemap: state.components.values().filter(|c| c.basemap_path.is_some()).count(),
            components_with_lossmap: state.components.values().filter(|c| c.lossmap_path.is_some()).count(),
            components_with_fpy: state.components.values().filter(|c| c.fpy_path.is_some()).count(),
        }
    }

    /// Checks every observed lot's `station_names` against `configured_order`.
    pub fn validate_station_order(&self, configured_order: &[String]) -> StationOrderReport {
        let configured: HashSet<&String> = configured_order.iter().collect();
        let state = self.state.read();
        let mut details = Vec::new();
        let mut ok = true;
        for lot in state.lots.values() {
            for station in &lot.station_names {
                if !configured.contains(station) {
                    ok = false;
                    details.push(format!("lot {} has unconfigured station {station}", lot.lot_id));
                }
            }
        }
        StationOrderReport { ok, details }
    }

    /// Clears the in-memory catalog and repopulates it from the
    /// filesystem. Triggered on startup and whenever the cache file is
    /// found to be corrupt.
    pub async fn rescan_all(&self, scanner: &FilesystemScanner) -> Result<()> {
        {
            let mut state = self.state.write();
            *state = CatalogState::default();
        }
        scanner.scan_into(self).await
    }

    pub fn lots_for_display(&self) -> Vec<(String, String, String)> {
        self.state
            .read()
            .lots
            .values()
            .map(|lot| (lot.product_id.clone(), lot.lot_id.clone(), lot.original_lot_id.clone()))
            .collect()
    }
}
