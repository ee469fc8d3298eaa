//! The Catalog (C1) and FilesystemScanner (C2): the single in-memory
//! source of truth for products/lots/components, backed by a pluggable
//! [`CatalogStore`] and populated by filesystem probing.

pub mod catalog;
pub mod error;
pub mod scanner;
pub mod store;

pub use catalog::{Catalog, ComponentStats, StationOrderReport};
pub use error::{CatalogError, Result};
pub use scanner::FilesystemScanner;
pub use store::{CatalogSnapshot, CatalogStore, JsonFileCatalogStore};

/// The production catalog type: every other crate depends on this
/// concrete alias rather than threading a `CatalogStore` type parameter
/// through the whole stack.
pub type DefaultCatalog = Catalog<JsonFileCatalogStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use aoi_model::Component;
    use std::sync::Arc;

    async fn empty_catalog() -> Catalog<JsonFileCatalogStore> {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileCatalogStore::new(dir.path().join("cache.json")));
        // Leak the tempdir for the duration of the test process; fine for
        // unit tests that don't outlive the process.
        std::mem::forget(dir);
        Catalog::load(store).await.unwrap()
    }

    #[tokio::test]
    async fn empty_component_is_never_cached() {
        let catalog = empty_catalog().await;
        let component = Component::new("C1", "", "MT");
        catalog.add_component("P1", "L1", component).await.unwrap();
        assert_eq!(catalog.component_stats().total_components, 0);
    }

    #[tokio::test]
    async fn duplicate_original_lot_across_products_gets_compound_id() {
        let catalog = empty_catalog().await;
        let mut c1 = Component::new("C1", "", "MT");
        c1.csv_path = Some("/tmp/a.csv".into());
        catalog.add_component("P1", "L1", c1).await.unwrap();

        let mut c2 = Component::new("C2", "", "MT");
        c2.csv_path = Some("/tmp/b.csv".into());
        catalog.add_component("P2", "L1", c2).await.unwrap();

        let lot_p1 = catalog.get_lot("L1").unwrap();
        assert_eq!(lot_p1.product_id, "P1");
        let lot_p2 = catalog.get_lot("P2_L1").unwrap();
        assert_eq!(lot_p2.product_id, "P2");
        assert_eq!(lot_p2.original_lot_id, "L1");
    }

    #[tokio::test]
    async fn get_component_resolves_by_original_lot_id() {
        let catalog = empty_catalog().await;
        let mut c = Component::new("C1", "", "MT");
        c.csv_path = Some("/tmp/a.csv".into());
        catalog.add_component("P1", "LOT-9", c).await.unwrap();

        let found = catalog.get_component("LOT-9", "MT", "C1").unwrap();
        assert_eq!(found.component_id, "C1");
    }
}
