//! A lot name reused under two products must not collide: each product
//! gets its own internal lot id and its own copy of the component.

use aoi_catalog::{DefaultCatalog, FilesystemScanner, JsonFileCatalogStore};
use std::sync::Arc;

fn write_csv(root: &std::path::Path, product: &str) {
    let dir = root.join(product).join("csv/L1/MT");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("C.csv"), "Col,Row,DefectType\n1,1,ok\n").unwrap();
}

#[tokio::test]
async fn lot_reused_across_products_gets_distinct_internal_ids() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("D");
    write_csv(&root, "P1");
    write_csv(&root, "P2");

    let store = Arc::new(JsonFileCatalogStore::new(tmp.path().join("catalog.json")));
    let catalog = Arc::new(DefaultCatalog::load(store).await.unwrap());
    let scanner = FilesystemScanner::new(root.clone(), vec!["MT".to_string()]);
    catalog.rescan_all(&scanner).await.unwrap();

    let p1_lots = catalog.get_lots_by_product("P1");
    let p2_lots = catalog.get_lots_by_product("P2");
    assert_eq!(p1_lots.len(), 1);
    assert_eq!(p2_lots.len(), 1);
    assert_eq!(p1_lots[0].original_lot_id, "L1");
    assert_eq!(p2_lots[0].original_lot_id, "L1");
    assert_ne!(p1_lots[0].lot_id, p2_lots[0].lot_id);

    let p1_component = catalog.get_component(&p1_lots[0].lot_id, "MT", "C").unwrap();
    let p2_component = catalog.get_component(&p2_lots[0].lot_id, "MT", "C").unwrap();
    assert_eq!(p1_component.csv_path.unwrap(), root.join("P1/csv/L1/MT/C.csv"));
    assert_eq!(p2_component.csv_path.unwrap(), root.join("P2/csv/L1/MT/C.csv"));

    // Calling with the bare original_lot_id resolves to whichever lot
    // literally carries that string as its internal id (P1, the first
    // product scanned) without raising ambiguity, since that's a direct
    // key hit rather than a fuzzy original_lot_id search.
    let bare = catalog.get_component("L1", "MT", "C").unwrap();
    assert_eq!(bare.csv_path.unwrap(), root.join("P1/csv/L1/MT/C.csv"));
}
