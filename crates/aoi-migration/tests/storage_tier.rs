//! S8: a scheduled archive pass picks the oldest whole-component group
//! first and leaves newer components untouched, exercised directly
//! against `StorageTierMover::run_scheduled_pass` (disk-percent gating
//! belongs to `check_thresholds`, which this bypasses since real disk
//! usage can't be controlled from a test).

use aoi_catalog::{DefaultCatalog, JsonFileCatalogStore};
use aoi_config::ArchiveRule;
use aoi_model::{Component, PathBuilder};
use aoi_migration::StorageTierMover;
use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn set_mtime(path: &std::path::Path, when: SystemTime) {
    File::open(path).unwrap().set_modified(when).unwrap();
}

fn write_org_files(dir: &std::path::Path, names: &[&str], age: SystemTime) {
    std::fs::create_dir_all(dir).unwrap();
    for name in names {
        std::fs::write(dir.join(name), b"binary-image-data").unwrap();
    }
    set_mtime(dir, age);
}

#[tokio::test]
async fn s8_scheduled_pass_archives_oldest_group_only() {
    let tmp = tempfile::tempdir().unwrap();
    let local_root = tmp.path().join("D");
    let archive_root = tmp.path().join("archive");

    let c1_dir = local_root.join("P1/org/L1/MT/C1");
    let c2_dir = local_root.join("P1/org/L1/MT/C2");
    write_org_files(&c1_dir, &["img1.bmp", "img2.bmp", "img3.bmp"], SystemTime::now() - Duration::from_secs(2 * 24 * 3600));
    write_org_files(&c2_dir, &["img1.bmp"], SystemTime::now() - Duration::from_secs(3600));

    let store = Arc::new(JsonFileCatalogStore::new(tmp.path().join("catalog.json")));
    let catalog = Arc::new(DefaultCatalog::load(store).await.unwrap());
    let mut c1 = Component::new("C1", String::new(), "MT");
    c1.org_path = Some(c1_dir.clone());
    catalog.add_component("P1", "L1", c1).await.unwrap();
    let mut c2 = Component::new("C2", String::new(), "MT");
    c2.org_path = Some(c2_dir.clone());
    catalog.add_component("P1", "L1", c2).await.unwrap();

    let mut structure = HashMap::new();
    structure.insert(aoi_model::FileType::Csv, "{base}/{product}/csv/{lot}/{station}/{component}.csv".to_string());
    structure.insert(aoi_model::FileType::Org, "{base}/{product}/org/{lot}/{station}/{component}/".to_string());
    structure.insert(aoi_model::FileType::Roi, "{base}/{product}/roi/{lot}/{station}/{component}/".to_string());
    structure.insert(aoi_model::FileType::Map, "{base}/{product}/map/{lot}/{station}/{component}.png".to_string());
    let path_builder = Arc::new(PathBuilder::new(local_root.display().to_string(), &structure).unwrap());

    let mut rules = HashMap::new();
    rules.insert("org".to_string(), ArchiveRule { enabled: true, min_age_days: 1, batch_size: 1 });

    let mover = StorageTierMover::new(
        catalog.clone(),
        path_builder,
        local_root.clone(),
        archive_root.clone(),
        aoi_config::LocalStorageThresholds { warning_threshold_percent: 80.0, critical_threshold_percent: 90.0 },
        rules,
        tmp.path().join("archive_reports.log"),
    );

    mover.run_scheduled_pass().await;

    assert!(!c1_dir.exists(), "C1's org directory should have been archived off the primary disk");
    assert!(c2_dir.exists(), "C2 is younger than the age cutoff and must be left alone");

    let archived_c1 = archive_root.join("P1/org/L1/MT/C1");
    assert!(archived_c1.join("img1.bmp").is_file());
    assert!(archived_c1.join("img2.bmp").is_file());
    assert!(archived_c1.join("img3.bmp").is_file());

    let reports = mover.reports_snapshot();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].files_moved, 3);
    assert_eq!(reports[0].by_file_type.get("org"), Some(&3));
    assert!(reports[0].success);
}
