//! Exercises the basemap/lossmap task bodies end to end: a real
//! filesystem tree scanned by `FilesystemScanner`, fed through
//! `pipeline::dispatch`.

use aoi_catalog::{DefaultCatalog, FilesystemScanner, JsonFileCatalogStore};
use aoi_config::AoiConfig;
use aoi_orchestration::pipeline::adapters::{CsvTabularReader, NullPlotRenderer};
use aoi_orchestration::pipeline::move_files::AlwaysReadyGate;
use aoi_orchestration::pipeline::{dispatch, PipelineContext};
use aoi_model::TaskParams;
use std::sync::Arc;

fn config_json(base_path: &str, alignment_recipe: &str) -> String {
    format!(
        r#"{{
            "database": {{
                "base_path": "{base_path}",
                "structure": {{
                    "csv": "{{base}}/{{product}}/csv/{{lot}}/{{station}}/{{component}}.csv",
                    "org": "{{base}}/{{product}}/org/{{lot}}/{{station}}/{{component}}/",
                    "roi": "{{base}}/{{product}}/roi/{{lot}}/{{station}}/{{component}}/",
                    "map": "{{base}}/{{product}}/map/{{lot}}/{{station}}/{{component}}.png"
                }}
            }},
            "processing": {{
                "station_order": ["MT", "DC2"],
                "flip_config": {{}},
                "station_recipe": {{"MT": "default"}},
                "station_logic": {{}}
            }},
            "defect_rules": {{"good": ["ok"], "bad": ["dirty"]}},
            "monitoring": {{"scan_interval": 30, "rescan_interval": 300}},
            "alignment_recipes": {{"default": {alignment_recipe}}}
        }}"#
    )
}

async fn build_ctx(root: &std::path::Path, data_dir: &std::path::Path, alignment_recipe: &str) -> (Arc<PipelineContext>, Arc<DefaultCatalog>) {
    let config = Arc::new(AoiConfig::from_str(&config_json(&root.display().to_string(), alignment_recipe)).unwrap());
    let path_builder = Arc::new(config.path_builder().unwrap());
    let store = Arc::new(JsonFileCatalogStore::new(data_dir.join("catalog.json")));
    let catalog = Arc::new(DefaultCatalog::load(store).await.unwrap());
    let scanner = FilesystemScanner::new(root.to_path_buf(), config.processing.station_order.clone());
    catalog.rescan_all(&scanner).await.unwrap();

    let ctx = Arc::new(PipelineContext {
        catalog: catalog.clone(),
        config,
        path_builder,
        tabular_reader: Arc::new(CsvTabularReader),
        plot_renderer: Arc::new(NullPlotRenderer),
        readiness_gate: Arc::new(AlwaysReadyGate),
    });
    (ctx, catalog)
}

fn write_component_csv(root: &std::path::Path) {
    let dir = root.join("P1/processed_csv/L1/MT");
    std::fs::create_dir_all(&dir).unwrap();
    let body = "; preamble line 1\n; preamble line 2\n; preamble line 3\nCol,Row,DefectType\n1,1,ok\n1,2,dirty\n";
    std::fs::write(dir.join("DEV_CMP001_202401010000.csv"), body).unwrap();
}

#[tokio::test]
async fn s1_basemap_happy_path() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("D");
    write_component_csv(&root);

    let (ctx, catalog) = build_ctx(&root, tmp.path(), "[[1, 1, \"ok\"]]").await;

    let result = dispatch(&TaskParams::Basemap { lot_id: "L1".into(), station: "MT".into(), component_id: Some("CMP001".into()) }, "P1", ctx.clone())
        .await
        .unwrap();
    assert!(result.starts_with("success 1/1"), "unexpected result: {result}");

    let csv_path = root.join("P1/csv/L1/MT/CMP001.csv");
    let map_path = root.join("P1/map/L1/MT/CMP001.png");
    assert!(csv_path.is_file());
    assert!(map_path.is_file());
    let contents = std::fs::read_to_string(&csv_path).unwrap();
    assert!(contents.starts_with("Col,Row,DefectType"));
    assert_eq!(contents.lines().count(), 3);

    let component = catalog.get_component("L1", "MT", "CMP001").unwrap();
    assert_eq!(component.csv_path.unwrap(), csv_path);
}

#[tokio::test]
async fn s2_alignment_fail_leaves_no_output() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("D");
    write_component_csv(&root);

    let (ctx, _catalog) = build_ctx(&root, tmp.path(), "[[9, 9, \"ok\"]]").await;

    let result = dispatch(&TaskParams::Basemap { lot_id: "L1".into(), station: "MT".into(), component_id: Some("CMP001".into()) }, "P1", ctx)
        .await
        .unwrap();
    assert!(result.contains("alignment"), "expected alignment failure in message, got: {result}");
    assert!(!root.join("P1/csv/L1/MT/CMP001.csv").exists());
    assert!(!root.join("P1/map/L1/MT/CMP001.png").exists());
}

#[tokio::test]
async fn s3_lossmap_on_first_station_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("D");
    write_component_csv(&root);

    let (ctx, _catalog) = build_ctx(&root, tmp.path(), "[[1, 1, \"ok\"]]").await;

    let err = dispatch(&TaskParams::Lossmap { lot_id: "L1".into(), station: "MT".into() }, "P1", ctx).await.unwrap_err();
    assert!(err.to_string().contains("first station"), "unexpected error: {err}");
    assert!(!root.join("P1/map/L1/LOSS0/CMP001.png").exists());
}
