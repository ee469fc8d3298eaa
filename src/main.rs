//! Boot sequence for the AOI pipeline and orchestrator: load config, load
//! or rebuild the catalog, wire the task engine, ingest controller, file
//! watcher and migration engine together, then run until a shutdown
//! signal arrives.

use anyhow::{Context, Result};
use aoi_catalog::{DefaultCatalog, FilesystemScanner, JsonFileCatalogStore};
use aoi_config::AoiConfig;
use aoi_migration::MigrationEngine;
use aoi_orchestration::pipeline::adapters::{CsvTabularReader, NullPlotRenderer};
use aoi_orchestration::pipeline::PipelineContext;
use aoi_orchestration::{PerfLog, TaskEngine};
use aoi_watcher::{FileWatcher, IngestController};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "aoi-orchestrator", about = "Manufacturing-inspection data pipeline and storage-migration orchestrator")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Directory for the catalog cache, retry state and archive reports.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = Arc::new(AoiConfig::from_file(&cli.config).context("loading configuration")?);
    let path_builder = Arc::new(config.path_builder().context("building path templates")?);

    std::fs::create_dir_all(&cli.data_dir).context("creating data directory")?;
    let catalog_path = cli.data_dir.join("catalog.json");
    let store = Arc::new(JsonFileCatalogStore::new(&catalog_path));
    let catalog = Arc::new(DefaultCatalog::load(store).await.context("loading catalog cache")?);

    if catalog.get_products().is_empty() {
        tracing::info!("catalog cache empty, running initial full scan");
        let scanner = FilesystemScanner::new(config.database.base_path.clone(), config.processing.station_order.clone());
        catalog.rescan_all(&scanner).await.context("initial filesystem scan")?;
    }

    let retry_queue = Arc::new(aoi_migration::RetryQueue::load(cli.data_dir.join("retry_tasks.json")));
    let readiness_gate = Arc::new(aoi_migration::PathReadinessMonitor::new(
        catalog.clone(),
        path_builder.clone(),
        retry_queue.clone(),
        config.auto_move.retry_mechanism.max_retry_count,
    ));

    let pipeline_ctx = Arc::new(PipelineContext {
        catalog: catalog.clone(),
        config: config.clone(),
        path_builder: path_builder.clone(),
        tabular_reader: Arc::new(CsvTabularReader),
        plot_renderer: Arc::new(NullPlotRenderer),
        readiness_gate: readiness_gate.clone(),
    });

    let perf = Arc::new(PerfLog::new(cli.data_dir.join("perf")));
    let engine = Arc::new(TaskEngine::new(pipeline_ctx.clone(), perf));

    let ingest = IngestController::new(catalog.clone(), engine.clone());
    let watcher = FileWatcher::new(config.clone(), Some(cli.config.clone()), catalog.clone());
    ingest.spawn(watcher.subscribe(), engine.subscribe());
    watcher.spawn();

    let migration = Arc::new(MigrationEngine::new(
        config.clone(),
        catalog.clone(),
        path_builder.clone(),
        pipeline_ctx.clone(),
        engine.clone(),
        retry_queue,
        readiness_gate,
        cli.data_dir.join("archive_reports.log"),
    ));
    migration.spawn();

    tracing::info!(
        queue = ingest.queue_size(),
        retries = migration.retry_count(),
        "aoi-orchestrator running"
    );

    wait_for_shutdown().await;
    tracing::info!("shutting down");
    catalog.save().await.context("saving catalog on shutdown")?;
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
