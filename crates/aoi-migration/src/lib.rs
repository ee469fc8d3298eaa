//! MigrationEngine (C10) and StorageTierMover (C11): everything that
//! moves artifacts between product subtrees and storage tiers once a
//! component's files exist, plus the bookkeeping (readiness, retries,
//! failure suppression) that makes those moves eventually consistent
//! instead of best-effort-once.

pub mod delayed;
pub mod error;
pub mod ledger;
pub mod readiness;
pub mod retry;
pub mod tier_mover;

pub use error::{MigrationError, Result};
pub use ledger::FailureLedger;
pub use readiness::PathReadinessMonitor;
pub use retry::RetryQueue;
pub use tier_mover::StorageTierMover;

use aoi_catalog::DefaultCatalog;
use aoi_config::AoiConfig;
use aoi_model::{BatchMoveEntry, DelayedMoveEntry, FileType, PathBuilder, TaskParams};
use aoi_orchestration::pipeline::move_files::MoveFilesTask;
use aoi_orchestration::pipeline::{PipelineContext, PipelineTask};
use aoi_orchestration::{Event, TaskEngine};
use delayed::DelayedMoveQueue;
use std::sync::Arc;
use tokio::sync::broadcast;

fn parse_file_types(names: &[String]) -> Vec<FileType> {
    names
        .iter()
        .filter_map(|n| match n.as_str() {
            "csv" => Some(FileType::Csv),
            "org" => Some(FileType::Org),
            "roi" => Some(FileType::Roi),
            "map" => Some(FileType::Map),
            _ => None,
        })
        .collect()
}

/// Ties the immediate hook, DelayedMoveQueue, PathReadinessMonitor,
/// RetryQueue, FailureLedger and StorageTierMover together and exposes a
/// single `spawn` that starts every background loop.
pub struct MigrationEngine {
    config: Arc<AoiConfig>,
    catalog: Arc<DefaultCatalog>,
    pipeline_ctx: Arc<PipelineContext>,
    engine: Arc<TaskEngine>,
    delayed: Arc<DelayedMoveQueue>,
    retry: Arc<RetryQueue>,
    readiness: Arc<PathReadinessMonitor>,
    ledger: Arc<FailureLedger>,
    tier_mover: Option<Arc<StorageTierMover>>,
}

impl MigrationEngine {
    /// `retry` and `readiness` must be the same instances already injected
    /// into `pipeline_ctx.readiness_gate` — callers build those first (they
    /// have no dependency on the engine or task engine) and share them here
    /// so the immediate hook, the retry sweep and every `move_files` call
    /// dispatched through the task engine observe one bookkeeping state,
    /// not three independently-persisted copies of `retry_tasks.json`.
    pub fn new(
        config: Arc<AoiConfig>,
        catalog: Arc<DefaultCatalog>,
        path_builder: Arc<PathBuilder>,
        pipeline_ctx: Arc<PipelineContext>,
        engine: Arc<TaskEngine>,
        retry: Arc<RetryQueue>,
        readiness: Arc<PathReadinessMonitor>,
        archive_reports_path: impl Into<std::path::PathBuf>,
    ) -> Self {
        let max_retries = config.auto_move.retry_mechanism.max_retry_count;
        let delayed = Arc::new(DelayedMoveQueue::new(config.auto_move.delayed.schedule.as_ref()));
        let ledger = Arc::new(FailureLedger::new(max_retries));

        let tier_mover = if config.storage_management.enabled {
            config.storage_management.archive_storage.path.clone().map(|archive_path| {
                Arc::new(StorageTierMover::new(
                    catalog.clone(),
                    path_builder.clone(),
                    path_builder.base(),
                    archive_path,
                    config.storage_management.local_storage.clone(),
                    config.storage_management.scheduled_archive.archive_rules.clone(),
                    archive_reports_path,
                ))
            })
        } else {
            None
        };

        Self { config, catalog, pipeline_ctx, engine, delayed, retry, readiness, ledger, tier_mover }
    }

    /// The gate to inject into `PipelineContext` so `move_files` consults
    /// this engine's readiness bookkeeping instead of always proceeding.
    pub fn readiness_gate(&self) -> Arc<PathReadinessMonitor> {
        self.readiness.clone()
    }

    pub fn spawn(self: &Arc<Self>) {
        let engine_events = self.engine.subscribe();
        tokio::spawn(Self::run_immediate_hook(self.clone(), engine_events));
        tokio::spawn(Self::run_delayed_scheduler(self.clone()));
        tokio::spawn(Self::run_retry_sweep(self.clone()));
        tokio::spawn(Self::run_readiness_sweep(self.clone()));
        if self.tier_mover.is_some() {
            tokio::spawn(Self::run_storage_loops(self.clone()));
        }
    }

    async fn run_immediate_hook(self: Arc<Self>, mut events: broadcast::Receiver<Event>) {
        loop {
            match events.recv().await {
                Ok(Event::TaskCompleted(task)) => self.on_task_completed(task).await,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "migration engine lagged behind task events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn on_task_completed(&self, task: aoi_model::ProcessingTask) {
        if !matches!(task.status, aoi_model::TaskStatus::Completed) {
            return;
        }
        let TaskParams::Basemap { lot_id, station, component_id: Some(component_id) } = &task.params else { return };
        if !self.config.auto_move.enabled {
            return;
        }
        let Some(target_product) = self.config.auto_move.target_product.clone() else { return };
        if task.product_id == target_product {
            return;
        }
        let Ok(lot) = self.catalog.get_lot(lot_id) else {
            tracing::warn!(lot_id, "auto-move triggered for an unknown lot, skipping");
            return;
        };
        let original_lot_id = lot.original_lot_id.clone();

        let immediate_types = parse_file_types(&self.config.auto_move.immediate.file_types);
        let move_task = MoveFilesTask {
            component_id: component_id.clone(),
            lot_id: lot_id.clone(),
            original_lot_id: original_lot_id.clone(),
            station: station.clone(),
            source_product: task.product_id.clone(),
            target_product: target_product.clone(),
            file_types: immediate_types,
        };

        match move_task.run(self.pipeline_ctx.clone()).await {
            Ok(msg) => {
                tracing::info!(component_id, msg, "immediate move completed");
                self.retry.record_success(lot_id, station, component_id);

                if self.config.auto_move.delayed.enabled {
                    self.delayed.enqueue(DelayedMoveEntry {
                        component_id: component_id.clone(),
                        lot_id: lot_id.clone(),
                        original_lot_id: original_lot_id.clone(),
                        station: station.clone(),
                        source_product: task.product_id.clone(),
                        target_product,
                        enqueued_at: chrono::Utc::now(),
                    });
                }
            }
            Err(err) => {
                let key = format!("{lot_id}/{station}/{component_id}");
                if self.ledger.is_suppressed(&key) {
                    tracing::debug!(component_id, "immediate move failure suppressed by ledger");
                    return;
                }
                self.ledger.record_failure(&key);
                tracing::warn!(component_id, error = %err, "immediate move failed");
                self.retry.add(
                    component_id.clone(),
                    lot_id.clone(),
                    original_lot_id,
                    station.clone(),
                    task.product_id.clone(),
                    target_product,
                    parse_file_types(&self.config.auto_move.immediate.file_types),
                    err.to_string(),
                    self.config.auto_move.retry_mechanism.max_retry_count,
                );
            }
        }
    }

    async fn run_delayed_scheduler(self: Arc<Self>) {
        loop {
            let now = chrono::Local::now();
            let fire_at = self.delayed.next_fire_time(now);
            let wait = (fire_at - now).to_std().unwrap_or(std::time::Duration::from_secs(60));
            tokio::time::sleep(wait).await;

            let file_types = parse_file_types(&self.config.auto_move.delayed.file_types);
            let groups = self.delayed.drain(file_types.clone());
            for (source_product, target_product, entries) in groups {
                self.dispatch_batch_move(entries, source_product, target_product, file_types.clone());
            }
        }
    }

    fn dispatch_batch_move(&self, entries: Vec<BatchMoveEntry>, source_product: String, target_product: String, file_types: Vec<FileType>) {
        self.engine.create_task(source_product, TaskParams::BatchMoveFiles { entries, target_product, file_types });
    }

    async fn run_retry_sweep(self: Arc<Self>) {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            self.retry.prune_expired(chrono::Utc::now());
            for entry in self.retry.due_entries(chrono::Utc::now()) {
                let task = MoveFilesTask {
                    component_id: entry.component_id.clone(),
                    lot_id: entry.lot_id.clone(),
                    original_lot_id: entry.original_lot_id.clone(),
                    station: entry.station.clone(),
                    source_product: entry.source_product.clone(),
                    target_product: entry.target_product.clone(),
                    file_types: entry.file_types.clone(),
                };
                match task.run(self.pipeline_ctx.clone()).await {
                    Ok(_) => self.retry.record_success(&entry.lot_id, &entry.station, &entry.component_id),
                    Err(err) => {
                        tracing::warn!(component_id = %entry.component_id, error = %err, "retry attempt failed");
                        self.retry.record_failure(&entry.lot_id, &entry.station, &entry.component_id);
                    }
                }
            }
        }
    }

    async fn run_readiness_sweep(self: Arc<Self>) {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            self.readiness.sweep(&self.pipeline_ctx).await;
        }
    }

    async fn run_storage_loops(self: Arc<Self>) {
        let Some(tier_mover) = self.tier_mover.clone() else { return };
        let scan_interval = std::time::Duration::from_secs(self.config.storage_management.monitoring.scan_interval_seconds);
        let threshold_mover = tier_mover.clone();
        let threshold_loop = tokio::spawn(async move {
            loop {
                threshold_mover.check_thresholds().await;
                tokio::time::sleep(scan_interval).await;
            }
        });

        let schedule = self.config.storage_management.scheduled_archive.schedule.clone();
        let schedule_time = delayed::scheduled_time(schedule.as_ref());
        let schedule_days = delayed::allowed_days(schedule.as_ref());
        let scheduled_loop = tokio::spawn(async move {
            loop {
                let now = chrono::Local::now();
                let fire_at = delayed::next_fire_after(now, schedule_time, &schedule_days);
                let wait = (fire_at - now).to_std().unwrap_or(std::time::Duration::from_secs(3600));
                tokio::time::sleep(wait).await;
                tier_mover.run_scheduled_pass().await;
            }
        });

        let _ = tokio::join!(threshold_loop, scheduled_loop);
    }

    pub fn retry_count(&self) -> usize {
        self.retry.len()
    }

    pub fn delayed_queue_size(&self) -> usize {
        self.delayed.len()
    }

    pub fn catalog(&self) -> &Arc<DefaultCatalog> {
        &self.catalog
    }
}
