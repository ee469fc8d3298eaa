//! IngestController (spec §4.9): turns `FileFound` watcher events into
//! queued basemap work, and `TaskCompleted` engine events back into
//! per-file outcomes. Everything lives behind one mutex — no nested
//! locks — per the shared-resource discipline in spec §5.

use crate::watcher::WatcherEvent;
use aoi_catalog::DefaultCatalog;
use aoi_model::{Component, LogLevel, LogStatus, ProcessingLog, TaskParams};
use aoi_orchestration::{EngineState, Event, TaskEngine};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_CONCURRENT_TASKS: usize = 2;

fn aoi_filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]+_([A-Z0-9]+)_\d{12}\.csv$").unwrap())
}

fn component_id_from_path(path: &Path) -> Option<String> {
    let filename = path.file_name()?.to_str()?;
    aoi_filename_pattern().captures(filename).map(|caps| caps[1].to_string())
}

struct IngestState {
    queue: VecDeque<ProcessingLog>,
    current_tasks: usize,
    task_log_map: HashMap<Uuid, ProcessingLog>,
}

pub struct IngestController {
    catalog: Arc<DefaultCatalog>,
    engine: Arc<TaskEngine>,
    max_concurrent_tasks: usize,
    state: Mutex<IngestState>,
    events: broadcast::Sender<Event>,
    processed_count: AtomicU64,
}

impl IngestController {
    pub fn new(catalog: Arc<DefaultCatalog>, engine: Arc<TaskEngine>) -> Arc<Self> {
        Self::with_concurrency(catalog, engine, DEFAULT_MAX_CONCURRENT_TASKS)
    }

    pub fn with_concurrency(catalog: Arc<DefaultCatalog>, engine: Arc<TaskEngine>, max_concurrent_tasks: usize) -> Arc<Self> {
        let events = engine.event_sender();
        Arc::new(Self {
            catalog,
            engine,
            max_concurrent_tasks,
            state: Mutex::new(IngestState { queue: VecDeque::new(), current_tasks: 0, task_log_map: HashMap::new() }),
            events,
            processed_count: AtomicU64::new(0),
        })
    }

    /// Spawns the watcher-event listener, the engine-event listener, and
    /// the 1Hz dispatch tick. All three share `self` via `Arc::clone`.
    pub fn spawn(self: &Arc<Self>, watcher_events: broadcast::Receiver<WatcherEvent>, engine_events: broadcast::Receiver<Event>) {
        let controller = self.clone();
        tokio::spawn(async move { controller.run_watcher_listener(watcher_events).await });

        let controller = self.clone();
        tokio::spawn(async move { controller.run_engine_listener(engine_events).await });

        let controller = self.clone();
        tokio::spawn(async move { controller.run_dispatch_tick().await });
    }

    async fn run_watcher_listener(self: Arc<Self>, mut rx: broadcast::Receiver<WatcherEvent>) {
        loop {
            match rx.recv().await {
                Ok(WatcherEvent::FileFound { product_id, original_lot_id, station, path }) => {
                    self.on_file_found(&product_id, &original_lot_id, &station, &path).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "ingest controller lagged behind watcher events");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    async fn run_engine_listener(self: Arc<Self>, mut rx: broadcast::Receiver<Event>) {
        loop {
            match rx.recv().await {
                Ok(Event::TaskCompleted(task)) => self.on_task_completed(task).await,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "ingest controller lagged behind engine events");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    async fn run_dispatch_tick(self: Arc<Self>) {
        loop {
            tokio::time::sleep(TICK_INTERVAL).await;
            self.dispatch_ready();
        }
    }

    async fn on_file_found(&self, product_id: &str, original_lot_id: &str, station: &str, path: &Path) {
        let Some(component_id) = component_id_from_path(path) else {
            tracing::warn!(path = %path.display(), "file found event with unparseable filename, dropping");
            return;
        };

        let Ok(lot) = self.catalog.get_lot(original_lot_id) else {
            tracing::warn!(product_id, original_lot_id, "lot not yet in catalog, dropping until a rescan picks it up");
            return;
        };

        let existing = self.catalog.get_component(&lot.lot_id, station, &component_id);
        let result = match existing {
            Ok(mut component) => {
                component.original_csv_path = Some(path.to_path_buf());
                component.original_filename = path.file_name().map(|n| n.to_string_lossy().to_string());
                self.catalog.add_component(product_id, original_lot_id, component).await
            }
            Err(_) => {
                let mut component = Component::new(component_id.clone(), String::new(), station.to_string());
                component.original_csv_path = Some(path.to_path_buf());
                component.original_filename = path.file_name().map(|n| n.to_string_lossy().to_string());
                self.catalog.add_component(product_id, original_lot_id, component).await
            }
        };
        if let Err(err) = result {
            tracing::error!(error = %err, component_id, "failed to register ingested file in catalog");
            return;
        }

        let mut log = ProcessingLog::new(product_id, &lot.lot_id, &lot.original_lot_id, station, component_id, path.to_path_buf());
        log.step("file_found", LogLevel::Info, "queued for basemap processing");
        self.state.lock().queue.push_back(log);
    }

    fn dispatch_ready(&self) {
        loop {
            let next = {
                let mut state = self.state.lock();
                if state.current_tasks >= self.max_concurrent_tasks {
                    return;
                }
                let Some(log) = state.queue.pop_front() else { return };
                state.current_tasks += 1;
                log
            };

            let task_id = self.engine.create_task(
                next.product_id.clone(),
                TaskParams::Basemap { lot_id: next.lot_id.clone(), station: next.station.clone(), component_id: Some(next.component_id.clone()) },
            );
            self.state.lock().task_log_map.insert(task_id, next);
        }
    }

    async fn on_task_completed(&self, task: aoi_model::ProcessingTask) {
        let log = {
            let mut state = self.state.lock();
            let Some(mut log) = state.task_log_map.remove(&task.task_id) else { return };
            state.current_tasks = state.current_tasks.saturating_sub(1);
            let (status, level) = if task.status == aoi_model::TaskStatus::Completed {
                (LogStatus::Completed, LogLevel::Info)
            } else {
                (LogStatus::Failed, LogLevel::Error)
            };
            log.status = status;
            log.message = task.message.clone();
            log.duration = task.completed.map(|at| at - log.timestamp);
            log.step("task_completed", level, task.message);
            log
        };

        self.processed_count.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(Event::LogUpdated(Some(log)));
        self.publish_status();
    }

    fn publish_status(&self) {
        let queue_size = self.state.lock().queue.len();
        let _ = self.events.send(Event::StatusChanged {
            state: EngineState::Running,
            queue_size,
            processed_count: self.processed_count.load(Ordering::Relaxed),
        });
    }

    pub fn queue_size(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aoi_catalog::JsonFileCatalogStore;
    use aoi_config::AoiConfig;
    use aoi_orchestration::pipeline::adapters::{CsvTabularReader, NullPlotRenderer};
    use aoi_orchestration::pipeline::move_files::AlwaysReadyGate;
    use aoi_orchestration::{PerfLog, PipelineContext};

    async fn test_controller() -> (Arc<IngestController>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let template = r#"{
            "database": {
                "base_path": "__BASE__",
                "structure": {
                    "csv": "{base}/{product}/csv/{lot}/{station}/{component}.csv",
                    "org": "{base}/{product}/org/{lot}/{station}/{component}/",
                    "roi": "{base}/{product}/roi/{lot}/{station}/{component}/",
                    "map": "{base}/{product}/map/{lot}/{station}/{component}.png"
                }
            },
            "processing": {"station_order": ["MT"], "flip_config": {}, "station_recipe": {}, "station_logic": {}},
            "defect_rules": {"good": ["Good"], "bad": ["Scratch"]},
            "monitoring": {"scan_interval": 30, "rescan_interval": 300}
        }"#
        .replace("__BASE__", &dir.path().display().to_string());
        let config = Arc::new(AoiConfig::from_str(&template).unwrap());
        let path_builder = Arc::new(config.path_builder().unwrap());
        let store = Arc::new(JsonFileCatalogStore::new(dir.path().join("catalog.json")));
        let catalog: Arc<DefaultCatalog> = Arc::new(DefaultCatalog::load(store).await.unwrap());

        let ctx = Arc::new(PipelineContext {
            catalog: catalog.clone(),
            config,
            path_builder,
            tabular_reader: Arc::new(CsvTabularReader),
            plot_renderer: Arc::new(NullPlotRenderer),
            readiness_gate: Arc::new(AlwaysReadyGate),
        });
        let perf = Arc::new(PerfLog::new(dir.path().join("perf")));
        let engine = Arc::new(TaskEngine::new(ctx, perf));
        (IngestController::new(catalog, engine), dir)
    }

    #[tokio::test]
    async fn file_found_for_unknown_lot_is_dropped() {
        let (controller, _dir) = test_controller().await;
        controller.on_file_found("P1", "L1", "MT", Path::new("/tmp/DEV_CMP001_202401010000.csv")).await;
        assert_eq!(controller.queue_size(), 0);
    }

    #[tokio::test]
    async fn file_found_for_known_lot_queues_a_log() {
        let (controller, _dir) = test_controller().await;
        let mut seed = Component::new("SEED", "", "MT");
        seed.csv_path = Some("/tmp/seed.csv".into());
        controller.catalog.add_component("P1", "L1", seed).await.unwrap();

        controller.on_file_found("P1", "L1", "MT", Path::new("/tmp/DEV_CMP001_202401010000.csv")).await;
        assert_eq!(controller.queue_size(), 1);
    }
}
