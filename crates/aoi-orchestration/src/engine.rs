//! TaskEngine (C6): spawns each task immediately via `tokio::spawn`,
//! tracks it in a lock-guarded results table, and broadcasts lifecycle
//! events over a `tokio::sync::broadcast` channel so any number of
//! subscribers can observe progress without the engine ever blocking on
//! one of them (spec §4.6), generalizing the teacher's
//! `PipelineOrchestrator::run_dag` spawn-and-join loop from a fixed DAG
//! of stages to an open set of independently submitted tasks.

use crate::perf::PerfLog;
use crate::pipeline::{self, PipelineContext};
use crate::task::{EngineState, Event};
use aoi_model::{ProcessingTask, TaskParams, TaskStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Completed/failed task records older than this are dropped by
/// `reap_tasks` so the results table doesn't grow without bound across a
/// long-running process.
fn result_retention() -> chrono::Duration {
    chrono::Duration::hours(24)
}

struct TaskRecord {
    task: ProcessingTask,
    handle: Option<JoinHandle<()>>,
}

pub struct TaskEngine {
    ctx: Arc<PipelineContext>,
    perf: Arc<PerfLog>,
    records: RwLock<HashMap<Uuid, TaskRecord>>,
    events: broadcast::Sender<Event>,
    processed_count: AtomicU64,
}

impl TaskEngine {
    pub fn new(ctx: Arc<PipelineContext>, perf: Arc<PerfLog>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { ctx, perf, records: RwLock::new(HashMap::new()), events, processed_count: AtomicU64::new(0) }
    }

    /// A fresh, independent view of the event stream. Each subscriber
    /// gets its own lagging-tolerant receiver; a slow one only risks
    /// missing old events, never blocking the engine.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// A clone of the engine's own broadcast sender, so other
    /// subsystems (the IngestController) can publish onto the same event
    /// bus instead of running a second one (Design Notes §9: "pick one").
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.events.clone()
    }

    pub fn create_task(self: &Arc<Self>, product_id: impl Into<String>, params: TaskParams) -> Uuid {
        let task = ProcessingTask::new(product_id, params);
        let task_id = task.task_id;

        self.records.write().insert(task_id, TaskRecord { task, handle: None });
        self.publish_status();

        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.run_task(task_id).await });
        if let Some(record) = self.records.write().get_mut(&task_id) {
            record.handle = Some(handle);
        }
        task_id
    }

    async fn run_task(self: Arc<Self>, task_id: Uuid) {
        let Some((params, product_id, kind)) = ({
            let mut records = self.records.write();
            records.get_mut(&task_id).map(|record| {
                record.task.status = TaskStatus::Running;
                (record.task.params.clone(), record.task.product_id.clone(), record.task.kind())
            })
        }) else {
            return;
        };
        self.publish_status();

        let lot_id = params.lot_id().map(str::to_string);
        let station = station_of(&params);

        let started = Instant::now();
        let outcome = pipeline::dispatch(&params, &product_id, self.ctx.clone()).await;
        let elapsed = started.elapsed();

        let (status, message) = match &outcome {
            Ok(message) => (TaskStatus::Completed, message.clone()),
            Err(err) => {
                tracing::error!(task_id = %task_id, error = %err, "task failed");
                (TaskStatus::Failed, err.to_string())
            }
        };
        self.perf.record(kind, &product_id, lot_id.as_deref(), station.as_deref(), task_id, status, elapsed);

        let completed_task = {
            let mut records = self.records.write();
            let Some(record) = records.get_mut(&task_id) else { return };
            record.task.status = status;
            record.task.message = message;
            record.task.completed = Some(chrono::Utc::now());
            record.handle = None;
            record.task.clone()
        };

        self.processed_count.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(Event::TaskCompleted(completed_task));
        self.publish_status();
    }

    pub fn get_task_status(&self, task_id: Uuid) -> Option<ProcessingTask> {
        self.records.read().get(&task_id).map(|r| r.task.clone())
    }

    /// Aborts a still-pending-or-running task. Returns `false` once the
    /// task has already finished (there is nothing left to cancel).
    pub fn cancel_task(&self, task_id: Uuid) -> bool {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(&task_id) else { return false };
        if !matches!(record.task.status, TaskStatus::Pending | TaskStatus::Running) {
            return false;
        }
        if let Some(handle) = record.handle.take() {
            handle.abort();
        }
        record.task.status = TaskStatus::Failed;
        record.task.message = "cancelled".to_string();
        record.task.completed = Some(chrono::Utc::now());
        true
    }

    /// Drops completed/failed records older than the retention window,
    /// returning how many were removed. Meant to be called on a timer by
    /// the binary's main loop.
    pub fn reap_tasks(&self) -> usize {
        let cutoff = chrono::Utc::now() - result_retention();
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| record.task.completed.map(|at| at > cutoff).unwrap_or(true));
        before - records.len()
    }

    fn publish_status(&self) {
        let queue_size = self.records.read().values().filter(|r| matches!(r.task.status, TaskStatus::Pending | TaskStatus::Running)).count();
        let _ = self.events.send(Event::StatusChanged {
            state: EngineState::Running,
            queue_size,
            processed_count: self.processed_count.load(Ordering::Relaxed),
        });
    }
}

fn station_of(params: &TaskParams) -> Option<String> {
    match params {
        TaskParams::ProcessCsv { station, .. }
        | TaskParams::Basemap { station, .. }
        | TaskParams::Lossmap { station, .. }
        | TaskParams::Fpy { station, .. }
        | TaskParams::FpyParallel { station, .. }
        | TaskParams::MoveFiles { station, .. } => Some(station.clone()),
        TaskParams::BatchMoveFiles { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::adapters::{CsvTabularReader, NullPlotRenderer};
    use crate::pipeline::move_files::AlwaysReadyGate;
    use aoi_catalog::{DefaultCatalog, JsonFileCatalogStore};
    use aoi_config::AoiConfig;

    async fn test_engine() -> (Arc<TaskEngine>, tempfile::TempDir) {
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
            "processing": {"station_order": ["MT", "DC2"], "flip_config": {}, "station_recipe": {}, "station_logic": {}},
            "defect_rules": {"good": ["Good"], "bad": ["Scratch"]},
            "monitoring": {"scan_interval": 30, "rescan_interval": 300}
        }"#;
        let config_text = template.replace("__BASE__", &dir.path().display().to_string());
        let config = Arc::new(AoiConfig::from_str(&config_text).unwrap());
        let path_builder = Arc::new(config.path_builder().unwrap());
        let store = Arc::new(JsonFileCatalogStore::new(dir.path().join("catalog.json")));
        let catalog: Arc<DefaultCatalog> = Arc::new(DefaultCatalog::load(store).await.unwrap());

        let ctx = Arc::new(PipelineContext {
            catalog,
            config,
            path_builder,
            tabular_reader: Arc::new(CsvTabularReader),
            plot_renderer: Arc::new(NullPlotRenderer),
            readiness_gate: Arc::new(AlwaysReadyGate),
        });
        let perf = Arc::new(PerfLog::new(dir.path().join("perf")));
        (Arc::new(TaskEngine::new(ctx, perf)), dir)
    }

    #[tokio::test]
    async fn unknown_lot_task_completes_as_failed() {
        let (engine, _dir) = test_engine().await;
        let mut rx = engine.subscribe();
        let task_id = engine.create_task("P1", TaskParams::ProcessCsv { lot_id: "missing".to_string(), station: "MT".to_string(), component_id: None });

        let task = loop {
            match rx.recv().await.unwrap() {
                Event::TaskCompleted(task) if task.task_id == task_id => break task,
                _ => continue,
            }
        };
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(engine.get_task_status(task_id).unwrap().status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_task_returns_false_once_finished() {
        let (engine, _dir) = test_engine().await;
        let mut rx = engine.subscribe();
        let task_id = engine.create_task("P1", TaskParams::ProcessCsv { lot_id: "missing".to_string(), station: "MT".to_string(), component_id: None });
        loop {
            if let Event::TaskCompleted(task) = rx.recv().await.unwrap() {
                if task.task_id == task_id {
                    break;
                }
            }
        }
        assert!(!engine.cancel_task(task_id));
    }

    #[tokio::test]
    async fn reap_tasks_keeps_recently_completed() {
        let (engine, _dir) = test_engine().await;
        let mut rx = engine.subscribe();
        let task_id = engine.create_task("P1", TaskParams::ProcessCsv { lot_id: "missing".to_string(), station: "MT".to_string(), component_id: None });
        loop {
            if let Event::TaskCompleted(task) = rx.recv().await.unwrap() {
                if task.task_id == task_id {
                    break;
                }
            }
        }
        assert_eq!(engine.reap_tasks(), 0);
        assert!(engine.get_task_status(task_id).is_some());
    }
}
