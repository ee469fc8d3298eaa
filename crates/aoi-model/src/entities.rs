//! Entity types for §3 of the specification.
//!
//! Shape follows `codegraph-orchestration::job::Job` / `JobState`: plain
//! owned structs, `chrono::DateTime<Utc>` timestamps, `serde` derives for
//! cache/retry-state persistence, `uuid::Uuid` for task identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use uuid::Uuid;

/// A top-level storage partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub lot_ids: BTreeSet<String>,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Product {
    pub fn new(product_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            product_id: product_id.into(),
            lot_ids: BTreeSet::new(),
            description: None,
            created: now,
            modified: now,
        }
    }
}

/// A manufacturing batch. `lot_id` is the internal identifier (possibly
/// `{product_id}_{original_lot_id}` when the same `original_lot_id`
/// collides across products); `original_lot_id` never changes after
/// creation and is always what gets shown to a user or written into a
/// path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub lot_id: String,
    pub original_lot_id: String,
    pub product_id: String,
    pub station_names: BTreeSet<String>,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Lot {
    pub fn new(lot_id: impl Into<String>, original_lot_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            lot_id: lot_id.into(),
            original_lot_id: original_lot_id.into(),
            product_id: product_id.into(),
            station_names: BTreeSet::new(),
            description: None,
            created: now,
            modified: now,
        }
    }
}

/// A single physical component (die/part) at one inspection station.
///
/// The six path fields are populated independently by scanner probing and
/// pipeline stages; `None` means "not yet produced". `csv_path` is always
/// the canonical processed CSV; `original_csv_path` is the raw file found
/// under the `processed_csv` (raw input) subtree, prior to header strip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub component_id: String,
    pub lot_id: String,
    pub station: String,
    pub original_filename: Option<String>,
    pub processed_filename: Option<String>,
    pub org_path: Option<PathBuf>,
    pub roi_path: Option<PathBuf>,
    pub csv_path: Option<PathBuf>,
    pub original_csv_path: Option<PathBuf>,
    pub basemap_path: Option<PathBuf>,
    pub lossmap_path: Option<PathBuf>,
    pub fpy_path: Option<PathBuf>,
    pub defect_stats: HashMap<String, i64>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Component {
    pub fn new(component_id: impl Into<String>, lot_id: impl Into<String>, station: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            component_id: component_id.into(),
            lot_id: lot_id.into(),
            station: station.into(),
            original_filename: None,
            processed_filename: None,
            org_path: None,
            roi_path: None,
            csv_path: None,
            original_csv_path: None,
            basemap_path: None,
            lossmap_path: None,
            fpy_path: None,
            defect_stats: HashMap::new(),
            created: now,
            modified: now,
        }
    }

    /// A component is only catalog-visible once at least one path field is
    /// populated (spec §3 essential invariants).
    pub fn has_any_path(&self) -> bool {
        self.org_path.is_some()
            || self.roi_path.is_some()
            || self.csv_path.is_some()
            || self.original_csv_path.is_some()
            || self.basemap_path.is_some()
            || self.lossmap_path.is_some()
            || self.fpy_path.is_some()
    }

    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }
}

/// File-type selector used by `move_files`/`batch_move_files` and by
/// `StorageTierMover`'s per-file-type archival rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Csv,
    Map,
    Org,
    Roi,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Map => "map",
            FileType::Org => "org",
            FileType::Roi => "roi",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of a `batch_move_files` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMoveEntry {
    pub component_id: String,
    pub lot_id: String,
    pub original_lot_id: String,
    pub station: String,
    pub source_product: String,
}

/// Task kind + kind-specific parameters, kept together as one tagged sum
/// per Design Notes §9 ("Parameter structs live inside the variant, not on
/// the base task").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskParams {
    ProcessCsv {
        lot_id: String,
        station: String,
        component_id: Option<String>,
    },
    Basemap {
        lot_id: String,
        station: String,
        component_id: Option<String>,
    },
    Lossmap {
        lot_id: String,
        station: String,
    },
    Fpy {
        lot_id: String,
        station: String,
    },
    FpyParallel {
        lot_id: String,
        station: String,
    },
    MoveFiles {
        component_id: String,
        lot_id: String,
        original_lot_id: String,
        station: String,
        source_product: String,
        target_product: String,
        file_types: Vec<FileType>,
    },
    BatchMoveFiles {
        entries: Vec<BatchMoveEntry>,
        target_product: String,
        file_types: Vec<FileType>,
    },
}

impl TaskParams {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskParams::ProcessCsv { .. } => TaskKind::ProcessCsv,
            TaskParams::Basemap { .. } => TaskKind::Basemap,
            TaskParams::Lossmap { .. } => TaskKind::Lossmap,
            TaskParams::Fpy { .. } => TaskKind::Fpy,
            TaskParams::FpyParallel { .. } => TaskKind::FpyParallel,
            TaskParams::MoveFiles { .. } => TaskKind::MoveFiles,
            TaskParams::BatchMoveFiles { .. } => TaskKind::BatchMoveFiles,
        }
    }

    pub fn product_id(&self) -> Option<&str> {
        match self {
            TaskParams::MoveFiles { source_product, .. } => Some(source_product),
            _ => None,
        }
    }

    pub fn lot_id(&self) -> Option<&str> {
        match self {
            TaskParams::ProcessCsv { lot_id, .. }
            | TaskParams::Basemap { lot_id, .. }
            | TaskParams::Lossmap { lot_id, .. }
            | TaskParams::Fpy { lot_id, .. }
            | TaskParams::FpyParallel { lot_id, .. }
            | TaskParams::MoveFiles { lot_id, .. } => Some(lot_id),
            TaskParams::BatchMoveFiles { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ProcessCsv,
    Basemap,
    Lossmap,
    Fpy,
    FpyParallel,
    MoveFiles,
    BatchMoveFiles,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ProcessCsv => "process_csv",
            TaskKind::Basemap => "basemap",
            TaskKind::Lossmap => "lossmap",
            TaskKind::Fpy => "fpy",
            TaskKind::FpyParallel => "fpy_parallel",
            TaskKind::MoveFiles => "move_files",
            TaskKind::BatchMoveFiles => "batch_move_files",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A scheduled/running/finished unit of work (spec §3 `ProcessingTask`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingTask {
    pub task_id: Uuid,
    pub product_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub created: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
    pub params: TaskParams,
}

impl ProcessingTask {
    pub fn new(product_id: impl Into<String>, params: TaskParams) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            product_id: product_id.into(),
            status: TaskStatus::Pending,
            message: String::new(),
            created: Utc::now(),
            completed: None,
            params,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.params.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStep {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One ingested-file record, tracked end to end through the pipeline
/// (spec §3 `ProcessingLog`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLog {
    pub timestamp: DateTime<Utc>,
    pub product_id: String,
    pub lot_id: String,
    pub original_lot_id: String,
    pub station: String,
    pub component_id: String,
    pub file_path: PathBuf,
    pub steps: Vec<LogStep>,
    pub status: LogStatus,
    pub message: String,
    pub duration: Option<chrono::Duration>,
}

impl ProcessingLog {
    pub fn new(
        product_id: impl Into<String>,
        lot_id: impl Into<String>,
        original_lot_id: impl Into<String>,
        station: impl Into<String>,
        component_id: impl Into<String>,
        file_path: PathBuf,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            product_id: product_id.into(),
            lot_id: lot_id.into(),
            original_lot_id: original_lot_id.into(),
            station: station.into(),
            component_id: component_id.into(),
            file_path,
            steps: Vec::new(),
            status: LogStatus::Pending,
            message: String::new(),
            duration: None,
        }
    }

    pub fn step(&mut self, name: impl Into<String>, level: LogLevel, message: impl Into<String>) {
        self.steps.push(LogStep {
            timestamp: Utc::now(),
            name: name.into(),
            level,
            message: message.into(),
        });
    }
}

/// A queued, as-yet-unexecuted bulk move (spec §3 `DelayedMoveEntry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayedMoveEntry {
    pub component_id: String,
    pub lot_id: String,
    pub original_lot_id: String,
    pub station: String,
    pub source_product: String,
    pub target_product: String,
    pub enqueued_at: DateTime<Utc>,
}

/// A failed move awaiting retry with exponential backoff (spec §3
/// `RetryEntry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEntry {
    pub component_id: String,
    pub lot_id: String,
    pub original_lot_id: String,
    pub station: String,
    pub source_product: String,
    pub target_product: String,
    pub file_types: Vec<FileType>,
    pub reason: String,
    pub attempt: u32,
    pub next_attempt_time: DateTime<Utc>,
    pub first_failure_time: DateTime<Utc>,
    pub max_retries: u32,
}

/// One pass of the archival mover (spec §3 `ArchiveReport`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveReport {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub success: bool,
    pub files_moved: usize,
    pub size_moved_gb: f64,
    pub by_file_type: HashMap<String, usize>,
    pub errors: Vec<String>,
}
