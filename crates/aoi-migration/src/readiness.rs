//! PathReadinessMonitor (spec §4.10): decides whether an `org`/`roi` move
//! can proceed right now by inspecting how much of the target directory
//! chain already exists on the source side, and owns the monitor table for
//! components that are partially there.

use crate::retry::RetryQueue;
use aoi_catalog::DefaultCatalog;
use aoi_model::{FileType, PathBuilder};
use aoi_orchestration::pipeline::move_files::{MoveReadinessGate, MoveRequest};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Complete,
    Partial,
    Base,
    Absent,
}

fn classify(target: &Path) -> Readiness {
    if target.exists() {
        return Readiness::Complete;
    }
    match target.parent() {
        Some(station_dir) if station_dir.exists() => return Readiness::Partial,
        _ => {}
    }
    let lot_dir = target.parent().and_then(Path::parent);
    match lot_dir {
        Some(dir) if dir.exists() => Readiness::Base,
        _ => Readiness::Absent,
    }
}

struct MonitorEntry {
    request: MoveRequest,
    pending: Vec<FileType>,
    started: DateTime<Utc>,
}

fn key(lot_id: &str, station: &str, component_id: &str) -> String {
    format!("{lot_id}\u{1f}{station}\u{1f}{component_id}")
}

pub struct PathReadinessMonitor {
    catalog: Arc<DefaultCatalog>,
    path_builder: Arc<PathBuilder>,
    retry: Arc<RetryQueue>,
    max_retries: u32,
    monitored: Mutex<HashMap<String, MonitorEntry>>,
}

impl PathReadinessMonitor {
    pub fn new(catalog: Arc<DefaultCatalog>, path_builder: Arc<PathBuilder>, retry: Arc<RetryQueue>, max_retries: u32) -> Self {
        Self { catalog, path_builder, retry, max_retries, monitored: Mutex::new(HashMap::new()) }
    }

    fn target_path(&self, request: &MoveRequest, file_type: FileType) -> Option<std::path::PathBuf> {
        match file_type {
            FileType::Org => self.path_builder.build_org(&request.source_product, &request.original_lot_id, &request.station, &request.component_id).ok(),
            FileType::Roi => self.path_builder.build_roi(&request.source_product, &request.original_lot_id, &request.station, &request.component_id).ok(),
            FileType::Csv | FileType::Map => None,
        }
    }

    fn register_pending(&self, request: &MoveRequest, file_type: FileType) {
        let k = key(&request.lot_id, &request.station, &request.component_id);
        let mut monitored = self.monitored.lock();
        let entry = monitored.entry(k).or_insert_with(|| MonitorEntry {
            request: request.clone(),
            pending: Vec::new(),
            started: Utc::now(),
        });
        if !entry.pending.contains(&file_type) {
            entry.pending.push(file_type);
        }
    }

    /// Periodic sweep: re-checks every monitored entry and fires
    /// `move_files` for any whose pending file_types have all become
    /// `complete`. Intended to run on a `tokio::time::interval` loop owned
    /// by the migration engine.
    pub async fn sweep(&self, ctx: &Arc<aoi_orchestration::pipeline::PipelineContext>) {
        let ready: Vec<MoveRequest> = {
            let mut monitored = self.monitored.lock();
            let mut ready = Vec::new();
            monitored.retain(|_, entry| {
                let all_complete = entry
                    .pending
                    .iter()
                    .all(|ft| matches!(self.target_path(&entry.request, *ft).map(|p| classify(&p)), Some(Readiness::Complete)));
                if all_complete {
                    ready.push(entry.request.clone());
                    false
                } else {
                    true
                }
            });
            ready
        };

        for request in ready {
            let task = aoi_orchestration::pipeline::move_files::MoveFilesTask {
                component_id: request.component_id.clone(),
                lot_id: request.lot_id.clone(),
                original_lot_id: request.original_lot_id.clone(),
                station: request.station.clone(),
                source_product: request.source_product.clone(),
                target_product: request.target_product.clone(),
                file_types: request.file_types.clone(),
            };
            if let Err(err) = aoi_orchestration::pipeline::PipelineTask::run(&task, Arc::clone(ctx)).await {
                tracing::warn!(component_id = %request.component_id, error = %err, "readiness-triggered move failed");
            }
        }
    }

    pub fn monitored_count(&self) -> usize {
        self.monitored.lock().len()
    }
}

impl MoveReadinessGate for PathReadinessMonitor {
    fn check(&self, request: &MoveRequest, file_type: FileType) -> bool {
        if self.catalog.get_lot(&request.lot_id).is_err() {
            tracing::warn!(lot_id = %request.lot_id, "readiness check against unknown lot");
            return false;
        }
        let Some(target) = self.target_path(request, file_type) else {
            return true;
        };

        match classify(&target) {
            Readiness::Complete => true,
            Readiness::Partial | Readiness::Base => {
                self.register_pending(request, file_type);
                false
            }
            Readiness::Absent => {
                self.retry.add(
                    request.component_id.clone(),
                    request.lot_id.clone(),
                    request.original_lot_id.clone(),
                    request.station.clone(),
                    request.source_product.clone(),
                    request.target_product.clone(),
                    vec![file_type],
                    "target path absent",
                    self.max_retries,
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_reports_complete_when_target_exists() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("COMP1");
        std::fs::create_dir_all(&target).unwrap();
        assert_eq!(classify(&target), Readiness::Complete);
    }

    #[test]
    fn classify_reports_partial_when_only_station_dir_exists() {
        let dir = tempfile::tempdir().unwrap();
        let station_dir = dir.path().join("LOT1").join("MT");
        std::fs::create_dir_all(&station_dir).unwrap();
        assert_eq!(classify(&station_dir.join("COMP1")), Readiness::Partial);
    }

    #[test]
    fn classify_reports_base_when_only_lot_dir_exists() {
        let dir = tempfile::tempdir().unwrap();
        let lot_dir = dir.path().join("LOT1");
        std::fs::create_dir_all(&lot_dir).unwrap();
        assert_eq!(classify(&lot_dir.join("MT").join("COMP1")), Readiness::Base);
    }

    #[test]
    fn classify_reports_absent_when_nothing_exists() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(classify(&dir.path().join("LOT1").join("MT").join("COMP1")), Readiness::Absent);
    }
}
