//! StorageTierMover (spec §4.11): watches free space on the primary disk
//! and moves whole-component file groups to a secondary archive disk,
//! either on a threshold trip or a daily schedule. Disk measurement mirrors
//! `original_source/dbmplus/app/utils/storage_monitor.py`'s use of
//! `psutil.disk_usage`, done here with `sysinfo`.

use aoi_catalog::DefaultCatalog;
use aoi_config::{ArchiveRule, LocalStorageThresholds, Schedule};
use aoi_model::{ArchiveReport, FileType, PathBuilder};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sysinfo::Disks;

const MAX_REPORTS: usize = 100;

pub struct StorageTierMover {
    catalog: Arc<DefaultCatalog>,
    path_builder: Arc<PathBuilder>,
    local_path: PathBuf,
    archive_path: PathBuf,
    thresholds: LocalStorageThresholds,
    rules: HashMap<String, ArchiveRule>,
    reports_path: PathBuf,
    reports: Mutex<Vec<ArchiveReport>>,
}

fn file_type_for_rule(name: &str) -> Option<FileType> {
    match name {
        "csv" => Some(FileType::Csv),
        "org" => Some(FileType::Org),
        "roi" => Some(FileType::Roi),
        "map" => Some(FileType::Map),
        _ => None,
    }
}

impl StorageTierMover {
    pub fn new(
        catalog: Arc<DefaultCatalog>,
        path_builder: Arc<PathBuilder>,
        local_path: impl Into<PathBuf>,
        archive_path: impl Into<PathBuf>,
        thresholds: LocalStorageThresholds,
        rules: HashMap<String, ArchiveRule>,
        reports_path: impl Into<PathBuf>,
    ) -> Self {
        let reports_path = reports_path.into();
        let reports = Self::load_reports(&reports_path);
        Self {
            catalog,
            path_builder,
            local_path: local_path.into(),
            archive_path: archive_path.into(),
            thresholds,
            rules,
            reports_path,
            reports: Mutex::new(reports),
        }
    }

    fn load_reports(path: &Path) -> Vec<ArchiveReport> {
        std::fs::read_to_string(path).ok().and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
    }

    fn persist_reports(&self, reports: &[ArchiveReport]) {
        if let Some(parent) = self.reports_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(text) = serde_json::to_string_pretty(reports) {
            if let Err(err) = std::fs::write(&self.reports_path, text) {
                tracing::warn!(error = %err, "failed to persist archive reports");
            }
        }
    }

    fn push_report(&self, report: ArchiveReport) {
        let mut reports = self.reports.lock();
        reports.push(report);
        if reports.len() > MAX_REPORTS {
            let overflow = reports.len() - MAX_REPORTS;
            reports.drain(0..overflow);
        }
        self.persist_reports(&reports);
    }

    /// Percent of the primary disk in use, `None` if the filesystem holding
    /// `local_path` can't be identified.
    pub fn percent_used(&self) -> Option<f64> {
        let disks = Disks::new_with_refreshed_list();
        let mut best: Option<(&Path, &sysinfo::Disk)> = None;
        for disk in disks.list() {
            let mount = disk.mount_point();
            if self.local_path.starts_with(mount) {
                if best.map(|(m, _)| mount.as_os_str().len() > m.as_os_str().len()).unwrap_or(true) {
                    best = Some((mount, disk));
                }
            }
        }
        let (_, disk) = best?;
        let total = disk.total_space();
        if total == 0 {
            return None;
        }
        let used = total - disk.available_space();
        Some(used as f64 / total as f64 * 100.0)
    }

    /// One iteration of the free-space loop (spec: run every
    /// `scan_interval_seconds`). Dispatches an emergency or warning pass,
    /// or does nothing.
    pub async fn check_thresholds(&self) {
        let Some(used_pct) = self.percent_used() else { return };
        if used_pct >= self.thresholds.critical_threshold_percent {
            tracing::warn!(used_pct, "primary disk at critical threshold, running emergency archive pass");
            self.run_pass(10, 1).await;
        } else if used_pct >= self.thresholds.warning_threshold_percent {
            tracing::info!(used_pct, "primary disk at warning threshold, running archive pass");
            self.run_pass(5, 7).await;
        }
    }

    /// Scheduled daily pass driven by `rules`' own `min_age_days`/`batch_size`.
    pub async fn run_scheduled_pass(&self) {
        for (name, rule) in self.rules.clone() {
            if !rule.enabled {
                continue;
            }
            let Some(file_type) = file_type_for_rule(&name) else { continue };
            self.archive_rule(file_type, rule.min_age_days, rule.batch_size).await;
        }
    }

    async fn run_pass(&self, batch_size: usize, min_age_days: u32) {
        for file_type in [FileType::Org, FileType::Roi, FileType::Csv] {
            self.archive_rule(file_type, min_age_days, batch_size).await;
        }
    }

    /// Finds candidate components for `file_type` across every cataloged
    /// product/lot, sorts by the age of their oldest matching file, and
    /// archives the first `batch_size` whole-component groups.
    async fn archive_rule(&self, file_type: FileType, min_age_days: u32, batch_size: usize) {
        let cutoff = Utc::now() - chrono::Duration::days(min_age_days as i64);
        let mut candidates: Vec<(chrono::DateTime<Utc>, String, String, String, PathBuf)> = Vec::new();

        for product in self.catalog.get_products() {
            for lot in self.catalog.get_lots_by_product(&product.product_id) {
                for station in &lot.station_names {
                    for component in self.catalog.get_components_by_lot_station(&lot.lot_id, station) {
                        let Some(path) = component_path(&component, file_type) else { continue };
                        let Ok(metadata) = std::fs::metadata(&path) else { continue };
                        let Ok(modified) = metadata.modified() else { continue };
                        let modified: chrono::DateTime<Utc> = modified.into();
                        if modified < cutoff {
                            candidates.push((modified, lot.original_lot_id.clone(), station.clone(), component.component_id.clone(), path));
                        }
                    }
                }
            }
        }

        candidates.sort_by_key(|(age, ..)| *age);
        let selected = candidates.into_iter().take(batch_size);

        let mut files_moved = 0usize;
        let mut bytes_moved = 0u64;
        let mut errors = Vec::new();
        let mut by_file_type = HashMap::new();

        for (_, original_lot_id, station, component_id, source) in selected {
            match self.archive_one(&source).await {
                Ok((count, bytes)) => {
                    files_moved += count;
                    bytes_moved += bytes;
                    *by_file_type.entry(file_type.as_str().to_string()).or_insert(0) += count;
                }
                Err(err) => errors.push(format!("{original_lot_id}/{station}/{component_id}: {err}")),
            }
        }

        if files_moved == 0 && errors.is_empty() {
            return;
        }

        self.push_report(ArchiveReport {
            timestamp: Utc::now(),
            kind: format!("{file_type}"),
            success: errors.is_empty(),
            files_moved,
            size_moved_gb: bytes_moved as f64 / (1024.0 * 1024.0 * 1024.0),
            by_file_type,
            errors,
        });
    }

    /// Free space remaining on the disk backing `archive_path`, `None` if
    /// its filesystem can't be identified.
    fn archive_free_bytes(&self) -> Option<u64> {
        let disks = Disks::new_with_refreshed_list();
        let mut best: Option<(&Path, &sysinfo::Disk)> = None;
        for disk in disks.list() {
            let mount = disk.mount_point();
            if self.archive_path.starts_with(mount) {
                if best.map(|(m, _)| mount.as_os_str().len() > m.as_os_str().len()).unwrap_or(true) {
                    best = Some((mount, disk));
                }
            }
        }
        best.map(|(_, disk)| disk.available_space())
    }

    /// Copy-then-verify-then-delete: the target is only removed from the
    /// primary disk once its archived copy matches in byte length. Returns
    /// the number of files moved and the bytes copied — a directory-backed
    /// file type (org/roi) archives every file it contains in one group.
    async fn archive_one(&self, source: &Path) -> std::io::Result<(usize, u64)> {
        let needed = dir_size(source).unwrap_or(0);
        if let Some(free) = self.archive_free_bytes() {
            if free < needed {
                return Err(std::io::Error::other(format!(
                    "archive disk has {free} bytes free, need at least {needed} for {}",
                    source.display()
                )));
            }
        }

        let relative = source.strip_prefix(self.path_builder.base()).unwrap_or(source);
        let target = self.archive_path.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if source.is_dir() {
            copy_dir_recursive(source, &target)?;
            if let Err(err) = verify_dir(source, &target) {
                let _ = std::fs::remove_dir_all(&target);
                return Err(err);
            }
            let count = count_files(source)?;
            let bytes = dir_size(source).unwrap_or(0);
            std::fs::remove_dir_all(source)?;
            Ok((count, bytes))
        } else {
            std::fs::copy(source, &target)?;
            let src_len = std::fs::metadata(source)?.len();
            let dst_len = std::fs::metadata(&target)?.len();
            if src_len != dst_len {
                let _ = std::fs::remove_file(&target);
                return Err(std::io::Error::other("archive copy size mismatch"));
            }
            std::fs::remove_file(source)?;
            Ok((1, src_len))
        }
    }

    pub fn reports_snapshot(&self) -> Vec<ArchiveReport> {
        self.reports.lock().clone()
    }
}

fn component_path(component: &aoi_model::Component, file_type: FileType) -> Option<PathBuf> {
    match file_type {
        FileType::Csv => component.csv_path.clone(),
        FileType::Org => component.org_path.clone(),
        FileType::Roi => component.roi_path.clone(),
        FileType::Map => component.basemap_path.clone(),
    }
}

fn copy_dir_recursive(source: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(target)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

fn count_files(dir: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_dir() {
            count += count_files(&entry.path())?;
        } else {
            count += 1;
        }
    }
    Ok(count)
}

/// Total byte size of `path`: its own length if a file, or the recursive
/// sum of its contents if a directory. Used both to size-check the
/// archive disk before copying and to report bytes actually moved.
fn dir_size(path: &Path) -> std::io::Result<u64> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }
    let mut total = 0u64;
    for entry in std::fs::read_dir(path)? {
        total += dir_size(&entry?.path())?;
    }
    Ok(total)
}

fn verify_dir(source: &Path, target: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.path().is_dir() {
            verify_dir(&entry.path(), &dest)?;
        } else {
            let src_len = entry.metadata()?.len();
            let dst_len = std::fs::metadata(&dest)?.len();
            if src_len != dst_len {
                return Err(std::io::Error::other(format!("size mismatch for {}", dest.display())));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_for_rule_maps_known_names() {
        assert_eq!(file_type_for_rule("org"), Some(FileType::Org));
        assert_eq!(file_type_for_rule("unknown"), None);
    }
}
