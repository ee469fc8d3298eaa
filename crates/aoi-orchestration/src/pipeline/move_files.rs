//! move_files (spec §4.7, §8 invariant 8). `csv`/`map` are always
//! attempted immediately; `org`/`roi` go through a [`MoveReadinessGate`]
//! first — the concrete gate (PathReadinessMonitor + RetryQueue) lives in
//! the migration crate and is injected via [`super::PipelineContext`] so
//! this crate never depends on it directly.

use super::{PipelineContext, PipelineTask};
use crate::error::Result;
use async_trait::async_trait;
use aoi_model::FileType;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub component_id: String,
    pub lot_id: String,
    pub original_lot_id: String,
    pub station: String,
    pub source_product: String,
    pub target_product: String,
    pub file_types: Vec<FileType>,
}

/// `check` returns `true` when the caller should proceed with the move
/// right now. A `false` means the gate has taken responsibility for
/// retrying later (it registers its own bookkeeping internally).
pub trait MoveReadinessGate: Send + Sync {
    fn check(&self, request: &MoveRequest, file_type: FileType) -> bool;
}

/// Always-ready gate, used when no migration engine is wired in (e.g.
/// unit tests for the pipeline in isolation).
pub struct AlwaysReadyGate;

impl MoveReadinessGate for AlwaysReadyGate {
    fn check(&self, _request: &MoveRequest, _file_type: FileType) -> bool {
        true
    }
}

pub struct MoveFilesTask {
    pub component_id: String,
    pub lot_id: String,
    pub original_lot_id: String,
    pub station: String,
    pub source_product: String,
    pub target_product: String,
    pub file_types: Vec<FileType>,
}

#[async_trait]
impl PipelineTask for MoveFilesTask {
    async fn run(&self, ctx: Arc<PipelineContext>) -> Result<String> {
        // `self.lot_id` is a snapshot taken before this move was queued: if
        // an earlier call already relocated csv/map to `target_product`,
        // the component now lives under whatever internal lot_id
        // `ensure_lot` assigned there, which may differ from the snapshot.
        // Re-resolve from `original_lot_id`, which is stable across moves,
        // checking the target first since every deferred/retried call
        // runs after the component has already been re-homed there.
        let lot_id = ctx
            .catalog
            .current_lot_id(&self.target_product, &self.original_lot_id)
            .or_else(|_| ctx.catalog.current_lot_id(&self.source_product, &self.original_lot_id))?;
        let component = ctx.catalog.get_component(&lot_id, &self.station, &self.component_id)?;
        let request = MoveRequest {
            component_id: self.component_id.clone(),
            lot_id: lot_id.clone(),
            original_lot_id: self.original_lot_id.clone(),
            station: self.station.clone(),
            source_product: self.source_product.clone(),
            target_product: self.target_product.clone(),
            file_types: self.file_types.clone(),
        };

        let mut moved = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();

        for file_type in &self.file_types {
            let gated = matches!(file_type, FileType::Org | FileType::Roi);
            if gated && !ctx.readiness_gate.check(&request, *file_type) {
                skipped.push(file_type.to_string());
                continue;
            }
            match move_one(&ctx, &self.original_lot_id, &self.station, &component.component_id, &self.source_product, &self.target_product, *file_type)
                .await
            {
                Ok(()) => moved.push(file_type.to_string()),
                Err(err) => failed.push(format!("{file_type}: {err}")),
            }
        }

        if !moved.is_empty() {
            ctx.catalog.remove_component(&self.source_product, &lot_id, &self.station, &self.component_id).await?;
            let mut updated = component.clone();
            apply_moved_paths(&mut updated, &moved, &ctx, &self.target_product, &self.original_lot_id, &self.station);
            ctx.catalog.add_component(&self.target_product, &self.original_lot_id, updated).await?;
        }

        Ok(format!(
            "moved {}/{} ({} skipped); failures: {}",
            moved.len(),
            self.file_types.len(),
            skipped.len(),
            if failed.is_empty() { "none".to_string() } else { failed.join(", ") }
        ))
    }
}

fn apply_moved_paths(
    component: &mut aoi_model::Component,
    moved: &[String],
    ctx: &Arc<PipelineContext>,
    target_product: &str,
    original_lot_id: &str,
    station: &str,
) {
    for kind in moved {
        let path = match kind.as_str() {
            "csv" => ctx.path_builder.build_csv(target_product, original_lot_id, station, &component.component_id).ok(),
            "org" => ctx.path_builder.build_org(target_product, original_lot_id, station, &component.component_id).ok(),
            "roi" => ctx.path_builder.build_roi(target_product, original_lot_id, station, &component.component_id).ok(),
            "map" => ctx.path_builder.build_map(target_product, original_lot_id, station, &component.component_id).ok(),
            _ => None,
        };
        match kind.as_str() {
            "csv" => component.csv_path = path,
            "org" => component.org_path = path,
            "roi" => component.roi_path = path,
            "map" => component.basemap_path = path,
            _ => {}
        }
    }
}

async fn move_one(
    ctx: &Arc<PipelineContext>,
    original_lot_id: &str,
    station: &str,
    component_id: &str,
    source_product: &str,
    target_product: &str,
    file_type: FileType,
) -> Result<()> {
    let (source, target) = match file_type {
        FileType::Csv => (
            ctx.path_builder.build_csv(source_product, original_lot_id, station, component_id)?,
            ctx.path_builder.build_csv(target_product, original_lot_id, station, component_id)?,
        ),
        FileType::Org => (
            ctx.path_builder.build_org(source_product, original_lot_id, station, component_id)?,
            ctx.path_builder.build_org(target_product, original_lot_id, station, component_id)?,
        ),
        FileType::Roi => (
            ctx.path_builder.build_roi(source_product, original_lot_id, station, component_id)?,
            ctx.path_builder.build_roi(target_product, original_lot_id, station, component_id)?,
        ),
        FileType::Map => (
            ctx.path_builder.build_map(source_product, original_lot_id, station, component_id)?,
            ctx.path_builder.build_map(target_product, original_lot_id, station, component_id)?,
        ),
    };

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if source.is_dir() {
        copy_dir_recursive(&source, &target)?;
        std::fs::remove_dir_all(&source)?;
    } else {
        std::fs::rename(&source, &target).or_else(|_| -> std::io::Result<()> {
            std::fs::copy(&source, &target)?;
            std::fs::remove_file(&source)
        })?;
    }
    Ok(())
}

fn copy_dir_recursive(source: &std::path::Path, target: &std::path::Path) -> std::io::Result<()> {
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
