//! Pipeline (C7): task bodies for each `TaskKind`, composed from
//! AlignmentChecker, HeaderStripper, Transforms and a `PlotRenderer`.

pub mod adapters;
pub mod basemap;
pub mod batch_move_files;
pub mod fpy;
pub mod move_files;
pub mod process_csv;

use crate::error::Result;
use aoi_catalog::DefaultCatalog;
use aoi_config::AoiConfig;
use aoi_model::{PathBuilder, PlotRenderer, TabularReader, TaskParams};
use async_trait::async_trait;
use std::sync::Arc;

pub use move_files::{MoveReadinessGate, MoveRequest};

/// Everything a task body needs, threaded through once at startup.
pub struct PipelineContext {
    pub catalog: Arc<DefaultCatalog>,
    pub config: Arc<AoiConfig>,
    pub path_builder: Arc<PathBuilder>,
    pub tabular_reader: Arc<dyn TabularReader>,
    pub plot_renderer: Arc<dyn PlotRenderer>,
    pub readiness_gate: Arc<dyn MoveReadinessGate>,
}

#[async_trait]
pub trait PipelineTask: Send + Sync {
    async fn run(&self, ctx: Arc<PipelineContext>) -> Result<String>;
}

pub async fn dispatch(params: &TaskParams, product_id: &str, ctx: Arc<PipelineContext>) -> Result<String> {
    match params {
        TaskParams::ProcessCsv { lot_id, station, component_id } => {
            process_csv::ProcessCsvTask {
                product_id: product_id.to_string(),
                lot_id: lot_id.clone(),
                station: station.clone(),
                component_id: component_id.clone(),
            }
            .run(ctx)
            .await
        }
        TaskParams::Basemap { lot_id, station, component_id } => {
            basemap::BasemapTask {
                product_id: product_id.to_string(),
                lot_id: lot_id.clone(),
                station: station.clone(),
                component_id: component_id.clone(),
            }
            .run(ctx)
            .await
        }
        TaskParams::Lossmap { lot_id, station } => {
            fpy::LossmapTask { product_id: product_id.to_string(), lot_id: lot_id.clone(), station: station.clone() }.run(ctx).await
        }
        TaskParams::Fpy { lot_id, station } => {
            fpy::FpyTask { product_id: product_id.to_string(), lot_id: lot_id.clone(), station: station.clone(), parallel: false }
                .run(ctx)
                .await
        }
        TaskParams::FpyParallel { lot_id, station } => {
            fpy::FpyTask { product_id: product_id.to_string(), lot_id: lot_id.clone(), station: station.clone(), parallel: true }
                .run(ctx)
                .await
        }
        TaskParams::MoveFiles { component_id, lot_id, original_lot_id, station, source_product, target_product, file_types } => {
            move_files::MoveFilesTask {
                component_id: component_id.clone(),
                lot_id: lot_id.clone(),
                original_lot_id: original_lot_id.clone(),
                station: station.clone(),
                source_product: source_product.clone(),
                target_product: target_product.clone(),
                file_types: file_types.clone(),
            }
            .run(ctx)
            .await
        }
        TaskParams::BatchMoveFiles { entries, target_product, file_types } => {
            batch_move_files::BatchMoveFilesTask {
                entries: entries.clone(),
                target_product: target_product.clone(),
                file_types: file_types.clone(),
            }
            .run(ctx)
            .await
        }
    }
}
