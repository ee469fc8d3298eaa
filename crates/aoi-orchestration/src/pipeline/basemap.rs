//! basemap(component? or all-in-station): the fixed four-step protocol
//! (spec §4.7). The MigrationEngine immediate-move hook that's supposed
//! to fire "on success" is wired as a `TaskCompleted` subscriber instead
//! of a direct call, so this crate never depends on `aoi-migration`.

use super::{PipelineContext, PipelineTask};
use crate::align::{check_alignment, AlignmentOutcome, ReferenceTriple};
use crate::error::{PipelineError, Result};
use crate::header_strip::strip_header;
use async_trait::async_trait;
use aoi_model::transforms::{apply_mask, flip, Axis, MaskRule};
use aoi_model::{Component, PlotStyle};
use regex::Regex;
use std::sync::{Arc, OnceLock};

pub struct BasemapTask {
    pub product_id: String,
    pub lot_id: String,
    pub station: String,
    pub component_id: Option<String>,
}

fn processed_filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]+\.csv$").unwrap())
}

#[async_trait]
impl PipelineTask for BasemapTask {
    async fn run(&self, ctx: Arc<PipelineContext>) -> Result<String> {
        let lot = ctx.catalog.get_lot(&self.lot_id)?;
        let components = match &self.component_id {
            Some(id) => vec![ctx.catalog.get_component(&self.lot_id, &self.station, id)?],
            None => ctx.catalog.get_components_by_lot_station(&self.lot_id, &self.station),
        };

        let mut ok = 0usize;
        let mut failed = Vec::new();
        for component in components {
            let id = component.component_id.clone();
            match run_one(&ctx, &lot.product_id, &lot.original_lot_id, &self.station, component).await {
                Ok(()) => ok += 1,
                Err(err) => failed.push(format!("{id}: {err}")),
            }
        }
        let total = ok + failed.len();
        if failed.is_empty() {
            Ok(format!("success {ok}/{total}"))
        } else {
            Ok(format!("success {ok}/{total}; failures: {}", failed.join(", ")))
        }
    }
}

async fn run_one(ctx: &Arc<PipelineContext>, product_id: &str, original_lot_id: &str, station: &str, component: Component) -> Result<()> {
    let already_processed = component
        .csv_path
        .as_ref()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(|n| processed_filename_pattern().is_match(n))
        .unwrap_or(false);

    let csv_path = if already_processed {
        component.csv_path.clone().ok_or_else(|| PipelineError::FileNotFound(component.component_id.clone().into()))?
    } else {
        let source = component
            .original_csv_path
            .clone()
            .or_else(|| component.csv_path.clone())
            .ok_or_else(|| PipelineError::FileNotFound(component.component_id.clone().into()))?;

        let recipe = ctx.config.processing.station_recipe.get(station).cloned().unwrap_or_default();
        let references: Vec<ReferenceTriple> = ctx
            .config
            .get::<Vec<(i64, i64, String)>>(&format!("alignment_recipes.{recipe}"))
            .unwrap_or_default()
            .into_iter()
            .map(|(col, row, defect_type)| ReferenceTriple { col, row, defect_type })
            .collect();

        match check_alignment(&source, &references) {
            Ok((AlignmentOutcome::Success, _)) => {}
            Ok((AlignmentOutcome::Fail, message)) => return Err(PipelineError::AlignmentFail { path: source, message }),
            Err(err) => return Err(err),
        }

        let dest = ctx.path_builder.build_csv(product_id, original_lot_id, station, &component.component_id)?;
        let written = strip_header(&source, Some(&dest))?;
        ctx.catalog
            .update_component(product_id, &component.lot_id, station, &component.component_id, |c| {
                c.original_csv_path = Some(source.clone());
                c.csv_path = Some(written.clone());
            })
            .await?;
        written
    };

    let mut table = ctx
        .tabular_reader
        .read(&csv_path)
        .map_err(|err| PipelineError::SchemaMismatch { path: csv_path.clone(), reason: err.to_string() })?;

    let mask_rules: Vec<MaskRule> = ctx
        .config
        .get::<Vec<(i64, i64, i64, i64)>>(&format!("sample_rules.{station}.mask"))
        .unwrap_or_default()
        .into_iter()
        .map(|(start_row, end_row, start_col, end_col)| MaskRule { start_row, end_row, start_col, end_col })
        .collect();
    if !mask_rules.is_empty() {
        table = apply_mask(&table, &mask_rules);
    }
    if ctx.config.processing.flip(station) {
        table = flip(&table, Axis::Horizontal);
    }

    let dest = ctx.path_builder.build_map(product_id, original_lot_id, station, &component.component_id)?;
    ctx.plot_renderer
        .render(&table, &PlotStyle { title: Some(format!("{station}/{}", component.component_id)), ..Default::default() }, &dest)
        .map_err(|err| PipelineError::RenderFailure { path: dest.clone(), message: err.to_string() })?;

    ctx.catalog
        .update_component(product_id, &component.lot_id, station, &component.component_id, |c| {
            c.basemap_path = Some(dest.clone());
        })
        .await?;
    Ok(())
}
