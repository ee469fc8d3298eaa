//! lossmap/fpy/fpy_parallel (spec §4.7): both rebuild a binarized table per
//! station from the processed CSV and combine them; lossmap compares the
//! current station against the one immediately before it, fpy combines
//! every station up to and including the current one.

use super::{PipelineContext, PipelineTask};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use aoi_model::transforms::{binarize, classify_loss_points, flip, Axis};
use aoi_model::{CellValue, Component, PathBuilder, PlotStyle, Row, Table};
use std::collections::HashMap;
use std::sync::Arc;

pub struct LossmapTask {
    pub product_id: String,
    pub lot_id: String,
    pub station: String,
}

#[async_trait]
impl PipelineTask for LossmapTask {
    async fn run(&self, ctx: Arc<PipelineContext>) -> Result<String> {
        if ctx.config.processing.is_first_station(&self.station) {
            return Err(PipelineError::ConfigMissing(format!("{} is the first station, lossmap has no predecessor to compare against", self.station)));
        }
        let previous_station = ctx
            .config
            .processing
            .previous_station(&self.station)
            .ok_or_else(|| PipelineError::ConfigMissing(format!("no previous station configured before {}", self.station)))?
            .to_string();
        let idx = ctx.config.processing.station_index(&self.station).unwrap_or(0);

        let lot = ctx.catalog.get_lot(&self.lot_id)?;
        let components = ctx.catalog.get_components_by_lot_station(&self.lot_id, &self.station);

        let mut ok = 0usize;
        let mut failed = Vec::new();
        let mut skipped = 0usize;
        for component in components {
            let previous = match ctx.catalog.get_component(&self.lot_id, &previous_station, &component.component_id) {
                Ok(c) => c,
                Err(_) => {
                    tracing::warn!(component_id = %component.component_id, previous_station, "no component at previous station, skipping lossmap");
                    skipped += 1;
                    continue;
                }
            };
            match run_one(&ctx, &lot.product_id, &lot.original_lot_id, &self.station, idx, &component, &previous).await {
                Ok(()) => ok += 1,
                Err(err) => failed.push(format!("{}: {err}", component.component_id)),
            }
        }
        let total = ok + failed.len();
        if failed.is_empty() {
            Ok(format!("success {ok}/{total} ({skipped} skipped, no predecessor)"))
        } else {
            Ok(format!("success {ok}/{total} ({skipped} skipped); failures: {}", failed.join(", ")))
        }
    }
}

fn binarized_table(ctx: &PipelineContext, component: &Component, station: &str) -> Result<Table> {
    let path = component.csv_path.clone().ok_or_else(|| PipelineError::FileNotFound(component.component_id.clone().into()))?;
    let table = ctx
        .tabular_reader
        .read(&path)
        .map_err(|err| PipelineError::SchemaMismatch { path: path.clone(), reason: err.to_string() })?;
    let table = if ctx.config.processing.flip(station) { flip(&table, Axis::Horizontal) } else { table };
    Ok(binarize(&table, &ctx.config.defect_rules.good))
}

async fn run_one(
    ctx: &Arc<PipelineContext>,
    product_id: &str,
    original_lot_id: &str,
    station: &str,
    station_index: usize,
    component: &Component,
    previous: &Component,
) -> Result<()> {
    let previous_station = ctx.config.processing.previous_station(station).unwrap_or("");
    let curr = binarized_table(ctx, component, station)?;
    let prev = binarized_table(ctx, previous, previous_station)?;

    let classified = classify_loss_points(&prev, &curr);
    let mut out = Table::new(vec!["Col".to_string(), "Row".to_string(), "status".to_string()]);
    for (col, row, status) in &classified {
        let mut r = Row::new();
        r.insert("Col".to_string(), CellValue::Int(*col));
        r.insert("Row".to_string(), CellValue::Int(*row));
        r.insert("status".to_string(), CellValue::Text(format!("{status:?}")));
        out.push_row(r);
    }

    let group = PathBuilder::lossmap_group(station_index);
    let dest = ctx.path_builder.build_map(product_id, original_lot_id, &group, &component.component_id)?;
    ctx.plot_renderer
        .render(&out, &PlotStyle { title: Some(format!("{group}/{}", component.component_id)), ..Default::default() }, &dest)
        .map_err(|err| PipelineError::RenderFailure { path: dest.clone(), message: err.to_string() })?;

    ctx.catalog
        .update_component(product_id, &component.lot_id, station, &component.component_id, |c| {
            c.lossmap_path = Some(dest.clone());
        })
        .await?;
    Ok(())
}

pub struct FpyTask {
    pub product_id: String,
    pub lot_id: String,
    pub station: String,
    pub parallel: bool,
}

struct FpyResult {
    component_id: String,
    fpy_percent: f64,
    plot: Table,
}

#[async_trait]
impl PipelineTask for FpyTask {
    async fn run(&self, ctx: Arc<PipelineContext>) -> Result<String> {
        let stations: Vec<String> = match ctx.config.processing.station_index(&self.station) {
            Some(idx) => ctx.config.processing.station_order[..=idx].to_vec(),
            None => return Err(PipelineError::ConfigMissing(format!("{} is not in the configured station order", self.station))),
        };
        if stations.len() == 1 {
            tracing::warn!(station = %self.station, "fpy on the first configured station yields from a single binarization, not a cumulative chain");
        }

        let lot = ctx.catalog.get_lot(&self.lot_id)?;
        let components = ctx.catalog.get_components_by_lot_station(&self.lot_id, &self.station);

        // Resolve every component at every earlier station up front (async
        // catalog lookups), so the CPU-bound merge/render work below is
        // plain sync code that a rayon pool can run without touching async.
        let mut per_component_stations: Vec<(Component, Vec<Component>)> = Vec::new();
        let mut skipped = 0usize;
        'components: for component in components {
            let mut chain = Vec::with_capacity(stations.len());
            for station in &stations {
                match ctx.catalog.get_component(&self.lot_id, station, &component.component_id) {
                    Ok(c) => chain.push(c),
                    Err(_) => {
                        tracing::warn!(component_id = %component.component_id, station, "missing at an earlier station, skipping fpy");
                        skipped += 1;
                        continue 'components;
                    }
                }
            }
            per_component_stations.push((component, chain));
        }

        let results: Vec<Result<FpyResult>> = if self.parallel && per_component_stations.len() > 1 {
            let pool_size = per_component_stations.len().min(8);
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(pool_size)
                .build()
                .map_err(|err| PipelineError::ConfigMissing(format!("failed to build fpy worker pool: {err}")))?;
            let ctx_ref = &ctx;
            let stations_ref = &stations;
            pool.install(|| {
                use rayon::prelude::*;
                per_component_stations.par_iter().map(|(component, chain)| compute_fpy(ctx_ref, stations_ref, component, chain)).collect()
            })
        } else {
            per_component_stations.iter().map(|(component, chain)| compute_fpy(&ctx, &stations, component, chain)).collect()
        };

        let mut ok = 0usize;
        let mut failed = Vec::new();
        let mut summary_rows: Vec<(String, f64)> = Vec::new();
        for (component, result) in per_component_stations.iter().map(|(c, _)| c).zip(results) {
            match result {
                Ok(fpy) => {
                    let dest = ctx.path_builder.build_map(&lot.product_id, &lot.original_lot_id, PathBuilder::fpy_group(), &component.component_id)?;
                    ctx.plot_renderer
                        .render(
                            &fpy.plot,
                            &PlotStyle { title: Some(format!("{}/{}", PathBuilder::fpy_group(), component.component_id)), ..Default::default() },
                            &dest,
                        )
                        .map_err(|err| PipelineError::RenderFailure { path: dest.clone(), message: err.to_string() })?;
                    ctx.catalog
                        .update_component(&lot.product_id, &component.lot_id, &self.station, &component.component_id, |c| {
                            c.fpy_path = Some(dest.clone());
                        })
                        .await?;
                    summary_rows.push((fpy.component_id, fpy.fpy_percent));
                    ok += 1;
                }
                Err(err) => failed.push(format!("{}: {err}", component.component_id)),
            }
        }

        write_summary(&ctx, &lot.product_id, &lot.original_lot_id, &self.station, &summary_rows)?;

        let total = ok + failed.len();
        if failed.is_empty() {
            Ok(format!("success {ok}/{total} ({skipped} skipped); summary rows {}", summary_rows.len()))
        } else {
            Ok(format!("success {ok}/{total} ({skipped} skipped); failures: {}", failed.join(", ")))
        }
    }
}

fn compute_fpy(ctx: &PipelineContext, stations: &[String], component: &Component, chain: &[Component]) -> Result<FpyResult> {
    let mut combined: HashMap<(i64, i64), i64> = HashMap::new();
    for (station, at_station) in stations.iter().zip(chain) {
        let binarized = binarized_table(ctx, at_station, station)?;
        let mut seen_here = std::collections::HashSet::new();
        for row in &binarized.rows {
            let (Some(col), Some(r), Some(b)) = (coord(row, "Col"), coord(row, "Row"), coord(row, "binary")) else {
                continue;
            };
            seen_here.insert((col, r));
            combined
                .entry((col, r))
                .and_modify(|v| *v = (*v).min(b))
                .or_insert(b);
        }
        // Coordinates this station never reported (outer join) fill as 0.
        for key in combined.keys().cloned().collect::<Vec<_>>() {
            if !seen_here.contains(&key) {
                combined.insert(key, 0);
            }
        }
    }

    let total = combined.len().max(1);
    let good = combined.values().filter(|v| **v == 1).count();
    let fpy_percent = (good as f64 / total as f64) * 100.0;

    let mut plot = Table::new(vec!["Col".to_string(), "Row".to_string(), "binary".to_string()]);
    for ((col, r), binary) in &combined {
        let mut row = Row::new();
        row.insert("Col".to_string(), CellValue::Int(*col));
        row.insert("Row".to_string(), CellValue::Int(*r));
        row.insert("binary".to_string(), CellValue::Int(*binary));
        plot.push_row(row);
    }

    Ok(FpyResult { component_id: component.component_id.clone(), fpy_percent, plot })
}

fn coord(row: &Row, key: &str) -> Option<i64> {
    row.get(key).and_then(CellValue::as_f64).map(|v| v as i64)
}

/// The per-lot summary isn't a component artifact, so it's written
/// alongside the per-component FPY renders rather than through
/// [`PathBuilder::build_map`] (which always expects a component id).
fn write_summary(ctx: &PipelineContext, product_id: &str, original_lot_id: &str, station: &str, rows: &[(String, f64)]) -> Result<()> {
    let sample = ctx.path_builder.build_map(product_id, original_lot_id, PathBuilder::fpy_group(), "_summary_anchor")?;
    let dir = sample.parent().ok_or_else(|| PipelineError::ConfigMissing("map template produced no parent directory".to_string()))?;
    std::fs::create_dir_all(dir)?;

    let csv_path = dir.join(format!("summary_{station}.csv"));
    let mut writer = csv::Writer::from_path(&csv_path)?;
    writer.write_record(["ID", "FPY"])?;
    for (id, fpy) in rows {
        writer.write_record([id.as_str(), &format!("{fpy:.2}")])?;
    }
    writer.flush()?;

    let plot_path = dir.join(format!("summary_{station}.png"));
    let mut chart = Table::new(vec!["component_id".to_string(), "fpy_percent".to_string()]);
    for (id, fpy) in rows {
        let mut row = Row::new();
        row.insert("component_id".to_string(), CellValue::Text(id.clone()));
        row.insert("fpy_percent".to_string(), CellValue::Float(*fpy));
        chart.push_row(row);
    }
    ctx.plot_renderer
        .render(&chart, &PlotStyle { title: Some(format!("FPY summary/{station}")), ..Default::default() }, &plot_path)
        .map_err(|err| PipelineError::RenderFailure { path: plot_path.clone(), message: err.to_string() })?;
    Ok(())
}
