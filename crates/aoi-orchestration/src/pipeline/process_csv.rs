use super::{PipelineContext, PipelineTask};
use crate::error::{PipelineError, Result};
use crate::header_strip::strip_header;
use async_trait::async_trait;
use aoi_model::Component;
use std::sync::Arc;

pub struct ProcessCsvTask {
    pub product_id: String,
    pub lot_id: String,
    pub station: String,
    pub component_id: Option<String>,
}

#[async_trait]
impl PipelineTask for ProcessCsvTask {
    async fn run(&self, ctx: Arc<PipelineContext>) -> Result<String> {
        let lot = ctx.catalog.get_lot(&self.lot_id)?;
        let components = match &self.component_id {
            Some(id) => vec![ctx.catalog.get_component(&self.lot_id, &self.station, id)?],
            None => ctx.catalog.get_components_by_lot_station(&self.lot_id, &self.station),
        };

        let mut ok = 0usize;
        let mut failed = Vec::new();
        for component in components {
            match process_one(&ctx, &lot.product_id, &lot.original_lot_id, &self.station, &component).await {
                Ok(()) => ok += 1,
                Err(err) => failed.push(format!("{}: {err}", component.component_id)),
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

async fn process_one(ctx: &Arc<PipelineContext>, product_id: &str, original_lot_id: &str, station: &str, component: &Component) -> Result<()> {
    let source = component
        .original_csv_path
        .clone()
        .or_else(|| component.csv_path.clone())
        .ok_or_else(|| PipelineError::FileNotFound(std::path::PathBuf::from(&component.component_id)))?;

    let dest = ctx.path_builder.build_csv(product_id, original_lot_id, station, &component.component_id)?;
    let written = strip_header(&source, Some(&dest))?;

    ctx.catalog
        .update_component(product_id, &component.lot_id, station, &component.component_id, |c| {
            c.original_csv_path = Some(source.clone());
            c.csv_path = Some(written.clone());
        })
        .await?;
    Ok(())
}
