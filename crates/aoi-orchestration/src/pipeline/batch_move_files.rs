//! batch_move_files: runs up to 4 concurrent `move_files` operations;
//! aggregates successes/failures without aborting the batch (spec §4.7,
//! §5).

use super::move_files::MoveFilesTask;
use super::{PipelineContext, PipelineTask};
use crate::error::Result;
use aoi_model::{BatchMoveEntry, FileType};
use std::sync::Arc;
use tokio::sync::Semaphore;

const MAX_CONCURRENT: usize = 4;

pub struct BatchMoveFilesTask {
    pub entries: Vec<BatchMoveEntry>,
    pub target_product: String,
    pub file_types: Vec<FileType>,
}

#[async_trait::async_trait]
impl PipelineTask for BatchMoveFilesTask {
    async fn run(&self, ctx: Arc<PipelineContext>) -> Result<String> {
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT));
        let mut handles = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let task = MoveFilesTask {
                component_id: entry.component_id.clone(),
                lot_id: entry.lot_id.clone(),
                original_lot_id: entry.original_lot_id.clone(),
                station: entry.station.clone(),
                source_product: entry.source_product.clone(),
                target_product: self.target_product.clone(),
                file_types: self.file_types.clone(),
            };
            let component_id = entry.component_id.clone();
            let semaphore = semaphore.clone();
            let ctx = ctx.clone();
            handles.push((
                component_id,
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                    task.run(ctx).await
                }),
            ));
        }

        let mut ok = 0usize;
        let mut failures = Vec::new();
        for (component_id, handle) in handles {
            match handle.await {
                Ok(Ok(msg)) => {
                    ok += 1;
                    tracing::debug!(component_id, msg, "batch move component completed");
                }
                Ok(Err(err)) => failures.push(format!("{component_id}: {err}")),
                Err(join_err) => failures.push(format!("{component_id}: task panicked: {join_err}")),
            }
        }
        let total = self.entries.len();
        if failures.is_empty() {
            Ok(format!("success {ok}/{total}"))
        } else {
            Ok(format!("success {ok}/{total}; failures: {}", failures.join(", ")))
        }
    }
}
