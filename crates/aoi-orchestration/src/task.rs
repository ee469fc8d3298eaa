//! Event surface for TaskEngine subscribers (spec §4.6, §6).

use aoi_model::{ProcessingLog, ProcessingTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    Stopped,
}

/// Broadcast over an internal channel so producers never block on a slow
/// subscriber (spec §4.6: "subscribers must be non-blocking or the
/// engine decouples via an internal channel/queue").
#[derive(Debug, Clone)]
pub enum Event {
    TaskCompleted(ProcessingTask),
    LogUpdated(Option<ProcessingLog>),
    StatusChanged { state: EngineState, queue_size: usize, processed_count: u64 },
}
