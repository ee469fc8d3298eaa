//! Data model for the AOI inspection pipeline: entities, path templates,
//! and the pure tabular transforms shared by every pipeline task.

pub mod entities;
pub mod error;
pub mod path_builder;
pub mod ports;
pub mod table;
pub mod transforms;

pub use entities::{
    ArchiveReport, BatchMoveEntry, Component, DelayedMoveEntry, FileType, Lot, LogLevel, LogStatus,
    LogStep, Product, ProcessingLog, ProcessingTask, RetryEntry, TaskKind, TaskParams, TaskStatus,
};
pub use error::{ModelError, Result};
pub use path_builder::PathBuilder;
pub use ports::{PlotRenderer, PlotStyle, PortError, TabularReader};
pub use table::{CellValue, LossStatus, Row, Table};
