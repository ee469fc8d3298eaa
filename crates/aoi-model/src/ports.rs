//! Narrow trait boundaries for the two external collaborators the
//! specification treats as out of scope: the CSV parser (`TabularReader`)
//! and the chart renderer (`PlotRenderer`). Pipeline tasks depend only on
//! these traits, never on a concrete `csv`/image-drawing crate directly.
//! Both traits share one error type so they can be held as `Arc<dyn _>`.

use crate::table::Table;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortError {
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to render to {path}: {message}")]
    Render { path: PathBuf, message: String },
}

/// Reads a processed CSV (header line `Row,Col,DefectType,...` onward)
/// into a `Table`.
pub trait TabularReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Table, PortError>;
}

/// Style knobs passed to a `PlotRenderer`; fields are a stable contract
/// between C7 and the rendering collaborator, not rendered ourselves.
#[derive(Debug, Clone, Default)]
pub struct PlotStyle {
    pub title: Option<String>,
    pub good_color: Option<String>,
    pub bad_color: Option<String>,
    pub width_px: Option<u32>,
    pub height_px: Option<u32>,
}

/// Renders a `Table` plus a `PlotStyle` to a PNG at `dest`. Concrete
/// implementations are out of scope for this crate.
pub trait PlotRenderer: Send + Sync {
    fn render(&self, table: &Table, style: &PlotStyle, dest: &Path) -> Result<(), PortError>;
}
