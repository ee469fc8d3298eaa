//! Concrete adapters for the `TabularReader`/`PlotRenderer` ports. The
//! CSV reader is a real implementation (the `csv` crate is part of this
//! crate's dependency surface); the plot renderer is a stub because
//! chart rendering is explicitly out of scope — a real deployment
//! supplies its own `PlotRenderer` at startup.

use aoi_model::{CellValue, PlotRenderer, PlotStyle, PortError, Row, TabularReader, Table};
use std::path::Path;

pub struct CsvTabularReader;

impl TabularReader for CsvTabularReader {
    fn read(&self, path: &Path) -> Result<Table, PortError> {
        let mut reader = csv::ReaderBuilder::new()
            .from_path(path)
            .map_err(|err| PortError::Read { path: path.to_path_buf(), message: err.to_string() })?;
        let headers = reader
            .headers()
            .map_err(|err| PortError::Read { path: path.to_path_buf(), message: err.to_string() })?
            .clone();
        let mut table = Table::new(headers.iter().map(str::to_string).collect());
        for record in reader.records() {
            let record = record.map_err(|err| PortError::Read { path: path.to_path_buf(), message: err.to_string() })?;
            let mut row: Row = Row::new();
            for (name, value) in headers.iter().zip(record.iter()) {
                let cell = if let Ok(i) = value.parse::<i64>() {
                    CellValue::Int(i)
                } else if let Ok(f) = value.parse::<f64>() {
                    CellValue::Float(f)
                } else {
                    CellValue::Text(value.to_string())
                };
                row.insert(name.to_string(), cell);
            }
            table.push_row(row);
        }
        Ok(table)
    }
}

/// No-op renderer: records that a render was requested but performs no
/// actual drawing. Stands in until a real `PlotRenderer` (out of scope
/// for this crate) is wired in.
pub struct NullPlotRenderer;

impl PlotRenderer for NullPlotRenderer {
    fn render(&self, _table: &Table, _style: &PlotStyle, dest: &Path) -> Result<(), PortError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|err| PortError::Render { path: dest.to_path_buf(), message: err.to_string() })?;
        }
        std::fs::write(dest, []).map_err(|err| PortError::Render { path: dest.to_path_buf(), message: err.to_string() })
    }
}
