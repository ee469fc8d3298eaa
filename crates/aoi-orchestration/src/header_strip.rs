//! HeaderStripper (spec §4.4): writes everything from the detected
//! header row onward to a processed CSV, leaving the source untouched.

use crate::align::locate_header;
use crate::error::{PipelineError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn aoi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]+_([A-Z0-9]+)_\d{12}\.csv$").unwrap())
}

pub fn component_id_from_aoi_filename(filename: &str) -> Option<String> {
    aoi_pattern().captures(filename).map(|caps| caps[1].to_string())
}

/// Strips the preamble ahead of the header row and writes the rest to
/// `output_path`, or `<same-dir>/{component_id}.csv` when not given.
pub fn strip_header(source: &Path, output_path: Option<&Path>) -> Result<PathBuf> {
    let filename = source.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let component_id = component_id_from_aoi_filename(filename).unwrap_or_else(|| {
        source.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
    });

    let text = std::fs::read_to_string(source).map_err(|source_err| PipelineError::FileUnreadable {
        path: source.to_path_buf(),
        source: source_err,
    })?;
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    let Some(header_idx) = locate_header(&lines) else {
        return Err(PipelineError::SchemaMismatch { path: source.to_path_buf(), reason: "no header".to_string() });
    };

    let dest = match output_path {
        Some(p) => p.to_path_buf(),
        None => source.parent().unwrap_or_else(|| Path::new(".")).join(format!("{component_id}.csv")),
    };
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&dest, lines[header_idx..].join("\n"))?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_component_id_from_aoi_filename() {
        assert_eq!(component_id_from_aoi_filename("AOI1_C001_202401011200.csv"), Some("C001".to_string()));
    }

    #[test]
    fn strips_preamble_lines() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("AOI1_C001_202401011200.csv");
        std::fs::write(&source, "; comment\nRow,Col,DefectType\n0,0,Good\n").unwrap();
        let dest = strip_header(&source, None).unwrap();
        let contents = std::fs::read_to_string(dest).unwrap();
        assert!(contents.starts_with("Row,Col,DefectType"));
    }
}
