//! AlignmentChecker (spec §4.3): validates a raw CSV against a recipe's
//! reference `(col,row,defect_type)` triples before it enters the
//! pipeline.

use crate::error::{PipelineError, Result};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferencePoint {
    pub col: i64,
    pub row: i64,
}

#[derive(Debug, Clone)]
pub struct ReferenceTriple {
    pub col: i64,
    pub row: i64,
    pub defect_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentOutcome {
    Success,
    Fail,
}

/// Locates the header line: the first line containing all of `Row`,
/// `Col`, `DefectType`, or — failing that — the line with the most
/// commas, provided it has at least 4 columns.
pub fn locate_header(lines: &[String]) -> Option<usize> {
    for (idx, line) in lines.iter().enumerate() {
        let has_all = ["Row", "Col", "DefectType"].iter().all(|needle| line.contains(needle));
        if has_all {
            return Some(idx);
        }
    }
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| (idx, line.matches(',').count()))
        .filter(|(_, commas)| *commas + 1 >= 4)
        .max_by_key(|(_, commas)| *commas)
        .map(|(idx, _)| idx)
}

pub fn check_alignment(path: &Path, references: &[ReferenceTriple]) -> Result<(AlignmentOutcome, String)> {
    let text = std::fs::read_to_string(path).map_err(|source| PipelineError::FileUnreadable { path: path.to_path_buf(), source })?;
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    let Some(header_idx) = locate_header(&lines) else {
        return Err(PipelineError::AlignmentError { path: path.to_path_buf(), message: "no header".to_string() });
    };

    let csv_body = lines[header_idx..].join("\n");
    let mut reader = csv::ReaderBuilder::new().from_reader(csv_body.as_bytes());
    let headers = reader.headers()?.clone();
    let col_idx = headers.iter().position(|h| h == "Col");
    let row_idx = headers.iter().position(|h| h == "Row");
    let defect_idx = headers.iter().position(|h| h == "DefectType");
    let (Some(col_idx), Some(row_idx), Some(defect_idx)) = (col_idx, row_idx, defect_idx) else {
        return Err(PipelineError::SchemaMismatch { path: path.to_path_buf(), reason: "missing Col/Row/DefectType column".to_string() });
    };

    let mut found = 0usize;
    for result in reader.records() {
        let record = result?;
        let (Some(col), Some(row), Some(defect)) = (record.get(col_idx), record.get(row_idx), record.get(defect_idx)) else {
            continue;
        };
        let (Ok(col), Ok(row)) = (col.parse::<i64>(), row.parse::<i64>()) else {
            continue;
        };
        if references.iter().any(|r| r.col == col && r.row == row && r.defect_type == defect) {
            found += 1;
        }
    }

    let total = references.len();
    if found >= 1 {
        Ok((AlignmentOutcome::Success, format!("found {found}/{total}")))
    } else {
        Ok((AlignmentOutcome::Fail, format!("found {found}/{total}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_header_by_required_columns() {
        let lines = vec!["; preamble".to_string(), "Row,Col,DefectType,Extra".to_string(), "0,0,Good".to_string()];
        assert_eq!(locate_header(&lines), Some(1));
    }

    #[test]
    fn falls_back_to_most_commas() {
        let lines = vec!["a,b".to_string(), "a,b,c,d,e".to_string()];
        assert_eq!(locate_header(&lines), Some(1));
    }

    #[test]
    fn no_header_found_when_no_candidate_has_four_columns() {
        let lines = vec!["a".to_string(), "a,b".to_string()];
        assert_eq!(locate_header(&lines), None);
    }
}
