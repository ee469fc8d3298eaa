//! A minimal owned tabular type for the C5 transforms. No dataframe
//! dependency: rows are `HashMap<String, CellValue>`, columns are ordered
//! by first appearance, which is all `Binarize`/`Flip`/`ApplyMask`/
//! `ClassifyLossPoints` need.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            CellValue::Text(s) => s.parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

pub type Row = HashMap<String, CellValue>;

/// Outcome of `ClassifyLossPoints` for a single coordinate. `bad_to_good`
/// is intentionally absent: the source process treats it as physically
/// impossible and never emits it (see design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossStatus {
    GoodToGood,
    GoodToBad,
    BadToBad,
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn push_row(&mut self, row: Row) {
        for key in row.keys() {
            if !self.columns.contains(key) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = Option<&'a CellValue>> + 'a {
        self.rows.iter().map(move |r| r.get(name))
    }
}
