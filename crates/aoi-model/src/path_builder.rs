//! Parses `database.structure.{csv,org,roi,map}` templates once at
//! startup into typed `build_*` methods, instead of string-formatting a
//! template at every call site (Design Notes §9).

use crate::entities::FileType;
use crate::error::{ModelError, Result};
use std::collections::HashMap;
use std::path::PathBuf;

const PLACEHOLDERS: &[&str] = &["{base}", "{product}", "{lot}", "{station}", "{component}"];

/// A template string such as `{base}/{product}/csv/{lot}/{station}/{component}.csv`,
/// split into literal/placeholder segments so substitution is a single
/// linear pass rather than repeated `str::replace` calls.
#[derive(Debug, Clone)]
struct Template {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Base,
    Product,
    Lot,
    Station,
    Component,
}

impl Template {
    fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = raw;
        while !rest.is_empty() {
            if let Some(pos) = PLACEHOLDERS.iter().filter_map(|p| rest.find(p).map(|i| (i, *p))).min_by_key(|(i, _)| *i) {
                let (idx, placeholder) = pos;
                if idx > 0 {
                    segments.push(Segment::Literal(rest[..idx].to_string()));
                }
                segments.push(match placeholder {
                    "{base}" => Segment::Base,
                    "{product}" => Segment::Product,
                    "{lot}" => Segment::Lot,
                    "{station}" => Segment::Station,
                    "{component}" => Segment::Component,
                    _ => unreachable!(),
                });
                rest = &rest[idx + placeholder.len()..];
            } else {
                segments.push(Segment::Literal(rest.to_string()));
                break;
            }
        }
        if segments.is_empty() {
            return Err(ModelError::InvalidTemplate { template: raw.to_string(), reason: "empty template".to_string() });
        }
        Ok(Self { segments })
    }

    fn render(&self, base: &str, product: &str, lot: &str, station: Option<&str>, component: Option<&str>) -> Result<PathBuf> {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Base => out.push_str(base),
                Segment::Product => out.push_str(product),
                Segment::Lot => out.push_str(lot),
                Segment::Station => out.push_str(station.ok_or_else(|| ModelError::InvalidTemplate {
                    template: "{station}".to_string(),
                    reason: "station placeholder required but not supplied".to_string(),
                })?),
                Segment::Component => out.push_str(component.ok_or_else(|| ModelError::InvalidTemplate {
                    template: "{component}".to_string(),
                    reason: "component placeholder required but not supplied".to_string(),
                })?),
            }
        }
        Ok(PathBuf::from(out))
    }
}

/// Parsed `database.structure.*` templates, one per [`FileType`], plus the
/// storage root they're anchored to.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    base: String,
    templates: HashMap<FileType, Template>,
}

impl PathBuilder {
    pub fn new(base: impl Into<String>, structure: &HashMap<FileType, String>) -> Result<Self> {
        let mut templates = HashMap::new();
        for (file_type, raw) in structure {
            templates.insert(*file_type, Template::parse(raw)?);
        }
        Ok(Self { base: base.into(), templates })
    }

    fn template(&self, file_type: FileType) -> Result<&Template> {
        self.templates.get(&file_type).ok_or_else(|| ModelError::MissingTemplate(file_type.to_string()))
    }

    pub fn build_csv(&self, product: &str, lot: &str, station: &str, component: &str) -> Result<PathBuf> {
        self.template(FileType::Csv)?.render(&self.base, product, lot, Some(station), Some(component))
    }

    pub fn build_org(&self, product: &str, lot: &str, station: &str, component: &str) -> Result<PathBuf> {
        self.template(FileType::Org)?.render(&self.base, product, lot, Some(station), Some(component))
    }

    pub fn build_roi(&self, product: &str, lot: &str, station: &str, component: &str) -> Result<PathBuf> {
        self.template(FileType::Roi)?.render(&self.base, product, lot, Some(station), Some(component))
    }

    /// `map`'s template is shared by basemap, lossmap and fpy renders; the
    /// `station` argument for lossmap is `LOSS{idx}` and for fpy is `FPY`,
    /// both produced by the caller, not this builder.
    pub fn build_map(&self, product: &str, lot: &str, station_or_group: &str, component: &str) -> Result<PathBuf> {
        self.template(FileType::Map)?.render(&self.base, product, lot, Some(station_or_group), Some(component))
    }

    pub fn lossmap_group(index: usize) -> String {
        format!("LOSS{index}")
    }

    pub fn fpy_group() -> &'static str {
        "FPY"
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PathBuilder {
        let mut structure = HashMap::new();
        structure.insert(FileType::Csv, "{base}/{product}/csv/{lot}/{station}/{component}.csv".to_string());
        structure.insert(FileType::Org, "{base}/{product}/org/{lot}/{station}/{component}/".to_string());
        structure.insert(FileType::Roi, "{base}/{product}/roi/{lot}/{station}/{component}/".to_string());
        structure.insert(FileType::Map, "{base}/{product}/map/{lot}/{station}/{component}.png".to_string());
        PathBuilder::new("/data/aoi", &structure).unwrap()
    }

    #[test]
    fn builds_csv_path() {
        let pb = builder();
        let path = pb.build_csv("P1", "L1", "MT", "C1").unwrap();
        assert_eq!(path, PathBuf::from("/data/aoi/P1/csv/L1/MT/C1.csv"));
    }

    #[test]
    fn lossmap_group_name_tracks_station_index() {
        assert_eq!(PathBuilder::lossmap_group(2), "LOSS2");
    }

    #[test]
    fn missing_template_errors() {
        let structure = HashMap::new();
        let pb = PathBuilder::new("/data/aoi", &structure).unwrap();
        assert!(pb.build_csv("P1", "L1", "MT", "C1").is_err());
    }
}
