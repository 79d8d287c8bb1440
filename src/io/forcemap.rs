//! Read/write force-map JSON files.
//!
//! This is the crate's own interchange format, not an instrument format:
//! one file holds the curves of one acquisition and, for force maps, the
//! scan grid they were recorded on.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::batch::CurveSource;
use crate::domain::{Calibration, Curve, ScanGrid, Segment, SegmentKind};
use crate::error::{AnalysisError, AppError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceMapFile {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<ScanGrid>,
    /// Spring constant, sensitivity and height channel recorded at acquisition.
    #[serde(default, skip_serializing_if = "Calibration::is_empty")]
    pub calibration: Calibration,
    /// Curves in acquisition order; `curves[i].index == i`.
    pub curves: Vec<Curve>,
}

impl ForceMapFile {
    /// File-level structure checks.
    ///
    /// Segment contents are validated per curve when they are read, so one bad
    /// curve does not reject the whole file.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.file_id.trim().is_empty() {
            return Err(AppError::new(2, "Force map has an empty file_id."));
        }
        if let Some((pos, curve)) = self.curves.iter().enumerate().find(|(i, c)| c.index != *i) {
            return Err(AppError::new(
                2,
                format!(
                    "Force map '{}': curve at position {pos} has index {}.",
                    self.file_id, curve.index
                ),
            ));
        }
        self.calibration
            .validate()
            .map_err(|e| AppError::new(2, format!("Force map '{}': {e}", self.file_id)))?;
        if let Some(grid) = self.grid {
            if grid.len() < self.curves.len() {
                return Err(AppError::new(
                    2,
                    format!(
                        "Force map '{}': {} curves do not fit a {}x{} grid.",
                        self.file_id,
                        self.curves.len(),
                        grid.cols,
                        grid.rows
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl CurveSource for ForceMapFile {
    fn file_id(&self) -> &str {
        &self.file_id
    }

    fn curve_count(&self) -> usize {
        self.curves.len()
    }

    fn segments(&self, curve_index: usize) -> Result<Vec<(SegmentKind, Segment)>, AnalysisError> {
        let curve = self.curves.get(curve_index).ok_or_else(|| {
            AnalysisError::MalformedCurve(format!(
                "curve {curve_index} is out of range ({} curves)",
                self.curves.len()
            ))
        })?;
        if curve.segments.is_empty() {
            return Err(AnalysisError::MalformedCurve(format!(
                "curve {curve_index} has no segments"
            )));
        }
        for (_, segment) in &curve.segments {
            segment.validate()?;
        }
        Ok(curve.segments.clone())
    }

    fn scan_grid(&self) -> Option<ScanGrid> {
        self.grid
    }

    fn calibration(&self) -> Calibration {
        self.calibration.clone()
    }
}

/// Read and structurally validate a force-map JSON file.
pub fn read_force_map(path: &Path) -> Result<ForceMapFile, AppError> {
    let file = File::open(path)
        .map_err(|e| {
            AppError::new(2, format!("Failed to open force map '{}': {e}", path.display()))
        })?;
    let map: ForceMapFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| {
            AppError::new(2, format!("Invalid force map JSON '{}': {e}", path.display()))
        })?;
    map.validate()?;
    Ok(map)
}

/// Write a force-map JSON file.
pub fn write_force_map(path: &Path, map: &ForceMapFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| {
            AppError::new(2, format!("Failed to create force map '{}': {e}", path.display()))
        })?;
    serde_json::to_writer(BufWriter::new(file), map)
        .map_err(|e| AppError::new(2, format!("Failed to write force map JSON: {e}")))?;
    Ok(())
}
