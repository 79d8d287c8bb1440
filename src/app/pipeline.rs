//! Shared "fit pipeline" logic used by the `fit` and `demo` commands.
//!
//! Both commands end the same way once their force maps are loaded:
//! batch fit -> results export document -> report text.

use std::collections::BTreeMap;

use crate::batch::{BatchProcessor, BatchSummary, CancellationToken, CurveSource, LogProgress};
use crate::domain::{AnalysisParameters, ModelKind, ScanGrid};
use crate::error::AppError;
use crate::io::{ForceMapFile, ResultsExport};

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub summary: BatchSummary,
    pub export: ResultsExport,
}

/// Fit every curve of the loaded maps.
///
/// Fails with exit code 3 when there is nothing to fit and 4 when every curve
/// failed; per-curve failures alone are reported, not raised.
pub fn run_batch(
    maps: &[ForceMapFile],
    params: &AnalysisParameters,
    model: ModelKind,
) -> Result<RunOutput, AppError> {
    params.validate()?;
    let curve_count: usize = maps.iter().map(|m| m.curves.len()).sum();
    if curve_count == 0 {
        return Err(AppError::new(3, "No curves to fit."));
    }

    let sources: Vec<&dyn CurveSource> = maps.iter().map(|m| m as &dyn CurveSource).collect();
    let grids: BTreeMap<String, ScanGrid> = sources
        .iter()
        .filter_map(|s| s.scan_grid().map(|g| (s.file_id().to_string(), g)))
        .collect();

    let processor = BatchProcessor::new();
    let summary = processor.run(
        &sources,
        params,
        model,
        &mut LogProgress,
        &CancellationToken::new(),
    );
    if summary.curves == 0 {
        return Err(AppError::new(3, "No curves to fit."));
    }

    let export = ResultsExport::new(
        model,
        params,
        Some(summary.clone()),
        grids,
        processor.snapshot(),
    );
    Ok(RunOutput { summary, export })
}
