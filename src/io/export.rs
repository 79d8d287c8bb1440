//! Export batch results to JSON and CSV.
//!
//! JSON keeps everything (curves, residuals, the parameters of the run) and is
//! what `afm show` reads back. CSV has one row per curve with the fitted
//! parameters, meant for spreadsheets and downstream scripts.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::{BatchSummary, FitResultStore};
use crate::domain::{AnalysisParameters, CurveOutcome, ModelKind, ModelParams, ScanGrid};
use crate::error::AppError;

/// Top-level JSON results document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsExport {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub model: ModelKind,
    pub parameters: AnalysisParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<BatchSummary>,
    /// Scan grids of the processed force maps, by file id.
    #[serde(default)]
    pub grids: BTreeMap<String, ScanGrid>,
    pub results: FitResultStore,
}

impl ResultsExport {
    pub fn new(
        model: ModelKind,
        parameters: &AnalysisParameters,
        summary: Option<BatchSummary>,
        grids: BTreeMap<String, ScanGrid>,
        results: FitResultStore,
    ) -> Self {
        Self {
            tool: format!("afm {}", env!("CARGO_PKG_VERSION")),
            generated_at: Utc::now(),
            model,
            parameters: parameters.clone(),
            summary,
            grids,
            results,
        }
    }
}

pub fn write_results_json(path: &Path, export: &ResultsExport) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| {
            AppError::new(2, format!("Failed to create results JSON '{}': {e}", path.display()))
        })?;
    serde_json::to_writer_pretty(BufWriter::new(file), export)
        .map_err(|e| AppError::new(2, format!("Failed to write results JSON: {e}")))?;
    Ok(())
}

pub fn read_results_json(path: &Path) -> Result<ResultsExport, AppError> {
    let file = File::open(path)
        .map_err(|e| {
            AppError::new(2, format!("Failed to open results JSON '{}': {e}", path.display()))
        })?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid results JSON '{}': {e}", path.display())))
}

/// One CSV row; optional columns are left empty when they do not apply.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    file_id: &'a str,
    curve_index: usize,
    x: Option<usize>,
    y: Option<usize>,
    model: Option<&'static str>,
    status: &'static str,
    error: Option<String>,
    e0: Option<f64>,
    delta0: Option<f64>,
    tc: Option<f64>,
    beta_e: Option<f64>,
    f0: Option<f64>,
    ting_d0: Option<f64>,
    hertz_e0: Option<f64>,
    hertz_redchi: Option<f64>,
    redchi: Option<f64>,
    sse: Option<f64>,
    n: Option<usize>,
    poc_index: Option<usize>,
    poc_height: Option<f64>,
}

impl<'a> CsvRow<'a> {
    fn new(
        file_id: &'a str,
        curve_index: usize,
        grid: Option<&ScanGrid>,
        outcome: &CurveOutcome,
    ) -> Self {
        let position = grid.and_then(|g| g.position_of(curve_index));
        let mut row = CsvRow {
            file_id,
            curve_index,
            x: position.map(|p| p.0),
            y: position.map(|p| p.1),
            model: None,
            status: "ok",
            error: None,
            e0: None,
            delta0: None,
            tc: None,
            beta_e: None,
            f0: None,
            ting_d0: None,
            hertz_e0: None,
            hertz_redchi: None,
            redchi: None,
            sse: None,
            n: None,
            poc_index: None,
            poc_height: None,
        };

        let fit = match outcome {
            Ok(fit) => fit,
            Err(err) => {
                row.status = err.label();
                row.error = Some(err.to_string());
                return row;
            }
        };
        row.model = Some(fit.model.display_name());
        row.redchi = Some(fit.quality.redchi);
        row.sse = Some(fit.quality.sse);
        row.n = Some(fit.quality.n);
        row.poc_index = Some(fit.poc.index);
        row.poc_height = Some(fit.poc.height);
        match &fit.params {
            ModelParams::Hertz(p) => {
                row.e0 = Some(p.e0);
                row.delta0 = Some(p.delta0);
            }
            ModelParams::Ting {
                ting,
                ting_d0,
                hertz,
                hertz_redchi,
            } => {
                row.e0 = Some(ting.e0);
                row.tc = Some(ting.tc);
                row.beta_e = Some(ting.beta_e);
                row.f0 = Some(ting.f0);
                row.ting_d0 = Some(*ting_d0);
                row.delta0 = Some(hertz.delta0);
                row.hertz_e0 = Some(hertz.e0);
                row.hertz_redchi = Some(*hertz_redchi);
            }
        }
        row
    }
}

/// Write one row per stored curve outcome.
pub fn write_results_csv(
    path: &Path,
    store: &FitResultStore,
    grids: &BTreeMap<String, ScanGrid>,
) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| {
            AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display()))
        })?;

    for (file_id, results) in store.iter() {
        let grid = grids.get(file_id);
        for (idx, outcome) in results {
            writer
                .serialize(CsvRow::new(file_id, *idx, grid, outcome))
                .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
        }
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV: {e}")))?;
    Ok(())
}
