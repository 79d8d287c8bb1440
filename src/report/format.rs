//! Reporting utilities: per-file statistics and formatted terminal output.
//!
//! Formatting lives here so the preprocessing and fitting code stay free of
//! presentation concerns.

use std::collections::BTreeMap;

use crate::batch::{FileResults, FitResultStore};
use crate::domain::{ModelParams, ScanGrid};
use crate::io::ResultsExport;
use crate::math::{mean, median_mut};

/// Modulus statistics and failure counts of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStats {
    pub curves: usize,
    pub fitted: usize,
    /// Failure label → count.
    pub failures: BTreeMap<&'static str, usize>,
    pub e0_mean: Option<f64>,
    pub e0_median: Option<f64>,
    pub e0_min: Option<f64>,
    pub e0_max: Option<f64>,
    /// Mean fluidity exponent of Ting fits.
    pub beta_mean: Option<f64>,
}

pub fn file_stats(results: &FileResults) -> FileStats {
    let mut failures = BTreeMap::new();
    let mut moduli = Vec::new();
    let mut betas = Vec::new();
    for outcome in results.values() {
        match outcome {
            Ok(fit) => {
                moduli.push(fit.params.e0());
                if let ModelParams::Ting { ting, .. } = &fit.params {
                    betas.push(ting.beta_e);
                }
            }
            Err(err) => *failures.entry(err.label()).or_insert(0) += 1,
        }
    }
    let e0_mean = mean(&moduli);
    let e0_min = moduli.iter().copied().reduce(f64::min);
    let e0_max = moduli.iter().copied().reduce(f64::max);
    let fitted = moduli.len();
    FileStats {
        curves: results.len(),
        fitted,
        failures,
        e0_mean,
        e0_median: median_mut(&mut moduli),
        e0_min,
        e0_max,
        beta_mean: mean(&betas),
    }
}

/// Format the run header and per-file statistics.
pub fn format_run_summary(export: &ResultsExport) -> String {
    let mut out = String::new();
    let p = &export.parameters;
    let session = p.session_calibration();
    let session_k = p.calibration_override.spring_constant;
    let session_sens = p.calibration_override.deflection_sensitivity;
    let per_file = session_k.is_none() || session_sens.is_none();
    let scope = if per_file {
        " (unless recorded per file)"
    } else {
        ""
    };

    out.push_str(&format!("=== afm - {} fit ===\n", export.model.display_name()));
    out.push_str(&format!("Generated: {}\n", export.generated_at.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!(
        "Indenter: {:?} tip={:.3e} nu={:.2} | k={:.4} N/m | sens={:.2} nm/V{scope}\n",
        p.indenter.geometry,
        p.indenter.tip_parameter,
        p.indenter.poisson_ratio,
        session.spring_constant,
        session.deflection_sensitivity * 1e9
    ));
    out.push_str(&format!(
        "Segment: {} | PoC window={} | contact offset={:.2e} m | drag={}\n",
        p.curve_segment.display_name(),
        p.poc_window,
        p.contact_offset,
        match p.viscous_drag {
            Some(d) => format!("order {} @ {:.2e} m/s", d.poly_order, d.ramp_speed),
            None => "off".to_string(),
        }
    ));
    if let Some(s) = &export.summary {
        out.push_str(&format!(
            "Run: {} files, {} curves ({} ok, {} failed){} in {:.2?}\n",
            s.files,
            s.curves,
            s.succeeded,
            s.failed,
            if s.cancelled { ", cancelled" } else { "" },
            s.elapsed
        ));
    }

    for (file_id, results) in export.results.iter() {
        let stats = file_stats(results);
        out.push_str(&format!("\n{file_id}: {}/{} curves fitted\n", stats.fitted, stats.curves));
        if let (Some(mean), Some(median), Some(lo), Some(hi)) =
            (stats.e0_mean, stats.e0_median, stats.e0_min, stats.e0_max)
        {
            out.push_str(&format!(
                "  E0 mean={mean:.1} median={median:.1} range=[{lo:.1}, {hi:.1}] Pa\n"
            ));
        }
        if let Some(beta) = stats.beta_mean {
            out.push_str(&format!("  betaE mean={beta:.3}\n"));
        }
        for (label, count) in &stats.failures {
            out.push_str(&format!("  {label}: {count}\n"));
        }
    }

    out
}

/// Format a per-curve table of one file (at most `limit` rows).
pub fn format_curve_table(
    store: &FitResultStore,
    file_id: &str,
    grid: Option<&ScanGrid>,
    limit: usize,
) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>6} {:>9} {:<20} {:>12} {:>12} {:>8} {:>10}\n",
            "curve", "pixel", "status", "E0 [Pa]", "contact", "betaE", "redchi"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<6} {:-<9} {:-<20} {:-<12} {:-<12} {:-<8} {:-<10}\n",
            "", "", "", "", "", "", ""
        )
            .trim_end(),
    );
    out.push('\n');

    let Some(results) = store.file(file_id) else {
        return out;
    };
    for (idx, outcome) in results.iter().take(limit) {
        let pixel = grid
            .and_then(|g| g.position_of(*idx))
            .map(|(x, y)| format!("{x},{y}"))
            .unwrap_or_default();
        let line = match outcome {
            Ok(fit) => {
                let beta = match &fit.params {
                    ModelParams::Ting { ting, .. } => format!("{:.3}", ting.beta_e),
                    ModelParams::Hertz(_) => String::new(),
                };
                format!(
                    "{idx:>6} {pixel:>9} {:<20} {:>12.1} {:>12.3e} {beta:>8} {:>10.3e}\n",
                    "ok",
                    fit.params.e0(),
                    fit.params.contact_point(),
                    fit.quality.redchi
                )
            }
            Err(err) => format!("{idx:>6} {pixel:>9} {:<20}\n", truncate(err.label(), 20)),
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    if results.len() > limit {
        out.push_str(&format!("... {} more\n", results.len() - limit));
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AnalysisParameters, FitQuality, FitResult, HertzParams, ModelKind, PointOfContact,
        ScanOrder,
    };
    use crate::error::AnalysisError;

    fn hertz(e0: f64) -> FitResult {
        FitResult {
            model: ModelKind::Hertz,
            params: ModelParams::Hertz(HertzParams { e0, delta0: 0.0 }),
            quality: FitQuality::new(1e-20, 50, 2, 5),
            poc: PointOfContact { index: 10, height: 0.0, deflection: 0.0 },
            indentation: Vec::new(),
            best_fit: Vec::new(),
            residuals: Vec::new(),
        }
    }

    fn results() -> FileResults {
        let mut r = FileResults::new();
        r.insert(0, Ok(hertz(1000.0)));
        r.insert(1, Ok(hertz(3000.0)));
        r.insert(2, Ok(hertz(2000.0)));
        r.insert(3, Err(AnalysisError::InsufficientData("short".into())));
        r
    }

    #[test]
    fn stats_cover_fits_and_failures() {
        let stats = file_stats(&results());
        assert_eq!(stats.curves, 4);
        assert_eq!(stats.fitted, 3);
        assert_eq!(stats.e0_mean, Some(2000.0));
        assert_eq!(stats.e0_median, Some(2000.0));
        assert_eq!(stats.e0_min, Some(1000.0));
        assert_eq!(stats.e0_max, Some(3000.0));
        assert_eq!(stats.failures.get("insufficient_data"), Some(&1));
        assert!(stats.beta_mean.is_none());
    }

    #[test]
    fn summary_lists_each_file() {
        let mut store = FitResultStore::new();
        store.replace_file("map", results());
        let export = ResultsExport::new(
            ModelKind::Hertz,
            &AnalysisParameters::default(),
            None,
            BTreeMap::new(),
            store,
        );
        let text = format_run_summary(&export);
        assert!(text.contains("=== afm - Hertz fit ==="));
        assert!(text.contains("map: 3/4 curves fitted"));
        assert!(text.contains("insufficient_data: 1"));
    }

    #[test]
    fn curve_table_is_limited() {
        let mut store = FitResultStore::new();
        store.replace_file("map", results());
        let grid = ScanGrid::new(2, 2, ScanOrder::Raster);
        let text = format_curve_table(&store, "map", Some(&grid), 2);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[2].contains("0,0"));
        assert!(lines[4].contains("2 more"));
    }
}
