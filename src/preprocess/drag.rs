//! Hydrodynamic drag correction between approach and retract.
//!
//! Away from the sample the extend and retract baselines should coincide; a
//! constant offset between them is the viscous drag on the cantilever, equal
//! in magnitude and opposite in sign for the two directions. Each baseline
//! (indentation < 0) is fitted with a polynomial, both fits are compared over
//! the indentation range they share, and half the mean difference is removed
//! from each side.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::math::{mean, polyfit};

const GRID_POINTS: usize = 100;

/// Estimated drag of one curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DragReport {
    /// Drag force (N) subtracted from extend and added to retract.
    pub drag_force: f64,
    /// Drag coefficient `drag_force / ramp_speed` (N·s/m).
    pub drag_coefficient: Option<f64>,
}

/// Baseline samples (indentation < 0, finite) of one direction.
fn baseline(indentation: &[f64], force: &[f64]) -> (Vec<f64>, Vec<f64>) {
    indentation
        .iter()
        .zip(force)
        .filter(|(i, f)| **i < 0.0 && i.is_finite() && f.is_finite())
        .map(|(i, f)| (*i, *f))
        .unzip()
}

fn range(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Estimate the drag force from the two baselines.
pub fn estimate_drag(
    ext_indentation: &[f64],
    ext_force: &[f64],
    ret_indentation: &[f64],
    ret_force: &[f64],
    poly_order: usize,
    ramp_speed: f64,
) -> Result<DragReport, AnalysisError> {
    let (ext_x, ext_y) = baseline(ext_indentation, ext_force);
    let (ret_x, ret_y) = baseline(ret_indentation, ret_force);
    let needed = poly_order + 2;
    if ext_x.len() < needed || ret_x.len() < needed {
        return Err(AnalysisError::FitDivergence(format!(
            "drag correction needs {needed} baseline samples per direction, \
             got {} extend and {} retract",
            ext_x.len(),
            ret_x.len()
        )));
    }

    let (ext_lo, ext_hi) = range(&ext_x);
    let (ret_lo, ret_hi) = range(&ret_x);
    let lo = ext_lo.max(ret_lo);
    let hi = ext_hi.min(ret_hi);
    if lo >= hi {
        return Err(AnalysisError::FitDivergence(
            "extend and retract baselines do not overlap".into(),
        ));
    }

    let ext_poly = polyfit(&ext_x, &ext_y, poly_order).ok_or_else(|| {
        AnalysisError::FitDivergence("extend baseline polynomial fit failed".into())
    })?;
    let ret_poly = polyfit(&ret_x, &ret_y, poly_order).ok_or_else(|| {
        AnalysisError::FitDivergence("retract baseline polynomial fit failed".into())
    })?;

    let step = (hi - lo) / (GRID_POINTS - 1) as f64;
    let diffs: Vec<f64> = (0..GRID_POINTS)
        .map(|k| {
            let x = lo + k as f64 * step;
            ext_poly.eval(x) - ret_poly.eval(x)
        })
        .collect();
    let drag_force = mean(&diffs).unwrap_or(f64::NAN) / 2.0;
    if !drag_force.is_finite() {
        return Err(AnalysisError::FitDivergence("drag force is not finite".into()));
    }

    let drag_coefficient = (ramp_speed > 0.0).then(|| drag_force / ramp_speed);
    Ok(DragReport {
        drag_force,
        drag_coefficient,
    })
}

/// Remove the drag from both directions, returning the corrected forces.
pub fn correct_viscous_drag(
    ext_indentation: &[f64],
    ext_force: &[f64],
    ret_indentation: &[f64],
    ret_force: &[f64],
    poly_order: usize,
    ramp_speed: f64,
) -> Result<(Vec<f64>, Vec<f64>, DragReport), AnalysisError> {
    let report = estimate_drag(
        ext_indentation,
        ext_force,
        ret_indentation,
        ret_force,
        poly_order,
        ramp_speed,
    )?;
    let ext = ext_force.iter().map(|f| f - report.drag_force).collect();
    let ret = ret_force.iter().map(|f| f + report.drag_force).collect();
    Ok((ext, ret, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, from: f64, to: f64) -> Vec<f64> {
        (0..n)
            .map(|i| from + (to - from) * i as f64 / (n - 1) as f64)
            .collect()
    }

    /// Shared baseline tilt plus a contact region beyond zero indentation.
    fn signal(ind: &[f64], offset: f64) -> Vec<f64> {
        ind.iter()
            .map(|&x| {
                let tilt = 1e-3 * x;
                let contact = if x > 0.0 { 50.0 * x * x } else { 0.0 };
                tilt + contact + offset
            })
            .collect()
    }

    #[test]
    fn symmetric_offsets_are_removed() {
        let drag = 3e-11;
        let ext_ind = ramp(200, -2e-6, 5e-7);
        let ret_ind = ramp(180, -1.5e-6, 4e-7);
        let ext_f = signal(&ext_ind, drag);
        let ret_f = signal(&ret_ind, -drag);

        let (ext, ret, report) =
            correct_viscous_drag(&ext_ind, &ext_f, &ret_ind, &ret_f, 2, 1e-6).unwrap();
        assert!((report.drag_force - drag).abs() < 1e-15);
        let coeff = report.drag_coefficient.unwrap();
        assert!((coeff - drag / 1e-6).abs() < 1e-9);

        let clean_ext = signal(&ext_ind, 0.0);
        let clean_ret = signal(&ret_ind, 0.0);
        for (a, b) in ext.iter().zip(&clean_ext) {
            assert!((a - b).abs() < 1e-15);
        }
        for (a, b) in ret.iter().zip(&clean_ret) {
            assert!((a - b).abs() < 1e-15);
        }
    }

    #[test]
    fn no_drag_leaves_signals_untouched() {
        let ind = ramp(100, -1e-6, 2e-7);
        let f = signal(&ind, 0.0);
        let (ext, ret, report) = correct_viscous_drag(&ind, &f, &ind, &f, 1, 0.0).unwrap();
        assert!(report.drag_force.abs() < 1e-18);
        assert!(report.drag_coefficient.is_none());
        assert_eq!(ext.len(), f.len());
        assert_eq!(ret.len(), f.len());
    }

    #[test]
    fn short_baseline_is_reported() {
        let ext_ind = ramp(50, -1e-9, 1e-6);
        let ret_ind = ramp(50, -1e-6, 1e-6);
        let f = vec![0.0; 50];
        let err = correct_viscous_drag(&ext_ind, &f, &ret_ind, &f, 2, 1e-6).unwrap_err();
        assert!(matches!(err, AnalysisError::FitDivergence(_)));
    }

    #[test]
    fn disjoint_baselines_are_reported() {
        let ext_ind = ramp(50, -2e-6, -1.5e-6);
        let ret_ind = ramp(50, -1e-6, -5e-7);
        let f = vec![0.0; 50];
        let err = estimate_drag(&ext_ind, &f, &ret_ind, &f, 1, 1e-6).unwrap_err();
        assert!(matches!(err, AnalysisError::FitDivergence(_)));
    }
}
