//! Per-curve analysis: segments in, `CurveOutcome` out.
//!
//! Hertz:
//! 1. pick the extend (or reversed retract) segment
//! 2. RoV contact point on height vs deflection
//! 3. force/indentation against that contact
//! 4. optional drag correction against the opposite segment
//! 5. re-baseline on the first sample and fit
//!
//! Ting runs the Hertz pipeline on the extend segment first, moves the
//! contact point by the fitted `δ0`, transforms both segments against it and
//! fits the concatenated approach–retract series.

use log::warn;

use crate::domain::{
    AnalysisParameters, Curve, FitResult, ModelKind, ModelParams, PointOfContact, Segment,
    SegmentKind,
};
use crate::error::AnalysisError;
use crate::fit::{HertzFitEngine, TingFitEngine};
use crate::math::median_step;
use crate::preprocess::{
    correct_viscous_drag, estimate_poc, force_indentation, rebaseline, rebaseline_by,
};

/// One segment reduced to the channels the pipeline uses.
#[derive(Debug, Clone)]
struct Trace {
    time: Vec<f64>,
    height: Vec<f64>,
    /// Raw deflection (V).
    deflection: Vec<f64>,
    /// Deflection in metres.
    deflection_m: Vec<f64>,
}

impl Trace {
    fn from_segment(
        segment: &Segment,
        params: &AnalysisParameters,
        reversed: bool,
    ) -> Result<Self, AnalysisError> {
        let mut trace = Self {
            time: segment.time.clone(),
            height: segment.height(&params.height_channel)?.to_vec(),
            deflection: segment.deflection.clone(),
            deflection_m: segment.deflection_m(params.deflection_sensitivity),
        };
        if reversed {
            trace.time.reverse();
            trace.height.reverse();
            trace.deflection.reverse();
            trace.deflection_m.reverse();
        }
        Ok(trace)
    }

    fn poc(&self, params: &AnalysisParameters) -> Result<PointOfContact, AnalysisError> {
        estimate_poc(&self.height, &self.deflection_m, params.poc_window)
    }

    /// `(force, indentation)` against a contact point.
    fn transform(
        &self,
        params: &AnalysisParameters,
        poc_height: f64,
        poc_deflection: f64,
    ) -> Result<(Vec<f64>, Vec<f64>), AnalysisError> {
        force_indentation(
            &self.height,
            &self.deflection,
            params.deflection_sensitivity,
            params.spring_constant,
            poc_height,
            poc_deflection,
        )
    }
}

/// Run the selected model on one curve.
pub fn analyze_curve(
    curve: &Curve,
    params: &AnalysisParameters,
    model: ModelKind,
) -> Result<FitResult, AnalysisError> {
    match model {
        ModelKind::Hertz => analyze_hertz(curve, params),
        ModelKind::Ting => analyze_ting(curve, params),
    }
}

/// Hertz fit of the extend segment, or of the reversed retract segment.
///
/// Indentation is measured against the RoV contact `(z[i*], d[i*])`: both the
/// height and the deflection (m) at the contact sample. A deflection offset at
/// contact therefore shifts indentation, and with it the `-contact_offset`
/// domain cut, by `d[i*]` compared with a zero reference deflection.
pub fn analyze_hertz(
    curve: &Curve,
    params: &AnalysisParameters,
) -> Result<FitResult, AnalysisError> {
    let (selected, opposite, reversed) = match params.curve_segment {
        SegmentKind::Extend => (curve.first_extend()?, curve.last_retract().ok(), false),
        SegmentKind::Retract => (curve.last_retract()?, curve.first_extend().ok(), true),
        SegmentKind::Pause => {
            return Err(AnalysisError::MalformedCurve(
                "pause segments cannot be fitted with the Hertz model".into(),
            ));
        }
    };
    let trace = Trace::from_segment(selected, params, reversed)?;
    let poc = trace.poc(params)?;
    let (mut force, indentation) = trace.transform(params, poc.height, poc.deflection)?;

    if let (Some(drag), Some(other)) = (params.viscous_drag, opposite) {
        let other = Trace::from_segment(other, params, !reversed)?;
        let (other_force, other_ind) = other.transform(params, poc.height, poc.deflection)?;
        let (order, speed) = (drag.poly_order, drag.ramp_speed);
        let corrected = if reversed {
            correct_viscous_drag(&other_ind, &other_force, &indentation, &force, order, speed)
                .map(|(_, ret, _)| ret)
        } else {
            correct_viscous_drag(&indentation, &force, &other_ind, &other_force, order, speed)
                .map(|(ext, _, _)| ext)
        };
        match corrected {
            Ok(f) => force = f,
            Err(e) => warn!("curve {}: drag correction skipped: {e}", curve.index),
        }
    } else if params.viscous_drag.is_some() {
        warn!("curve {}: drag correction skipped: no opposite segment", curve.index);
    }
    rebaseline(&mut force);

    let fit = HertzFitEngine::new(params).fit(&indentation, &force)?;
    Ok(FitResult {
        model: ModelKind::Hertz,
        params: ModelParams::Hertz(fit.params),
        quality: fit.quality,
        poc,
        indentation: fit.indentation,
        best_fit: fit.best_fit,
        residuals: fit.residuals,
    })
}

pub fn analyze_ting(
    curve: &Curve,
    params: &AnalysisParameters,
) -> Result<FitResult, AnalysisError> {
    let ext = Trace::from_segment(curve.first_extend()?, params, false)?;
    let ret = Trace::from_segment(curve.last_retract()?, params, false)?;

    let poc = ext.poc(params)?;
    let (mut ext_force, ext_ind) = ext.transform(params, poc.height, poc.deflection)?;
    rebaseline(&mut ext_force);
    let hertz = HertzFitEngine::new(params).fit(&ext_ind, &ext_force)?;

    let contact = PointOfContact {
        height: poc.height + hertz.params.delta0,
        ..poc
    };
    let (mut ext_force, ext_ind) = ext.transform(params, contact.height, contact.deflection)?;
    let (mut ret_force, ret_ind) = ret.transform(params, contact.height, contact.deflection)?;
    if let Some(drag) = params.viscous_drag {
        let corrected = correct_viscous_drag(
            &ext_ind,
            &ext_force,
            &ret_ind,
            &ret_force,
            drag.poly_order,
            drag.ramp_speed,
        );
        match corrected {
            Ok((e, r, _)) => {
                ext_force = e;
                ret_force = r;
            }
            Err(e) => warn!("curve {}: drag correction skipped: {e}", curve.index),
        }
    }
    let offset = ext_force.first().copied().unwrap_or(0.0);
    rebaseline_by(&mut ext_force, offset);
    rebaseline_by(&mut ret_force, offset);

    let time = concat_time(&ext.time, &ret.time);
    let force = [ext_force, ret_force].concat();
    let indentation = [ext_ind, ret_ind].concat();

    let fit = TingFitEngine::new(params).fit(&time, &force, &indentation, Some(&hertz))?;
    Ok(FitResult {
        model: ModelKind::Ting,
        params: ModelParams::Ting {
            ting: fit.params,
            ting_d0: fit.ting_d0,
            hertz: hertz.params,
            hertz_redchi: hertz.quality.redchi,
        },
        quality: fit.quality,
        poc: contact,
        indentation: fit.indentation,
        best_fit: fit.best_fit,
        residuals: fit.residuals,
    })
}

/// Append the retract clock after the extend clock, one sampling interval apart.
fn concat_time(ext: &[f64], ret: &[f64]) -> Vec<f64> {
    let (Some(&ext_end), Some(&ret_start)) = (ext.last(), ret.first()) else {
        return [ext, ret].concat();
    };
    let dt = median_step(ext).or_else(|| median_step(ret)).unwrap_or(0.0);
    let shift = ext_end + dt - ret_start;
    ext.iter().copied().chain(ret.iter().map(|t| t + shift)).collect()
}
