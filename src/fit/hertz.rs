//! Hertz fit engine.
//!
//! Fits `E0` and `δ0` of the elastic contact model to a force–indentation
//! segment with the Levenberg–Marquardt solver and the analytic Jacobian.

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::{AnalysisParameters, FitQuality, HertzParams, Indenter, ModelKind};
use crate::error::AnalysisError;
use crate::fit::engine::{FitState, MIN_FIT_POINTS, check_report, finite_pairs, lm_options};
use crate::math::{LeastSquaresProblem, LmOptions, levenberg_marquardt};
use crate::models::{hertz_curve, hertz_force, hertz_gradient};

/// A converged Hertz fit on its filtered domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HertzFit {
    pub params: HertzParams,
    pub quality: FitQuality,
    pub indentation: Vec<f64>,
    pub force: Vec<f64>,
    pub best_fit: Vec<f64>,
    /// Observed minus fitted force.
    pub residuals: Vec<f64>,
}

struct HertzProblem<'a> {
    indenter: Indenter,
    indentation: &'a [f64],
    force: &'a [f64],
    bounds: Vec<(f64, f64)>,
    scales: Vec<f64>,
}

impl HertzProblem<'_> {
    fn params(p: &[f64]) -> HertzParams {
        HertzParams { e0: p[0], delta0: p[1] }
    }
}

impl LeastSquaresProblem for HertzProblem<'_> {
    fn n_params(&self) -> usize {
        2
    }

    fn residuals(&self, p: &[f64]) -> Option<DVector<f64>> {
        let params = Self::params(p);
        Some(DVector::from_iterator(
            self.force.len(),
            self.indentation
                .iter()
                .zip(self.force)
                .map(|(&x, &f)| hertz_force(&self.indenter, &params, x) - f),
        ))
    }

    fn jacobian(&self, p: &[f64], r0: &DVector<f64>) -> Option<DMatrix<f64>> {
        let params = Self::params(p);
        let mut jac = DMatrix::<f64>::zeros(r0.len(), 2);
        for (i, &x) in self.indentation.iter().enumerate() {
            let (de, dd) = hertz_gradient(&self.indenter, &params, x);
            jac[(i, 0)] = de;
            jac[(i, 1)] = dd;
        }
        Some(jac)
    }

    fn param_scales(&self) -> Vec<f64> {
        self.scales.clone()
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        self.bounds.clone()
    }
}

/// Elastic model fitter with an observable lifecycle.
#[derive(Debug, Clone)]
pub struct HertzFitEngine {
    indenter: Indenter,
    contact_offset: f64,
    max_indentation: Option<f64>,
    initial: HertzParams,
    options: LmOptions,
    state: FitState,
}

impl HertzFitEngine {
    pub fn new(params: &AnalysisParameters) -> Self {
        Self {
            indenter: params.indenter,
            contact_offset: params.contact_offset,
            max_indentation: params.max_indentation,
            initial: HertzParams {
                e0: params.hertz_init_e0,
                delta0: params.hertz_init_d0,
            },
            options: lm_options(params.max_iterations),
            state: FitState::Ready,
        }
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    /// Fit one force–indentation segment.
    pub fn fit(&mut self, indentation: &[f64], force: &[f64]) -> Result<HertzFit, AnalysisError> {
        self.state = FitState::Fitting;
        let outcome = self.run(indentation, force);
        self.state = FitState::after(&outcome);
        outcome
    }

    /// Samples inside the fit domain.
    fn domain(&self, indentation: &[f64], force: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let upper = self.max_indentation.unwrap_or(f64::INFINITY);
        finite_pairs(indentation, force)
            .filter(|(_, x, _)| *x > -self.contact_offset && *x <= upper)
            .map(|(_, x, f)| (x, f))
            .unzip()
    }

    fn run(&self, indentation: &[f64], force: &[f64]) -> Result<HertzFit, AnalysisError> {
        if indentation.len() != force.len() {
            return Err(AnalysisError::MalformedCurve(format!(
                "indentation has {} samples but force has {}",
                indentation.len(),
                force.len()
            )));
        }
        let (ind, f) = self.domain(indentation, force);
        if ind.len() < MIN_FIT_POINTS {
            return Err(AnalysisError::InvalidModelDomain(format!(
                "{} samples in the Hertz fit domain, need {MIN_FIT_POINTS}",
                ind.len()
            )));
        }
        let (lo, hi) = ind
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let span = (hi - lo).max(f64::MIN_POSITIVE);
        let problem = HertzProblem {
            indenter: self.indenter,
            indentation: &ind,
            force: &f,
            bounds: vec![(0.0, f64::INFINITY), (lo, hi)],
            scales: vec![self.initial.e0.abs().max(1.0), span],
        };
        let x0 = [self.initial.e0, self.initial.delta0.clamp(lo, hi)];
        check_contact(&ind, x0[1])?;
        let report = check_report(
            ModelKind::Hertz.display_name(),
            levenberg_marquardt(&problem, &x0, &self.options),
        )?;

        let params = HertzProblem::params(&report.params);
        check_contact(&ind, params.delta0)?;

        let best_fit = hertz_curve(&self.indenter, &params, &ind);
        if best_fit.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::FitDivergence("Hertz curve is not finite".into()));
        }
        let residuals: Vec<f64> = f.iter().zip(&best_fit).map(|(o, m)| o - m).collect();
        let quality = FitQuality::new(
            report.sse,
            ind.len(),
            ModelKind::Hertz.param_count(),
            report.iterations,
        );
        debug!(
            "hertz fit: E0={:.4e} Pa delta0={:.4e} m redchi={:.3e} ({} iterations, {:?})",
            params.e0, params.delta0, quality.redchi, report.iterations, report.termination
        );

        Ok(HertzFit {
            params,
            quality,
            indentation: ind,
            force: f,
            best_fit,
            residuals,
        })
    }
}

/// The model is identically zero unless enough samples lie past `delta0`.
fn check_contact(indentation: &[f64], delta0: f64) -> Result<(), AnalysisError> {
    let in_contact = indentation.iter().filter(|x| **x > delta0).count();
    if in_contact < MIN_FIT_POINTS {
        return Err(AnalysisError::InvalidModelDomain(format!(
            "{in_contact} samples beyond the contact point {delta0:.3e} m, need {MIN_FIT_POINTS}"
        )));
    }
    Ok(())
}
