//! Ting fit engine.
//!
//! Fits `E0`, `tc`, `betaE` and `F0` of the viscoelastic model over a full
//! approach–retract time series. The Hertz fit of the same curve is a hard
//! prerequisite: it seeds `E0` and defines the contact reference.

use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::domain::{AnalysisParameters, FitQuality, ModelKind, TingParams};
use crate::error::AnalysisError;
use crate::fit::engine::{FitState, MIN_FIT_POINTS, check_report, lm_options};
use crate::fit::hertz::HertzFit;
use crate::math::{
    LeastSquaresProblem, LmOptions, levenberg_marquardt, median_step, nearest_index,
};
use crate::models::{TingInputs, TingModel};

const BETA_BOUNDS: (f64, f64) = (1e-3, 0.999);

/// A converged Ting fit on its filtered, re-baselined series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TingFit {
    pub params: TingParams,
    /// Indentation at the sample nearest `tc` (m).
    pub ting_d0: f64,
    pub quality: FitQuality,
    pub idx_tm: usize,
    pub time: Vec<f64>,
    pub force: Vec<f64>,
    pub indentation: Vec<f64>,
    pub best_fit: Vec<f64>,
    /// Observed minus fitted force.
    pub residuals: Vec<f64>,
}

struct TingProblem<'a> {
    model: &'a TingModel,
    inputs: &'a TingInputs,
    bounds: Vec<(f64, f64)>,
    scales: Vec<f64>,
}

fn ting_params(p: &[f64]) -> TingParams {
    TingParams {
        e0: p[0],
        tc: p[1],
        beta_e: p[2],
        f0: p[3],
    }
}

impl LeastSquaresProblem for TingProblem<'_> {
    fn n_params(&self) -> usize {
        4
    }

    fn residuals(&self, p: &[f64]) -> Option<DVector<f64>> {
        let curve = self.model.curve(self.inputs, &ting_params(p));
        Some(DVector::from_iterator(
            curve.len(),
            curve.iter().zip(&self.inputs.force).map(|(m, o)| m - o),
        ))
    }

    fn param_scales(&self) -> Vec<f64> {
        self.scales.clone()
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        self.bounds.clone()
    }
}

/// Viscoelastic model fitter with an observable lifecycle.
#[derive(Debug, Clone)]
pub struct TingFitEngine {
    model: TingModel,
    contact_offset: f64,
    smoothing_window: usize,
    init_beta: f64,
    init_f0: f64,
    options: LmOptions,
    state: FitState,
}

impl TingFitEngine {
    pub fn new(params: &AnalysisParameters) -> Self {
        Self {
            model: TingModel::new(params.indenter, params.ting_t0),
            contact_offset: params.contact_offset,
            smoothing_window: params.smoothing_window,
            init_beta: params.ting_init_beta,
            init_f0: params.ting_init_f0,
            options: lm_options(params.max_iterations),
            state: FitState::Ready,
        }
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    /// The evaluator used by this engine, for re-rendering fitted parameters.
    pub fn model(&self) -> TingModel {
        self.model
    }

    /// Fit a concatenated extend+retract series.
    ///
    /// Samples at or below `-contact_offset` are dropped, then force and time
    /// are shifted so the first retained sample sits at zero.
    pub fn fit(
        &mut self,
        time: &[f64],
        force: &[f64],
        indentation: &[f64],
        hertz: Option<&HertzFit>,
    ) -> Result<TingFit, AnalysisError> {
        self.state = FitState::Fitting;
        let outcome = self.run(time, force, indentation, hertz);
        self.state = FitState::after(&outcome);
        outcome
    }

    fn run(
        &self,
        time: &[f64],
        force: &[f64],
        indentation: &[f64],
        hertz: Option<&HertzFit>,
    ) -> Result<TingFit, AnalysisError> {
        let hertz = hertz.ok_or_else(|| {
            AnalysisError::DependencyMissing(
                "Ting fit requires a Hertz fit of the same curve".into(),
            )
        })?;
        if time.len() != force.len() || time.len() != indentation.len() {
            return Err(AnalysisError::MalformedCurve(format!(
                "time/force/indentation lengths differ ({}/{}/{})",
                time.len(),
                force.len(),
                indentation.len()
            )));
        }

        let (t, f, ind) = self.domain(time, force, indentation);
        if t.len() < MIN_FIT_POINTS {
            return Err(AnalysisError::InvalidModelDomain(format!(
                "{} samples in the Ting fit domain, need {MIN_FIT_POINTS}",
                t.len()
            )));
        }

        let inputs = TingInputs::new(&t, &f, &ind, None, self.smoothing_window)?;
        let idx_tm = inputs.idx_tm;
        let (t_start, t_m) = (t[0], inputs.tm());
        if idx_tm + 1 < MIN_FIT_POINTS || t_m <= t_start {
            return Err(AnalysisError::InvalidModelDomain(format!(
                "loading phase has only {} samples before the force maximum",
                idx_tm + 1
            )));
        }

        let tc_index = nearest_index(&ind[..=idx_tm], 0.0).unwrap_or(0);
        let f_span = f.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let dt = median_step(&t).unwrap_or(t_m - t_start);
        let problem = TingProblem {
            model: &self.model,
            inputs: &inputs,
            bounds: vec![
                (0.0, f64::INFINITY),
                (t_start, t_m),
                BETA_BOUNDS,
                (f64::NEG_INFINITY, f64::INFINITY),
            ],
            scales: vec![hertz.params.e0.abs().max(1.0), dt, 0.1, f_span.max(1e-12)],
        };
        let x0 = [
            hertz.params.e0,
            t[tc_index],
            self.init_beta.clamp(BETA_BOUNDS.0, BETA_BOUNDS.1),
            self.init_f0,
        ];
        let report = check_report(
            ModelKind::Ting.display_name(),
            levenberg_marquardt(&problem, &x0, &self.options),
        )?;

        let params = ting_params(&report.params);
        let best_fit = self.model.curve(&inputs, &params);
        if best_fit.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::FitDivergence("Ting curve is not finite".into()));
        }
        let residuals: Vec<f64> = f.iter().zip(&best_fit).map(|(o, m)| o - m).collect();
        let ting_d0 = nearest_index(&t, params.tc).map(|i| ind[i]).unwrap_or(0.0);
        let quality = FitQuality::new(
            report.sse,
            t.len(),
            ModelKind::Ting.param_count(),
            report.iterations,
        );
        debug!(
            "ting fit: E0={:.4e} Pa tc={:.4e} s betaE={:.3} F0={:.3e} N redchi={:.3e}",
            params.e0, params.tc, params.beta_e, params.f0, quality.redchi
        );

        Ok(TingFit {
            params,
            ting_d0,
            quality,
            idx_tm,
            time: t,
            force: f,
            indentation: ind,
            best_fit,
            residuals,
        })
    }

    /// Filter to the contact region and re-baseline force and time.
    fn domain(
        &self,
        time: &[f64],
        force: &[f64],
        indentation: &[f64],
    ) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mut t = Vec::with_capacity(time.len());
        let mut f = Vec::with_capacity(time.len());
        let mut ind = Vec::with_capacity(time.len());
        for i in 0..time.len() {
            let keep = indentation[i] > -self.contact_offset
                && time[i].is_finite()
                && force[i].is_finite();
            if keep {
                t.push(time[i]);
                f.push(force[i]);
                ind.push(indentation[i]);
            }
        }
        if let (Some(&t0), Some(&f0)) = (t.first(), f.first()) {
            t.iter_mut().for_each(|v| *v -= t0);
            f.iter_mut().for_each(|v| *v -= f0);
        }
        (t, f, ind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HertzParams, Indenter};

    fn hertz_seed(e0: f64) -> HertzFit {
        HertzFit {
            params: HertzParams { e0, delta0: 0.0 },
            quality: FitQuality::new(0.0, 10, 2, 1),
            indentation: Vec::new(),
            force: Vec::new(),
            best_fit: Vec::new(),
            residuals: Vec::new(),
        }
    }

    /// Approach from 1e-7 m above the surface to 1e-6 m deep and back, 1 s each way.
    fn history() -> (Vec<f64>, Vec<f64>) {
        let n = 201;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.01).collect();
        let ind = time
            .iter()
            .map(|&t| {
                let u = if t <= 1.0 { t } else { 2.0 - t };
                -1e-7 + 1.1e-6 * u
            })
            .collect();
        (time, ind)
    }

    fn params() -> AnalysisParameters {
        AnalysisParameters {
            smoothing_window: 1,
            ting_init_beta: 0.2,
            ..AnalysisParameters::default()
        }
    }

    #[test]
    fn missing_hertz_fit_is_a_dependency_error() {
        let (time, ind) = history();
        let force = vec![0.0; time.len()];
        let mut engine = TingFitEngine::new(&params());
        let err = engine.fit(&time, &force, &ind, None).unwrap_err();
        assert!(matches!(err, AnalysisError::DependencyMissing(_)));
        assert_eq!(engine.state(), FitState::Failed);
    }

    #[test]
    fn recovers_generated_parameters() {
        let (time, ind) = history();
        let truth = TingParams { e0: 1500.0, tc: 0.095, beta_e: 0.15, f0: 0.0 };
        let model = TingModel::new(Indenter::default(), 1.0);
        let zeros = vec![0.0; time.len()];
        let force = model.evaluate(&time, &zeros, &ind, &truth, Some(100), 1).unwrap();

        let mut engine = TingFitEngine::new(&params());
        let fit = engine.fit(&time, &force, &ind, Some(&hertz_seed(1000.0))).unwrap();
        assert_eq!(engine.state(), FitState::Converged);

        assert_eq!(fit.idx_tm, 100);
        let rel = (fit.params.e0 - truth.e0).abs() / truth.e0;
        assert!(rel < 0.1, "E0 = {}", fit.params.e0);
        assert!((fit.params.beta_e - truth.beta_e).abs() < 0.05, "beta = {}", fit.params.beta_e);
        assert!((fit.params.tc - truth.tc).abs() < 0.02, "tc = {}", fit.params.tc);
        assert!(fit.ting_d0.abs() < 3e-8, "ting_d0 = {}", fit.ting_d0);
        assert_eq!(fit.best_fit.len(), fit.time.len());
    }

    #[test]
    fn fitted_parameters_render_on_another_grid() {
        let (time, ind) = history();
        let truth = TingParams { e0: 1200.0, tc: 0.09, beta_e: 0.2, f0: 0.0 };
        let model = TingModel::new(Indenter::default(), 1.0);
        let zeros = vec![0.0; time.len()];
        let force = model.evaluate(&time, &zeros, &ind, &truth, Some(100), 1).unwrap();

        let mut engine = TingFitEngine::new(&params());
        let fit = engine.fit(&time, &force, &ind, Some(&hertz_seed(1000.0))).unwrap();
        let renderer = engine.model();

        let same = renderer
            .evaluate(&fit.time, &fit.force, &fit.indentation, &fit.params, Some(fit.idx_tm), 1)
            .unwrap();
        assert_eq!(same, fit.best_fit);

        // Every other sample; the force maximum stays on the grid.
        let coarse_t: Vec<f64> = fit.time.iter().step_by(2).copied().collect();
        let coarse_ind: Vec<f64> = fit.indentation.iter().step_by(2).copied().collect();
        let coarse_zeros = vec![0.0; coarse_t.len()];
        let coarse = renderer
            .evaluate(&coarse_t, &coarse_zeros, &coarse_ind, &fit.params, Some(fit.idx_tm / 2), 1)
            .unwrap();
        let peak = fit.best_fit.iter().fold(0.0_f64, |m, v| m.max(*v));
        for (j, value) in coarse.iter().enumerate() {
            let fine = fit.best_fit[2 * j];
            if fine > 0.1 * peak {
                assert!((value - fine).abs() / fine < 0.05, "sample {}: {value} vs {fine}", 2 * j);
            }
        }
    }

    #[test]
    fn series_is_filtered_and_rebased() {
        let (time, mut ind) = history();
        // Two samples far above the surface are discarded.
        ind[0] = -5e-6;
        ind[1] = -5e-6;
        let model = TingModel::new(Indenter::default(), 1.0);
        let truth = TingParams { e0: 1000.0, tc: 0.1, beta_e: 0.1, f0: 2e-10 };
        let zeros = vec![0.0; time.len()];
        let force = model.evaluate(&time, &zeros, &ind, &truth, Some(100), 1).unwrap();

        let mut engine = TingFitEngine::new(&params());
        let fit = engine.fit(&time, &force, &ind, Some(&hertz_seed(1000.0))).unwrap();
        assert_eq!(fit.time.len(), time.len() - 2);
        assert_eq!(fit.time[0], 0.0);
        assert_eq!(fit.force[0], 0.0);
    }

    #[test]
    fn nothing_in_contact_is_invalid_domain() {
        let time: Vec<f64> = (0..50).map(|i| i as f64 * 0.01).collect();
        let ind = vec![-2e-6; 50];
        let force = vec![0.0; 50];
        let mut engine = TingFitEngine::new(&params());
        let err = engine.fit(&time, &force, &ind, Some(&hertz_seed(1000.0))).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidModelDomain(_)));
    }
}
