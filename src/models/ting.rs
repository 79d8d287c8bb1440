//! Ting viscoelastic contact model with power-law stress relaxation.
//!
//! The relaxation modulus is `E(t) = E0 · (t / t0)^−β`. With `C` and `n` the
//! indenter prefactor and exponent, and `d(t) = max(δ(t) − δ(tc), 0)` the
//! indentation measured from the contact time `tc`:
//!
//! ```text
//! loading:    F(t) = F0 + C E0 t0^β ∫_tc^t     (t − τ)^−β d(dⁿ)/dτ dτ
//! unloading:  F(t) = F0 + C E0 t0^β ∫_tc^t1(t) (t − τ)^−β d(dⁿ)/dτ dτ
//!             with t1(t) solving ∫_t1^t (t − τ)^−β dd/dτ dτ = 0
//! ```
//!
//! Numerical notes:
//! - Integrals use the midpoint rule over sample increments. The kernel lag
//!   `t − τ` is floored at half the median sampling interval so a repeated
//!   timestamp never hits the singularity.
//! - `δ(tc)` is linearly interpolated and the first increment starts at `tc`,
//!   which keeps the model continuous in `tc` (the fitter differentiates it
//!   numerically).
//! - When no `t1 ≥ tc` exists the tip has left the surface and `F = F0`.
//! - Output samples are independent and evaluated in parallel.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{Indenter, TingParams};
use crate::error::AnalysisError;
use crate::math::{argmax, interpolate, median_step, moving_average};

/// Inputs shared by every evaluation of one curve.
///
/// Smoothing and the loading/unloading split do not depend on the fitted
/// parameters, so they are computed once.
#[derive(Debug, Clone)]
pub struct TingInputs {
    pub time: Vec<f64>,
    pub force: Vec<f64>,
    /// Smoothed indentation.
    pub indentation: Vec<f64>,
    /// Index of maximum force (end of loading).
    pub idx_tm: usize,
    min_lag: f64,
}

impl TingInputs {
    /// Validate and prepare one curve.
    ///
    /// `idx_tm` defaults to the index of maximum force.
    pub fn new(
        time: &[f64],
        force: &[f64],
        indentation: &[f64],
        idx_tm: Option<usize>,
        smoothing_window: usize,
    ) -> Result<Self, AnalysisError> {
        let n = time.len();
        if force.len() != n || indentation.len() != n {
            return Err(AnalysisError::MalformedCurve(format!(
                "time/force/indentation lengths differ ({n}/{}/{})",
                force.len(),
                indentation.len()
            )));
        }
        if n < 2 {
            return Err(AnalysisError::InsufficientData(format!(
                "Ting model needs at least 2 samples, got {n}"
            )));
        }
        let idx_tm = match idx_tm {
            Some(i) if i < n => i,
            Some(i) => {
                return Err(AnalysisError::InvalidModelDomain(format!(
                    "idx_tm={i} is outside the {n} samples"
                )));
            }
            None => argmax(force).ok_or_else(|| {
                AnalysisError::InvalidModelDomain("force has no finite maximum".into())
            })?,
        };
        let min_lag = median_step(time).map(|dt| 0.5 * dt).unwrap_or(1e-12);

        Ok(Self {
            time: time.to_vec(),
            force: force.to_vec(),
            indentation: moving_average(indentation, smoothing_window),
            idx_tm,
            min_lag,
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Time of maximum force.
    pub fn tm(&self) -> f64 {
        self.time[self.idx_tm]
    }
}

/// Evaluator for the Ting model.
///
/// Holds only the fixed settings of a run; fitted parameters are always
/// passed in explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TingModel {
    pub indenter: Indenter,
    /// Reference time of the relaxation modulus (s).
    pub t0: f64,
}

/// Contact-phase increments of the indentation history.
struct Increments {
    /// First sample strictly after `tc`.
    ic: usize,
    /// Midpoint time of each increment (index `k - ic`).
    mid: Vec<f64>,
    /// Increment of `dⁿ`.
    dg: Vec<f64>,
    /// Increment of `d`.
    dd: Vec<f64>,
}

impl TingModel {
    pub fn new(indenter: Indenter, t0: f64) -> Self {
        Self { indenter, t0 }
    }

    /// Model force at every input sample.
    pub fn evaluate(
        &self,
        time: &[f64],
        force: &[f64],
        indentation: &[f64],
        params: &TingParams,
        idx_tm: Option<usize>,
        smoothing_window: usize,
    ) -> Result<Vec<f64>, AnalysisError> {
        let inputs = TingInputs::new(time, force, indentation, idx_tm, smoothing_window)?;
        Ok(self.curve(&inputs, params))
    }

    /// Observed minus modelled force at every input sample.
    pub fn residuals(
        &self,
        time: &[f64],
        force: &[f64],
        indentation: &[f64],
        params: &TingParams,
        idx_tm: Option<usize>,
        smoothing_window: usize,
    ) -> Result<Vec<f64>, AnalysisError> {
        let inputs = TingInputs::new(time, force, indentation, idx_tm, smoothing_window)?;
        let fitted = self.curve(&inputs, params);
        Ok(inputs.force.iter().zip(&fitted).map(|(o, f)| o - f).collect())
    }

    /// Model force for prepared inputs.
    pub fn curve(&self, inputs: &TingInputs, params: &TingParams) -> Vec<f64> {
        let inc = self.increments(inputs, params.tc);
        let prefactor = self.indenter.coefficient() * params.e0 * self.t0.powf(params.beta_e);
        let beta = params.beta_e;
        let min_lag = inputs.min_lag;
        let m = inputs.idx_tm;

        (0..inputs.len())
            .into_par_iter()
            .map(|i| {
                if i < inc.ic {
                    return params.f0;
                }
                let t = inputs.time[i];
                let kernel = |k: usize| (t - inc.mid[k - inc.ic]).max(min_lag).powf(-beta);

                if i <= m {
                    let integral: f64 = (inc.ic..=i).map(|k| kernel(k) * inc.dg[k - inc.ic]).sum();
                    return params.f0 + prefactor * integral;
                }

                // Unloading: accumulate ∫ (t − τ)^−β dd backwards from t until it
                // turns non-negative; that crossing is t1.
                let unload_start = (m + 1).max(inc.ic);
                let mut s: f64 = (unload_start..=i).map(|k| kernel(k) * inc.dd[k - inc.ic]).sum();
                if s >= 0.0 {
                    let integral: f64 = (inc.ic..=i).map(|k| kernel(k) * inc.dg[k - inc.ic]).sum();
                    return params.f0 + prefactor * integral;
                }

                let mut k = unload_start;
                while k > inc.ic {
                    k -= 1;
                    let wk = kernel(k);
                    let step = wk * inc.dd[k - inc.ic];
                    if s + step >= 0.0 {
                        // Only the fraction of increment k below t1 contributes.
                        let theta = if step > 0.0 { -s / step } else { 0.0 };
                        let head: f64 = (inc.ic..k).map(|j| kernel(j) * inc.dg[j - inc.ic]).sum();
                        let integral = head + (1.0 - theta) * wk * inc.dg[k - inc.ic];
                        return params.f0 + prefactor * integral;
                    }
                    s += step;
                }
                params.f0
            })
            .collect()
    }

    fn increments(&self, inputs: &TingInputs, tc: f64) -> Increments {
        let time = &inputs.time;
        let ind = &inputs.indentation;
        let n_exp = self.indenter.exponent();

        let delta_c = interpolate(time, ind, tc).unwrap_or(ind[0]);
        let ic = time.partition_point(|t| *t <= tc);

        let count = time.len() - ic;
        let mut mid = Vec::with_capacity(count);
        let mut dg = Vec::with_capacity(count);
        let mut dd = Vec::with_capacity(count);

        let mut prev_t = tc;
        let mut prev_d = 0.0_f64;
        for k in ic..time.len() {
            let d = (ind[k] - delta_c).max(0.0);
            mid.push(0.5 * (prev_t + time[k]));
            dg.push(d.powf(n_exp) - prev_d.powf(n_exp));
            dd.push(d - prev_d);
            prev_t = time[k];
            prev_d = d;
        }

        Increments { ic, mid, dg, dd }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HertzParams, IndenterGeometry};
    use crate::models::hertz_force;

    fn sphere() -> Indenter {
        Indenter {
            geometry: IndenterGeometry::Paraboloid,
            tip_parameter: 5e-6,
            poisson_ratio: 0.5,
        }
    }

    /// Triangular indentation history: approach at constant speed, then retract.
    fn triangle(n: usize, depth: f64) -> (Vec<f64>, Vec<f64>) {
        let dt = 1e-3;
        let half = n / 2;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * dt).collect();
        let ind: Vec<f64> = (0..n)
            .map(|i| {
                let u = if i <= half {
                    i as f64 / half as f64
                } else {
                    (n - 1 - i) as f64 / (n - 1 - half) as f64
                };
                depth * u
            })
            .collect();
        (time, ind)
    }

    #[test]
    fn elastic_limit_matches_hertz_on_loading() {
        let (time, ind) = triangle(201, 1e-6);
        let model = TingModel::new(sphere(), 1.0);
        let params = TingParams { e0: 1000.0, tc: 0.0, beta_e: 1e-9, f0: 0.0 };
        let force: Vec<f64> = ind.iter().map(|d| 1e-9 * d).collect();
        let curve = model.evaluate(&time, &force, &ind, &params, Some(100), 1).unwrap();

        let hertz = HertzParams { e0: 1000.0, delta0: 0.0 };
        for i in [10, 50, 100] {
            let expected = hertz_force(&sphere(), &hertz, ind[i]);
            assert!((curve[i] - expected).abs() / expected < 1e-6, "i={i}");
        }
    }

    #[test]
    fn elastic_limit_is_symmetric_on_unloading() {
        let (time, ind) = triangle(201, 1e-6);
        let model = TingModel::new(sphere(), 1.0);
        let params = TingParams { e0: 1000.0, tc: 0.0, beta_e: 1e-9, f0: 0.0 };
        let force = vec![0.0; time.len()];
        let curve = model.evaluate(&time, &force, &ind, &params, Some(100), 1).unwrap();

        for (a, b) in [(50, 150), (80, 120)] {
            assert!((curve[a] - curve[b]).abs() / curve[a] < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn relaxation_lowers_force_and_creates_hysteresis() {
        let (time, ind) = triangle(201, 1e-6);
        let model = TingModel::new(sphere(), 1.0);
        let force = vec![0.0; time.len()];
        let elastic_params = TingParams { e0: 1000.0, tc: 0.0, beta_e: 1e-9, f0: 0.0 };
        let viscous_params = TingParams { beta_e: 0.3, ..elastic_params };
        let elastic = model.evaluate(&time, &force, &ind, &elastic_params, Some(100), 1).unwrap();
        let viscous = model.evaluate(&time, &force, &ind, &viscous_params, Some(100), 1).unwrap();

        // With t0 = 1 s and t << t0 the power-law modulus is stiffer than E0.
        assert!(viscous[100] > elastic[100]);
        // Unloading force is below the loading force at the same indentation.
        assert!(viscous[150] < viscous[50]);
        assert!(viscous.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn baseline_before_contact_and_after_release() {
        let (time, ind) = triangle(201, 1e-6);
        let shifted: Vec<f64> = ind.iter().map(|d| d - 2e-7).collect();
        let model = TingModel::new(sphere(), 1.0);
        let force = vec![0.0; time.len()];
        let params = TingParams { e0: 1000.0, tc: 0.02, beta_e: 0.2, f0: 1e-10 };
        let curve = model.evaluate(&time, &force, &shifted, &params, Some(100), 1).unwrap();

        assert_eq!(curve[0], 1e-10);
        assert!((curve[20] - 1e-10).abs() < 1e-15);
        assert!(curve[100] > 1e-10);
        assert!((curve[200] - 1e-10).abs() < 1e-15);
    }

    #[test]
    fn residuals_are_observed_minus_model() {
        let (time, ind) = triangle(101, 5e-7);
        let model = TingModel::new(sphere(), 1.0);
        let params = TingParams { e0: 800.0, tc: 0.0, beta_e: 0.1, f0: 0.0 };
        let zeros = vec![0.0; time.len()];
        let curve = model.evaluate(&time, &zeros, &ind, &params, Some(50), 1).unwrap();
        let res = model.residuals(&time, &curve, &ind, &params, Some(50), 1).unwrap();
        assert!(res.iter().all(|r| r.abs() < 1e-20));
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let model = TingModel::new(sphere(), 1.0);
        let params = TingParams { e0: 800.0, tc: 0.0, beta_e: 0.1, f0: 0.0 };
        let err = model.evaluate(&[0.0, 1.0], &[0.0], &[0.0, 1.0], &params, None, 1).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedCurve(_)));
    }
}
