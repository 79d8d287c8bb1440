//! Levenberg–Marquardt solver for small nonlinear least-squares problems.
//!
//! ```text
//! minimize Σ r_i(p)²
//! ```
//!
//! Implementation choices:
//! - Jacobian columns are scaled to unit norm before each step (Moré scaling).
//!   Contact-mechanics parameters differ by ~11 orders of magnitude
//!   (E0 ~ 1e3 Pa, δ0 ~ 1e-8 m) and the SVD tolerance is absolute.
//! - The damped step solves the augmented system `[J_s; √λ I] s = [−r; 0]`
//!   with the same SVD least-squares routine used for linear fits.
//! - Bounds are enforced by projecting every trial point onto the box.
//! - If λ grows past `MAX_LAMBDA` no downhill step exists at machine precision
//!   and the current point is reported as converged.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::math::solve_least_squares;

const MAX_LAMBDA: f64 = 1e12;
const MIN_LAMBDA: f64 = 1e-12;

/// A nonlinear least-squares problem.
pub trait LeastSquaresProblem {
    fn n_params(&self) -> usize;

    /// Residual vector at `params`, or `None` if the model cannot be evaluated there.
    fn residuals(&self, params: &[f64]) -> Option<DVector<f64>>;

    /// Jacobian of `residuals` (rows = residuals, columns = parameters).
    ///
    /// Defaults to forward differences; `r0` is the residual at `params`.
    fn jacobian(&self, params: &[f64], r0: &DVector<f64>) -> Option<DMatrix<f64>> {
        finite_difference_jacobian(self, params, r0)
    }

    /// Typical magnitude of each parameter (sets finite-difference steps).
    fn param_scales(&self) -> Vec<f64> {
        vec![1.0; self.n_params()]
    }

    /// Inclusive `(lower, upper)` bounds per parameter.
    fn bounds(&self) -> Vec<(f64, f64)> {
        vec![(f64::NEG_INFINITY, f64::INFINITY); self.n_params()]
    }
}

#[derive(Debug, Clone)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Relative SSE reduction below which the fit is considered converged.
    pub ftol: f64,
    /// Relative (scaled) step size below which the fit is considered converged.
    pub xtol: f64,
    pub initial_lambda: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            initial_lambda: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Relative SSE change fell below `ftol`.
    SseTolerance,
    /// Scaled step fell below `xtol`.
    StepTolerance,
    /// Residuals are exactly zero.
    ExactFit,
    /// No downhill step could be found (λ exceeded its cap).
    Stalled,
    /// The iteration budget ran out.
    MaxIterations,
}

#[derive(Debug, Clone)]
pub struct LmReport {
    pub params: Vec<f64>,
    pub residuals: DVector<f64>,
    pub sse: f64,
    pub iterations: usize,
    pub termination: Termination,
}

impl LmReport {
    pub fn converged(&self) -> bool {
        self.termination != Termination::MaxIterations
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LmError {
    /// The model could not be evaluated at the starting point.
    #[error("model is not finite at the initial guess")]
    InvalidStart,
    /// The Jacobian could not be computed or contained non-finite values.
    #[error("jacobian is not finite")]
    InvalidJacobian,
}

/// Minimize the problem's sum of squared residuals from `x0`.
///
/// A report is returned even when the budget runs out; callers decide whether
/// `Termination::MaxIterations` is acceptable.
pub fn levenberg_marquardt<P: LeastSquaresProblem + ?Sized>(
    problem: &P,
    x0: &[f64],
    opts: &LmOptions,
) -> Result<LmReport, LmError> {
    let p = problem.n_params();
    let bounds = problem.bounds();
    let mut x = project(x0, &bounds);

    let mut r = evaluate(problem, &x).ok_or(LmError::InvalidStart)?;
    let mut sse = r.norm_squared();
    let mut lambda = opts.initial_lambda.max(MIN_LAMBDA);

    if sse == 0.0 {
        return Ok(report(x, r, sse, 0, Termination::ExactFit));
    }

    for iter in 1..=opts.max_iterations {
        let jac = problem.jacobian(&x, &r).ok_or(LmError::InvalidJacobian)?;
        if jac.iter().any(|v| !v.is_finite()) {
            return Err(LmError::InvalidJacobian);
        }

        // Column norms; a zero column means the parameter has no influence
        // at this point and its step stays zero.
        let scale: Vec<f64> = (0..p)
            .map(|j| {
                let n = jac.column(j).norm();
                if n > 0.0 { n } else { 1.0 }
            })
            .collect();
        let mut jac_s = jac.clone();
        for j in 0..p {
            jac_s.column_mut(j).scale_mut(1.0 / scale[j]);
        }
        let x_scaled_norm = x
            .iter()
            .zip(&scale)
            .map(|(v, s)| (v * s) * (v * s))
            .sum::<f64>()
            .sqrt();

        loop {
            let m = r.len();
            let mut a = DMatrix::<f64>::zeros(m + p, p);
            a.view_mut((0, 0), (m, p)).copy_from(&jac_s);
            let damp = lambda.sqrt();
            for j in 0..p {
                a[(m + j, j)] = damp;
            }
            let mut b = DVector::<f64>::zeros(m + p);
            b.rows_mut(0, m).copy_from(&(-r.clone()));

            let Some(step_s) = solve_least_squares(&a, &b) else {
                lambda *= 10.0;
                if lambda > MAX_LAMBDA {
                    return Ok(report(x, r, sse, iter, Termination::Stalled));
                }
                continue;
            };

            let trial: Vec<f64> = x
                .iter()
                .zip(step_s.iter().zip(&scale))
                .map(|(xi, (si, di))| xi + si / di)
                .collect();
            let trial = project(&trial, &bounds);

            let improved = evaluate(problem, &trial)
                .map(|r_new| (r_new.norm_squared(), r_new))
                .filter(|(sse_new, _)| *sse_new < sse);

            match improved {
                Some((sse_new, r_new)) => {
                    let taken_norm = trial
                        .iter()
                        .zip(&x)
                        .zip(&scale)
                        .map(|((new, old), s)| ((new - old) * s) * ((new - old) * s))
                        .sum::<f64>()
                        .sqrt();
                    let rel = (sse - sse_new) / sse;

                    x = trial;
                    r = r_new;
                    sse = sse_new;
                    lambda = (lambda / 10.0).max(MIN_LAMBDA);

                    if sse == 0.0 {
                        return Ok(report(x, r, sse, iter, Termination::ExactFit));
                    }
                    if rel <= opts.ftol {
                        return Ok(report(x, r, sse, iter, Termination::SseTolerance));
                    }
                    if taken_norm <= opts.xtol * (x_scaled_norm + opts.xtol) {
                        return Ok(report(x, r, sse, iter, Termination::StepTolerance));
                    }
                    break;
                }
                None => {
                    lambda *= 10.0;
                    if lambda > MAX_LAMBDA {
                        return Ok(report(x, r, sse, iter, Termination::Stalled));
                    }
                }
            }
        }
    }

    let iterations = opts.max_iterations;
    Ok(report(x, r, sse, iterations, Termination::MaxIterations))
}

/// Forward-difference Jacobian using the problem's parameter scales and bounds.
pub fn finite_difference_jacobian<P: LeastSquaresProblem + ?Sized>(
    problem: &P,
    params: &[f64],
    r0: &DVector<f64>,
) -> Option<DMatrix<f64>> {
    let p = problem.n_params();
    let scales = problem.param_scales();
    let bounds = problem.bounds();
    let mut jac = DMatrix::<f64>::zeros(r0.len(), p);
    let mut probe = params.to_vec();

    for j in 0..p {
        let mut h = 1e-7 * params[j].abs().max(scales[j].abs());
        if h == 0.0 {
            h = 1e-7;
        }
        // Step backwards when the forward probe would leave the box.
        if params[j] + h > bounds[j].1 {
            h = -h;
        }
        probe[j] = params[j] + h;
        let r1 = evaluate(problem, &probe)?;
        probe[j] = params[j];
        if r1.len() != r0.len() {
            return None;
        }
        let col = (r1 - r0) / h;
        jac.set_column(j, &col);
    }

    Some(jac)
}

fn evaluate<P: LeastSquaresProblem + ?Sized>(problem: &P, x: &[f64]) -> Option<DVector<f64>> {
    problem
        .residuals(x)
        .filter(|r| r.iter().all(|v| v.is_finite()))
}

fn project(x: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(bounds)
        .map(|(v, (lo, hi))| v.max(*lo).min(*hi))
        .collect()
}

fn report(
    params: Vec<f64>,
    residuals: DVector<f64>,
    sse: f64,
    iterations: usize,
    termination: Termination,
) -> LmReport {
    LmReport {
        params,
        residuals,
        sse,
        iterations,
        termination,
    }
}
