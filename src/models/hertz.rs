//! Hertz elastic contact model.
//!
//! `F(δ) = C · E0 · (δ − δ0)^n` for `δ > δ0` and `0` otherwise, where `C` and
//! `n` depend on the indenter geometry (see `Indenter::coefficient`).

use crate::domain::{HertzParams, Indenter};

/// Force at a single indentation.
pub fn hertz_force(indenter: &Indenter, params: &HertzParams, indentation: f64) -> f64 {
    let d = indentation - params.delta0;
    if d > 0.0 {
        indenter.coefficient() * params.e0 * d.powf(indenter.exponent())
    } else {
        0.0
    }
}

/// Model curve over a slice of indentations.
pub fn hertz_curve(indenter: &Indenter, params: &HertzParams, indentation: &[f64]) -> Vec<f64> {
    let c = indenter.coefficient();
    let n = indenter.exponent();
    indentation
        .iter()
        .map(|&ind| {
            let d = ind - params.delta0;
            if d > 0.0 { c * params.e0 * d.powf(n) } else { 0.0 }
        })
        .collect()
}

/// Partial derivatives `(∂F/∂E0, ∂F/∂δ0)` at one indentation.
pub fn hertz_gradient(indenter: &Indenter, params: &HertzParams, indentation: f64) -> (f64, f64) {
    let d = indentation - params.delta0;
    if d <= 0.0 {
        return (0.0, 0.0);
    }
    let c = indenter.coefficient();
    let n = indenter.exponent();
    let d_e0 = c * d.powf(n);
    let d_delta0 = -c * params.e0 * n * d.powf(n - 1.0);
    (d_e0, d_delta0)
}
