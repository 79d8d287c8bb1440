//! Linear least squares: SVD solver and polynomial regression.
//!
//! We solve small dense problems of the form:
//!
//! ```text
//! minimize ‖X β − y‖²
//! ```
//!
//! Implementation choices:
//! - SVD is used so tall (more rows than columns) and near-singular systems
//!   are handled without panicking. (Nalgebra's `QR::solve` is intended for
//!   square systems.)
//! - Polynomial abscissae are mapped onto `[-1, 1]` before building the
//!   Vandermonde matrix; AFM indentations are ~1e-7 m and their raw powers
//!   would underflow the solver tolerance.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// A fitted polynomial in a normalized abscissa.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    /// Coefficients, lowest order first, in the normalized variable `u`.
    pub coeffs: Vec<f64>,
    center: f64,
    half_width: f64,
}

impl Polynomial {
    fn normalize(&self, x: f64) -> f64 {
        (x - self.center) / self.half_width
    }

    /// Evaluate at `x` (Horner).
    pub fn eval(&self, x: f64) -> f64 {
        let u = self.normalize(x);
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * u + c)
    }
}

/// Least-squares polynomial of the given order through `(x, y)`.
///
/// Returns `None` when there are fewer than `order + 1` samples, the abscissa
/// range is degenerate, or the solve fails.
pub fn polyfit(x: &[f64], y: &[f64], order: usize) -> Option<Polynomial> {
    let n = x.len();
    let p = order + 1;
    if n != y.len() || n < p {
        return None;
    }

    let (lo, hi) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !(lo.is_finite() && hi.is_finite()) {
        return None;
    }
    let center = 0.5 * (lo + hi);
    let half_width = 0.5 * (hi - lo);
    if half_width <= 0.0 && order > 0 {
        return None;
    }
    let half_width = if half_width > 0.0 { half_width } else { 1.0 };

    let mut design = DMatrix::<f64>::zeros(n, p);
    for (i, &xi) in x.iter().enumerate() {
        let u = (xi - center) / half_width;
        let mut pow = 1.0;
        for j in 0..p {
            design[(i, j)] = pow;
            pow *= u;
        }
    }
    let rhs = DVector::from_column_slice(y);
    let beta = solve_least_squares(&design, &rhs)?;

    Some(Polynomial {
        coeffs: beta.iter().copied().collect(),
        center,
        half_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn polyfit_recovers_quadratic_at_nanometer_scale() {
        let x: Vec<f64> = (0..50).map(|i| -1e-6 + i as f64 * 2e-8).collect();
        let truth = |v: f64| 1e-10 + 2e-4 * v - 3e2 * v * v;
        let y: Vec<f64> = x.iter().map(|&v| truth(v)).collect();

        let poly = polyfit(&x, &y, 2).unwrap();
        for &v in &[-9e-7, -5e-7, -1e-7] {
            let rel = (poly.eval(v) - truth(v)).abs() / truth(v).abs();
            assert!(rel < 1e-8, "poly({v}) = {} vs {}", poly.eval(v), truth(v));
        }
    }

    #[test]
    fn polyfit_rejects_underdetermined_input() {
        assert!(polyfit(&[0.0, 1.0], &[0.0, 1.0], 2).is_none());
        assert!(polyfit(&[1.0, 1.0, 1.0], &[0.0, 1.0, 2.0], 1).is_none());
    }
}
