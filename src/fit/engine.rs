//! Pieces shared by the model fit engines.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::math::{LmError, LmOptions, LmReport};

/// Minimum number of samples a fit domain must hold.
pub const MIN_FIT_POINTS: usize = 5;

/// Lifecycle of a fit engine.
///
/// `Ready → Fitting → {Converged, Failed}`; a new `fit` call restarts the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitState {
    #[default]
    Ready,
    Fitting,
    Converged,
    Failed,
}

impl FitState {
    pub(crate) fn after<T>(outcome: &Result<T, AnalysisError>) -> Self {
        if outcome.is_ok() {
            FitState::Converged
        } else {
            FitState::Failed
        }
    }
}

pub(crate) fn lm_options(max_iterations: usize) -> LmOptions {
    LmOptions {
        max_iterations,
        ..LmOptions::default()
    }
}

/// Turn a solver outcome into a usable report or a divergence error.
pub(crate) fn check_report(
    model: &str,
    outcome: Result<LmReport, LmError>,
) -> Result<LmReport, AnalysisError> {
    let report = outcome.map_err(|e| AnalysisError::FitDivergence(format!("{model}: {e}")))?;
    if !report.converged() {
        return Err(AnalysisError::FitDivergence(format!(
            "{model} fit did not converge in {} iterations (sse={:.3e})",
            report.iterations, report.sse
        )));
    }
    if !report.sse.is_finite() || report.params.iter().any(|p| !p.is_finite()) {
        return Err(AnalysisError::FitDivergence(format!(
            "{model} fit produced non-finite parameters"
        )));
    }
    Ok(report)
}

/// Keep only samples where both values are finite.
pub(crate) fn finite_pairs(x: &[f64], y: &[f64]) -> impl Iterator<Item = (usize, f64, f64)> {
    x.iter()
        .zip(y)
        .enumerate()
        .filter(|(_, (a, b))| a.is_finite() && b.is_finite())
        .map(|(i, (a, b))| (i, *a, *b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Termination;
    use nalgebra::DVector;

    fn report(termination: Termination, params: Vec<f64>) -> LmReport {
        LmReport {
            params,
            residuals: DVector::zeros(3),
            sse: 1.0,
            iterations: 7,
            termination,
        }
    }

    #[test]
    fn exhausted_budget_is_divergence() {
        let err = check_report("hertz", Ok(report(Termination::MaxIterations, vec![1.0])))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::FitDivergence(_)));
    }

    #[test]
    fn nan_parameters_are_divergence() {
        let err = check_report("ting", Ok(report(Termination::SseTolerance, vec![f64::NAN])))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::FitDivergence(_)));
    }

    #[test]
    fn solver_errors_carry_their_message() {
        let err = check_report("ting", Err(LmError::InvalidJacobian)).unwrap_err();
        assert_eq!(err, AnalysisError::FitDivergence("ting: jacobian is not finite".into()));
    }

    #[test]
    fn converged_report_passes() {
        assert!(check_report("hertz", Ok(report(Termination::Stalled, vec![2.0]))).is_ok());
    }

    #[test]
    fn state_follows_outcome() {
        let ok: Result<(), AnalysisError> = Ok(());
        let err: Result<(), AnalysisError> = Err(AnalysisError::FitDivergence("x".into()));
        assert_eq!(FitState::after(&ok), FitState::Converged);
        assert_eq!(FitState::after(&err), FitState::Failed);
        assert_eq!(FitState::default(), FitState::Ready);
    }
}
