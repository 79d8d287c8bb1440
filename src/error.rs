use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-curve analysis failure.
///
/// Every variant is recoverable at curve granularity: the batch processor
/// records it in the curve's result slot and moves on to the next curve.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AnalysisError {
    /// Too few samples for the requested window or model.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// The fit domain is empty or too small after filtering.
    #[error("invalid model domain: {0}")]
    InvalidModelDomain(String),

    /// The optimizer did not converge or produced non-finite values.
    #[error("fit diverged: {0}")]
    FitDivergence(String),

    /// A Ting fit was requested without a Hertz precursor.
    #[error("missing dependency: {0}")]
    DependencyMissing(String),

    /// Input curve data is unreadable or inconsistent.
    #[error("malformed curve: {0}")]
    MalformedCurve(String),
}

impl AnalysisError {
    /// Short machine-friendly label (used in exports and summaries).
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisError::InsufficientData(_) => "insufficient_data",
            AnalysisError::InvalidModelDomain(_) => "invalid_model_domain",
            AnalysisError::FitDivergence(_) => "fit_divergence",
            AnalysisError::DependencyMissing(_) => "dependency_missing",
            AnalysisError::MalformedCurve(_) => "malformed_curve",
        }
    }
}

/// CLI-level error carrying the process exit code.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        let code = match err {
            AnalysisError::MalformedCurve(_) => 2,
            AnalysisError::InsufficientData(_) | AnalysisError::InvalidModelDomain(_) => 3,
            AnalysisError::FitDivergence(_) | AnalysisError::DependencyMissing(_) => 4,
        };
        AppError::new(code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
