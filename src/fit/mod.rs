//! Model fitting.
//!
//! Responsibilities:
//!
//! - restrict a preprocessed curve to the model's domain
//! - run Levenberg–Marquardt on the Hertz or Ting model
//! - map solver failures onto per-curve `AnalysisError`s

pub mod engine;
pub mod hertz;
pub mod ting;

pub use engine::{FitState, MIN_FIT_POINTS};
pub use hertz::*;
pub use ting::*;
