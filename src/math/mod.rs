//! Mathematical utilities: linear and nonlinear least squares, slice statistics.

pub mod lm;
pub mod ols;
pub mod stats;

pub use lm::*;
pub use ols::*;
pub use stats::*;
