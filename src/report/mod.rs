//! Reporting utilities: statistics and text output for stored results.

pub mod format;

pub use format::*;
