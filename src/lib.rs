//! `afm-curves` library crate.
//!
//! Analysis core for AFM force-distance curves: contact-point estimation,
//! force/indentation transforms, drag correction, Hertz and Ting fits and
//! batch processing across force maps.
//!
//! The binary (`afm`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - loaders and front-ends can reuse the pipeline directly

pub mod app;
pub mod batch;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod preprocess;
pub mod report;
