//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - curve data (`Segment`, `Curve`, `SegmentKind`)
//! - run configuration (`AnalysisParameters`, `Indenter`)
//! - fit outputs (`FitResult`, `ModelParams`, `CurveOutcome`)
//! - force-map geometry (`ScanGrid`)

pub mod grid;
pub mod types;

pub use grid::*;
pub use types::*;
