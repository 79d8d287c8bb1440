//! Batch processing of many curves across many files.
//!
//! - `source`: the `CurveSource` trait loaders implement
//! - `pipeline`: per-curve preprocessing and fitting
//! - `processor`: the file/curve loop with progress and cancellation
//! - `store`: results keyed by file and curve index

pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod source;
pub mod store;

pub use pipeline::{analyze_curve, analyze_hertz, analyze_ting};
pub use processor::{BatchProcessor, BatchSummary};
pub use progress::{CancellationToken, LogProgress, NoProgress, ProgressSink, ProgressUpdate};
pub use source::CurveSource;
pub use store::{FileResults, FitResultStore};
