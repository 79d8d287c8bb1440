//! Loaded files as seen by the batch processor.

use crate::domain::{Calibration, ScanGrid, Segment, SegmentKind};
use crate::error::AnalysisError;

/// One loaded file holding a sequence of curves.
///
/// Loaders for instrument formats live outside this crate; they only need to
/// hand out validated segments per curve.
pub trait CurveSource {
    fn file_id(&self) -> &str;

    fn curve_count(&self) -> usize;

    /// Segments of one curve, ordered by acquisition time.
    fn segments(&self, curve_index: usize) -> Result<Vec<(SegmentKind, Segment)>, AnalysisError>;

    /// Pixel layout when the file is a force map.
    fn scan_grid(&self) -> Option<ScanGrid> {
        None
    }

    /// Calibration recorded with the file.
    fn calibration(&self) -> Calibration {
        Calibration::default()
    }
}
