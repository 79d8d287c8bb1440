//! Batch runs over files and curves.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::batch::pipeline::analyze_curve;
use crate::batch::progress::{CancellationToken, ProgressSink, ProgressUpdate};
use crate::batch::source::CurveSource;
use crate::batch::store::{FileResults, FitResultStore};
use crate::domain::{AnalysisParameters, Curve, CurveOutcome, ModelKind};

/// Counts of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub model: ModelKind,
    pub files: usize,
    pub curves: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Runs the per-curve pipeline over many files and keeps the results.
///
/// Runs on the same processor are serialized; the store can be shared with
/// readers through `store()`.
#[derive(Debug, Default)]
pub struct BatchProcessor {
    store: Arc<Mutex<FitResultStore>>,
    run_lock: Mutex<()>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BatchProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> Arc<Mutex<FitResultStore>> {
        Arc::clone(&self.store)
    }

    /// Copy of the current results.
    pub fn snapshot(&self) -> FitResultStore {
        lock(&self.store).clone()
    }

    /// Fit every curve of the given files.
    ///
    /// Only the first file is processed unless `compute_all_files` is set.
    /// Each file is analyzed with `params.for_file(source.calibration())`.
    /// Per-curve failures are stored and do not stop the run. On cancellation
    /// the curves finished so far in the current file replace its entry; a
    /// file with no finished curve keeps its previous results.
    pub fn run(
        &self,
        sources: &[&dyn CurveSource],
        params: &AnalysisParameters,
        model: ModelKind,
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> BatchSummary {
        let _running = lock(&self.run_lock);
        let started = Instant::now();

        let selected = if params.compute_all_files {
            sources
        } else {
            &sources[..sources.len().min(1)]
        };
        let file_total = selected.len();
        let mut summary = BatchSummary {
            model,
            files: 0,
            curves: 0,
            succeeded: 0,
            failed: 0,
            cancelled: false,
            elapsed: Duration::ZERO,
        };

        'files: for (file_idx, source) in selected.iter().enumerate() {
            let file_id = source.file_id().to_string();
            let curve_total = source.curve_count();
            let file_params = params.for_file(&source.calibration());
            let mut results = FileResults::new();

            for curve_idx in 0..curve_total {
                if cancel.is_cancelled() {
                    if !results.is_empty() {
                        lock(&self.store).replace_file(&file_id, results);
                    }
                    summary.cancelled = true;
                    break 'files;
                }

                let outcome = process_curve(*source, curve_idx, &file_params, model);
                let message = match &outcome {
                    Ok(fit) => {
                        summary.succeeded += 1;
                        debug!(
                            "{file_id} curve {curve_idx}: E0={:.4e} Pa redchi={:.3e}",
                            fit.params.e0(),
                            fit.quality.redchi
                        );
                        format!("{file_id}: curve {curve_idx} fitted")
                    }
                    Err(err) => {
                        summary.failed += 1;
                        warn!("{file_id} curve {curve_idx}: {err}");
                        format!("{file_id}: curve {curve_idx} failed ({})", err.label())
                    }
                };
                summary.curves += 1;
                results.insert(curve_idx, outcome);

                progress.report(ProgressUpdate {
                    file_progress: file_idx,
                    file_total,
                    curve_progress: curve_idx + 1,
                    curve_total,
                    message,
                });
            }

            lock(&self.store).replace_file(&file_id, results);
            summary.files += 1;
            progress.report(ProgressUpdate {
                file_progress: file_idx + 1,
                file_total,
                curve_progress: curve_total,
                curve_total,
                message: format!("{file_id}: done"),
            });
        }

        summary.elapsed = started.elapsed();
        info!(
            "{} batch: {} files, {} curves ({} ok, {} failed){} in {:.2?}",
            model.display_name(),
            summary.files,
            summary.curves,
            summary.succeeded,
            summary.failed,
            if summary.cancelled { ", cancelled" } else { "" },
            summary.elapsed
        );
        summary
    }
}

fn process_curve(
    source: &dyn CurveSource,
    index: usize,
    params: &AnalysisParameters,
    model: ModelKind,
) -> CurveOutcome {
    let segments = source.segments(index)?;
    analyze_curve(&Curve { index, segments }, params, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SyntheticConfig, generate_force_map};
    use crate::domain::{Calibration, ScanGrid, Segment, SegmentKind};
    use crate::error::AnalysisError;
    use crate::io::ForceMapFile;

    fn force_map(file_id: &str, curves: usize) -> ForceMapFile {
        let config = SyntheticConfig {
            file_id: file_id.to_string(),
            cols: curves,
            rows: 1,
            ..SyntheticConfig::default()
        };
        generate_force_map(&config, &AnalysisParameters::default())
            .unwrap()
            .file
    }

    /// Truncate one curve so it is too short for the contact estimator.
    fn with_short_curve(mut map: ForceMapFile, index: usize) -> ForceMapFile {
        for (_, segment) in &mut map.curves[index].segments {
            let keep = 20;
            *segment = Segment::new(
                segment.time[..keep].to_vec(),
                segment
                    .heights
                    .iter()
                    .map(|(k, v)| (k.clone(), v[..keep].to_vec()))
                    .collect(),
                segment.deflection[..keep].to_vec(),
            )
            .unwrap();
        }
        map
    }

    #[test]
    fn failed_curves_are_recorded_and_the_run_continues() {
        let map = with_short_curve(force_map("map-a", 5), 3);
        let processor = BatchProcessor::new();
        let mut updates = Vec::new();
        let mut sink = |u: ProgressUpdate| updates.push(u);

        let summary = processor.run(
            &[&map],
            &AnalysisParameters::default(),
            ModelKind::Hertz,
            &mut sink,
            &CancellationToken::new(),
        );

        assert_eq!(summary.curves, 5);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, 1);
        assert!(!summary.cancelled);

        let store = processor.snapshot();
        let results = store.file("map-a").unwrap();
        assert_eq!(results.len(), 5);
        for (idx, outcome) in results {
            if *idx == 3 {
                assert!(matches!(outcome, Err(AnalysisError::InsufficientData(_))));
            } else {
                assert!(outcome.is_ok(), "curve {idx}: {outcome:?}");
            }
        }

        let curve_updates: Vec<usize> = updates
            .iter()
            .filter(|u| u.file_progress == 0)
            .map(|u| u.curve_progress)
            .collect();
        assert_eq!(curve_updates, vec![1, 2, 3, 4, 5]);
        let last = updates.last().unwrap();
        assert_eq!(last.file_progress, last.file_total);
        assert_eq!(last.curve_progress, last.curve_total);
    }

    #[test]
    fn cancellation_keeps_finished_curves() {
        let map = force_map("map-b", 5);
        let processor = BatchProcessor::new();
        let token = CancellationToken::new();
        let trigger = token.clone();
        let mut sink = move |u: ProgressUpdate| {
            if u.curve_progress == 2 {
                trigger.cancel();
            }
        };

        let summary = processor.run(
            &[&map],
            &AnalysisParameters::default(),
            ModelKind::Hertz,
            &mut sink,
            &token,
        );

        assert!(summary.cancelled);
        assert_eq!(summary.curves, 2);
        let store = processor.snapshot();
        let results = store.file("map-b").unwrap();
        assert_eq!(results.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn cancelling_between_files_keeps_earlier_results() {
        let a = force_map("a", 1);
        let b = force_map("b", 1);
        let processor = BatchProcessor::new();
        let params = AnalysisParameters {
            compute_all_files: true,
            ..AnalysisParameters::default()
        };
        let mut quiet = crate::batch::NoProgress;
        processor.run(&[&a, &b], &params, ModelKind::Hertz, &mut quiet, &CancellationToken::new());
        assert_eq!(processor.snapshot().file("b").map(|r| r.len()), Some(1));

        let token = CancellationToken::new();
        let trigger = token.clone();
        let mut sink = move |u: ProgressUpdate| {
            if u.file_progress == 1 {
                trigger.cancel();
            }
        };
        let summary = processor.run(&[&a, &b], &params, ModelKind::Hertz, &mut sink, &token);

        assert!(summary.cancelled);
        assert_eq!(summary.files, 1);
        let store = processor.snapshot();
        assert_eq!(store.file("a").map(|r| r.len()), Some(1));
        assert_eq!(store.file("b").map(|r| r.len()), Some(1));
    }

    #[test]
    fn each_file_is_fitted_with_its_own_calibration() {
        let stiff = generate_force_map(
            &SyntheticConfig {
                file_id: "stiff".into(),
                cols: 2,
                rows: 1,
                ..SyntheticConfig::default()
            },
            &AnalysisParameters {
                calibration_override: Calibration {
                    spring_constant: Some(0.2),
                    ..Calibration::default()
                },
                ..AnalysisParameters::default()
            },
        )
        .unwrap();
        let soft = generate_force_map(
            &SyntheticConfig {
                file_id: "soft".into(),
                cols: 2,
                rows: 1,
                ..SyntheticConfig::default()
            },
            &AnalysisParameters::default(),
        )
        .unwrap();

        let processor = BatchProcessor::new();
        let params = AnalysisParameters {
            compute_all_files: true,
            ..AnalysisParameters::default()
        };
        let summary = processor.run(
            &[&stiff.file, &soft.file],
            &params,
            ModelKind::Hertz,
            &mut crate::batch::NoProgress,
            &CancellationToken::new(),
        );
        assert_eq!(summary.failed, 0);

        let store = processor.snapshot();
        for generated in [&stiff, &soft] {
            for (idx, truth) in generated.moduli.iter().enumerate() {
                let fit = store.get(&generated.file.file_id, idx).unwrap().as_ref().unwrap();
                let rel = (fit.params.e0() - truth).abs() / truth;
                assert!(rel < 0.15, "{} curve {idx}: E0 off by {rel}", generated.file.file_id);
            }
        }

        // A session value overrides what the file recorded.
        let forced = AnalysisParameters {
            calibration_override: Calibration {
                spring_constant: Some(0.05),
                ..Calibration::default()
            },
            ..AnalysisParameters::default()
        };
        processor.run(
            &[&stiff.file],
            &forced,
            ModelKind::Hertz,
            &mut crate::batch::NoProgress,
            &CancellationToken::new(),
        );
        let fit = processor.snapshot().get("stiff", 0).unwrap().clone().unwrap();
        assert!(fit.params.e0() < 0.5 * stiff.moduli[0]);
    }

    #[test]
    fn only_the_first_file_unless_all_files_requested() {
        let a = force_map("a", 1);
        let b = force_map("b", 1);
        let processor = BatchProcessor::new();
        let mut sink = crate::batch::NoProgress;

        let params = AnalysisParameters::default();
        processor.run(&[&a, &b], &params, ModelKind::Hertz, &mut sink, &CancellationToken::new());
        assert_eq!(processor.snapshot().file_ids().collect::<Vec<_>>(), vec!["a"]);

        let params = AnalysisParameters {
            compute_all_files: true,
            ..params
        };
        let token = CancellationToken::new();
        let summary = processor.run(&[&a, &b], &params, ModelKind::Hertz, &mut sink, &token);
        assert_eq!(summary.files, 2);
        assert_eq!(processor.snapshot().file_ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn recomputing_a_file_replaces_its_results() {
        let processor = BatchProcessor::new();
        let mut sink = crate::batch::NoProgress;
        let params = AnalysisParameters::default();

        let big = force_map("same", 3);
        processor.run(&[&big], &params, ModelKind::Hertz, &mut sink, &CancellationToken::new());
        assert_eq!(processor.snapshot().len(), 3);

        let small = force_map("same", 1);
        processor.run(&[&small], &params, ModelKind::Hertz, &mut sink, &CancellationToken::new());
        assert_eq!(processor.snapshot().len(), 1);
    }

    #[test]
    fn unreadable_curves_become_errors() {
        struct Broken;
        impl CurveSource for Broken {
            fn file_id(&self) -> &str {
                "broken"
            }
            fn curve_count(&self) -> usize {
                2
            }
            fn segments(&self, idx: usize) -> Result<Vec<(SegmentKind, Segment)>, AnalysisError> {
                Err(AnalysisError::MalformedCurve(format!("curve {idx} unreadable")))
            }
            fn scan_grid(&self) -> Option<ScanGrid> {
                None
            }
        }

        let processor = BatchProcessor::new();
        let summary = processor.run(
            &[&Broken],
            &AnalysisParameters::default(),
            ModelKind::Ting,
            &mut crate::batch::NoProgress,
            &CancellationToken::new(),
        );
        assert_eq!(summary.failed, 2);
        let store = processor.snapshot();
        assert!(matches!(store.get("broken", 1), Some(Err(AnalysisError::MalformedCurve(_)))));
    }
}
