//! Progress reporting and cancellation for batch runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use log::info;
use serde::{Deserialize, Serialize};

/// Position of a batch run.
///
/// `curve_progress` is 1-based within the current file; `file_progress`
/// counts files already finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub file_progress: usize,
    pub file_total: usize,
    pub curve_progress: usize,
    pub curve_total: usize,
    pub message: String,
}

/// Receiver of progress updates.
pub trait ProgressSink {
    fn report(&mut self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressUpdate),
{
    fn report(&mut self, update: ProgressUpdate) {
        self(update)
    }
}

impl ProgressSink for Sender<ProgressUpdate> {
    fn report(&mut self, update: ProgressUpdate) {
        // A dropped receiver only means nobody is watching.
        let _ = self.send(update);
    }
}

/// Sink that writes each update to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, update: ProgressUpdate) {
        info!(
            "[file {}/{} curve {}/{}] {}",
            update.file_progress,
            update.file_total,
            update.curve_progress,
            update.curve_total,
            update.message
        );
    }
}

/// Sink that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _update: ProgressUpdate) {}
}

/// Shared flag checked by the batch processor before each curve.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn update(curve: usize) -> ProgressUpdate {
        ProgressUpdate {
            file_progress: 0,
            file_total: 1,
            curve_progress: curve,
            curve_total: 3,
            message: format!("curve {curve}"),
        }
    }

    #[test]
    fn closures_and_channels_receive_updates() {
        let mut seen = Vec::new();
        {
            let mut sink = |u: ProgressUpdate| seen.push(u.curve_progress);
            sink.report(update(1));
            sink.report(update(2));
        }
        assert_eq!(seen, vec![1, 2]);

        let (tx, rx) = mpsc::channel();
        let mut sink = tx;
        sink.report(update(3));
        assert_eq!(rx.recv().unwrap().curve_progress, 3);
    }

    #[test]
    fn sender_ignores_closed_receiver() {
        let (tx, rx) = mpsc::channel::<ProgressUpdate>();
        drop(rx);
        let mut sink = tx;
        sink.report(update(1));
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
