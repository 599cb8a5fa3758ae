//! Progress reporting.
//!
//! Long-running operations report through a [`ProgressCallback`] every
//! `batch_size` frames. The default callback discards everything.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use subgrid::{ProgressCallback, ProgressInfo, SubgridError, SubtitleEmbedder};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.operation);
//!         }
//!     }
//! }
//!
//! SubtitleEmbedder::new("input.mp4", "input.srt", "output.mp4")
//!     .with_progress(Arc::new(PrintProgress))
//!     .run()?;
//! # Ok::<(), SubgridError>(())
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The kind of operation currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Writing the signal into frames.
    Embedding,
    /// Reading the signal back out of frames.
    Verification,
    /// Running the external post-processing step.
    Transcoding,
}

/// A snapshot of progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many frames have been processed so far.
    pub current: u64,
    /// Total frames expected, if the container reports it.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
}

/// Receives progress updates.
///
/// Callbacks observe but cannot halt the operation.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during an operation.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications.
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks timing and fires the callback every `batch_size` items.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total: total.filter(|&total| total > 0),
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
        }
    }

    /// Record one completed item.
    pub(crate) fn advance(&mut self) {
        self.current += 1;
        if self.current % self.batch_size == 0 {
            self.report();
        }
    }

    /// Emit a final report regardless of batching.
    pub(crate) fn finish(&self) {
        self.report();
    }

    fn report(&self) {
        let percentage = self
            .total
            .map(|total| (self.current.min(total) as f32 / total as f32) * 100.0);

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed: self.start_time.elapsed(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<u64>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(info.current);
        }
    }

    #[test]
    fn reports_every_batch_and_on_finish() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker =
            ProgressTracker::new(recorder.clone(), OperationType::Embedding, Some(7), 3);
        for _ in 0..7 {
            tracker.advance();
        }
        tracker.finish();
        assert_eq!(*recorder.0.lock().unwrap(), vec![3, 6, 7]);
    }
}
