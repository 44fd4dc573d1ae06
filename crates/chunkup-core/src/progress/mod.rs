//! Progress tracking.
//!
//! The server side uses [`ProgressTracker`] to decide when a
//! `progress|<bytes>` reply is due. The client side surfaces those replies
//! through the [`ProgressReporter`] hooks.

use crate::file::ManifestEntry;

/// Decides when enough new bytes have been written to report progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTracker {
    threshold: u64,
    last_reported: u64,
}

impl ProgressTracker {
    /// Create a tracker that fires every `threshold` bytes.
    ///
    /// A threshold of 0 is treated as 1.
    #[must_use]
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            last_reported: 0,
        }
    }

    /// Record the current file offset.
    ///
    /// Returns the offset to report if at least `threshold` bytes were
    /// written since the last report. The same offset is never reported
    /// twice.
    pub fn record(&mut self, offset: u64) -> Option<u64> {
        if offset > self.last_reported && offset - self.last_reported >= self.threshold {
            self.last_reported = offset;
            Some(offset)
        } else {
            None
        }
    }

    /// Forget the last report, for the start of a new file.
    pub fn reset(&mut self) {
        self.last_reported = 0;
    }

    /// Offset of the most recent report.
    #[must_use]
    pub const fn last_reported(&self) -> u64 {
        self.last_reported
    }

    /// Configured threshold in bytes.
    #[must_use]
    pub const fn threshold(&self) -> u64 {
        self.threshold
    }
}

/// Percentage of `declared` covered by `uploaded`, capped at 100.
///
/// An empty file is complete as soon as it starts.
#[must_use]
pub fn percent_complete(uploaded: u64, declared: u64) -> f64 {
    if declared == 0 {
        return 100.0;
    }
    (uploaded as f64 / declared as f64 * 100.0).min(100.0)
}

/// Client-side progress hooks.
///
/// All methods default to doing nothing; `()` is the silent reporter.
pub trait ProgressReporter: Send {
    /// File `index` is about to be sent.
    fn file_started(&mut self, index: usize, entry: &ManifestEntry) {
        let _ = (index, entry);
    }

    /// The server reported `uploaded` bytes written for file `index`.
    fn progress(&mut self, index: usize, entry: &ManifestEntry, uploaded: u64) {
        let _ = (index, entry, uploaded);
    }

    /// The server acknowledged the end of file `index`.
    fn file_finished(&mut self, index: usize, entry: &ManifestEntry) {
        let _ = (index, entry);
    }
}

impl ProgressReporter for () {}
