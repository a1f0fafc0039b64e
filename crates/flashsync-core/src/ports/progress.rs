//! Progress reporting port
//!
//! Long downloads report `(bytes transferred, total bytes, elapsed time)`
//! through a [`ProgressSink`]. Any `Fn(ProgressInfo)` closure is a sink.

use std::time::Duration;

/// A single progress report for one download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressInfo {
    /// Bytes received so far
    pub bytes_transferred: u64,
    /// Expected size of the download
    pub total_bytes: u64,
    /// Time since the response headers arrived
    pub elapsed: Duration,
}

impl ProgressInfo {
    /// Fraction in `0.0..=1.0`; zero-sized downloads count as complete
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_transferred as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// Receiver of download progress
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: ProgressInfo);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressInfo) + Send + Sync,
{
    fn report(&self, progress: ProgressInfo) {
        self(progress)
    }
}
