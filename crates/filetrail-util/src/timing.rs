//! Timing for history operations.
//!
//! A [`TimingGuard`] covers one snapshot, purge or filter pass over a single
//! history. It counts the snapshots and bytes the pass handled and logs them
//! with the elapsed time when dropped.
//!
//! ```rust,ignore
//! let mut timing = TimingGuard::filter(dir.display().to_string());
//! for snapshot in snapshots {
//!     let content = read(snapshot).await?;
//!     timing.record(content.len() as u64);
//! }
//! // logged here
//! ```

use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Passes at or above this duration are logged at warn level.
const DEFAULT_SLOW_MS: u64 = 2000;

/// RAII timer for a history operation.
pub struct TimingGuard {
    operation: &'static str,
    /// Tracked file or history directory the pass ran over.
    target: String,
    start: Instant,
    snapshots: usize,
    bytes: u64,
    slow_ms: u64,
}

impl TimingGuard {
    pub fn new(operation: &'static str, target: impl Into<String>) -> Self {
        Self {
            operation,
            target: target.into(),
            start: Instant::now(),
            snapshots: 0,
            bytes: 0,
            slow_ms: DEFAULT_SLOW_MS,
        }
    }

    /// Timer for creating a snapshot of a tracked file.
    pub fn snapshot(target: impl Into<String>) -> Self {
        Self::new("snapshot", target)
    }

    /// Timer for a retention purge.
    pub fn purge(target: impl Into<String>) -> Self {
        Self::new("purge", target)
    }

    /// Timer for a content filter pass.
    pub fn filter(target: impl Into<String>) -> Self {
        Self::new("filter", target)
    }

    pub fn with_slow_threshold(mut self, ms: u64) -> Self {
        self.slow_ms = ms;
        self
    }

    /// Count one snapshot of `bytes` bytes as handled by this pass.
    pub fn record(&mut self, bytes: u64) {
        self.snapshots += 1;
        self.bytes = self.bytes.saturating_add(bytes);
    }

    pub fn snapshots(&self) -> usize {
        self.snapshots
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Bytes handled per second, or `None` for an empty or instantaneous pass.
fn bytes_per_sec(bytes: u64, elapsed: Duration) -> Option<u64> {
    let secs = elapsed.as_secs_f64();
    (bytes > 0 && secs > 0.0).then(|| (bytes as f64 / secs) as u64)
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let duration_ms = elapsed.as_millis() as u64;
        let rate = bytes_per_sec(self.bytes, elapsed).unwrap_or(0);

        if duration_ms >= self.slow_ms {
            warn!(
                operation = self.operation,
                target = %self.target,
                snapshots = self.snapshots,
                bytes = self.bytes,
                bytes_per_sec = rate,
                duration_ms,
                "Slow history operation"
            );
        } else {
            debug!(
                operation = self.operation,
                target = %self.target,
                snapshots = self.snapshots,
                bytes = self.bytes,
                bytes_per_sec = rate,
                duration_ms,
                "History operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let mut guard = TimingGuard::filter("history/main.rs");
        guard.record(1200);
        guard.record(300);
        assert_eq!(guard.snapshots(), 2);
        assert_eq!(guard.bytes(), 1500);
    }

    #[test]
    fn test_record_saturates() {
        let mut guard = TimingGuard::purge("history");
        guard.record(u64::MAX);
        guard.record(10);
        assert_eq!(guard.bytes(), u64::MAX);
    }

    #[test]
    fn test_bytes_per_sec() {
        assert_eq!(bytes_per_sec(4096, Duration::from_secs(2)), Some(2048));
        assert_eq!(bytes_per_sec(0, Duration::from_secs(1)), None);
        assert_eq!(bytes_per_sec(10, Duration::ZERO), None);
    }

    #[test]
    fn test_slow_threshold() {
        let guard = TimingGuard::snapshot("notes.txt").with_slow_threshold(0);
        assert!(guard.elapsed() >= Duration::ZERO);
        drop(guard);
    }
}
