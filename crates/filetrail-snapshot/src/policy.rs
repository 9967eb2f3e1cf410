//! Retention policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of snapshots that are always kept, whatever the limits say.
pub const MIN_RETAINED: usize = 2;

/// Limits applied to one tracked file's history. Zero disables a limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Keep at most this many snapshots.
    pub max_count: u32,
    /// Drop snapshots older than this many days.
    pub max_age_days: u32,
    /// Keep the history within this many bytes on disk.
    pub max_total_bytes: u64,
    /// Compress snapshots of files larger than this.
    pub compress_threshold_bytes: u64,
    /// Ignore saves that arrive sooner than this after the latest snapshot.
    pub min_save_interval_secs: u64,
}

impl RetentionPolicy {
    /// A policy without any limits.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_count(mut self, count: u32) -> Self {
        self.max_count = count;
        self
    }

    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    pub fn with_max_total_bytes(mut self, bytes: u64) -> Self {
        self.max_total_bytes = bytes;
        self
    }

    pub fn with_compress_threshold(mut self, bytes: u64) -> Self {
        self.compress_threshold_bytes = bytes;
        self
    }

    pub fn with_min_save_interval(mut self, secs: u64) -> Self {
        self.min_save_interval_secs = secs;
        self
    }

    /// Whether a file of `len` bytes is stored compressed.
    pub fn compresses(&self, len: u64) -> bool {
        self.compress_threshold_bytes > 0 && len > self.compress_threshold_bytes
    }

    /// Minimum spacing between snapshots, if throttling is on.
    pub fn min_save_interval(&self) -> Option<Duration> {
        (self.min_save_interval_secs > 0).then(|| Duration::from_secs(self.min_save_interval_secs))
    }

    /// Whether any eviction limit is set.
    pub fn has_limits(&self) -> bool {
        self.max_count > 0 || self.max_age_days > 0 || self.max_total_bytes > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unlimited() {
        let policy = RetentionPolicy::default();
        assert!(!policy.has_limits());
        assert!(!policy.compresses(u64::MAX));
        assert!(policy.min_save_interval().is_none());
    }

    #[test]
    fn test_compress_threshold_is_exclusive() {
        let policy = RetentionPolicy::unlimited().with_compress_threshold(1024);
        assert!(!policy.compresses(1024));
        assert!(policy.compresses(1025));
    }

    #[test]
    fn test_deserialize_partial() {
        let policy: RetentionPolicy =
            serde_json::from_str(r#"{"max_count": 25, "min_save_interval_secs": 60}"#).unwrap();
        assert_eq!(policy.max_count, 25);
        assert_eq!(policy.max_age_days, 0);
        assert_eq!(policy.min_save_interval(), Some(Duration::from_secs(60)));
        assert!(policy.has_limits());
    }
}
