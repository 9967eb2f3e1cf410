//! Retention purging.
//!
//! Purging is done in two phases: [`plan`] decides which snapshots to evict
//! without touching the filesystem, then [`Purger::purge`] deletes them. The
//! limits are applied in a fixed order, each to the survivors of the previous
//! one:
//!
//! 1. count: keep the `max_count` most recent snapshots
//! 2. age: drop snapshots older than `max_age_days`
//! 3. size: drop the oldest snapshots until the total fits `max_total_bytes`
//!
//! No limit ever reduces a history below [`MIN_RETAINED`] snapshots.

use crate::disk_usage::DiskUsage;
use crate::policy::{RetentionPolicy, MIN_RETAINED};
use crate::snapshot::{list_snapshots, Snapshot};
use crate::timestamp::Stamp;
use crate::SnapshotResult;
use filetrail_util::TimingGuard;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// Which limit evicted a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    Count,
    Age,
    Size,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvictionReason::Count => "count",
            EvictionReason::Age => "age",
            EvictionReason::Size => "size",
        })
    }
}

/// A snapshot chosen for eviction.
#[derive(Debug, Clone, Serialize)]
pub struct Eviction {
    pub snapshot: Snapshot,
    pub reason: EvictionReason,
}

/// The snapshots to keep and to evict, both most recent first.
#[derive(Debug, Clone, Default)]
pub struct PurgePlan {
    pub keep: Vec<Snapshot>,
    pub evict: Vec<Eviction>,
}

/// Decide which snapshots a policy evicts.
///
/// `snapshots` must be ordered most recent first.
pub fn plan(snapshots: Vec<Snapshot>, policy: &RetentionPolicy, now: Stamp) -> PurgePlan {
    let mut keep = snapshots;
    let mut evict = Vec::new();
    let floor = MIN_RETAINED.min(keep.len());

    if policy.max_count > 0 {
        let limit = (policy.max_count as usize).max(MIN_RETAINED);
        while keep.len() > limit {
            if let Some(snapshot) = keep.pop() {
                evict.push(Eviction {
                    snapshot,
                    reason: EvictionReason::Count,
                });
            }
        }
    }

    // a cutoff before the calendar's start expires nothing
    let cutoff = (policy.max_age_days > 0)
        .then(|| now.minus_days(policy.max_age_days))
        .flatten();
    if let Some(cutoff) = cutoff {
        let mut index = keep.len();
        while index > 0 && keep.len() > floor {
            index -= 1;
            let expired = keep[index]
                .effective_stamp()
                .is_some_and(|stamp| stamp < cutoff);
            if expired {
                evict.push(Eviction {
                    snapshot: keep.remove(index),
                    reason: EvictionReason::Age,
                });
            }
        }
    }

    if policy.max_total_bytes > 0 {
        let mut total: u64 = keep.iter().map(|s| s.disk_size).sum();
        while total > policy.max_total_bytes && keep.len() > floor {
            let Some(snapshot) = keep.pop() else {
                break;
            };
            total = total.saturating_sub(snapshot.disk_size);
            evict.push(Eviction {
                snapshot,
                reason: EvictionReason::Size,
            });
        }
    }

    evict.sort_by(|a, b| b.snapshot.name.cmp(&a.snapshot.name));
    PurgePlan { keep, evict }
}

/// Result of a purge.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeOutcome {
    /// Snapshots still on disk, most recent first.
    pub survivors: Vec<Snapshot>,
    /// Snapshots deleted.
    pub evicted: Vec<Eviction>,
    /// Snapshots chosen for eviction whose deletion failed; also in `survivors`.
    pub failed: Vec<Snapshot>,
    /// Whether the emptied history directory was removed.
    pub removed_dir: bool,
}

impl PurgeOutcome {
    /// Whether anything was deleted. A filter pass after such a purge must
    /// rescan from scratch.
    pub fn any_evicted(&self) -> bool {
        !self.evicted.is_empty()
    }
}

/// Applies a retention policy to history directories.
pub struct Purger<'a> {
    usage: &'a dyn DiskUsage,
}

impl<'a> Purger<'a> {
    pub fn new(usage: &'a dyn DiskUsage) -> Self {
        Self { usage }
    }

    /// Purge the history directory `dir` as of the current time.
    pub async fn purge(&self, dir: &Path, policy: &RetentionPolicy) -> SnapshotResult<PurgeOutcome> {
        self.purge_at(dir, policy, Stamp::now()).await
    }

    /// Purge the history directory `dir` as of `now`.
    pub async fn purge_at(
        &self,
        dir: &Path,
        policy: &RetentionPolicy,
        now: Stamp,
    ) -> SnapshotResult<PurgeOutcome> {
        let mut timing = TimingGuard::purge(dir.display().to_string());

        let snapshots = list_snapshots(dir, self.usage).await?;
        if snapshots.is_empty() {
            return Ok(PurgeOutcome {
                removed_dir: remove_if_empty(dir).await,
                ..Default::default()
            });
        }
        if !policy.has_limits() {
            return Ok(PurgeOutcome {
                survivors: snapshots,
                ..Default::default()
            });
        }

        let outcome = apply(dir, plan(snapshots, policy, now)).await;
        for eviction in &outcome.evicted {
            timing.record(eviction.snapshot.disk_size);
        }
        Ok(outcome)
    }
}

/// Delete the evictions of `plan`. A snapshot that cannot be deleted stays a
/// survivor and is listed in `failed`.
async fn apply(dir: &Path, plan: PurgePlan) -> PurgeOutcome {
    let PurgePlan { keep, evict } = plan;
    let mut outcome = PurgeOutcome {
        survivors: keep,
        ..Default::default()
    };

    for eviction in evict {
        match fs::remove_file(&eviction.snapshot.path).await {
            Ok(()) => {
                debug!(
                    snapshot = %eviction.snapshot.name,
                    reason = %eviction.reason,
                    "Evicted snapshot"
                );
                outcome.evicted.push(eviction);
            }
            Err(e) => {
                warn!(
                    path = %eviction.snapshot.path.display(),
                    error = %e,
                    "Failed to delete snapshot, keeping it"
                );
                outcome.failed.push(eviction.snapshot.clone());
                outcome.survivors.push(eviction.snapshot);
            }
        }
    }
    outcome.survivors.sort_by(|a, b| b.name.cmp(&a.name));

    if outcome.any_evicted() {
        info!(
            dir = %dir.display(),
            evicted = outcome.evicted.len(),
            remaining = outcome.survivors.len(),
            "Purged snapshots"
        );
    }

    if outcome.survivors.is_empty() {
        outcome.removed_dir = remove_if_empty(dir).await;
    }

    outcome
}

/// Remove `dir` if it holds nothing at all. Failures are logged only.
async fn remove_if_empty(dir: &Path) -> bool {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    match entries.next_entry().await {
        Ok(None) => {}
        _ => return false,
    }
    match fs::remove_dir(dir).await {
        Ok(()) => {
            debug!(dir = %dir.display(), "Removed empty history directory");
            true
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to remove empty history directory");
            false
        }
    }
}
