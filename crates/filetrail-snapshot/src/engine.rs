//! The save pipeline, serialized per tracked file.

use crate::filter::{ContentFilter, FilterCriteria, FilterOutcome};
use crate::policy::RetentionPolicy;
use crate::purge::{Eviction, PurgeOutcome, Purger};
use crate::snapshot::Snapshot;
use crate::store::{CreateOutcome, SnapshotStore};
use crate::tracked::{DirectoryMode, TrackedFile};
use crate::SnapshotResult;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// What a save did.
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub created: CreateOutcome,
    /// Snapshots removed by retention after the new one was stored.
    pub evicted: Vec<Eviction>,
    /// The filter pass that followed, if a filter is set.
    pub filter: Option<FilterOutcome>,
}

/// Summary figures for one tracked file's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub count: usize,
    /// Sum of uncompressed sizes.
    pub logical_bytes: u64,
    /// Sum of sizes charged against the storage limit.
    pub disk_bytes: u64,
    /// Snapshots hidden by the filter.
    pub filtered: usize,
}

impl HistoryStats {
    pub fn from_snapshots(snapshots: &[Snapshot]) -> Self {
        snapshots.iter().fold(Self::default(), |mut stats, s| {
            stats.count += 1;
            stats.logical_bytes += s.logical_size;
            stats.disk_bytes += s.disk_size;
            stats.filtered += usize::from(s.filtered);
            stats
        })
    }
}

type LockMap = std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>;

/// Exclusive hold on one tracked file. Dropping it forgets the path once no
/// other operation holds or waits on it.
struct PathLock<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    path: PathBuf,
    locks: &'a LockMap,
}

impl Drop for PathLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        // waiters clone the entry under the map lock, so only the map's own
        // reference is left when nobody else needs it
        if locks
            .get(&self.path)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.path);
        }
    }
}

/// Entry point for callers: create, purge and filter as one step, with at
/// most one operation in flight per tracked file.
pub struct HistoryEngine {
    store: SnapshotStore,
    mode: DirectoryMode,
    locks: LockMap,
}

impl HistoryEngine {
    pub fn new(mode: DirectoryMode) -> Self {
        Self::with_store(SnapshotStore::new(), mode)
    }

    pub fn with_store(store: SnapshotStore, mode: DirectoryMode) -> Self {
        Self {
            store,
            mode,
            locks: LockMap::default(),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn mode(&self) -> &DirectoryMode {
        &self.mode
    }

    /// Inspect a tracked file.
    pub async fn open(&self, path: &Path) -> SnapshotResult<TrackedFile> {
        TrackedFile::open(path, &self.mode).await
    }

    /// Open a tracked file and take its lock.
    async fn acquire(&self, path: &Path) -> SnapshotResult<(TrackedFile, PathLock<'_>)> {
        let tracked = self.open(path).await?;
        let key = tracked.path().to_path_buf();
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let held = PathLock {
            guard: Some(lock.lock_owned().await),
            path: key,
            locks: &self.locks,
        };
        // re-inspect under the lock
        let tracked = self.open(&held.path).await?;
        Ok((tracked, held))
    }

    /// Number of paths with an operation in flight or waiting.
    pub fn active_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Handle a save of `path`: snapshot it, enforce retention, update the filter.
    pub async fn save(&self, path: &Path, policy: &RetentionPolicy) -> SnapshotResult<SaveReport> {
        let (tracked, _guard) = self.acquire(path).await?;
        self.save_locked(&tracked, policy).await
    }

    /// Like [`Self::save`], but ignores the minimum save interval.
    pub async fn save_current(
        &self,
        path: &Path,
        policy: &RetentionPolicy,
    ) -> SnapshotResult<SaveReport> {
        let (tracked, _guard) = self.acquire(path).await?;
        self.save_locked(&tracked, &policy.with_min_save_interval(0))
            .await
    }

    async fn save_locked(
        &self,
        tracked: &TrackedFile,
        policy: &RetentionPolicy,
    ) -> SnapshotResult<SaveReport> {
        let created = self.store.create(tracked, policy).await?;
        if !created.is_created() {
            return Ok(SaveReport {
                created,
                evicted: Vec::new(),
                filter: None,
            });
        }

        let purged = Purger::new(self.store.disk_usage())
            .purge(tracked.history_dir(), policy)
            .await?;
        let filter = self.refresh_filter(tracked, &purged).await?;

        Ok(SaveReport {
            created,
            evicted: purged.evicted,
            filter,
        })
    }

    /// Re-run the persisted filter; a full rescan if the purge removed anything.
    async fn refresh_filter(
        &self,
        tracked: &TrackedFile,
        purged: &PurgeOutcome,
    ) -> SnapshotResult<Option<FilterOutcome>> {
        let outcome = ContentFilter::new(tracked.history_dir())
            .refresh(purged.any_evicted())
            .await?;
        Ok(outcome.active.then_some(outcome))
    }

    /// Enforce retention without taking a snapshot.
    pub async fn purge(
        &self,
        path: &Path,
        policy: &RetentionPolicy,
    ) -> SnapshotResult<(PurgeOutcome, Option<FilterOutcome>)> {
        let (tracked, _guard) = self.acquire(path).await?;
        let purged = Purger::new(self.store.disk_usage())
            .purge(tracked.history_dir(), policy)
            .await?;
        let filter = if purged.any_evicted() && !purged.removed_dir {
            self.refresh_filter(&tracked, &purged).await?
        } else {
            None
        };
        Ok((purged, filter))
    }

    /// Install filter criteria for a file's history and classify its snapshots.
    pub async fn apply_filter(
        &self,
        path: &Path,
        criteria: &FilterCriteria,
        force_full_rescan: bool,
    ) -> SnapshotResult<FilterOutcome> {
        let (tracked, _guard) = self.acquire(path).await?;
        ContentFilter::new(tracked.history_dir())
            .filter(criteria, force_full_rescan)
            .await
    }

    /// Remove the filter of a file's history.
    pub async fn clear_filter(&self, path: &Path) -> SnapshotResult<()> {
        let (tracked, _guard) = self.acquire(path).await?;
        ContentFilter::new(tracked.history_dir()).clear().await
    }

    /// Snapshots of a file, most recent first, with filter flags set.
    pub async fn list(&self, path: &Path) -> SnapshotResult<Vec<Snapshot>> {
        let (tracked, _guard) = self.acquire(path).await?;
        self.list_locked(&tracked).await
    }

    async fn list_locked(&self, tracked: &TrackedFile) -> SnapshotResult<Vec<Snapshot>> {
        let mut snapshots = self.store.list(tracked).await?;
        if !snapshots.is_empty() {
            ContentFilter::new(tracked.history_dir())
                .mark(&mut snapshots)
                .await?;
        }
        Ok(snapshots)
    }

    pub async fn stats(&self, path: &Path) -> SnapshotResult<HistoryStats> {
        let snapshots = self.list(path).await?;
        Ok(HistoryStats::from_snapshots(&snapshots))
    }

    /// Find a snapshot by timestamp or file name.
    pub async fn find(&self, path: &Path, id: &str) -> SnapshotResult<Snapshot> {
        let (tracked, _guard) = self.acquire(path).await?;
        self.store.find(&tracked, id).await
    }

    /// Uncompressed content of a snapshot.
    pub async fn read(&self, path: &Path, id: &str) -> SnapshotResult<Vec<u8>> {
        let (tracked, _guard) = self.acquire(path).await?;
        let snapshot = self.store.find(&tracked, id).await?;
        self.store.read_content(&snapshot).await
    }

    pub async fn extract(&self, path: &Path, id: &str, dest: &Path) -> SnapshotResult<()> {
        let (tracked, _guard) = self.acquire(path).await?;
        let snapshot = self.store.find(&tracked, id).await?;
        self.store.extract(&snapshot, dest).await
    }

    /// Overwrite a file with one of its snapshots.
    pub async fn restore(&self, path: &Path, id: &str) -> SnapshotResult<Snapshot> {
        let (tracked, _guard) = self.acquire(path).await?;
        let snapshot = self.store.find(&tracked, id).await?;
        self.store.restore(&tracked, &snapshot).await?;
        Ok(snapshot)
    }

    /// Diff from a snapshot to the file's current content.
    pub async fn diff(&self, path: &Path, id: &str) -> SnapshotResult<String> {
        let (tracked, _guard) = self.acquire(path).await?;
        let snapshot = self.store.find(&tracked, id).await?;
        self.store.diff(&tracked, &snapshot).await
    }

    /// Carry a file's history over to its new name.
    pub async fn rename(&self, old_path: &Path, new_path: &Path) -> SnapshotResult<Option<PathBuf>> {
        let (_tracked, _guard) = self.acquire(old_path).await?;
        let moved = self.store.rename(old_path, new_path, &self.mode).await?;
        if moved.is_none() {
            debug!(from = %old_path.display(), "No history to move");
        }
        Ok(moved)
    }
}
