//! Per-file snapshot history for filetrail.
//!
//! Every save of a tracked file can be captured as a timestamped copy kept in
//! a hidden history directory next to the file (or under a central root).
//! This crate provides:
//! - Snapshot creation, with optional gzip compression of large files
//! - Retention by count, age and total size, always keeping two snapshots
//! - An incremental content filter that hides snapshots by search terms
//!
//! # Example
//!
//! ```no_run
//! use filetrail_snapshot::{DirectoryMode, HistoryEngine, RetentionPolicy};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = HistoryEngine::new(DirectoryMode::CoLocated);
//! let policy = RetentionPolicy::default()
//!     .with_max_count(100)
//!     .with_min_save_interval(60);
//!
//! // Called whenever the file is saved
//! let report = engine.save(Path::new("src/main.rs"), &policy).await?;
//! if let Some(snapshot) = report.created.created() {
//!     println!("saved {}", snapshot.file_name());
//! }
//!
//! for snapshot in engine.list(Path::new("src/main.rs")).await? {
//!     println!("{} {} bytes", snapshot.name, snapshot.logical_size);
//! }
//! # Ok(())
//! # }
//! ```

mod disk_usage;
mod engine;
mod error;
mod filter;
mod policy;
mod purge;
mod snapshot;
mod store;
mod timestamp;
mod tracked;

pub use disk_usage::{round_to_cluster, ClusterRounding, DiskUsage, FsDiskUsage, DEFAULT_CLUSTER_SIZE};
pub use engine::{HistoryEngine, HistoryStats, SaveReport};
pub use error::{SnapshotError, SnapshotResult};
pub use filter::{
    Combinator, ContentFilter, FilterCriteria, FilterOutcome, FilterState, SearchTerm, TermMode,
};
pub use policy::{RetentionPolicy, MIN_RETAINED};
pub use purge::{plan, Eviction, EvictionReason, PurgeOutcome, PurgePlan, Purger};
pub use snapshot::{list_snapshot_names, list_snapshots, Snapshot, SnapshotName, GZIP_SUFFIX};
pub use store::{CreateOutcome, SkipReason, SnapshotStore};
pub use timestamp::{Stamp, STAMP_LEN};
pub use tracked::{resolve_history_dir, DirectoryMode, TrackedFile, HISTORY_DIR_NAME};
