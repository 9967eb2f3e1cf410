//! Content filtering.
//!
//! A filter hides the snapshots of a history whose content does not match up
//! to two search terms. The result is kept in a side-file inside the history
//! directory (`.filter.json`) together with a high-water mark: the most recent
//! snapshot already classified. Later passes only read snapshots newer than the
//! mark, unless the history lost snapshots or the criteria changed, in which
//! case every snapshot is read again.
//!
//! Snapshots are never renamed or moved; being filtered is purely a matter of
//! membership in the persisted set.

use crate::snapshot::{list_snapshot_names, Snapshot};
use crate::store::read_snapshot;
use crate::{SnapshotError, SnapshotResult};
use filetrail_storage::{JsonStorage, Storage};
use filetrail_util::TimingGuard;
use regex::bytes::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Storage key of the filter state: `<history dir>/.filter.json`.
const STATE_KEY: &[&str] = &[".filter"];

/// Whether snapshots must contain or lack a term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermMode {
    #[default]
    Include,
    Exclude,
}

/// How the second term combines with the first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    /// Snapshots failing the first term are shown anyway if they contain the second.
    #[default]
    Or,
    /// Snapshots passing the first term must also satisfy the second.
    And,
}

/// One search term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchTerm {
    pub text: String,
    pub mode: TermMode,
    pub case_sensitive: bool,
}

impl SearchTerm {
    pub fn include(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: TermMode::Include,
            case_sensitive: false,
        }
    }

    pub fn exclude(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: TermMode::Exclude,
            case_sensitive: false,
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// No text at all. Whitespace is a valid term.
    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }

    fn compile(&self) -> SnapshotResult<Matcher> {
        let regex = RegexBuilder::new(&regex::escape(&self.text))
            .case_insensitive(!self.case_sensitive)
            .build()
            .map_err(|e| SnapshotError::InvalidFilter(e.to_string()))?;
        Ok(Matcher {
            regex,
            mode: self.mode,
        })
    }
}

/// Filter criteria: a first term, an optional second term and how they combine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub term1: SearchTerm,
    pub term2: Option<SearchTerm>,
    pub combinator: Combinator,
}

impl FilterCriteria {
    pub fn new(term1: SearchTerm) -> Self {
        Self {
            term1,
            term2: None,
            combinator: Combinator::Or,
        }
    }

    pub fn or(mut self, term2: SearchTerm) -> Self {
        self.term2 = Some(term2);
        self.combinator = Combinator::Or;
        self
    }

    pub fn and(mut self, term2: SearchTerm) -> Self {
        self.term2 = Some(term2);
        self.combinator = Combinator::And;
        self
    }

    /// A filter is active only when the first term has text.
    pub fn is_active(&self) -> bool {
        !self.term1.is_blank()
    }

    /// The second term, if it has text.
    pub fn second(&self) -> Option<&SearchTerm> {
        self.term2.as_ref().filter(|t| !t.is_blank())
    }

    fn compile(&self) -> SnapshotResult<CompiledCriteria> {
        Ok(CompiledCriteria {
            first: self.term1.compile()?,
            second: self.second().map(SearchTerm::compile).transpose()?,
            combinator: self.combinator,
        })
    }
}

struct Matcher {
    regex: Regex,
    mode: TermMode,
}

impl Matcher {
    fn found(&self, content: &[u8]) -> bool {
        self.regex.is_match(content)
    }

    /// Whether content satisfies this term's mode.
    fn passes(&self, content: &[u8]) -> bool {
        let found = self.found(content);
        match self.mode {
            TermMode::Include => found,
            TermMode::Exclude => !found,
        }
    }
}

struct CompiledCriteria {
    first: Matcher,
    second: Option<Matcher>,
    combinator: Combinator,
}

impl CompiledCriteria {
    fn is_visible(&self, content: &[u8]) -> bool {
        let pass = self.first.passes(content);
        let Some(second) = &self.second else {
            return pass;
        };
        match (pass, self.combinator) {
            (false, Combinator::Or) => second.found(content),
            (true, _) => second.passes(content),
            (false, Combinator::And) => false,
        }
    }
}

/// Persisted filter state of one history directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub criteria: FilterCriteria,
    /// Timestamp of the most recent snapshot already classified.
    pub high_water: Option<String>,
    /// File names of hidden snapshots.
    pub filtered: BTreeSet<String>,
}

/// Result of a filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOutcome {
    /// Whether a filter is in effect.
    pub active: bool,
    /// Whether every snapshot was read rather than only the new ones.
    pub full_rescan: bool,
    /// Snapshots read in this pass.
    pub scanned: usize,
    /// Snapshots that could not be read and kept their previous status.
    pub unreadable: usize,
    /// Number of hidden snapshots after the pass.
    pub filtered: usize,
    pub high_water: Option<String>,
}

impl FilterOutcome {
    fn inactive() -> Self {
        Self::default()
    }
}

/// Classifies the snapshots of one history directory.
pub struct ContentFilter<S: Storage = JsonStorage> {
    dir: PathBuf,
    storage: S,
}

impl ContentFilter<JsonStorage> {
    /// A filter whose state lives in the history directory itself.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let storage = JsonStorage::new(&dir);
        Self { dir, storage }
    }
}

impl<S: Storage> ContentFilter<S> {
    pub fn with_storage(dir: impl Into<PathBuf>, storage: S) -> Self {
        Self {
            dir: dir.into(),
            storage,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the persisted state. An unreadable state file counts as absent.
    pub async fn load_state(&self) -> SnapshotResult<Option<FilterState>> {
        match self.storage.read::<FilterState>(STATE_KEY).await {
            Ok(state) => Ok(state),
            Err(e) if !e.is_io() => {
                warn!(dir = %self.dir.display(), error = %e, "Ignoring unreadable filter state");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Names of the snapshots currently hidden.
    pub async fn filtered_names(&self) -> SnapshotResult<BTreeSet<String>> {
        Ok(self
            .load_state()
            .await?
            .filter(|state| state.criteria.is_active())
            .map(|state| state.filtered)
            .unwrap_or_default())
    }

    /// Set the `filtered` flag of listed snapshots from the persisted state.
    pub async fn mark(&self, snapshots: &mut [Snapshot]) -> SnapshotResult<()> {
        let filtered = self.filtered_names().await?;
        for snapshot in snapshots {
            snapshot.filtered = filtered.contains(&snapshot.file_name());
        }
        Ok(())
    }

    /// Remove any filter: every snapshot becomes visible.
    pub async fn clear(&self) -> SnapshotResult<()> {
        self.storage.remove(STATE_KEY).await?;
        debug!(dir = %self.dir.display(), "Cleared filter");
        Ok(())
    }

    /// Re-run the persisted criteria. Does nothing when no filter is set.
    pub async fn refresh(&self, force_full_rescan: bool) -> SnapshotResult<FilterOutcome> {
        match self.load_state().await? {
            Some(state) => self.filter(&state.criteria, force_full_rescan).await,
            None => Ok(FilterOutcome::inactive()),
        }
    }

    /// Apply `criteria` to the history.
    ///
    /// Only snapshots newer than the high-water mark are read, unless
    /// `force_full_rescan` is set (snapshots were evicted), there is no prior
    /// state, or the criteria differ from the persisted ones.
    pub async fn filter(
        &self,
        criteria: &FilterCriteria,
        force_full_rescan: bool,
    ) -> SnapshotResult<FilterOutcome> {
        if !criteria.is_active() {
            self.clear().await?;
            return Ok(FilterOutcome::inactive());
        }

        let mut timing = TimingGuard::filter(self.dir.display().to_string());
        let compiled = criteria.compile()?;
        let prior = self.load_state().await?;

        let same_criteria = prior.as_ref().filter(|p| p.criteria == *criteria);
        let full_rescan = force_full_rescan
            || same_criteria.map_or(true, |p| p.high_water.is_none());

        let mut names = list_snapshot_names(&self.dir).await?;
        names.reverse();
        let on_disk: BTreeSet<String> = names.iter().map(|n| n.to_string()).collect();

        let previous: BTreeSet<String> = same_criteria
            .map(|p| p.filtered.clone())
            .unwrap_or_default();
        let (mut filtered, start) = match same_criteria {
            Some(p) if !full_rescan => (
                previous.intersection(&on_disk).cloned().collect::<BTreeSet<_>>(),
                p.high_water.clone(),
            ),
            _ => (BTreeSet::new(), None),
        };

        let mut outcome = FilterOutcome {
            active: true,
            full_rescan,
            high_water: start.clone(),
            ..Default::default()
        };

        for name in names
            .iter()
            .filter(|n| start.as_deref().map_or(true, |hw| n.key() > hw))
        {
            let file_name = name.to_string();
            outcome.scanned += 1;
            outcome.high_water = Some(name.key().to_string());

            let path = self.dir.join(&file_name);
            let content = match read_snapshot(&path, name.is_compressed()).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(snapshot = %file_name, error = %e, "Failed to read snapshot, keeping its status");
                    outcome.unreadable += 1;
                    if previous.contains(&file_name) {
                        filtered.insert(file_name);
                    }
                    continue;
                }
            };

            timing.record(content.len() as u64);
            if compiled.is_visible(&content) {
                filtered.remove(&file_name);
            } else {
                filtered.insert(file_name);
            }
        }

        outcome.filtered = filtered.len();
        let state = FilterState {
            criteria: criteria.clone(),
            high_water: outcome.high_water.clone(),
            filtered,
        };
        self.storage.write(STATE_KEY, &state).await?;

        if outcome.scanned > 0 {
            info!(
                dir = %self.dir.display(),
                scanned = outcome.scanned,
                filtered = outcome.filtered,
                full = full_rescan,
                "Filtered snapshots"
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetrail_storage::MemoryStorage;
    use tempfile::TempDir;

    fn visible(criteria: &FilterCriteria, content: &str) -> bool {
        criteria.compile().unwrap().is_visible(content.as_bytes())
    }

    #[test]
    fn test_single_include_term() {
        let criteria = FilterCriteria::new(SearchTerm::include("todo"));
        assert!(visible(&criteria, "// TODO: fix"));
        assert!(!visible(&criteria, "nothing here"));
    }

    #[test]
    fn test_case_sensitivity() {
        let sensitive = FilterCriteria::new(SearchTerm::include("ERROR").case_sensitive(true));
        assert!(!visible(&sensitive, "an error occurred"));
        assert!(visible(&sensitive, "an ERROR occurred"));

        let insensitive = FilterCriteria::new(SearchTerm::include("ERROR"));
        assert!(visible(&insensitive, "an error occurred"));
    }

    #[test]
    fn test_exclude_term() {
        let criteria = FilterCriteria::new(SearchTerm::exclude("debug"));
        assert!(!visible(&criteria, "debug print"));
        assert!(visible(&criteria, "release build"));
    }

    #[test]
    fn test_or_combinator() {
        let criteria = FilterCriteria::new(SearchTerm::include("alpha")).or(SearchTerm::include("beta"));
        assert!(visible(&criteria, "alpha"));
        assert!(visible(&criteria, "beta"));
        assert!(!visible(&criteria, "gamma"));
    }

    #[test]
    fn test_and_combinator() {
        let criteria = FilterCriteria::new(SearchTerm::include("alpha")).and(SearchTerm::include("beta"));
        assert!(visible(&criteria, "alpha beta"));
        assert!(!visible(&criteria, "alpha"));
        assert!(!visible(&criteria, "beta"));

        let without = FilterCriteria::new(SearchTerm::include("alpha")).and(SearchTerm::exclude("beta"));
        assert!(visible(&without, "alpha"));
        assert!(!visible(&without, "alpha beta"));
    }

    #[test]
    fn test_second_term_narrows_passing_snapshots_under_or() {
        let criteria = FilterCriteria::new(SearchTerm::include("alpha")).or(SearchTerm::exclude("beta"));
        assert!(visible(&criteria, "alpha"));
        assert!(!visible(&criteria, "alpha beta"));
    }

    #[test]
    fn test_special_characters_are_literal() {
        let criteria = FilterCriteria::new(SearchTerm::include("fn main()"));
        assert!(visible(&criteria, "fn main() {}"));
        assert!(!visible(&criteria, "fn mainX {}"));
    }

    #[test]
    fn test_blank_terms() {
        assert!(!FilterCriteria::new(SearchTerm::include("")).is_active());
        let criteria = FilterCriteria::new(SearchTerm::include("a")).and(SearchTerm::include(""));
        assert!(criteria.second().is_none());
        assert!(visible(&criteria, "a"));
    }

    #[test]
    fn test_whitespace_term_is_active() {
        let criteria = FilterCriteria::new(SearchTerm::include("  "));
        assert!(criteria.is_active());
        assert!(visible(&criteria, "a  b"));
        assert!(!visible(&criteria, "a b"));
    }

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_filter_persists_state() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2024-01-01_00_00_00_000.rs", "ok");
        write(dir.path(), "2024-01-02_00_00_00_000.rs", "panic!()");

        let filter = ContentFilter::new(dir.path());
        let criteria = FilterCriteria::new(SearchTerm::exclude("panic!"));
        let outcome = filter.filter(&criteria, false).await.unwrap();

        assert!(outcome.active);
        assert!(outcome.full_rescan);
        assert_eq!(outcome.scanned, 2);
        assert_eq!(outcome.filtered, 1);
        assert_eq!(outcome.high_water.as_deref(), Some("2024-01-02_00_00_00_000"));
        assert!(dir.path().join(".filter.json").exists());

        let state = filter.load_state().await.unwrap().unwrap();
        assert!(state.filtered.contains("2024-01-02_00_00_00_000.rs"));
    }

    fn write_gz(dir: &Path, key: &str, content: &str) {
        use flate2::{write::GzEncoder, Compression};
        use std::io::Write;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        let name = format!("{key}.rs.{}.gz", content.len());
        std::fs::write(dir.join(name), encoder.finish().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_keeps_filtered_status() {
        let dir = TempDir::new().unwrap();
        write_gz(dir.path(), "2024-01-01_00_00_00_000", "panic!()");
        write(dir.path(), "2024-01-02_00_00_00_000.rs", "ok");
        let filter = ContentFilter::with_storage(dir.path(), MemoryStorage::new());
        let criteria = FilterCriteria::new(SearchTerm::exclude("panic!"));
        let outcome = filter.filter(&criteria, false).await.unwrap();
        assert_eq!(outcome.filtered, 1);
        assert_eq!(outcome.unreadable, 0);

        // corrupt the compressed body, then force a full rescan
        write(dir.path(), "2024-01-01_00_00_00_000.rs.8.gz", "not gzip");
        let outcome = filter.filter(&criteria, true).await.unwrap();
        assert!(outcome.full_rescan);
        assert_eq!(outcome.scanned, 2);
        assert_eq!(outcome.unreadable, 1);
        assert_eq!(outcome.filtered, 1);
        let names = filter.filtered_names().await.unwrap();
        assert!(names.contains("2024-01-01_00_00_00_000.rs.8.gz"));
    }

    #[tokio::test]
    async fn test_unreadable_unclassified_snapshot_stays_visible() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2024-01-01_00_00_00_000.rs.8.gz", "not gzip");
        write(dir.path(), "2024-01-02_00_00_00_000.rs", "panic!()");
        let filter = ContentFilter::with_storage(dir.path(), MemoryStorage::new());

        let outcome = filter
            .filter(&FilterCriteria::new(SearchTerm::exclude("panic!")), false)
            .await
            .unwrap();
        assert_eq!(outcome.unreadable, 1);
        assert_eq!(outcome.filtered, 1);
        let names = filter.filtered_names().await.unwrap();
        assert!(!names.contains("2024-01-01_00_00_00_000.rs.8.gz"));
        assert!(names.contains("2024-01-02_00_00_00_000.rs"));
    }

    #[tokio::test]
    async fn test_incremental_pass_reads_only_new_snapshots() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2024-01-01_00_00_00_000.rs", "keep");
        let filter = ContentFilter::with_storage(dir.path(), MemoryStorage::new());
        let criteria = FilterCriteria::new(SearchTerm::include("keep"));
        filter.filter(&criteria, false).await.unwrap();

        write(dir.path(), "2024-01-02_00_00_00_000.rs", "drop");
        let outcome = filter.filter(&criteria, false).await.unwrap();
        assert!(!outcome.full_rescan);
        assert_eq!(outcome.scanned, 1);
        assert_eq!(outcome.filtered, 1);
    }

    #[tokio::test]
    async fn test_changed_criteria_rescans() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2024-01-01_00_00_00_000.rs", "alpha");
        write(dir.path(), "2024-01-02_00_00_00_000.rs", "beta");
        let filter = ContentFilter::with_storage(dir.path(), MemoryStorage::new());

        filter
            .filter(&FilterCriteria::new(SearchTerm::include("alpha")), false)
            .await
            .unwrap();
        let outcome = filter
            .filter(&FilterCriteria::new(SearchTerm::include("beta")), false)
            .await
            .unwrap();
        assert!(outcome.full_rescan);
        assert_eq!(outcome.scanned, 2);
        let names = filter.filtered_names().await.unwrap();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["2024-01-01_00_00_00_000.rs".to_string()]
        );
    }

    #[tokio::test]
    async fn test_inactive_filter_deletes_state() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2024-01-01_00_00_00_000.rs", "x");
        let filter = ContentFilter::new(dir.path());
        filter
            .filter(&FilterCriteria::new(SearchTerm::include("y")), false)
            .await
            .unwrap();
        assert!(dir.path().join(".filter.json").exists());

        let outcome = filter
            .filter(&FilterCriteria::new(SearchTerm::include("")), false)
            .await
            .unwrap();
        assert!(!outcome.active);
        assert!(!dir.path().join(".filter.json").exists());
        assert!(filter.filtered_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_without_state_is_noop() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2024-01-01_00_00_00_000.rs", "x");
        let filter = ContentFilter::new(dir.path());
        let outcome = filter.refresh(true).await.unwrap();
        assert_eq!(outcome, FilterOutcome::default());
        assert!(!dir.path().join(".filter.json").exists());
    }

    #[tokio::test]
    async fn test_corrupt_state_forces_full_rescan() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2024-01-01_00_00_00_000.rs", "x");
        write(dir.path(), ".filter.json", "{ broken");
        let filter = ContentFilter::new(dir.path());

        assert!(filter.load_state().await.unwrap().is_none());
        let outcome = filter
            .filter(&FilterCriteria::new(SearchTerm::include("x")), false)
            .await
            .unwrap();
        assert!(outcome.full_rescan);
        assert_eq!(outcome.filtered, 0);
    }

    #[tokio::test]
    async fn test_mark_sets_flags() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2024-01-01_00_00_00_000.rs", "secret");
        write(dir.path(), "2024-01-02_00_00_00_000.rs", "public");
        let filter = ContentFilter::new(dir.path());
        filter
            .filter(&FilterCriteria::new(SearchTerm::exclude("secret")), false)
            .await
            .unwrap();

        let usage = crate::disk_usage::ClusterRounding::new(1);
        let mut snapshots = crate::snapshot::list_snapshots(dir.path(), &usage)
            .await
            .unwrap();
        filter.mark(&mut snapshots).await.unwrap();
        assert!(!snapshots[0].filtered);
        assert!(snapshots[1].filtered);
    }
}
