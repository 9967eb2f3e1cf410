//! History command handlers.
//!
//! Handles saving, listing, reading and pruning a file's snapshots.

use bytesize::ByteSize;
use clap::Subcommand;
use filetrail_snapshot::{
    CreateOutcome, Eviction, FilterOutcome, HistoryEngine, RetentionPolicy, SaveReport,
    SkipReason, Snapshot,
};
use std::io::Write;
use std::path::PathBuf;

/// History subcommands.
#[derive(Subcommand)]
pub enum HistoryCommand {
    /// Record a save: snapshot the file if the policy allows, then apply retention
    Save { file: PathBuf },
    /// Snapshot the file now, ignoring the minimum save interval
    Snapshot { file: PathBuf },
    /// List a file's snapshots, most recent first
    List {
        file: PathBuf,
        /// Include snapshots hidden by the filter
        #[arg(short, long)]
        all: bool,
        /// Print output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the content of a snapshot
    Show {
        file: PathBuf,
        /// Snapshot timestamp or file name
        id: String,
    },
    /// Diff a snapshot against the current file
    Diff {
        file: PathBuf,
        /// Snapshot timestamp or file name
        id: String,
    },
    /// Overwrite the file with a snapshot
    Restore {
        file: PathBuf,
        /// Snapshot timestamp or file name
        id: String,
    },
    /// Write a snapshot's content to another file
    Extract {
        file: PathBuf,
        /// Snapshot timestamp or file name
        id: String,
        /// Destination path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Apply retention limits without taking a snapshot
    Purge { file: PathBuf },
    /// Show history statistics for a file
    Stats {
        file: PathBuf,
        /// Print output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a file's history along with a rename
    Rename { from: PathBuf, to: PathBuf },
}

/// Handle history commands.
pub async fn handle_history(
    engine: &HistoryEngine,
    policy: &RetentionPolicy,
    command: HistoryCommand,
) -> anyhow::Result<()> {
    match command {
        HistoryCommand::Save { file } => {
            let report = engine.save(&file, policy).await?;
            print_save_report(&report);
        }
        HistoryCommand::Snapshot { file } => {
            let report = engine.save_current(&file, policy).await?;
            print_save_report(&report);
        }
        HistoryCommand::List { file, all, json } => {
            let snapshots: Vec<Snapshot> = engine
                .list(&file)
                .await?
                .into_iter()
                .filter(|s| all || !s.filtered)
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            } else {
                print_snapshot_table(&snapshots);
            }
        }
        HistoryCommand::Show { file, id } => {
            let content = engine.read(&file, &id).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content)?;
            stdout.flush()?;
        }
        HistoryCommand::Diff { file, id } => {
            let diff = engine.diff(&file, &id).await?;
            if diff.is_empty() {
                println!("No changes.");
            } else {
                print!("{diff}");
            }
        }
        HistoryCommand::Restore { file, id } => {
            let snapshot = engine.restore(&file, &id).await?;
            println!("Restored {} from {}", file.display(), snapshot.name);
        }
        HistoryCommand::Extract { file, id, output } => {
            engine.extract(&file, &id, &output).await?;
            println!("Wrote {}", output.display());
        }
        HistoryCommand::Purge { file } => {
            let (outcome, filter) = engine.purge(&file, policy).await?;
            print_evictions(&outcome.evicted);
            for snapshot in &outcome.failed {
                println!("Could not remove {}", snapshot.name);
            }
            if outcome.evicted.is_empty() && outcome.failed.is_empty() {
                println!("Nothing to remove.");
            }
            if outcome.removed_dir {
                println!("History is empty, removed its directory.");
            }
            if let Some(filter) = filter {
                print_filter_outcome(&filter);
            }
        }
        HistoryCommand::Stats { file, json } => {
            let stats = engine.stats(&file).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Snapshots: {}", stats.count);
                println!("Hidden by filter: {}", stats.filtered);
                println!("Content size: {}", format_size(stats.logical_bytes));
                println!("Size on disk: {}", format_size(stats.disk_bytes));
            }
        }
        HistoryCommand::Rename { from, to } => match engine.rename(&from, &to).await? {
            Some(dir) => println!("Moved history to {}", dir.display()),
            None => println!("No history to move."),
        },
    }

    Ok(())
}

fn print_save_report(report: &SaveReport) {
    match &report.created {
        CreateOutcome::Created(snapshot) => {
            println!(
                "Saved {} ({})",
                snapshot.name,
                format_size(snapshot.logical_size)
            );
        }
        CreateOutcome::Skipped(reason) => println!("No snapshot: {}", describe_skip(reason)),
    }
    print_evictions(&report.evicted);
    if let Some(filter) = &report.filter {
        print_filter_outcome(filter);
    }
}

fn print_evictions(evicted: &[Eviction]) {
    for eviction in evicted {
        println!(
            "Removed {} (over {} limit)",
            eviction.snapshot.name, eviction.reason
        );
    }
}

pub(crate) fn print_filter_outcome(outcome: &FilterOutcome) {
    let scan = if outcome.full_rescan { "full" } else { "incremental" };
    println!(
        "Filter: {} hidden ({} scanned, {})",
        outcome.filtered, outcome.scanned, scan
    );
    if outcome.unreadable > 0 {
        println!("  {} snapshot(s) could not be read", outcome.unreadable);
    }
}

fn print_snapshot_table(snapshots: &[Snapshot]) {
    if snapshots.is_empty() {
        println!("No snapshots found.");
        return;
    }

    println!("{:<26} {:>12} {:>12}  {}", "SNAPSHOT", "SIZE", "ON DISK", "FLAGS");
    println!("{}", "-".repeat(64));
    for snapshot in snapshots {
        let mut flags = Vec::new();
        if snapshot.is_compressed() {
            flags.push("gz");
        }
        if snapshot.filtered {
            flags.push("hidden");
        }
        println!(
            "{:<26} {:>12} {:>12}  {}",
            snapshot.name.key(),
            format_size(snapshot.logical_size),
            format_size(snapshot.disk_size),
            flags.join(",")
        );
    }
}

fn describe_skip(reason: &SkipReason) -> String {
    match reason {
        SkipReason::Missing => "file does not exist".to_string(),
        SkipReason::Empty => "file is empty".to_string(),
        SkipReason::TooSoon { elapsed, interval } => format!(
            "last snapshot is {}s old, interval is {}s",
            elapsed.as_secs(),
            interval.as_secs()
        ),
        SkipReason::Duplicate => "identical snapshot already exists".to_string(),
        SkipReason::ClockSkew => "clock is behind the latest snapshot".to_string(),
        SkipReason::CopyFailed => "copy failed, will retry on next save".to_string(),
    }
}

fn format_size(bytes: u64) -> String {
    ByteSize::b(bytes).to_string_as(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_describe_too_soon() {
        let reason = SkipReason::TooSoon {
            elapsed: Duration::from_secs(12),
            interval: Duration::from_secs(60),
        };
        assert_eq!(
            describe_skip(&reason),
            "last snapshot is 12s old, interval is 60s"
        );
    }

    #[test]
    fn test_format_size_uses_binary_units() {
        assert_eq!(format_size(512), "512 B");
        assert!(format_size(4096).contains("KiB"));
    }
}
