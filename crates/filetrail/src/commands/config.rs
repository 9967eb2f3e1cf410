//! Config command handlers.

use clap::{Args, Subcommand, ValueEnum};
use filetrail_core::config::{HistoryConfig, HistoryLocation, RetentionConfig};
use filetrail_core::Config;
use std::path::{Path, PathBuf};

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the merged configuration and where it came from
    Show,
    /// Write settings to the project config, keeping the rest of the file
    Set(ConfigSetArgs),
}

/// Arguments of `filetrail config set`. A value of 0 turns a limit off.
#[derive(Args)]
pub struct ConfigSetArgs {
    /// Keep at most this many snapshots per file
    #[arg(long, value_name = "N")]
    max_count: Option<u32>,

    /// Remove snapshots older than this many days
    #[arg(long, value_name = "DAYS")]
    max_age_days: Option<u32>,

    /// Limit each file's history to this many KB
    #[arg(long, value_name = "KB")]
    max_total_kb: Option<u64>,

    /// Compress snapshots of files larger than this many KB
    #[arg(long, value_name = "KB")]
    compress_above_kb: Option<u64>,

    /// Minimum seconds between automatic snapshots
    #[arg(long, value_name = "SECS")]
    min_save_interval: Option<u64>,

    /// Where histories are stored
    #[arg(long, value_enum)]
    location: Option<Location>,

    /// Root directory for the custom location
    #[arg(long)]
    root: Option<PathBuf>,

    /// Write the global config instead of the project's
    #[arg(long)]
    global: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Location {
    CoLocated,
    AppData,
    Custom,
}

impl From<Location> for HistoryLocation {
    fn from(location: Location) -> Self {
        match location {
            Location::CoLocated => HistoryLocation::CoLocated,
            Location::AppData => HistoryLocation::AppData,
            Location::Custom => HistoryLocation::Custom,
        }
    }
}

impl ConfigSetArgs {
    /// The settings given on the command line, everything else unset.
    fn to_config(&self) -> Config {
        let retention = RetentionConfig {
            max_count: self.max_count,
            max_age_days: self.max_age_days,
            max_total_kb: self.max_total_kb,
            compress_above_kb: self.compress_above_kb,
            min_save_interval_secs: self.min_save_interval,
        };
        let history = HistoryConfig {
            location: self.location.map(HistoryLocation::from),
            root: self.root.clone(),
        };
        Config {
            retention: (retention != RetentionConfig::default()).then_some(retention),
            history: (history != HistoryConfig::default()).then_some(history),
            ..Default::default()
        }
    }
}

/// Handle config commands.
pub async fn handle_config(
    config: &Config,
    sources: &[PathBuf],
    project_dir: &Path,
    command: Option<ConfigCommand>,
) -> anyhow::Result<()> {
    match command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => show_config(config, sources),
        ConfigCommand::Set(args) => {
            let update = args.to_config();
            if update == Config::default() {
                anyhow::bail!("Nothing to set, pass at least one setting");
            }
            let target = (!args.global).then_some(project_dir);
            let path = update.save_partial(target).await?;
            println!("Updated {}", path.display());
            Ok(())
        }
    }
}

/// Show the merged configuration and where it came from.
fn show_config(config: &Config, sources: &[PathBuf]) -> anyhow::Result<()> {
    println!("Configuration sources:");
    if sources.is_empty() {
        println!("  (none)");
    } else {
        for source in sources {
            println!("  {}", source.display());
        }
    }
    println!();

    println!("Current configuration:");
    println!("{}", serde_json::to_string_pretty(config)?);
    println!();

    println!("Effective retention policy:");
    println!("{}", serde_json::to_string_pretty(&config.retention_policy())?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ConfigSetArgs,
    }

    fn parse(args: &[&str]) -> ConfigSetArgs {
        let mut argv = vec!["set"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_no_settings_is_empty_config() {
        assert_eq!(parse(&[]).to_config(), Config::default());
    }

    #[test]
    fn test_retention_settings() {
        let config = parse(&["--max-count", "20", "--min-save-interval", "0"]).to_config();
        let retention = config.retention.unwrap();
        assert_eq!(retention.max_count, Some(20));
        assert_eq!(retention.min_save_interval_secs, Some(0));
        assert_eq!(retention.max_age_days, None);
        assert!(config.history.is_none());
    }

    #[test]
    fn test_location_settings() {
        let config = parse(&["--location", "custom", "--root", "/var/trail"]).to_config();
        let history = config.history.unwrap();
        assert_eq!(history.location, Some(HistoryLocation::Custom));
        assert_eq!(history.root, Some(PathBuf::from("/var/trail")));
        assert!(config.retention.is_none());
    }
}
