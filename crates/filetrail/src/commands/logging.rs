//! Logging initialization.

use filetrail_core::Config;
use filetrail_util::log::{self, LogConfig, LogLevel};

/// Initialize logging from the loaded config.
///
/// Logs are appended to the configured log file, or the default one under
/// the local data directory. `--verbose` also prints debug output to stderr.
pub fn init_logging(verbose: bool, config: &Config) {
    let level = if verbose {
        LogLevel::Debug
    } else {
        config.log_level()
    };

    log::init(LogConfig {
        print: verbose,
        level,
        include_location: verbose,
        file: config.log_file.clone().or_else(log::default_log_path),
    });
}
