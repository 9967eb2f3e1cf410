//! Command handlers for the filetrail CLI.

pub mod config;
pub mod filter;
pub mod history;
pub mod logging;

pub use config::*;
pub use filter::*;
pub use history::*;
pub use logging::*;
