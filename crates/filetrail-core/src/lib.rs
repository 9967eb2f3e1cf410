//! Configuration for filetrail.
//!
//! Settings come from several layered sources (see [`config`]) and are
//! turned into the explicit policy values the snapshot engine takes:
//! a [`filetrail_snapshot::RetentionPolicy`] and a
//! [`filetrail_snapshot::DirectoryMode`].

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{ConfigError, CoreError, CoreResult};
