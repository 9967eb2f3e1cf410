//! Shared utilities for filetrail.
//!
//! This crate provides common utilities used across the filetrail workspace:
//! - Logging setup with tracing
//! - Platform directories and path normalization
//! - RAII-based timing for operation measurement

pub mod log;
pub mod path;
pub mod timing;

pub use timing::TimingGuard;
