//! Testing utilities and fixtures for filetrail.
//!
//! - **Fixtures**: temporary projects with tracked files and seeded histories
//! - **Assertions**: file and history assertion helpers
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use filetrail_test_utils::fixtures::TestProject;
//!
//! #[tokio::test]
//! async fn test_history() {
//!     let project = TestProject::new()
//!         .with_file("src/main.rs", "fn main() {}")
//!         .with_snapshot("src/main.rs", "2024-01-01_09_00_00_000", "fn old() {}")
//!         .build();
//!
//!     assert_eq!(project.snapshot_names("src/main.rs").len(), 1);
//! }
//! ```

pub mod assertions;
pub mod fixtures;

pub use fixtures::{BuiltTestProject, TestProject};
