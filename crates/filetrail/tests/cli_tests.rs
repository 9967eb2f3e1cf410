//! CLI integration tests.
//!
//! These tests exercise the CLI commands end-to-end.

use filetrail_test_utils::fixtures::{content, BuiltTestProject, TestProject};
use std::process::{Command, Output};

/// Run filetrail inside `project`, with a private home directory so no
/// user config or log location leaks in.
fn run(project: &BuiltTestProject, args: &[&str]) -> Output {
    let home = project.path().join(".home");
    Command::new(env!("CARGO_BIN_EXE_filetrail"))
        .args(args)
        .current_dir(project.path())
        .env("HOME", &home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env_remove("FILETRAIL_CONFIG_CONTENT")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_version_command() {
    let project = TestProject::new().build();
    let output = run(&project, &["version"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("filetrail"));
}

#[test]
fn test_help_command() {
    let project = TestProject::new().build();
    let output = run(&project, &["--help"]);

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("save"));
    assert!(stdout.contains("filter"));
    assert!(stdout.contains("--verbose"));
}

#[test]
fn test_save_and_list() {
    let project = TestProject::new()
        .with_file("notes.txt", "first draft")
        .build();

    let output = run(&project, &["save", "notes.txt"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Saved"));
    assert_eq!(project.snapshot_names("notes.txt").len(), 1);

    let output = run(&project, &["list", "notes.txt"]);
    assert!(output.status.success());
    let listed = stdout(&output);
    assert!(listed.contains(&project.snapshot_names("notes.txt")[0][..23]));
}

#[test]
fn test_save_respects_project_interval() {
    let project = TestProject::new()
        .with_file("notes.txt", "draft")
        .with_config(r#"{ "retention": { "min_save_interval_secs": 3600 } }"#)
        .build();

    assert!(run(&project, &["save", "notes.txt"]).status.success());
    let output = run(&project, &["save", "notes.txt"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No snapshot"));
    assert_eq!(project.snapshot_names("notes.txt").len(), 1);

    let output = run(&project, &["snapshot", "notes.txt"]);
    assert!(output.status.success());
    assert_eq!(project.snapshot_names("notes.txt").len(), 2);
}

#[test]
fn test_purge_applies_count_limit() {
    let mut builder = TestProject::new()
        .with_file("main.rs", content::RUST_MAIN)
        .with_config(r#"{ "retention": { "max_count": 2 } }"#);
    for day in 1..=4 {
        builder = builder.with_snapshot(
            "main.rs",
            &format!("2024-01-0{day}_00_00_00_000"),
            format!("// v{day}"),
        );
    }
    let project = builder.build();

    let output = run(&project, &["purge", "main.rs"]);
    assert!(output.status.success());
    assert_eq!(
        project.snapshot_names("main.rs"),
        vec![
            "2024-01-03_00_00_00_000.rs".to_string(),
            "2024-01-04_00_00_00_000.rs".to_string(),
        ]
    );
}

#[test]
fn test_filter_hides_snapshots() {
    let project = TestProject::new()
        .with_file("app.log", content::LOG_CLEAN)
        .with_snapshot("app.log", "2024-03-01_00_00_00_000", content::LOG_WITH_ERROR)
        .with_snapshot("app.log", "2024-03-02_00_00_00_000", content::LOG_CLEAN)
        .build();

    let output = run(&project, &["filter", "app.log", "ERROR"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("1 hidden"));

    let listed = stdout(&run(&project, &["list", "app.log"]));
    assert!(listed.contains("2024-03-01_00_00_00_000"));
    assert!(!listed.contains("2024-03-02_00_00_00_000"));

    let listed = stdout(&run(&project, &["list", "app.log", "--all"]));
    assert!(listed.contains("2024-03-02_00_00_00_000"));
    assert!(listed.contains("hidden"));

    assert!(run(&project, &["filter", "app.log", "--clear"])
        .status
        .success());
    let listed = stdout(&run(&project, &["list", "app.log"]));
    assert!(listed.contains("2024-03-02_00_00_00_000"));
}

#[test]
fn test_show_and_restore() {
    let project = TestProject::new()
        .with_file("notes.txt", "current")
        .with_compressed_snapshot("notes.txt", "2024-01-01_00_00_00_000", "earlier text")
        .build();

    let output = run(&project, &["show", "notes.txt", "2024-01-01_00_00_00_000"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "earlier text");

    let output = run(&project, &["restore", "notes.txt", "2024-01-01_00_00_00_000"]);
    assert!(output.status.success());
    assert_eq!(project.read_file("notes.txt"), "earlier text");
}

#[test]
fn test_unknown_snapshot_fails() {
    let project = TestProject::new().with_file("notes.txt", "x").build();

    let output = run(&project, &["show", "notes.txt", "2099-01-01_00_00_00_000"]);
    assert!(!output.status.success());
}

#[test]
fn test_config_command() {
    let project = TestProject::new()
        .with_config(r#"{ "retention": { "max_total_kb": 512 } }"#)
        .build();

    let output = run(&project, &["config"]);
    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("filetrail.json"));
    assert!(stdout.contains("524288"));
}

#[test]
fn test_config_set_updates_project_file() {
    let project = TestProject::new()
        .with_file("notes.txt", "draft")
        .with_config(r#"{ "retention": { "max_total_kb": 512 } }"#)
        .build();

    let output = run(&project, &["config", "set", "--max-count", "7"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("filetrail.json"));

    let written = project.read_file("filetrail.json");
    assert!(written.contains("\"max_count\": 7"));
    assert!(written.contains("\"max_total_kb\": 512"));

    let shown = stdout(&run(&project, &["config", "show"]));
    assert!(shown.contains("\"max_count\": 7"));
}

#[test]
fn test_config_set_without_settings_fails() {
    let project = TestProject::new().build();
    let output = run(&project, &["config", "set"]);
    assert!(!output.status.success());
}

#[test]
fn test_diff_of_unchanged_file() {
    let project = TestProject::new()
        .with_file("notes.txt", "same text")
        .with_snapshot("notes.txt", "2024-01-01_00_00_00_000", "same text")
        .build();

    let output = run(&project, &["diff", "notes.txt", "2024-01-01_00_00_00_000"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "No changes.");
}
