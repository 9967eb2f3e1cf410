//! Custom assertion helpers for common test patterns.

use std::path::Path;

/// Assert that a file contains specific text.
///
/// # Example
///
/// ```rust
/// use filetrail_test_utils::assertions::assert_file_contains;
/// use std::fs;
/// use tempfile::TempDir;
///
/// let dir = TempDir::new().unwrap();
/// let path = dir.path().join("test.txt");
/// fs::write(&path, "Hello, world!").unwrap();
///
/// assert_file_contains(&path, "Hello");
/// ```
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));

    assert!(
        content.contains(expected),
        "File {} does not contain expected text.\nExpected to find: {}\nActual content:\n{}",
        path.display(),
        expected,
        content
    );
}

/// Assert that a file's content equals expected text exactly.
pub fn assert_file_equals(path: &Path, expected: &str) {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));

    if content != expected {
        assert_strings_equal(&content, expected);
    }
}

/// Assert that a history directory holds exactly the given snapshot names
/// (in any order). Hidden files such as the filter state are ignored.
pub fn assert_history_names(dir: &Path, expected: &[&str]) {
    let mut actual: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect(),
        Err(_) => Vec::new(),
    };
    actual.sort();
    let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected.sort();

    assert_eq!(
        actual,
        expected,
        "History {} does not hold the expected snapshots",
        dir.display()
    );
}

/// Assert that two strings are equal, with a nice diff on failure.
pub fn assert_strings_equal(actual: &str, expected: &str) {
    if actual != expected {
        let diff = similar::TextDiff::from_lines(expected, actual);
        let mut output = String::new();

        for change in diff.iter_all_changes() {
            let sign = match change.tag() {
                similar::ChangeTag::Delete => "-",
                similar::ChangeTag::Insert => "+",
                similar::ChangeTag::Equal => " ",
            };
            output.push_str(&format!("{}{}", sign, change));
        }

        panic!("Strings are not equal.\nDiff:\n{}", output);
    }
}

/// Assert that a result is Ok and extract the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($expr:expr, $msg:literal) => {
        match $expr {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Assert that a result is Err.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_assert_file_contains() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");
        fs::write(&path, "Hello, world!").unwrap();

        assert_file_contains(&path, "Hello");
        assert_file_equals(&path, "Hello, world!");
    }

    #[test]
    fn test_assert_history_names_ignores_hidden() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("2024-01-01_00_00_00_000.rs"), "a").unwrap();
        fs::write(dir.path().join(".filter.json"), "{}").unwrap();

        assert_history_names(dir.path(), &["2024-01-01_00_00_00_000.rs"]);
        assert_history_names(&dir.path().join("missing"), &[]);
    }

    #[test]
    #[should_panic(expected = "Strings are not equal")]
    fn test_assert_strings_equal_panics() {
        assert_strings_equal("a\n", "b\n");
    }

    #[test]
    fn test_assert_ok_macro() {
        let result: Result<i32, &str> = Ok(42);
        assert_eq!(assert_ok!(result), 42);
    }
}
