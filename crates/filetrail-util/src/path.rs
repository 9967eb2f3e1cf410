//! Path utilities.
//!
//! This module provides utilities for working with file paths.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf, Prefix};

/// Get the filetrail configuration directory.
///
/// This follows XDG conventions on Linux/macOS:
/// - `$XDG_CONFIG_HOME/filetrail` if set
/// - `~/.config/filetrail` otherwise
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("filetrail"))
}

/// Get the local data directory that hosts centralized history trees.
///
/// This is the platform's local data directory itself (e.g.
/// `~/.local/share`, `%LOCALAPPDATA%`); the history root is created below it.
pub fn local_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir()
}

/// Get the filetrail logs directory.
pub fn logs_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("filetrail").join("logs"))
}

/// Normalize a path by removing `.` and `..` components.
///
/// Unlike `canonicalize`, this doesn't require the path to exist.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {
                // Skip `.`
            }
            _ => {
                result.push(component);
            }
        }
    }

    result
}

/// Make a path absolute and normalized without touching the filesystem
/// beyond reading the current directory.
pub fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}

/// Strip the root and any prefix from an absolute path so it can be nested
/// under another directory.
///
/// A drive prefix `C:` becomes a plain `C` component and a UNC prefix
/// `\\server\share` becomes `server/share`:
///
/// `C:\Users\me\file.rs` -> `C/Users/me/file.rs`, `/home/me/file.rs` -> `home/me/file.rs`.
pub fn without_root(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => match prefix.kind() {
                Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => {
                    result.push(OsString::from((letter as char).to_string()));
                }
                Prefix::UNC(server, share) | Prefix::VerbatimUNC(server, share) => {
                    result.push(server);
                    result.push(share);
                }
                Prefix::Verbatim(name) | Prefix::DeviceNS(name) => {
                    result.push(name);
                }
            },
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(part) => result.push(part),
        }
    }

    result
}

/// Convert a path to a form that is not subject to the platform's legacy
/// maximum path length.
///
/// On Windows an absolute path receives the `\\?\` verbatim prefix (`\\?\UNC\`
/// for network shares). Elsewhere the path is returned unchanged.
pub fn long_path(path: &Path) -> PathBuf {
    if cfg!(windows) {
        let text = path.to_string_lossy();
        if text.starts_with(r"\\?\") {
            return path.to_path_buf();
        }
        if let Some(rest) = text.strip_prefix(r"\\") {
            return PathBuf::from(format!(r"\\?\UNC\{rest}"));
        }
        let bytes = text.as_bytes();
        if bytes.len() > 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            return PathBuf::from(format!(r"\\?\{text}"));
        }
    }
    path.to_path_buf()
}
