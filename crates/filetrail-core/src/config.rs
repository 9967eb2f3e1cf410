//! Configuration management for filetrail.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `~/.config/filetrail/config.json`
//! 2. Environment variable: `FILETRAIL_CONFIG_CONTENT`
//! 3. Project config: `filetrail.json` or `filetrail.jsonc` in project directory
//! 4. Environment overrides: `FILETRAIL_*` variables
//!
//! Supports JSONC (JSON with comments) and variable substitution:
//! - `{env:VAR_NAME}` - Substitute environment variable
//! - `{file:path}` - Substitute file contents
//!
//! Every retention limit is off unless configured. Sizes are given in
//! kilobytes (1024 bytes).

use crate::error::{ConfigError, CoreResult};
use filetrail_snapshot::{DirectoryMode, RetentionPolicy};
use filetrail_util::log;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Static regex for variable substitution, compiled once.
static VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

/// Get the variable substitution regex, compiling it once on first use.
fn var_regex() -> &'static regex::Regex {
    VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\{(env|file):([^}]+)\}")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Environment variable holding a whole config document.
pub const CONFIG_CONTENT_ENV: &str = "FILETRAIL_CONFIG_CONTENT";

/// Project config file names, in lookup order.
const PROJECT_FILES: [&str; 2] = ["filetrail.jsonc", "filetrail.json"];

/// Global config file names, in lookup order.
const GLOBAL_FILES: [&str; 3] = ["config.json", "filetrail.json", "filetrail.jsonc"];

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON Schema reference.
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Log level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    /// Append logs to this file instead of the default log location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Where history directories live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryConfig>,

    /// Retention and capture limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionConfig>,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::LogLevel {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LogLevel::Trace,
            LogLevel::Debug => log::LogLevel::Debug,
            LogLevel::Info => log::LogLevel::Info,
            LogLevel::Warn => log::LogLevel::Warn,
            LogLevel::Error => log::LogLevel::Error,
        }
    }
}

/// History location settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<HistoryLocation>,

    /// Root directory for [`HistoryLocation::Custom`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl HistoryConfig {
    /// Merge another history config into this one (other takes precedence).
    pub fn merge(self, other: Self) -> Self {
        Self {
            location: merge_option(self.location, other.location),
            root: merge_option(self.root, other.root),
        }
    }
}

/// History location choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryLocation {
    /// `.filetrail/` next to each tracked file.
    CoLocated,
    /// Under the platform's local data directory.
    AppData,
    /// Under `history.root`.
    Custom,
}

/// Retention limits. A missing or zero value disables the limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,

    /// Total storage limit per file, in KB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_kb: Option<u64>,

    /// Compress snapshots of files larger than this, in KB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress_above_kb: Option<u64>,

    /// Minimum seconds between two automatic snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_save_interval_secs: Option<u64>,
}

impl RetentionConfig {
    /// Merge another retention config into this one (other takes precedence).
    pub fn merge(self, other: Self) -> Self {
        Self {
            max_count: merge_option(self.max_count, other.max_count),
            max_age_days: merge_option(self.max_age_days, other.max_age_days),
            max_total_kb: merge_option(self.max_total_kb, other.max_total_kb),
            compress_above_kb: merge_option(self.compress_above_kb, other.compress_above_kb),
            min_save_interval_secs: merge_option(
                self.min_save_interval_secs,
                other.min_save_interval_secs,
            ),
        }
    }

    /// The policy handed to the snapshot engine.
    pub fn to_policy(&self) -> RetentionPolicy {
        RetentionPolicy::unlimited()
            .with_max_count(self.max_count.unwrap_or(0))
            .with_max_age_days(self.max_age_days.unwrap_or(0))
            .with_max_total_bytes(kb_to_bytes(self.max_total_kb))
            .with_compress_threshold(kb_to_bytes(self.compress_above_kb))
            .with_min_save_interval(self.min_save_interval_secs.unwrap_or(0))
    }
}

fn kb_to_bytes(kb: Option<u64>) -> u64 {
    kb.unwrap_or(0).saturating_mul(1024)
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Loading order (later sources override earlier):
    /// 1. Global config from `~/.config/filetrail/`
    /// 2. `FILETRAIL_CONFIG_CONTENT` environment variable
    /// 3. Project config from `project_dir`
    /// 4. `FILETRAIL_*` overrides of single values
    pub async fn load(project_dir: Option<&Path>) -> CoreResult<(Self, Vec<PathBuf>)> {
        let mut config = Config::default();
        let mut sources = Vec::new();

        // 1. Load global config
        if let Some(global_dir) = Self::global_config_dir() {
            for name in &GLOBAL_FILES {
                let path = global_dir.join(name);
                if path.exists() {
                    let loaded = Self::load_file(&path).await?;
                    config = config.merge(loaded);
                    sources.push(path);
                    break;
                }
            }
        }

        // 2. Load from environment variable
        if let Ok(content) = std::env::var(CONFIG_CONTENT_ENV) {
            let loaded = Self::parse_jsonc(&content, "<env>")?;
            config = config.merge(loaded);
        }

        // 3. Load project config
        if let Some(dir) = project_dir {
            for name in &PROJECT_FILES {
                let path = dir.join(name);
                if path.exists() {
                    let loaded = Self::load_file(&path).await?;
                    config = config.merge(loaded);
                    sources.push(path);
                    break;
                }
            }
        }

        // 4. Single-value overrides
        config = config.with_env_overrides(|name| std::env::var(name).ok())?;

        tracing::debug!(sources = sources.len(), "Loaded configuration");
        Ok((config, sources))
    }

    /// Get the global config directory.
    ///
    /// On Unix systems, prefers `~/.config/filetrail` (XDG standard) over
    /// the platform-specific directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            if let Some(home) = dirs::home_dir() {
                let xdg_config = home.join(".config").join("filetrail");
                if xdg_config.exists() {
                    return Some(xdg_config);
                }
            }
        }

        filetrail_util::path::config_dir()
    }

    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> CoreResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::substitute_variables(&content, path)?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// File a save writes to: the project's existing config file, else
    /// `filetrail.json` in it. Without a project, the global config file.
    async fn save_path(project_dir: Option<&Path>) -> CoreResult<PathBuf> {
        let (dir, names): (PathBuf, &[&str]) = match project_dir {
            Some(dir) => (dir.to_path_buf(), PROJECT_FILES.as_slice()),
            None => {
                let dir = Self::global_config_dir().ok_or_else(|| {
                    ConfigError::InvalidPath("Could not determine config directory".to_string())
                })?;
                (dir, GLOBAL_FILES.as_slice())
            }
        };
        tokio::fs::create_dir_all(&dir).await?;

        let existing = names.iter().map(|name| dir.join(name)).find(|p| p.exists());
        let default = if project_dir.is_some() {
            "filetrail.json"
        } else {
            "config.json"
        };
        Ok(existing.unwrap_or_else(|| dir.join(default)))
    }

    /// Merge into the existing file and save, keeping values this config
    /// leaves unset. `{env:}` and `{file:}` references in the file are
    /// written back unexpanded; comments are not kept.
    ///
    /// Returns the file written.
    pub async fn save_partial(&self, project_dir: Option<&Path>) -> CoreResult<PathBuf> {
        let path = Self::save_path(project_dir).await?;

        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(content) => Self::parse_jsonc(&content, &path.display().to_string())?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };

        existing.merge(self.clone()).write_to(&path).await?;
        Ok(path)
    }

    async fn write_to(&self, path: &Path) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::InvalidJson {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        tokio::fs::write(path, content).await?;
        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Parse JSONC (JSON with comments).
    pub fn parse_jsonc(content: &str, source: &str) -> CoreResult<Self> {
        let stripped = Self::strip_comments(content);

        serde_json::from_str(&stripped).map_err(|e| {
            ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Strip JSON comments.
    fn strip_comments(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_string = false;
        let mut escape_next = false;

        while let Some(c) = chars.next() {
            if escape_next {
                result.push(c);
                escape_next = false;
                continue;
            }

            if c == '\\' && in_string {
                result.push(c);
                escape_next = true;
                continue;
            }

            if c == '"' {
                in_string = !in_string;
                result.push(c);
                continue;
            }

            if in_string {
                result.push(c);
                continue;
            }

            if c == '/' {
                match chars.peek() {
                    Some('/') => {
                        chars.next();
                        for c in chars.by_ref() {
                            if c == '\n' {
                                result.push('\n');
                                break;
                            }
                        }
                        continue;
                    }
                    Some('*') => {
                        chars.next();
                        let mut prev = ' ';
                        for c in chars.by_ref() {
                            if prev == '*' && c == '/' {
                                break;
                            }
                            // Keep line numbers stable for error messages
                            if c == '\n' {
                                result.push('\n');
                            }
                            prev = c;
                        }
                        continue;
                    }
                    _ => {}
                }
            }

            result.push(c);
        }

        result
    }

    /// Substitute `{env:NAME}` and `{file:path}` references.
    ///
    /// File references are resolved relative to the config file.
    fn substitute_variables(content: &str, config_path: &Path) -> CoreResult<String> {
        let re = var_regex();
        let config_dir = config_path.parent().unwrap_or(Path::new("."));

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let (Some(full_match), Some(kind), Some(value)) = (cap.get(0), cap.get(1), cap.get(2))
            else {
                continue;
            };
            let value = value.as_str();

            let replacement = match kind.as_str() {
                "env" => std::env::var(value).map_err(|_| ConfigError::EnvVarNotFound {
                    name: value.to_string(),
                })?,
                "file" => {
                    let file_path = config_dir.join(value);
                    std::fs::read_to_string(&file_path)
                        .map_err(|_| ConfigError::FileRefNotFound {
                            path: file_path.display().to_string(),
                        })?
                        .trim()
                        .to_string()
                }
                _ => continue,
            };

            result = result.replace(full_match.as_str(), &replacement);
        }

        Ok(result)
    }

    /// Apply `FILETRAIL_*` overrides looked up through `var`.
    pub fn with_env_overrides<F>(mut self, var: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = var("FILETRAIL_LOG_LEVEL") {
            let level = serde_json::from_value(serde_json::Value::String(level.to_lowercase()))
                .map_err(|_| {
                    ConfigError::validation(format!("FILETRAIL_LOG_LEVEL: unknown level {level}"))
                })?;
            self.log_level = Some(level);
        }

        let retention = RetentionConfig {
            max_count: parse_env(&var, "FILETRAIL_MAX_COUNT")?,
            max_age_days: parse_env(&var, "FILETRAIL_MAX_AGE_DAYS")?,
            max_total_kb: parse_env(&var, "FILETRAIL_MAX_TOTAL_KB")?,
            compress_above_kb: parse_env(&var, "FILETRAIL_COMPRESS_ABOVE_KB")?,
            min_save_interval_secs: parse_env(&var, "FILETRAIL_MIN_SAVE_INTERVAL")?,
        };

        if retention != RetentionConfig::default() {
            self.retention = Some(self.retention.unwrap_or_default().merge(retention));
        }
        Ok(self)
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(mut self, other: Self) -> Self {
        if other.schema.is_some() {
            self.schema = other.schema;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        if other.log_file.is_some() {
            self.log_file = other.log_file;
        }

        // Nested structs - merge field by field
        self.history = match (self.history, other.history) {
            (Some(base), Some(other)) => Some(base.merge(other)),
            (base, None) => base,
            (None, other) => other,
        };
        self.retention = match (self.retention, other.retention) {
            (Some(base), Some(other)) => Some(base.merge(other)),
            (base, None) => base,
            (None, other) => other,
        };

        self
    }

    /// The retention policy, all limits off where unset.
    pub fn retention_policy(&self) -> RetentionPolicy {
        self.retention
            .as_ref()
            .map(RetentionConfig::to_policy)
            .unwrap_or_else(RetentionPolicy::unlimited)
    }

    /// Where history directories live.
    pub fn directory_mode(&self) -> CoreResult<DirectoryMode> {
        let Some(history) = &self.history else {
            return Ok(DirectoryMode::CoLocated);
        };
        match history.location.unwrap_or(HistoryLocation::CoLocated) {
            HistoryLocation::CoLocated => Ok(DirectoryMode::CoLocated),
            HistoryLocation::AppData => Ok(DirectoryMode::AppData),
            HistoryLocation::Custom => match &history.root {
                Some(root) if !root.as_os_str().is_empty() => {
                    Ok(DirectoryMode::Custom(root.clone()))
                }
                _ => Err(ConfigError::validation(
                    "history.location is \"custom\" but history.root is not set",
                )
                .into()),
            },
        }
    }

    /// Log level for the logger, `info` when unset.
    pub fn log_level(&self) -> log::LogLevel {
        self.log_level.map(Into::into).unwrap_or_default()
    }
}

/// Parse a numeric override.
fn parse_env<T, F>(var: &F, name: &str) -> CoreResult<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|_| {
            ConfigError::validation(format!("{name}: expected a number, got {value:?}")).into()
        }),
    }
}

/// Merge two Option values.
fn merge_option<T>(base: Option<T>, other: Option<T>) -> Option<T> {
    match (base, other) {
        (_, Some(o)) => Some(o),
        (b, None) => b,
    }
}
