//! Configuration module for bucketsync.
//!
//! Provides the typed sync options that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Option enums
// ---------------------------------------------------------------------------

/// How a source file is compared against its destination counterpart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareVersionMode {
    /// Compare by name only; an existing destination is never replaced.
    None,
    /// Replace when the sizes of the latest versions differ.
    Size,
    /// Replace when the source's latest version is newer.
    #[default]
    #[serde(alias = "modTime")]
    ModTime,
}

/// What happens to destination versions the source no longer justifies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionMode {
    /// Transfer only; no remote history is pruned.
    #[default]
    MirrorOnly,
    /// Keep only the version matching the source.
    DeleteOldVersions,
    /// Keep every version that was visible within the last N days.
    KeepDays(u32),
}

/// What to do when the destination is newer than the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NewerFileMode {
    /// Fail the run.
    #[default]
    RaiseError,
    /// Leave the destination alone.
    Skip,
    /// Overwrite the destination anyway.
    Replace,
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

/// Options accepted by a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delete destination versions not matching the source.
    pub delete: bool,
    /// Keep old remote versions for this many days, then delete them.
    pub keep_days: Option<u32>,
    /// Skip files whose destination is newer than the source.
    pub skip_newer: bool,
    /// Replace files whose destination is newer than the source.
    pub replace_newer: bool,
    pub compare_versions: CompareVersionMode,
    /// Tolerance for `compare_versions`: milliseconds for mod_time, bytes for size.
    pub compare_threshold: u64,
    /// Directories (relative paths, no trailing `/`) to prune from the scan.
    pub exclude_dir_regex: Vec<String>,
    /// Files to leave out of the scan.
    pub exclude_file_regex: Vec<String>,
    /// Files to keep even when an exclude pattern matches them.
    pub include_file_regex: Vec<String>,
    /// Skip symlinks when scanning a local folder.
    pub exclude_all_symlinks: bool,
    /// Ignore file versions modified after this time (ms since epoch).
    pub exclude_modified_after: Option<i64>,
    /// Allow syncing from an empty local directory.
    pub allow_empty_source: bool,
    /// Number of actions allowed in flight at once.
    pub threads: usize,
    /// Report the actions that would run without running them.
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            delete: false,
            keep_days: None,
            skip_newer: false,
            replace_newer: false,
            compare_versions: CompareVersionMode::default(),
            compare_threshold: 0,
            exclude_dir_regex: Vec::new(),
            exclude_file_regex: Vec::new(),
            include_file_regex: Vec::new(),
            exclude_all_symlinks: false,
            exclude_modified_after: None,
            allow_empty_source: false,
            threads: 10,
            dry_run: false,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`SyncConfig::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/bucketsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("bucketsync")
            .join("config.yaml")
    }

    /// Retention mode selected by `delete` / `keep_days`.
    ///
    /// `delete` wins when both are set; [`validate`](Self::validate) reports
    /// that combination as an error.
    pub fn retention_mode(&self) -> RetentionMode {
        if self.delete {
            RetentionMode::DeleteOldVersions
        } else if let Some(days) = self.keep_days {
            RetentionMode::KeepDays(days)
        } else {
            RetentionMode::MirrorOnly
        }
    }

    /// Newer-destination handling selected by `skip_newer` / `replace_newer`.
    pub fn newer_file_mode(&self) -> NewerFileMode {
        if self.replace_newer {
            NewerFileMode::Replace
        } else if self.skip_newer {
            NewerFileMode::Skip
        } else {
            NewerFileMode::RaiseError
        }
    }
}

// ---------------------------------------------------------------------------
// SyncConfig::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Name of the offending option, e.g. `"keep_days"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl SyncConfig {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. Checks that depend
    /// on the folders being synced happen when the sync starts.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.skip_newer && self.replace_newer {
            errors.push(ValidationError {
                field: "skip_newer".into(),
                message: "skip_newer and replace_newer are incompatible".into(),
            });
        }
        if self.delete && self.keep_days.is_some() {
            errors.push(ValidationError {
                field: "delete".into(),
                message: "delete and keep_days are incompatible".into(),
            });
        }
        if self.keep_days == Some(0) {
            errors.push(ValidationError {
                field: "keep_days".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.threads == 0 {
            errors.push(ValidationError {
                field: "threads".into(),
                message: "must be greater than 0".into(),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// SyncConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`SyncConfig`] programmatically.
///
/// Starts from [`SyncConfig::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use bucketsync_core::config::{CompareVersionMode, SyncConfigBuilder};
///
/// let config = SyncConfigBuilder::new()
///     .keep_days(30)
///     .compare_versions(CompareVersionMode::Size)
///     .exclude_dir_regex(".git")
///     .threads(4)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Create a new builder initialised with [`SyncConfig::default`] values.
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    // --- retention ---

    pub fn delete(mut self, delete: bool) -> Self {
        self.config.delete = delete;
        self
    }

    pub fn keep_days(mut self, days: u32) -> Self {
        self.config.keep_days = Some(days);
        self
    }

    // --- comparison ---

    pub fn skip_newer(mut self, skip: bool) -> Self {
        self.config.skip_newer = skip;
        self
    }

    pub fn replace_newer(mut self, replace: bool) -> Self {
        self.config.replace_newer = replace;
        self
    }

    pub fn compare_versions(mut self, mode: CompareVersionMode) -> Self {
        self.config.compare_versions = mode;
        self
    }

    pub fn compare_threshold(mut self, threshold: u64) -> Self {
        self.config.compare_threshold = threshold;
        self
    }

    // --- scan ---

    pub fn exclude_dir_regex(mut self, pattern: impl Into<String>) -> Self {
        self.config.exclude_dir_regex.push(pattern.into());
        self
    }

    pub fn exclude_file_regex(mut self, pattern: impl Into<String>) -> Self {
        self.config.exclude_file_regex.push(pattern.into());
        self
    }

    pub fn include_file_regex(mut self, pattern: impl Into<String>) -> Self {
        self.config.include_file_regex.push(pattern.into());
        self
    }

    pub fn exclude_all_symlinks(mut self, exclude: bool) -> Self {
        self.config.exclude_all_symlinks = exclude;
        self
    }

    pub fn exclude_modified_after(mut self, millis: i64) -> Self {
        self.config.exclude_modified_after = Some(millis);
        self
    }

    // --- run ---

    pub fn allow_empty_source(mut self, allow: bool) -> Self {
        self.config.allow_empty_source = allow;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`SyncConfig`].
    pub fn build(self) -> SyncConfig {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<SyncConfig, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
