//! Scan policies - decide which paths take part in a sync
//!
//! A [`ScanPolicy`] holds three independent pattern sets:
//!
//! 1. A directory matching an exclude-directory pattern is excluded, and the
//!    local scanner does not descend into it.
//! 2. Otherwise a file matching an include pattern is always kept.
//! 3. Otherwise a file matching an exclude-file pattern is dropped.
//! 4. Everything else is kept.
//!
//! Patterns are regular expressions tested against the path relative to the
//! folder root, using `/` as separator. A pattern matches when it matches a
//! prefix of the path starting at the first character, so `.*e` matches
//! `hello`; append `$` to match the whole path. Directory paths never end
//! with `/`.

use regex::Regex;
use tracing::debug;

use bucketsync_core::config::SyncConfig;

use crate::SyncError;

// ============================================================================
// PatternSet
// ============================================================================

/// A possibly empty set of start-anchored regular expressions
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    compiled: Vec<Regex>,
}

impl PatternSet {
    /// Compiles every pattern, anchoring it at the start of the input
    ///
    /// # Errors
    /// Returns [`SyncError::InvalidRegex`] for the first pattern that fails to compile.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, SyncError> {
        let compiled = patterns
            .iter()
            .map(|p| {
                let pattern = p.as_ref();
                Regex::new(&format!("^(?:{pattern})")).map_err(|error| SyncError::InvalidRegex {
                    pattern: pattern.to_string(),
                    error,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { compiled })
    }

    /// Returns true if any pattern matches a prefix of `s`
    pub fn matches(&self, s: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(s))
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

// ============================================================================
// ScanPolicy
// ============================================================================

/// Inclusion/exclusion rules applied by both folder scanners
///
/// The default policy includes everything.
#[derive(Debug, Clone, Default)]
pub struct ScanPolicy {
    exclude_dir: PatternSet,
    exclude_file: PatternSet,
    include_file: PatternSet,
    exclude_all_symlinks: bool,
    exclude_modified_after: Option<i64>,
}

impl ScanPolicy {
    /// Creates a policy from the three pattern lists
    pub fn new<S: AsRef<str>>(
        exclude_dir_regexes: &[S],
        exclude_file_regexes: &[S],
        include_file_regexes: &[S],
    ) -> Result<Self, SyncError> {
        Ok(Self {
            exclude_dir: PatternSet::new(exclude_dir_regexes)?,
            exclude_file: PatternSet::new(exclude_file_regexes)?,
            include_file: PatternSet::new(include_file_regexes)?,
            exclude_all_symlinks: false,
            exclude_modified_after: None,
        })
    }

    /// Builds the policy described by the scan options of a [`SyncConfig`]
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        Ok(Self::new(
            &config.exclude_dir_regex,
            &config.exclude_file_regex,
            &config.include_file_regex,
        )?
        .with_exclude_all_symlinks(config.exclude_all_symlinks)
        .with_exclude_modified_after(config.exclude_modified_after))
    }

    /// Skip symlinked entries when scanning local folders
    pub fn with_exclude_all_symlinks(mut self, exclude: bool) -> Self {
        self.exclude_all_symlinks = exclude;
        self
    }

    /// Ignore file versions modified after `millis`
    pub fn with_exclude_modified_after(mut self, millis: Option<i64>) -> Self {
        self.exclude_modified_after = millis;
        self
    }

    pub fn exclude_all_symlinks(&self) -> bool {
        self.exclude_all_symlinks
    }

    /// Should the directory at `dir_path` (and everything under it) be excluded?
    pub fn should_exclude_directory(&self, dir_path: &str) -> bool {
        self.exclude_dir.matches(dir_path)
    }

    /// Should the file at `file_path` be excluded? Include patterns win.
    pub fn should_exclude_file(&self, file_path: &str) -> bool {
        !self.include_file.matches(file_path) && self.exclude_file.matches(file_path)
    }

    /// Full evaluation for a path whose kind is known
    pub fn should_exclude_path(&self, path: &str, is_dir: bool) -> bool {
        if is_dir {
            self.should_exclude_directory(path)
        } else {
            self.should_exclude_file(path)
        }
    }

    /// Evaluation for a bucket key, which has no directory entries of its own
    ///
    /// The name is excluded when any of its ancestor directories is, so both
    /// sides of a sync agree on pruned subtrees.
    pub fn should_exclude_remote_file(&self, name: &str) -> bool {
        if !self.exclude_dir.is_empty() {
            let ancestor_excluded = name
                .match_indices('/')
                .any(|(idx, _)| self.should_exclude_directory(&name[..idx]));
            if ancestor_excluded {
                debug!(name, "Remote file under excluded directory");
                return true;
            }
        }
        self.should_exclude_file(name)
    }

    /// Should a version with this modification time be ignored?
    pub fn should_exclude_version(&self, mod_time: i64) -> bool {
        self.exclude_modified_after
            .is_some_and(|cutoff| mod_time > cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(dirs: &[&str], excludes: &[&str], includes: &[&str]) -> ScanPolicy {
        ScanPolicy::new(dirs, excludes, includes).unwrap()
    }

    #[test]
    fn test_default_includes_everything() {
        let p = ScanPolicy::default();
        assert!(!p.should_exclude_file("a.txt"));
        assert!(!p.should_exclude_directory("a"));
        assert!(!p.should_exclude_remote_file("a/b/c.txt"));
        assert!(!p.should_exclude_version(i64::MAX));
    }

    #[test]
    fn test_patterns_anchor_at_start_only() {
        let p = policy(&[], &[".*e"], &[]);
        assert!(p.should_exclude_file("hello"));

        let p = policy(&[], &["llo"], &[]);
        assert!(!p.should_exclude_file("hello"));

        let p = policy(&[], &[".*\\.txt$"], &[]);
        assert!(p.should_exclude_file("dir/a.txt"));
        assert!(!p.should_exclude_file("dir/a.txt.bak"));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let p = policy(&[], &[".*\\.log"], &["keep\\.log"]);
        assert!(p.should_exclude_file("debug.log"));
        assert!(!p.should_exclude_file("keep.log"));
    }

    #[test]
    fn test_include_alone_excludes_nothing() {
        let p = policy(&[], &[], &["a"]);
        assert!(!p.should_exclude_file("b.txt"));
    }

    #[test]
    fn test_exclude_directory() {
        let p = policy(&["node_modules", "build$"], &[], &[]);
        assert!(p.should_exclude_directory("node_modules"));
        assert!(p.should_exclude_path("build", true));
        assert!(!p.should_exclude_path("build", false));
        assert!(!p.should_exclude_directory("src/build"));
    }

    #[test]
    fn test_remote_file_under_excluded_directory() {
        // An include pattern cannot rescue a file inside a pruned directory
        let p = policy(&["secret"], &[], &["secret/keep\\.txt"]);
        assert!(p.should_exclude_remote_file("secret/keep.txt"));
        assert!(p.should_exclude_remote_file("secret/deep/x"));
        assert!(!p.should_exclude_remote_file("secret.txt"));
        assert!(!p.should_exclude_remote_file("public/secret"));
    }

    #[test]
    fn test_modified_after() {
        let p = ScanPolicy::default().with_exclude_modified_after(Some(1000));
        assert!(!p.should_exclude_version(1000));
        assert!(p.should_exclude_version(1001));
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let err = ScanPolicy::new(&["("], &[], &[]).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRegex { ref pattern, .. } if pattern == "("));
    }

    #[test]
    fn test_from_config() {
        let config = SyncConfig {
            exclude_file_regex: vec![".*\\.tmp".to_string()],
            exclude_all_symlinks: true,
            ..SyncConfig::default()
        };
        let p = ScanPolicy::from_config(&config).unwrap();
        assert!(p.should_exclude_file("x.tmp"));
        assert!(p.exclude_all_symlinks());
    }
}
