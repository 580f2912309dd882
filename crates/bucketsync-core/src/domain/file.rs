//! File and FileVersion entities
//!
//! A [`File`] is one logical object in a folder, identified by a
//! slash-separated name relative to the folder root. It carries one or
//! more [`FileVersion`]s ordered newest first. Local folders always
//! produce exactly one version per file; remote folders may produce many.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Number of milliseconds in one day
pub const ONE_DAY_IN_MS: i64 = 24 * 60 * 60 * 1000;

// ============================================================================
// VersionAction
// ============================================================================

/// What a stored version represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionAction {
    /// Content was uploaded; the version is live data
    Upload,
    /// A hide marker; the file is invisible as of this version
    Hide,
}

impl Display for VersionAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            VersionAction::Upload => "upload",
            VersionAction::Hide => "hide",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for VersionAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(VersionAction::Upload),
            "hide" => Ok(VersionAction::Hide),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown version action '{other}'"
            ))),
        }
    }
}

// ============================================================================
// FileVersion
// ============================================================================

/// One concrete stored instance of a file
///
/// The identifier is the remote version id for bucket files and the
/// absolute local path for local files. Modification times are kept in
/// milliseconds since the epoch to avoid rounding differences between
/// the two sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    id: String,
    name: String,
    mod_time: i64,
    action: VersionAction,
    size: u64,
}

impl FileVersion {
    /// Creates a new version record
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mod_time: i64,
        action: VersionAction,
        size: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mod_time,
            action,
            size,
        }
    }

    /// Remote version id, or local absolute path
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Full name of the version as stored (remote key or relative local name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modification time in milliseconds since the epoch
    pub fn mod_time(&self) -> i64 {
        self.mod_time
    }

    pub fn action(&self) -> VersionAction {
        self.action
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Age of this version in whole and fractional days relative to `now_millis`
    pub fn age_days(&self, now_millis: i64) -> f64 {
        (now_millis - self.mod_time) as f64 / ONE_DAY_IN_MS as f64
    }
}

// ============================================================================
// File
// ============================================================================

/// A logical file and all of its known versions, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    versions: Vec<FileVersion>,
}

impl File {
    /// Creates a file from its logical name and a non-empty version list
    ///
    /// # Errors
    /// Returns [`DomainError::EmptyVersionList`] when `versions` is empty.
    pub fn new(name: impl Into<String>, versions: Vec<FileVersion>) -> Result<Self, DomainError> {
        let name = name.into();
        if versions.is_empty() {
            return Err(DomainError::EmptyVersionList(name));
        }
        Ok(Self { name, versions })
    }

    /// Logical, slash-separated name relative to the folder root
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All versions, newest first
    pub fn versions(&self) -> &[FileVersion] {
        &self.versions
    }

    /// The newest version
    pub fn latest_version(&self) -> &FileVersion {
        // `new` rejects empty version lists
        &self.versions[0]
    }

    /// Verifies that versions are ordered by non-increasing modification time
    ///
    /// # Errors
    /// Returns [`DomainError::VersionOrder`] naming the first offending pair.
    pub fn check_version_order(&self) -> Result<(), DomainError> {
        for pair in self.versions.windows(2) {
            if pair[0].mod_time < pair[1].mod_time {
                return Err(DomainError::VersionOrder {
                    name: self.name.clone(),
                    newer_mod_time: pair[0].mod_time,
                    older_mod_time: pair[1].mod_time,
                });
            }
        }
        Ok(())
    }
}

impl Display for File {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "File({}, {} version(s))", self.name, self.versions.len())
    }
}
