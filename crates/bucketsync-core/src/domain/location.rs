//! Folder locations
//!
//! A sync runs between two folders, given as strings by the user. A
//! string of the form `b2://bucket/prefix` (or the older `b2:bucket/prefix`)
//! names a prefix inside a bucket; anything else is a local directory.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Where one side of a sync lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FolderLocation {
    /// A directory on the local machine
    Local {
        /// Path as given; resolved against the current directory by the folder
        path: PathBuf,
    },
    /// A prefix inside a remote bucket
    Remote {
        /// Bucket name
        bucket: String,
        /// Folder prefix inside the bucket, without a trailing `/`; empty for the root
        prefix: String,
    },
}

impl FolderLocation {
    /// Parses a user-supplied folder string
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidLocation`] for bucket URIs with an empty
    /// bucket name or a `//` inside the path.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        if let Some(rest) = s.strip_prefix("b2://") {
            return Self::parse_bucket_and_prefix(rest);
        }
        if let Some(rest) = s.strip_prefix("b2:") {
            if rest.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
                return Self::parse_bucket_and_prefix(rest);
            }
        }
        if s.is_empty() {
            return Err(DomainError::InvalidLocation("empty path".to_string()));
        }
        Ok(FolderLocation::Local {
            path: PathBuf::from(s),
        })
    }

    fn parse_bucket_and_prefix(bucket_and_path: &str) -> Result<Self, DomainError> {
        if bucket_and_path.contains("//") {
            return Err(DomainError::InvalidLocation(format!(
                "'//' not allowed in path names: {bucket_and_path}"
            )));
        }
        let (bucket, prefix) = match bucket_and_path.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.strip_suffix('/').unwrap_or(prefix)),
            None => (bucket_and_path, ""),
        };
        if bucket.is_empty() {
            return Err(DomainError::InvalidLocation(format!(
                "missing bucket name: {bucket_and_path}"
            )));
        }
        Ok(FolderLocation::Remote {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }

    pub fn is_local(&self) -> bool {
        matches!(self, FolderLocation::Local { .. })
    }
}

impl FromStr for FolderLocation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for FolderLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FolderLocation::Local { path } => write!(f, "{}", path.display()),
            FolderLocation::Remote { bucket, prefix } if prefix.is_empty() => {
                write!(f, "b2://{bucket}")
            }
            FolderLocation::Remote { bucket, prefix } => write!(f, "b2://{bucket}/{prefix}"),
        }
    }
}
