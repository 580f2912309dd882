//! Storage client port (driven/secondary port)
//!
//! This module defines the interface to a versioned object store bucket.
//! The sync engine only needs listing, single-file transfers, hide markers
//! and version deletion; authentication, retries and multipart mechanics
//! belong to the implementation.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific
//!   and don't need domain-level classification.
//! - Uses `#[async_trait]` for async trait methods.
//! - [`ListedVersion`] is a port-level DTO, not a domain entity; the remote
//!   folder is responsible for mapping it to [`FileVersion`](crate::domain::FileVersion).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::VersionAction;

/// File info key carrying the source file's modification time in milliseconds
pub const SRC_LAST_MODIFIED_MILLIS: &str = "src_last_modified_millis";

/// Progress callback receiving `(bytes_so_far, total_bytes)`
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

// ============================================================================
// Listing DTOs
// ============================================================================

/// State of a listed version as reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListedAction {
    /// An upload that has started but never finished; never visible
    Start,
    /// Uploaded content
    Upload,
    /// A hide marker
    Hide,
}

impl ListedAction {
    /// Maps to the domain action; `None` for unfinished uploads
    pub fn as_version_action(&self) -> Option<VersionAction> {
        match self {
            ListedAction::Start => None,
            ListedAction::Upload => Some(VersionAction::Upload),
            ListedAction::Hide => Some(VersionAction::Hide),
        }
    }
}

/// A single version returned by a listing call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedVersion {
    /// Store-assigned version id
    pub id: String,
    /// Full object key, including the folder prefix
    pub file_name: String,
    /// Size in bytes (0 for hide markers)
    pub size: u64,
    /// Server upload time in milliseconds since the epoch
    pub upload_timestamp: i64,
    pub action: ListedAction,
    /// Custom metadata stored with the version
    pub file_info: HashMap<String, String>,
}

impl ListedVersion {
    /// Modification time of the original file, falling back to the upload time
    pub fn mod_time_millis(&self) -> i64 {
        self.file_info
            .get(SRC_LAST_MODIFIED_MILLIS)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(self.upload_timestamp)
    }
}

/// Where the next page of a listing starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListCursor {
    pub file_name: String,
    pub file_id: String,
}

/// One page of a version listing
#[derive(Debug, Clone, Default)]
pub struct VersionPage {
    /// Versions ordered by name ascending, then newest first
    pub versions: Vec<ListedVersion>,
    /// Cursor for the next page, `None` on the last page
    pub next: Option<ListCursor>,
}

// ============================================================================
// IStorageClient trait
// ============================================================================

/// Port trait for a versioned bucket
///
/// All methods complete only once the operation is done on the store.
/// Implementations handle authentication and any retry policy internally.
#[async_trait::async_trait]
pub trait IStorageClient: Send + Sync {
    /// Lists all versions of all files under `prefix`, recursively
    ///
    /// # Arguments
    /// * `prefix` - Key prefix; empty for the whole bucket
    /// * `start` - Cursor from the previous page (None for the first page)
    /// * `max_count` - Upper bound on the number of versions returned
    async fn list_file_versions(
        &self,
        prefix: &str,
        start: Option<&ListCursor>,
        max_count: usize,
    ) -> anyhow::Result<VersionPage>;

    /// Uploads a local file as a new version of `name`
    ///
    /// # Arguments
    /// * `source` - Local file to read
    /// * `name` - Full object key
    /// * `file_info` - Custom metadata stored with the version
    /// * `progress` - Optional callback reporting (bytes_sent, total_bytes)
    async fn upload(
        &self,
        source: &Path,
        name: &str,
        file_info: HashMap<String, String>,
        progress: Option<ProgressCallback>,
    ) -> anyhow::Result<ListedVersion>;

    /// Downloads the latest version of `name` into `destination`
    async fn download_by_name(
        &self,
        name: &str,
        destination: &Path,
        progress: Option<ProgressCallback>,
    ) -> anyhow::Result<()>;

    /// Adds a hide marker on top of `name`
    async fn hide(&self, name: &str) -> anyhow::Result<ListedVersion>;

    /// Permanently deletes one version
    async fn delete_version(&self, id: &str, name: &str) -> anyhow::Result<()>;
}
