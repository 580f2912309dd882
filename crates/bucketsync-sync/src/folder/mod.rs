//! Folders - sorted, policy-filtered scans of one side of a sync
//!
//! A [`Folder`] is either a directory on the local machine or a prefix
//! inside a bucket. Both produce a [`FileStream`]: a finite stream of
//! [`File`]s sorted by logical name, where a directory's contents sort as
//! though the directory name ended with `/`. With that rule
//! `"a.txt" < "a/1" < "a0.txt"` on both sides, which is plain byte order of
//! the full names and the order bucket listings come back in. The merge-join
//! in [`crate::diff`] relies on both sides agreeing on it.
//!
//! Every call to `all_files` starts a fresh scan.

mod local;
mod remote;

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use futures::stream::BoxStream;

use bucketsync_core::domain::{File, FolderLocation};
use bucketsync_core::ports::{IStorageClient, ISyncReporter};

use crate::scan_policy::ScanPolicy;
use crate::SyncError;

pub use local::LocalFolder;
pub use remote::RemoteFolder;

/// Stream of files produced by a folder scan
pub type FileStream = BoxStream<'static, Result<File, SyncError>>;

/// Kind of folder, used to pick the sync direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderType {
    Local,
    Remote,
}

impl Display for FolderType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FolderType::Local => write!(f, "local"),
            FolderType::Remote => write!(f, "b2"),
        }
    }
}

/// One side of a sync
#[derive(Clone)]
pub enum Folder {
    Local(LocalFolder),
    Remote(RemoteFolder),
}

impl Folder {
    /// Opens the folder named by `location`; `storage` backs remote folders
    pub fn open(
        location: &FolderLocation,
        storage: Arc<dyn IStorageClient>,
    ) -> Result<Self, SyncError> {
        match location {
            FolderLocation::Local { path } => Ok(Folder::Local(LocalFolder::new(path)?)),
            FolderLocation::Remote { bucket, prefix } => Ok(Folder::Remote(RemoteFolder::new(
                bucket.clone(),
                prefix.clone(),
                storage,
            ))),
        }
    }

    pub fn folder_type(&self) -> FolderType {
        match self {
            Folder::Local(_) => FolderType::Local,
            Folder::Remote(_) => FolderType::Remote,
        }
    }

    /// Scans the folder, yielding files in sorted order
    ///
    /// Local entries that cannot be read are skipped and passed to
    /// `reporter`, when one is given.
    pub fn all_files(
        &self,
        policy: Arc<ScanPolicy>,
        reporter: Option<Arc<dyn ISyncReporter>>,
    ) -> FileStream {
        match self {
            Folder::Local(folder) => folder.all_files(policy, reporter),
            Folder::Remote(folder) => folder.all_files(policy),
        }
    }
}

impl Display for Folder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Folder::Local(folder) => write!(f, "{folder}"),
            Folder::Remote(folder) => write!(f, "{folder}"),
        }
    }
}

impl fmt::Debug for Folder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Folder({self})")
    }
}
