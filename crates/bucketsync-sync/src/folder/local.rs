//! Local folder scanner
//!
//! Walks a directory tree on a blocking thread and feeds the sorted files
//! through a bounded channel, so the scan only runs ahead of its consumer
//! by [`SCAN_CHANNEL_CAPACITY`] files.
//!
//! ## Design Decisions
//!
//! - **Sorting**: each directory is listed completely, sorted with directory
//!   names suffixed by `/`, then walked in that order.
//! - **Pruning**: excluded directories are dropped before descending.
//! - **Unreadable entries**: broken symlinks and permission failures are
//!   reported and skipped; the scan continues.
//! - **Undecodable names**: a name that is not valid UTF-8 aborts the scan.

use std::fmt::{self, Display, Formatter};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use bucketsync_core::domain::{File, FileVersion, VersionAction};
use bucketsync_core::ports::ISyncReporter;

use super::FileStream;
use crate::scan_policy::ScanPolicy;
use crate::SyncError;

/// How many scanned files may wait for the consumer
const SCAN_CHANNEL_CAPACITY: usize = 1000;

type ScanSender = mpsc::Sender<Result<File, SyncError>>;

/// A directory on the local machine
#[derive(Debug, Clone)]
pub struct LocalFolder {
    root: PathBuf,
}

impl LocalFolder {
    /// Creates a folder rooted at `root`, made absolute against the current directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SyncError> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full local path for a logical (slash-separated) name
    pub fn make_full_path(&self, name: &str) -> PathBuf {
        name.split('/')
            .fold(self.root.clone(), |path, component| path.join(component))
    }

    /// Makes sure the root exists and is a directory, creating it if needed
    pub fn ensure_present(&self) -> Result<(), SyncError> {
        match std::fs::metadata(&self.root) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(SyncError::NotADirectory(self.root.clone())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "Creating local folder");
                std::fs::create_dir_all(&self.root)
                    .map_err(|_| SyncError::UnableToCreateDirectory(self.root.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Makes sure the root is an existing, non-empty directory
    ///
    /// Unlike [`ensure_present`](Self::ensure_present) this never creates anything.
    pub fn ensure_non_empty(&self) -> Result<(), SyncError> {
        let metadata = match std::fs::metadata(&self.root) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SyncError::EmptyDirectory(self.root.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_dir() {
            return Err(SyncError::NotADirectory(self.root.clone()));
        }
        if std::fs::read_dir(&self.root)?.next().is_none() {
            return Err(SyncError::EmptyDirectory(self.root.clone()));
        }
        Ok(())
    }

    /// Scans the tree; see the module docs for ordering and error behavior
    pub fn all_files(
        &self,
        policy: Arc<ScanPolicy>,
        reporter: Option<Arc<dyn ISyncReporter>>,
    ) -> FileStream {
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || {
            let walker = Walker {
                policy: &policy,
                reporter: reporter.as_deref(),
                tx: &tx,
            };
            if let Err(err) = walker.walk(&root, "", true) {
                // The receiver may already be gone; nothing left to tell.
                let _ = tx.blocking_send(Err(err));
            }
        });

        ReceiverStream::new(rx).boxed()
    }
}

impl Display for LocalFolder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "LocalFolder({})", self.root.display())
    }
}

// ============================================================================
// Walker
// ============================================================================

/// One accepted directory entry, waiting to be sorted
struct Entry {
    sort_key: String,
    relative: String,
    full_path: PathBuf,
    metadata: Metadata,
}

struct Walker<'a> {
    policy: &'a ScanPolicy,
    reporter: Option<&'a dyn ISyncReporter>,
    tx: &'a ScanSender,
}

impl Walker<'_> {
    /// Walks `dir`, whose logical name with trailing `/` is `prefix`
    ///
    /// Returns `Break` once the consumer has dropped the stream.
    fn walk(&self, dir: &Path, prefix: &str, is_root: bool) -> Result<ControlFlow<()>, SyncError> {
        let read_dir = match std::fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(err) if !is_root => {
                warn!(path = %dir.display(), %err, "Cannot list directory, skipping");
                self.report_access_error(dir);
                return Ok(ControlFlow::Continue(()));
            }
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(err) => {
                    warn!(path = %dir.display(), %err, "Failed to read directory entry");
                    self.report_access_error(dir);
                    continue;
                }
            };

            let os_name = dir_entry.file_name();
            let name = match os_name.to_str() {
                Some(name) => name.to_string(),
                None => {
                    return Err(SyncError::EnvironmentEncoding {
                        name: os_name.to_string_lossy().into_owned(),
                    })
                }
            };
            if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
                return Err(SyncError::InvalidFileName {
                    name,
                    dir: dir.to_path_buf(),
                });
            }

            let full_path = dir_entry.path();
            let is_symlink = dir_entry
                .file_type()
                .map(|t| t.is_symlink())
                .unwrap_or(false);
            if is_symlink && self.policy.exclude_all_symlinks() {
                debug!(path = %full_path.display(), "Skipping symlink");
                continue;
            }

            // Readability probe: follow symlinks, then make sure files open.
            let metadata = match std::fs::metadata(&full_path) {
                Ok(m) => m,
                Err(err) => {
                    warn!(path = %full_path.display(), %err, "Local entry not accessible");
                    self.report_access_error(&full_path);
                    continue;
                }
            };
            if metadata.is_file() {
                if let Err(err) = std::fs::File::open(&full_path) {
                    warn!(path = %full_path.display(), %err, "Local file not readable");
                    self.report_access_error(&full_path);
                    continue;
                }
            }

            let relative = format!("{prefix}{name}");
            if self.policy.should_exclude_path(&relative, metadata.is_dir()) {
                debug!(path = %relative, is_dir = metadata.is_dir(), "Excluded by scan policy");
                continue;
            }
            if metadata.is_dir() {
                if is_symlink && points_at_self_or_parent(&full_path) {
                    debug!(path = %full_path.display(), "Not following relative symlink");
                    continue;
                }
                entries.push(Entry {
                    sort_key: format!("{name}/"),
                    relative,
                    full_path,
                    metadata,
                });
            } else if metadata.is_file() {
                entries.push(Entry {
                    sort_key: name,
                    relative,
                    full_path,
                    metadata,
                });
            } else {
                debug!(path = %full_path.display(), "Skipping special file");
            }
        }

        entries.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));

        for entry in entries {
            if entry.metadata.is_dir() {
                let sub_prefix = format!("{}/", entry.relative);
                if self.walk(&entry.full_path, &sub_prefix, false)?.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
                continue;
            }

            let mod_time = entry
                .metadata
                .modified()
                .map(system_time_to_millis)
                .unwrap_or(0);
            if self.policy.should_exclude_version(mod_time) {
                debug!(path = %entry.relative, mod_time, "Excluding recently modified file");
                continue;
            }

            let version = FileVersion::new(
                entry.full_path.to_string_lossy(),
                entry.relative.clone(),
                mod_time,
                VersionAction::Upload,
                entry.metadata.len(),
            );
            let file = File::new(entry.relative, vec![version])?;
            if self.tx.blocking_send(Ok(file)).is_err() {
                debug!("Scan consumer dropped, stopping local walk");
                return Ok(ControlFlow::Break(()));
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    fn report_access_error(&self, path: &Path) {
        if let Some(reporter) = self.reporter {
            reporter.report_local_access_error(path);
        }
    }
}

/// True for symlinks whose target is literally `.` or `..`
fn points_at_self_or_parent(path: &Path) -> bool {
    std::fs::read_link(path)
        .map(|target| target == Path::new(".") || target == Path::new(".."))
        .unwrap_or(false)
}

/// Converts a filesystem timestamp to milliseconds since the epoch, rounded
fn system_time_to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64 * 1000 + ((d.subsec_nanos() as i64 + 500_000) / 1_000_000),
        Err(e) => {
            let d = e.duration();
            -(d.as_secs() as i64 * 1000 + ((d.subsec_nanos() as i64 + 500_000) / 1_000_000))
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================
