//! Sync actions - the units of work produced by the sync policy
//!
//! Each [`SyncAction`] is self-contained: given an [`ActionContext`] it
//! performs one storage or filesystem call and reports progress. Actions for
//! different files are independent and may run in any order.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing::{debug, error, warn};

use bucketsync_core::ports::{ISyncReporter, ProgressCallback, SRC_LAST_MODIFIED_MILLIS};

use crate::folder::{LocalFolder, RemoteFolder};

/// Suffix of the temporary file a download is written to before it replaces the target
pub const DOWNLOAD_TEMP_SUFFIX: &str = ".sync.tmp";

/// Annotation shown next to a remote version deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteNote {
    None,
    /// The deleted version is a hide marker
    HideMarker,
    /// The deleted version has been superseded
    OldVersion,
}

impl Display for DeleteNote {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DeleteNote::None => Ok(()),
            DeleteNote::HideMarker => write!(f, "(hide marker)"),
            DeleteNote::OldVersion => write!(f, "(old version)"),
        }
    }
}

/// One unit of sync work
///
/// Names are logical, relative to the folder roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Copy a local file into the bucket as a new version
    Upload {
        name: String,
        mod_time: i64,
        size: u64,
    },
    /// Copy the latest remote version of a file to the local folder
    Download {
        name: String,
        version_id: String,
        mod_time: i64,
        size: u64,
    },
    /// Put a hide marker on a remote file
    Hide { name: String },
    /// Permanently delete one remote version
    DeleteRemoteVersion {
        name: String,
        version_id: String,
        note: DeleteNote,
    },
    /// Delete a local file
    DeleteLocal { name: String, path: PathBuf },
}

/// Everything an action needs to run
pub struct ActionContext {
    pub local: LocalFolder,
    pub remote: RemoteFolder,
    pub reporter: Arc<dyn ISyncReporter>,
    /// Report actions without performing them
    pub dry_run: bool,
}

impl SyncAction {
    pub fn name(&self) -> &str {
        match self {
            SyncAction::Upload { name, .. }
            | SyncAction::Download { name, .. }
            | SyncAction::Hide { name }
            | SyncAction::DeleteRemoteVersion { name, .. }
            | SyncAction::DeleteLocal { name, .. } => name,
        }
    }

    /// Bytes this action moves; 0 for everything but transfers
    pub fn bytes(&self) -> u64 {
        match self {
            SyncAction::Upload { size, .. } | SyncAction::Download { size, .. } => *size,
            _ => 0,
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, SyncAction::Upload { .. } | SyncAction::Download { .. })
    }

    /// Performs the action, reporting completion or failure to the context's reporter
    #[tracing::instrument(skip(self, ctx), fields(action = %self))]
    pub async fn run(&self, ctx: &ActionContext) -> anyhow::Result<()> {
        if ctx.dry_run {
            debug!("Dry run, not executing");
            ctx.reporter.update_transferred(1, self.bytes());
            ctx.reporter.print_completion(&self.to_string());
            return Ok(());
        }

        match self.execute(ctx).await {
            Ok(()) => {
                ctx.reporter.print_completion(&self.to_string());
                Ok(())
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "Action failed");
                ctx.reporter.report_error(&format!("{self}: {err:#}"));
                Err(err)
            }
        }
    }

    async fn execute(&self, ctx: &ActionContext) -> anyhow::Result<()> {
        let client = ctx.remote.client();

        match self {
            SyncAction::Upload {
                name,
                mod_time,
                size,
            } => {
                let path = ctx.local.make_full_path(name);
                let key = ctx.remote.make_full_path(name);
                let mut file_info = HashMap::new();
                file_info.insert(SRC_LAST_MODIFIED_MILLIS.to_string(), mod_time.to_string());

                let reported = Arc::new(AtomicU64::new(0));
                let progress = progress_callback(Arc::clone(&ctx.reporter), Arc::clone(&reported));
                client
                    .upload(&path, &key, file_info, Some(progress))
                    .await
                    .with_context(|| format!("Failed to upload {}", path.display()))?;
                finish_transfer(ctx.reporter.as_ref(), &reported, *size);
            }
            SyncAction::Download {
                name,
                version_id,
                mod_time,
                size,
            } => {
                let path = ctx.local.make_full_path(name);
                let key = ctx.remote.make_full_path(name);
                debug!(key = %key, version_id = %version_id, "Downloading latest version");
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }

                let temp = temp_path(&path);
                let reported = Arc::new(AtomicU64::new(0));
                let progress = progress_callback(Arc::clone(&ctx.reporter), Arc::clone(&reported));
                if let Err(err) = client.download_by_name(&key, &temp, Some(progress)).await {
                    if let Err(cleanup_err) = tokio::fs::remove_file(&temp).await {
                        debug!(path = %temp.display(), %cleanup_err, "No temporary file to remove");
                    }
                    return Err(
                        err.context(format!("Failed to download {key} version {version_id}"))
                    );
                }

                tokio::fs::rename(&temp, &path)
                    .await
                    .with_context(|| format!("Failed to move download into {}", path.display()))?;
                set_mod_time(&path, *mod_time)
                    .await
                    .with_context(|| format!("Failed to set modification time of {}", path.display()))?;
                finish_transfer(ctx.reporter.as_ref(), &reported, *size);
            }
            SyncAction::Hide { name } => {
                let key = ctx.remote.make_full_path(name);
                client
                    .hide(&key)
                    .await
                    .with_context(|| format!("Failed to hide {key}"))?;
                ctx.reporter.update_transferred(1, 0);
            }
            SyncAction::DeleteRemoteVersion {
                name, version_id, ..
            } => {
                let key = ctx.remote.make_full_path(name);
                client
                    .delete_version(version_id, &key)
                    .await
                    .with_context(|| format!("Failed to delete {key} version {version_id}"))?;
                ctx.reporter.update_transferred(1, 0);
            }
            SyncAction::DeleteLocal { path, .. } => {
                tokio::fs::remove_file(path)
                    .await
                    .with_context(|| format!("Failed to delete {}", path.display()))?;
                ctx.reporter.update_transferred(1, 0);
            }
        }

        Ok(())
    }
}

impl Display for SyncAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Upload { name, .. } => write!(f, "upload {name}"),
            SyncAction::Download { name, .. } => write!(f, "dnload {name}"),
            SyncAction::Hide { name } => write!(f, "hide   {name}"),
            SyncAction::DeleteRemoteVersion { name, note, .. } => match note {
                DeleteNote::None => write!(f, "delete {name}"),
                note => write!(f, "delete {name} {note}"),
            },
            SyncAction::DeleteLocal { name, .. } => write!(f, "delete {name}"),
        }
    }
}

/// Runs a transfer, then its cleanups only if the transfer succeeded
///
/// All cleanups are attempted even if one fails; the first failure is returned.
pub async fn run_chain(
    transfer: &SyncAction,
    cleanups: &[SyncAction],
    ctx: &ActionContext,
) -> anyhow::Result<()> {
    if let Err(err) = transfer.run(ctx).await {
        for cleanup in cleanups {
            warn!(action = %cleanup, transfer = %transfer, "Skipping cleanup after failed transfer");
            ctx.reporter
                .print_completion(&format!("skip   {cleanup} (transfer failed)"));
        }
        return Err(err);
    }

    let mut first_error = None;
    for cleanup in cleanups {
        if let Err(err) = cleanup.run(ctx).await {
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), Err)
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds a storage progress callback that forwards byte deltas to the reporter
fn progress_callback(reporter: Arc<dyn ISyncReporter>, reported: Arc<AtomicU64>) -> ProgressCallback {
    Box::new(move |bytes_so_far, _total| {
        let previous = reported.fetch_max(bytes_so_far, Ordering::SeqCst);
        if bytes_so_far > previous {
            reporter.update_transferred(0, bytes_so_far - previous);
        }
    })
}

/// Counts the file as done and reports any bytes the progress callback missed
fn finish_transfer(reporter: &dyn ISyncReporter, reported: &AtomicU64, size: u64) {
    let already = reported.load(Ordering::SeqCst);
    reporter.update_transferred(1, size.saturating_sub(already));
}

fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.as_os_str().to_owned();
    temp.push(DOWNLOAD_TEMP_SUFFIX);
    PathBuf::from(temp)
}

fn millis_to_system_time(millis: i64) -> SystemTime {
    let offset = Duration::from_millis(millis.unsigned_abs());
    if millis >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}

/// Sets a file's modification time on a blocking thread
async fn set_mod_time(path: &Path, millis: i64) -> anyhow::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&path)?
            .set_modified(millis_to_system_time(millis))
    })
    .await
    .context("Modification time task did not complete")??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;
    use crate::report::SyncReport;
    use crate::simulator::BucketSimulator;

    struct Fixture {
        _dir: TempDir,
        sim: Arc<BucketSimulator>,
        report: Arc<SyncReport>,
        ctx: ActionContext,
    }

    fn fixture(dry_run: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let sim = Arc::new(BucketSimulator::new());
        let report = Arc::new(SyncReport::new());
        let ctx = ActionContext {
            local: LocalFolder::new(dir.path()).unwrap(),
            remote: RemoteFolder::new("bucket", "backup", sim.clone()),
            reporter: report.clone(),
            dry_run,
        };
        Fixture {
            _dir: dir,
            sim,
            report,
            ctx,
        }
    }

    #[tokio::test]
    async fn test_upload_sets_file_info_and_reports_bytes() {
        let fx = fixture(false);
        std::fs::write(fx.ctx.local.make_full_path("a.txt"), b"hello").unwrap();

        let action = SyncAction::Upload {
            name: "a.txt".to_string(),
            mod_time: 1234,
            size: 5,
        };
        action.run(&fx.ctx).await.unwrap();

        let versions = fx.sim.versions("backup/a.txt");
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].mod_time_millis(), 1234);
        assert_eq!(fx.sim.read_latest("backup/a.txt").unwrap(), b"hello");

        let summary = fx.report.summary();
        assert_eq!(summary.transferred_files, 1);
        assert_eq!(summary.transferred_bytes, 5);
    }

    #[tokio::test]
    async fn test_download_replaces_target_and_sets_mtime() {
        let fx = fixture(false);
        let version = fx.sim.upload_bytes("backup/dir/b.txt", b"remote", 1_600_000_000_000);
        let target = fx.ctx.local.make_full_path("dir/b.txt");

        let action = SyncAction::Download {
            name: "dir/b.txt".to_string(),
            version_id: version.id,
            mod_time: 1_600_000_000_000,
            size: 6,
        };
        action.run(&fx.ctx).await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"remote");
        assert!(!temp_path(&target).exists());
        let modified = std::fs::metadata(&target).unwrap().modified().unwrap();
        let millis = modified.duration_since(UNIX_EPOCH).unwrap().as_millis();
        assert_eq!(millis, 1_600_000_000_000);
        assert_eq!(fx.report.summary().transferred_bytes, 6);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_temp_file() {
        let fx = fixture(false);
        let target = fx.ctx.local.make_full_path("missing.txt");

        let action = SyncAction::Download {
            name: "missing.txt".to_string(),
            version_id: "v00000042".to_string(),
            mod_time: 0,
            size: 1,
        };
        let err = action.run(&fx.ctx).await.unwrap_err();
        assert!(format!("{err:#}").contains("backup/missing.txt version v00000042"));
        assert!(!target.exists());
        assert!(!temp_path(&target).exists());
        assert_eq!(fx.report.summary().errors, 1);
    }

    #[tokio::test]
    async fn test_hide_and_delete_remote() {
        let fx = fixture(false);
        let version = fx.sim.upload_bytes("backup/a.txt", b"x", 100);

        SyncAction::Hide {
            name: "a.txt".to_string(),
        }
        .run(&fx.ctx)
        .await
        .unwrap();
        assert_eq!(fx.sim.versions("backup/a.txt").len(), 2);
        assert!(fx.sim.read_latest("backup/a.txt").is_none());

        SyncAction::DeleteRemoteVersion {
            name: "a.txt".to_string(),
            version_id: version.id,
            note: DeleteNote::OldVersion,
        }
        .run(&fx.ctx)
        .await
        .unwrap();
        assert_eq!(fx.sim.versions("backup/a.txt").len(), 1);
        assert_eq!(fx.report.summary().transferred_files, 2);
    }

    #[tokio::test]
    async fn test_delete_local() {
        let fx = fixture(false);
        let path = fx.ctx.local.make_full_path("gone.txt");
        std::fs::write(&path, b"x").unwrap();

        SyncAction::DeleteLocal {
            name: "gone.txt".to_string(),
            path: path.clone(),
        }
        .run(&fx.ctx)
        .await
        .unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_side_effects() {
        let fx = fixture(true);
        let path = fx.ctx.local.make_full_path("keep.txt");
        std::fs::write(&path, b"x").unwrap();

        SyncAction::DeleteLocal {
            name: "keep.txt".to_string(),
            path: path.clone(),
        }
        .run(&fx.ctx)
        .await
        .unwrap();
        SyncAction::Upload {
            name: "keep.txt".to_string(),
            mod_time: 1,
            size: 1,
        }
        .run(&fx.ctx)
        .await
        .unwrap();

        assert!(path.exists());
        assert!(fx.sim.file_names().is_empty());
        let summary = fx.report.summary();
        assert_eq!(summary.transferred_files, 2);
        assert_eq!(summary.transferred_bytes, 1);
    }

    #[tokio::test]
    async fn test_chain_skips_cleanup_after_failed_transfer() {
        let fx = fixture(false);
        let old = fx.sim.upload_bytes("backup/a.txt", b"old", 100);

        // The local file does not exist, so the upload fails
        let transfer = SyncAction::Upload {
            name: "a.txt".to_string(),
            mod_time: 200,
            size: 3,
        };
        let cleanup = SyncAction::DeleteRemoteVersion {
            name: "a.txt".to_string(),
            version_id: old.id,
            note: DeleteNote::OldVersion,
        };

        assert!(run_chain(&transfer, &[cleanup], &fx.ctx).await.is_err());
        assert_eq!(fx.sim.versions("backup/a.txt").len(), 1);
    }

    #[tokio::test]
    async fn test_chain_runs_cleanup_after_transfer() {
        let fx = fixture(false);
        let old = fx.sim.upload_bytes("backup/a.txt", b"old", 100);
        std::fs::write(fx.ctx.local.make_full_path("a.txt"), b"new").unwrap();

        let transfer = SyncAction::Upload {
            name: "a.txt".to_string(),
            mod_time: 200,
            size: 3,
        };
        let cleanup = SyncAction::DeleteRemoteVersion {
            name: "a.txt".to_string(),
            version_id: old.id,
            note: DeleteNote::OldVersion,
        };

        run_chain(&transfer, &[cleanup], &fx.ctx).await.unwrap();
        let versions = fx.sim.versions("backup/a.txt");
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].mod_time_millis(), 200);
    }

    #[test]
    fn test_progress_callback_reports_deltas() {
        #[derive(Default)]
        struct Bytes(Mutex<Vec<u64>>);
        impl ISyncReporter for Bytes {
            fn update_local(&self, _: u64) {}
            fn end_local(&self) {}
            fn update_compare(&self, _: u64) {}
            fn end_compare(&self, _: u64, _: u64) {}
            fn update_transferred(&self, _: u64, bytes: u64) {
                self.0.lock().unwrap().push(bytes);
            }
            fn print_completion(&self, _: &str) {}
            fn report_error(&self, _: &str) {}
            fn report_local_access_error(&self, _: &Path) {}
        }

        let reporter = Arc::new(Bytes::default());
        let reported = Arc::new(AtomicU64::new(0));
        let callback = progress_callback(reporter.clone(), reported.clone());
        callback(10, 30);
        callback(10, 30);
        callback(25, 30);
        finish_transfer(reporter.as_ref(), &reported, 30);

        assert_eq!(*reporter.0.lock().unwrap(), vec![10, 15, 5]);
    }

    #[test]
    fn test_display() {
        let action = SyncAction::DeleteRemoteVersion {
            name: "a.txt".to_string(),
            version_id: "v1".to_string(),
            note: DeleteNote::HideMarker,
        };
        assert_eq!(action.to_string(), "delete a.txt (hide marker)");
        assert_eq!(
            SyncAction::Upload {
                name: "b".to_string(),
                mod_time: 0,
                size: 7
            }
            .to_string(),
            "upload b"
        );
    }
}
