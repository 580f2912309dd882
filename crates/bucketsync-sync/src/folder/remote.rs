//! Bucket folder scanner
//!
//! Lists every version under the folder prefix a page at a time and groups
//! consecutive versions of the same name into one [`File`]. Bucket listings
//! already come back ordered by name, newest version first.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, trace};

use bucketsync_core::domain::{File, FileVersion};
use bucketsync_core::ports::{IStorageClient, ListCursor, ListedVersion};

use super::FileStream;
use crate::scan_policy::ScanPolicy;
use crate::SyncError;

/// Versions requested per listing call
pub const LIST_PAGE_SIZE: usize = 1000;

/// A prefix inside a bucket
#[derive(Clone)]
pub struct RemoteFolder {
    bucket_name: String,
    folder_name: String,
    prefix: String,
    client: Arc<dyn IStorageClient>,
}

impl RemoteFolder {
    /// Creates a folder for `folder_name` (no leading or trailing slash; empty for the bucket root)
    pub fn new(
        bucket_name: impl Into<String>,
        folder_name: impl Into<String>,
        client: Arc<dyn IStorageClient>,
    ) -> Self {
        let folder_name = folder_name.into().trim_matches('/').to_string();
        let prefix = if folder_name.is_empty() {
            String::new()
        } else {
            format!("{folder_name}/")
        };
        Self {
            bucket_name: bucket_name.into(),
            folder_name,
            prefix,
            client,
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Full object key for a logical name
    pub fn make_full_path(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn client(&self) -> &Arc<dyn IStorageClient> {
        &self.client
    }

    /// Streams all visible files under the prefix, sorted by name
    pub fn all_files(&self, policy: Arc<ScanPolicy>) -> FileStream {
        let grouper = Grouper {
            versions: self.list_versions(),
            prefix: self.prefix.clone(),
            policy,
            pending: None,
            done: false,
        };

        stream::unfold(grouper, |mut grouper| async move {
            let item = grouper.next_file().await?;
            Some((item, grouper))
        })
        .boxed()
    }

    /// Every listed version under the prefix, following cursors until exhausted
    fn list_versions(&self) -> BoxStream<'static, Result<ListedVersion, SyncError>> {
        let client = Arc::clone(&self.client);
        let prefix = self.prefix.clone();

        stream::try_unfold(Some(None::<ListCursor>), move |state| {
            let client = Arc::clone(&client);
            let prefix = prefix.clone();
            async move {
                let Some(cursor) = state else {
                    return Ok::<_, SyncError>(None);
                };
                let page = client
                    .list_file_versions(&prefix, cursor.as_ref(), LIST_PAGE_SIZE)
                    .await
                    .map_err(SyncError::Storage)?;
                trace!(
                    prefix = %prefix,
                    count = page.versions.len(),
                    more = page.next.is_some(),
                    "Listed page of versions"
                );
                Ok(Some((page.versions, page.next.map(Some))))
            }
        })
        .map_ok(|versions| stream::iter(versions.into_iter().map(Ok::<_, SyncError>)))
        .try_flatten()
        .boxed()
    }
}

impl Display for RemoteFolder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteFolder({}, {})", self.bucket_name, self.folder_name)
    }
}

impl fmt::Debug for RemoteFolder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFolder")
            .field("bucket_name", &self.bucket_name)
            .field("folder_name", &self.folder_name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Grouping
// ============================================================================

struct Grouper {
    versions: BoxStream<'static, Result<ListedVersion, SyncError>>,
    prefix: String,
    policy: Arc<ScanPolicy>,
    /// Name and versions of the file being accumulated
    pending: Option<(String, Vec<FileVersion>)>,
    done: bool,
}

impl Grouper {
    /// Next complete file, an error, or `None` at the end
    async fn next_file(&mut self) -> Option<Result<File, SyncError>> {
        if self.done {
            return None;
        }

        loop {
            let listed = match self.versions.next().await {
                Some(Ok(listed)) => listed,
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    let (name, versions) = self.pending.take()?;
                    return Some(File::new(name, versions).map_err(SyncError::from));
                }
            };

            let Some(action) = listed.action.as_version_action() else {
                trace!(name = %listed.file_name, "Skipping unfinished upload");
                continue;
            };

            let Some(name) = listed.file_name.strip_prefix(&self.prefix) else {
                self.done = true;
                return Some(Err(SyncError::Storage(anyhow::anyhow!(
                    "listing returned '{}' outside of prefix '{}'",
                    listed.file_name,
                    self.prefix
                ))));
            };

            if self.policy.should_exclude_remote_file(name) {
                debug!(name, "Excluding remote file");
                continue;
            }
            let mod_time = listed.mod_time_millis();
            if self.policy.should_exclude_version(mod_time) {
                debug!(name, mod_time, "Excluding recently modified version");
                continue;
            }

            let name = name.to_string();
            let version = FileVersion::new(
                listed.id,
                listed.file_name,
                mod_time,
                action,
                listed.size,
            );

            if let Some((pending_name, versions)) = &mut self.pending {
                if *pending_name == name {
                    versions.push(version);
                    continue;
                }
            }
            if let Some((name, versions)) = self.pending.replace((name, vec![version])) {
                return Some(File::new(name, versions).map_err(SyncError::from));
            }
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use bucketsync_core::domain::VersionAction;
    use futures::TryStreamExt;

    use super::*;
    use crate::simulator::BucketSimulator;

    async fn scan(folder: &RemoteFolder, policy: ScanPolicy) -> Vec<File> {
        folder
            .all_files(Arc::new(policy))
            .try_collect()
            .await
            .unwrap()
    }

    fn names(files: &[File]) -> Vec<&str> {
        files.iter().map(|f| f.name()).collect()
    }

    #[tokio::test]
    async fn test_groups_versions_newest_first() {
        let sim = Arc::new(BucketSimulator::new());
        sim.upload_bytes("photos/a.txt", b"one", 100);
        sim.upload_bytes("photos/b.txt", b"bee", 150);
        sim.upload_bytes("photos/a.txt", b"two", 200);
        sim.hide("photos/b.txt").await.unwrap();

        let folder = RemoteFolder::new("bucket", "photos", sim.clone());
        let files = scan(&folder, ScanPolicy::default()).await;

        assert_eq!(names(&files), vec!["a.txt", "b.txt"]);
        let a = &files[0];
        assert_eq!(a.versions().len(), 2);
        assert_eq!(a.latest_version().mod_time(), 200);
        assert_eq!(a.latest_version().name(), "photos/a.txt");
        assert_eq!(a.versions()[1].mod_time(), 100);

        let b = &files[1];
        assert_eq!(b.latest_version().action(), VersionAction::Hide);
        assert_eq!(b.versions()[1].action(), VersionAction::Upload);
    }

    #[tokio::test]
    async fn test_prefix_limits_listing() {
        let sim = Arc::new(BucketSimulator::new());
        sim.upload_bytes("photos/a.txt", b"x", 100);
        sim.upload_bytes("photos2/b.txt", b"x", 100);
        sim.upload_bytes("other/c.txt", b"x", 100);

        let folder = RemoteFolder::new("bucket", "photos", sim.clone());
        assert_eq!(names(&scan(&folder, ScanPolicy::default()).await), vec!["a.txt"]);

        let root = RemoteFolder::new("bucket", "", sim);
        assert_eq!(
            names(&scan(&root, ScanPolicy::default()).await),
            vec!["other/c.txt", "photos/a.txt", "photos2/b.txt"]
        );
    }

    #[tokio::test]
    async fn test_paginates_across_many_versions() {
        let sim = Arc::new(BucketSimulator::new());
        let count = LIST_PAGE_SIZE + 250;
        for i in 0..count {
            sim.upload_bytes(&format!("many/f{i:05}"), b"x", i as i64);
        }

        let folder = RemoteFolder::new("bucket", "many", sim.clone());
        let files = scan(&folder, ScanPolicy::default()).await;

        assert_eq!(files.len(), count);
        assert!(sim.list_calls() >= 2);
        assert!(files.windows(2).all(|w| w[0].name() < w[1].name()));
    }

    #[tokio::test]
    async fn test_file_versions_split_across_pages_are_grouped() {
        let sim = Arc::new(BucketSimulator::new());
        for i in 0..(LIST_PAGE_SIZE as i64 + 5) {
            sim.upload_bytes("big/a.txt", b"x", i);
        }
        sim.upload_bytes("big/b.txt", b"x", 1);

        let folder = RemoteFolder::new("bucket", "big", sim);
        let files = scan(&folder, ScanPolicy::default()).await;

        assert_eq!(names(&files), vec!["a.txt", "b.txt"]);
        assert_eq!(files[0].versions().len(), LIST_PAGE_SIZE + 5);
    }

    #[tokio::test]
    async fn test_policy_applies_to_remote_names() {
        let sim = Arc::new(BucketSimulator::new());
        sim.upload_bytes("d/cache/x", b"x", 100);
        sim.upload_bytes("d/keep.txt", b"x", 100);
        sim.upload_bytes("d/skip.log", b"x", 100);

        let folder = RemoteFolder::new("bucket", "d", sim);
        let policy = ScanPolicy::new(&["cache"], &[".*\\.log"], &[]).unwrap();
        assert_eq!(names(&scan(&folder, policy).await), vec!["keep.txt"]);
    }

    #[tokio::test]
    async fn test_excludes_versions_modified_after_cutoff() {
        let sim = Arc::new(BucketSimulator::new());
        sim.upload_bytes("a.txt", b"old", 100);
        sim.upload_bytes("a.txt", b"new", 900);
        sim.upload_bytes("b.txt", b"new", 900);

        let folder = RemoteFolder::new("bucket", "", sim);
        let policy = ScanPolicy::default().with_exclude_modified_after(Some(500));
        let files = scan(&folder, policy).await;

        assert_eq!(names(&files), vec!["a.txt"]);
        assert_eq!(files[0].versions().len(), 1);
        assert_eq!(files[0].latest_version().mod_time(), 100);
    }

    #[tokio::test]
    async fn test_listing_failure_surfaces_as_error() {
        let sim = Arc::new(BucketSimulator::new());
        sim.upload_bytes("a.txt", b"x", 1);
        sim.fail_listing(true);

        let folder = RemoteFolder::new("bucket", "", sim);
        let result: Result<Vec<File>, SyncError> =
            folder.all_files(Arc::new(ScanPolicy::default())).try_collect().await;
        assert!(matches!(result, Err(SyncError::Storage(_))));
    }

    #[test]
    fn test_make_full_path() {
        let sim = Arc::new(BucketSimulator::new());
        let folder = RemoteFolder::new("bucket", "/photos/", sim.clone());
        assert_eq!(folder.make_full_path("a/b.jpg"), "photos/a/b.jpg");
        assert_eq!(folder.to_string(), "RemoteFolder(bucket, photos)");

        let root = RemoteFolder::new("bucket", "", sim);
        assert_eq!(root.make_full_path("a.jpg"), "a.jpg");
    }
}
