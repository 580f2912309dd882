//! In-memory versioned bucket
//!
//! [`BucketSimulator`] implements [`IStorageClient`] over a map of object
//! names to version stacks. It follows the listing contract of a real
//! bucket: names ascending, versions newest first, paginated by a
//! (name, id) cursor. A manual clock stamps uploads and hide markers so
//! retention scenarios are reproducible.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Context};
use tracing::debug;

use bucketsync_core::ports::{
    IStorageClient, ListCursor, ListedAction, ListedVersion, ProgressCallback, VersionPage,
    SRC_LAST_MODIFIED_MILLIS,
};

#[derive(Debug, Clone)]
struct StoredVersion {
    listed: ListedVersion,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct BucketState {
    /// Versions per name, newest first
    files: BTreeMap<String, Vec<StoredVersion>>,
    next_id: u64,
    now_millis: i64,
    list_calls: usize,
    fail_listing: bool,
    failing_names: HashSet<String>,
}

impl BucketState {
    fn new_id(&mut self) -> String {
        self.next_id += 1;
        format!("v{:08}", self.next_id)
    }

    fn check_failure(&self, name: &str) -> anyhow::Result<()> {
        if self.failing_names.contains(name) {
            bail!("injected failure for {name}");
        }
        Ok(())
    }

    fn push(
        &mut self,
        name: &str,
        action: ListedAction,
        data: Vec<u8>,
        file_info: HashMap<String, String>,
    ) -> ListedVersion {
        let listed = ListedVersion {
            id: self.new_id(),
            file_name: name.to_string(),
            size: data.len() as u64,
            upload_timestamp: self.now_millis,
            action,
            file_info,
        };
        self.files
            .entry(name.to_string())
            .or_default()
            .insert(0, StoredVersion {
                listed: listed.clone(),
                data,
            });
        listed
    }

    fn latest_upload(&self, name: &str) -> Option<&StoredVersion> {
        self.files
            .get(name)
            .and_then(|versions| versions.first())
            .filter(|v| v.listed.action == ListedAction::Upload)
    }
}

/// Versioned bucket kept entirely in memory
#[derive(Debug)]
pub struct BucketSimulator {
    state: Mutex<BucketState>,
}

impl Default for BucketSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketSimulator {
    /// Creates an empty bucket whose clock reads the current time
    pub fn new() -> Self {
        Self::with_time(chrono::Utc::now().timestamp_millis())
    }

    /// Creates an empty bucket whose clock reads `now_millis`
    pub fn with_time(now_millis: i64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                now_millis,
                ..BucketState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now_millis(&self) -> i64 {
        self.state().now_millis
    }

    pub fn set_time(&self, now_millis: i64) {
        self.state().now_millis = now_millis;
    }

    pub fn advance(&self, millis: i64) {
        self.state().now_millis += millis;
    }

    /// Stores `data` as a new version of `name` with the given source modification time
    pub fn upload_bytes(&self, name: &str, data: &[u8], mod_time: i64) -> ListedVersion {
        let mut file_info = HashMap::new();
        file_info.insert(SRC_LAST_MODIFIED_MILLIS.to_string(), mod_time.to_string());
        self.state()
            .push(name, ListedAction::Upload, data.to_vec(), file_info)
    }

    /// Stores an unfinished upload, which listings report but sync ignores
    pub fn start_upload(&self, name: &str) -> ListedVersion {
        self.state()
            .push(name, ListedAction::Start, Vec::new(), HashMap::new())
    }

    /// All versions of `name`, newest first
    pub fn versions(&self, name: &str) -> Vec<ListedVersion> {
        self.state()
            .files
            .get(name)
            .map(|versions| versions.iter().map(|v| v.listed.clone()).collect())
            .unwrap_or_default()
    }

    /// Names with at least one stored version
    pub fn file_names(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    /// Names whose newest version is a finished upload
    pub fn visible_file_names(&self) -> Vec<String> {
        let state = self.state();
        state
            .files
            .keys()
            .filter(|name| state.latest_upload(name).is_some())
            .cloned()
            .collect()
    }

    /// Content of the newest version, `None` when missing or hidden
    pub fn read_latest(&self, name: &str) -> Option<Vec<u8>> {
        self.state().latest_upload(name).map(|v| v.data.clone())
    }

    /// Makes every mutating call and download for `name` fail
    pub fn inject_failure(&self, name: &str) {
        self.state().failing_names.insert(name.to_string());
    }

    /// Makes listing calls fail
    pub fn fail_listing(&self, fail: bool) {
        self.state().fail_listing = fail;
    }

    /// Number of listing calls served
    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }
}

#[async_trait::async_trait]
impl IStorageClient for BucketSimulator {
    async fn list_file_versions(
        &self,
        prefix: &str,
        start: Option<&ListCursor>,
        max_count: usize,
    ) -> anyhow::Result<VersionPage> {
        let mut state = self.state();
        state.list_calls += 1;
        if state.fail_listing {
            bail!("injected listing failure");
        }

        let mut all = state
            .files
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .flat_map(|(_, versions)| versions.iter().map(|v| &v.listed));

        let mut versions = Vec::new();
        if let Some(cursor) = start {
            let first = all
                .by_ref()
                .find(|v| v.file_name == cursor.file_name && v.id == cursor.file_id)
                .ok_or_else(|| anyhow!("unknown list cursor {}/{}", cursor.file_name, cursor.file_id))?;
            versions.push(first.clone());
        }
        versions.extend(all.by_ref().take(max_count.saturating_sub(versions.len())).cloned());

        let next = all.next().map(|v| ListCursor {
            file_name: v.file_name.clone(),
            file_id: v.id.clone(),
        });
        debug!(prefix, count = versions.len(), more = next.is_some(), "Listed versions");
        Ok(VersionPage { versions, next })
    }

    async fn upload(
        &self,
        source: &Path,
        name: &str,
        file_info: HashMap<String, String>,
        progress: Option<ProgressCallback>,
    ) -> anyhow::Result<ListedVersion> {
        self.state().check_failure(name)?;
        let data = tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read {}", source.display()))?;

        let total = data.len() as u64;
        if let Some(progress) = progress {
            progress(total / 2, total);
            progress(total, total);
        }
        Ok(self
            .state()
            .push(name, ListedAction::Upload, data, file_info))
    }

    async fn download_by_name(
        &self,
        name: &str,
        destination: &Path,
        progress: Option<ProgressCallback>,
    ) -> anyhow::Result<()> {
        let data = {
            let state = self.state();
            state.check_failure(name)?;
            state
                .latest_upload(name)
                .map(|v| v.data.clone())
                .ok_or_else(|| anyhow!("File not present: {name}"))?
        };

        tokio::fs::write(destination, &data)
            .await
            .with_context(|| format!("Failed to write {}", destination.display()))?;
        if let Some(progress) = progress {
            let total = data.len() as u64;
            progress(total, total);
        }
        Ok(())
    }

    async fn hide(&self, name: &str) -> anyhow::Result<ListedVersion> {
        let mut state = self.state();
        state.check_failure(name)?;
        if !state.files.contains_key(name) {
            bail!("File not present: {name}");
        }
        Ok(state.push(name, ListedAction::Hide, Vec::new(), HashMap::new()))
    }

    async fn delete_version(&self, id: &str, name: &str) -> anyhow::Result<()> {
        let mut state = self.state();
        state.check_failure(name)?;
        let versions = state
            .files
            .get_mut(name)
            .ok_or_else(|| anyhow!("File not present: {name}"))?;
        let index = versions
            .iter()
            .position(|v| v.listed.id == id)
            .ok_or_else(|| anyhow!("Version {id} of {name} not found"))?;
        versions.remove(index);
        if versions.is_empty() {
            state.files.remove(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_is_sorted_and_paginated() {
        let sim = BucketSimulator::with_time(1000);
        sim.upload_bytes("b", b"1", 1);
        sim.upload_bytes("a", b"1", 1);
        sim.upload_bytes("a", b"2", 2);
        sim.upload_bytes("c", b"1", 1);

        let page = sim.list_file_versions("", None, 2).await.unwrap();
        let names: Vec<_> = page.versions.iter().map(|v| v.file_name.as_str()).collect();
        assert_eq!(names, vec!["a", "a"]);
        assert_eq!(page.versions[0].mod_time_millis(), 2);

        let cursor = page.next.unwrap();
        assert_eq!(cursor.file_name, "b");
        let page = sim.list_file_versions("", Some(&cursor), 2).await.unwrap();
        let names: Vec<_> = page.versions.iter().map(|v| v.file_name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert!(page.next.is_none());
        assert_eq!(sim.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_prefix_filter() {
        let sim = BucketSimulator::new();
        sim.upload_bytes("dir/a", b"1", 1);
        sim.upload_bytes("dir0", b"1", 1);
        sim.upload_bytes("other", b"1", 1);

        let page = sim.list_file_versions("dir/", None, 100).await.unwrap();
        assert_eq!(page.versions.len(), 1);
        assert_eq!(page.versions[0].file_name, "dir/a");
    }

    #[tokio::test]
    async fn test_hide_and_delete() {
        let sim = BucketSimulator::with_time(5000);
        let v1 = sim.upload_bytes("a", b"data", 1);
        let marker = sim.hide("a").await.unwrap();

        assert_eq!(marker.action, ListedAction::Hide);
        assert_eq!(marker.upload_timestamp, 5000);
        assert_eq!(marker.mod_time_millis(), 5000);
        assert!(sim.read_latest("a").is_none());
        assert!(sim.visible_file_names().is_empty());

        sim.delete_version(&marker.id, "a").await.unwrap();
        assert_eq!(sim.read_latest("a").unwrap(), b"data");
        sim.delete_version(&v1.id, "a").await.unwrap();
        assert!(sim.file_names().is_empty());
        assert!(sim.delete_version(&v1.id, "a").await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let sim = BucketSimulator::new();
        sim.upload_bytes("a", b"data", 1);
        sim.inject_failure("a");

        assert!(sim.hide("a").await.is_err());
        let dir = tempfile::TempDir::new().unwrap();
        assert!(sim
            .download_by_name("a", &dir.path().join("a"), None)
            .await
            .is_err());
    }

    #[test]
    fn test_clock() {
        let sim = BucketSimulator::with_time(100);
        sim.advance(50);
        assert_eq!(sim.now_millis(), 150);
        sim.set_time(10);
        assert_eq!(sim.now_millis(), 10);
    }
}
