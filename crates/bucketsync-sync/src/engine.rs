//! Folder synchronization engine
//!
//! The [`Synchronizer`] makes a destination folder mirror a source folder,
//! where one side is local and the other is a bucket prefix.
//!
//! ## Sync Flow
//!
//! 1. **Validation**: reject contradictory options and unsupported folder pairs
//!    before anything is scanned
//! 2. **Guards**: refuse an empty local source; create a missing local
//!    destination (a dry run leaves it missing and compares against nothing)
//! 3. **Counting**: a background task outside the executor's permits counts
//!    local files for progress reporting
//! 4. **Compare**: merge-join both folders, turn each pair into actions and
//!    submit them to the [`BoundedExecutor`] as they are produced
//! 5. **Drain**: wait for every action, then report failures as one error
//!
//! A transfer and the cleanup actions for the same file are submitted as one
//! chained task, so old versions are deleted only after the replacement exists.

use std::sync::Arc;
use std::time::Instant;

use futures::{stream, Stream, StreamExt};
use tracing::{debug, error, info, warn};

use bucketsync_core::config::{RetentionMode, SyncConfig};
use bucketsync_core::domain::FolderLocation;
use bucketsync_core::ports::{IStorageClient, ISyncReporter};

use crate::action::{run_chain, ActionContext, SyncAction};
use crate::diff::{zip_folders, FilePair};
use crate::executor::BoundedExecutor;
use crate::folder::{FileStream, Folder};
use crate::policy::{make_file_sync_actions, PolicySettings, SyncDirection};
use crate::scan_policy::ScanPolicy;
use crate::SyncError;

// ============================================================================
// SyncSummary
// ============================================================================

/// Summary of a completed sync run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Number of actions produced (and run, unless dry run)
    pub actions: u64,
    /// Bytes the transfers were planned to move
    pub bytes: u64,
    /// Actions that failed; always 0 in a returned summary
    pub failed: usize,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Runs one-way syncs with a fixed, validated configuration
#[derive(Debug)]
pub struct Synchronizer {
    config: SyncConfig,
    scan_policy: Arc<ScanPolicy>,
    settings: PolicySettings,
}

impl Synchronizer {
    /// Validates `config` and compiles its scan patterns
    ///
    /// # Errors
    /// - [`SyncError::IncompatibleOptions`] listing every validation problem
    /// - [`SyncError::InvalidRegex`] for a pattern that does not compile
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        let problems = config.validate();
        if !problems.is_empty() {
            let message = problems
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SyncError::IncompatibleOptions(message));
        }

        let scan_policy = Arc::new(ScanPolicy::from_config(&config)?);
        let settings = PolicySettings::from_config(&config);
        Ok(Self {
            config,
            scan_policy,
            settings,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Opens both locations and syncs them using the current time
    pub async fn sync_locations(
        &self,
        source: &FolderLocation,
        dest: &FolderLocation,
        storage: Arc<dyn IStorageClient>,
        reporter: Arc<dyn ISyncReporter>,
    ) -> Result<SyncSummary, SyncError> {
        let source = Folder::open(source, Arc::clone(&storage))?;
        let dest = Folder::open(dest, storage)?;
        let now_millis = chrono::Utc::now().timestamp_millis();
        self.sync_folders(&source, &dest, reporter, now_millis).await
    }

    /// Makes `dest` mirror `source`
    ///
    /// `now_millis` is the reference time for keep-days retention.
    ///
    /// # Errors
    /// Configuration and guard failures are returned before any scan starts.
    /// A fatal condition during the compare phase (for example
    /// [`SyncError::DestFileNewer`]) stops producing actions, waits for the
    /// submitted ones, then is returned. If everything was produced but some
    /// actions failed, [`SyncError::Incomplete`] is returned after all of
    /// them finished.
    #[tracing::instrument(skip(self, source, dest, reporter), fields(source = %source, dest = %dest))]
    pub async fn sync_folders(
        &self,
        source: &Folder,
        dest: &Folder,
        reporter: Arc<dyn ISyncReporter>,
        now_millis: i64,
    ) -> Result<SyncSummary, SyncError> {
        let start = Instant::now();

        let (direction, local, remote) = match (source, dest) {
            (Folder::Local(local), Folder::Remote(remote)) => (SyncDirection::Upload, local, remote),
            (Folder::Remote(remote), Folder::Local(local)) => {
                (SyncDirection::Download, local, remote)
            }
            _ => {
                return Err(SyncError::UnsupportedSyncType {
                    from: source.folder_type().to_string(),
                    to: dest.folder_type().to_string(),
                })
            }
        };

        if direction == SyncDirection::Download
            && matches!(self.settings.retention, RetentionMode::KeepDays(_))
        {
            return Err(SyncError::IncompatibleOptions(
                "keep_days cannot be used with a local destination".to_string(),
            ));
        }

        match direction {
            SyncDirection::Upload if !self.config.allow_empty_source => local.ensure_non_empty()?,
            SyncDirection::Upload => {}
            SyncDirection::Download if self.config.dry_run => {}
            SyncDirection::Download => local.ensure_present()?,
        }
        let local_missing = direction == SyncDirection::Download
            && self.config.dry_run
            && !local.root().exists();
        if local_missing {
            debug!(
                root = %local.root().display(),
                "Local destination missing, dry run compares against nothing"
            );
        }
        let local_side = match direction {
            SyncDirection::Upload => source,
            SyncDirection::Download => dest,
        };

        info!(
            ?direction,
            retention = ?self.settings.retention,
            threads = self.config.threads,
            dry_run = self.config.dry_run,
            "Starting sync"
        );

        let executor = BoundedExecutor::new(self.config.threads);

        let counter = tokio::spawn(count_local_files(
            self.scan(local_side, local_missing, None),
            Arc::clone(&reporter),
        ));

        let ctx = Arc::new(ActionContext {
            local: local.clone(),
            remote: remote.clone(),
            reporter: Arc::clone(&reporter),
            dry_run: self.config.dry_run,
        });

        let pairs = zip_folders(
            self.scan(source, local_missing, Some(Arc::clone(&reporter))),
            self.scan(dest, local_missing, Some(Arc::clone(&reporter))),
        )
        .boxed();

        let mut summary = SyncSummary::default();
        let produced = self
            .produce_actions(pairs, direction, now_millis, &executor, &ctx, &mut summary)
            .await;

        reporter.end_compare(summary.actions, summary.bytes);
        executor.shutdown().await;
        if let Err(err) = counter.await {
            warn!(error = %err, "Local count task did not finish");
        }

        if let Err(err) = produced {
            error!(error = %err, "Sync aborted");
            return Err(err);
        }

        let failures = executor.failures();
        summary.duration_ms = start.elapsed().as_millis() as u64;
        if !failures.is_empty() {
            for failure in &failures {
                debug!(task = %failure.label, message = %failure.message, "Failed task");
            }
            error!(failed = failures.len(), "Sync incomplete");
            return Err(SyncError::Incomplete {
                failed: failures.len(),
            });
        }

        info!(
            actions = summary.actions,
            bytes = summary.bytes,
            duration_ms = summary.duration_ms,
            "Sync completed"
        );
        Ok(summary)
    }

    /// Scans `folder`; a local folder known to be missing yields nothing
    fn scan(
        &self,
        folder: &Folder,
        local_missing: bool,
        reporter: Option<Arc<dyn ISyncReporter>>,
    ) -> FileStream {
        match folder {
            Folder::Local(_) if local_missing => stream::empty().boxed(),
            _ => folder.all_files(Arc::clone(&self.scan_policy), reporter),
        }
    }

    /// Compare phase: consumes the pair stream, submitting actions as they appear
    ///
    /// The stream is dropped on return, which stops the folder scans.
    async fn produce_actions(
        &self,
        mut pairs: impl Stream<Item = Result<FilePair, SyncError>> + Unpin,
        direction: SyncDirection,
        now_millis: i64,
        executor: &BoundedExecutor,
        ctx: &Arc<ActionContext>,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        while let Some(pair) = pairs.next().await {
            let (source_file, dest_file) = pair?;

            let local_present = match direction {
                SyncDirection::Upload => source_file.is_some(),
                SyncDirection::Download => dest_file.is_some(),
            };
            if local_present {
                ctx.reporter.update_compare(1);
            }

            let actions = make_file_sync_actions(
                direction,
                source_file.as_ref(),
                dest_file.as_ref(),
                &self.settings,
                now_millis,
            )?;
            if actions.is_empty() {
                continue;
            }
            debug!(
                name = actions[0].name(),
                count = actions.len(),
                "Planned actions"
            );

            summary.actions += actions.len() as u64;
            summary.bytes += actions.iter().map(SyncAction::bytes).sum::<u64>();
            submit_actions(executor, ctx, actions).await?;
        }
        Ok(())
    }
}

/// Submits one file's actions: chained behind the transfer, or one task each
async fn submit_actions(
    executor: &BoundedExecutor,
    ctx: &Arc<ActionContext>,
    actions: Vec<SyncAction>,
) -> Result<(), SyncError> {
    let mut actions = actions.into_iter();
    let Some(first) = actions.next() else {
        return Ok(());
    };
    let rest: Vec<SyncAction> = actions.collect();

    if first.is_transfer() && !rest.is_empty() {
        let ctx = Arc::clone(ctx);
        let label = first.to_string();
        return executor
            .submit(label, async move { run_chain(&first, &rest, &ctx).await })
            .await;
    }

    for action in std::iter::once(first).chain(rest) {
        let ctx = Arc::clone(ctx);
        let label = action.to_string();
        executor
            .submit(label, async move { action.run(&ctx).await })
            .await?;
    }
    Ok(())
}

/// Counts local files for progress scaling; scan errors surface in the compare phase
async fn count_local_files(mut files: FileStream, reporter: Arc<dyn ISyncReporter>) {
    while let Some(file) = files.next().await {
        if file.is_err() {
            warn!("Local count stopped early");
            break;
        }
        reporter.update_local(1);
    }
    reporter.end_local();
}
