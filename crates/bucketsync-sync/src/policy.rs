//! Sync policy - per-file transfer and retention decisions
//!
//! [`make_file_sync_actions`] turns one [`FilePair`](crate::diff::FilePair)
//! into the ordered list of actions that brings the destination in line with
//! the source: at most one transfer first, then any cleanup. The decision is
//! a pure function of its inputs; nothing here touches storage.
//!
//! Cleanup depends on the direction and the retention mode:
//!
//! | direction | retention             | cleanup                                      |
//! |-----------|-----------------------|----------------------------------------------|
//! | upload    | mirror only           | none                                         |
//! | upload    | delete old versions   | delete superseded remote versions            |
//! | upload    | keep N days           | hide vanished files, expire old versions     |
//! | download  | mirror only / delete  | delete local files whose source vanished     |
//! | download  | keep N days           | none (rejected by the synchronizer)          |

use bucketsync_core::config::{CompareVersionMode, NewerFileMode, RetentionMode, SyncConfig};
use bucketsync_core::domain::{File, FileVersion, VersionAction};
use tracing::debug;

use crate::action::{DeleteNote, SyncAction};
use crate::SyncError;

/// Which way files flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Local source, bucket destination
    Upload,
    /// Bucket source, local destination
    Download,
}

/// Knobs that influence per-file decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicySettings {
    pub compare_versions: CompareVersionMode,
    /// Milliseconds for modification times, bytes for sizes
    pub compare_threshold: u64,
    pub newer_file_mode: NewerFileMode,
    pub retention: RetentionMode,
}

impl PolicySettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            compare_versions: config.compare_versions,
            compare_threshold: config.compare_threshold,
            newer_file_mode: config.newer_file_mode(),
            retention: config.retention_mode(),
        }
    }
}

// ============================================================================
// Transfer decision
// ============================================================================

/// Does the source need to be copied over the destination?
///
/// A destination whose newest version is a hide marker is re-sent unless
/// comparison is disabled.
pub fn should_transfer(
    source: Option<&File>,
    dest: Option<&File>,
    settings: &PolicySettings,
) -> Result<bool, SyncError> {
    match (source, dest) {
        (None, _) => Ok(false),
        (Some(_), None) => Ok(true),
        (Some(_), Some(dest))
            if dest.latest_version().action() == VersionAction::Hide
                && settings.compare_versions != CompareVersionMode::None =>
        {
            Ok(true)
        }
        (Some(source), Some(dest)) => files_are_different(source, dest, settings),
    }
}

/// Compares the latest versions of two files under the configured mode
///
/// # Errors
/// [`SyncError::DestFileNewer`] when comparing modification times, the
/// destination is newer, and neither skip nor replace was requested.
pub fn files_are_different(
    source: &File,
    dest: &File,
    settings: &PolicySettings,
) -> Result<bool, SyncError> {
    let source_version = source.latest_version();
    let dest_version = dest.latest_version();
    let threshold = settings.compare_threshold;

    match settings.compare_versions {
        CompareVersionMode::None => Ok(false),
        CompareVersionMode::Size => {
            Ok(source_version.size().abs_diff(dest_version.size()) > threshold)
        }
        CompareVersionMode::ModTime => {
            let source_mod_time = source_version.mod_time();
            let dest_mod_time = dest_version.mod_time();
            if source_mod_time.abs_diff(dest_mod_time) <= threshold {
                return Ok(false);
            }
            if source_mod_time > dest_mod_time {
                return Ok(true);
            }
            match settings.newer_file_mode {
                NewerFileMode::Replace => Ok(true),
                NewerFileMode::Skip => {
                    debug!(name = source.name(), "Destination is newer, skipping");
                    Ok(false)
                }
                NewerFileMode::RaiseError => Err(SyncError::DestFileNewer {
                    name: dest.name().to_string(),
                    source_mod_time,
                    dest_mod_time,
                }),
            }
        }
    }
}

// ============================================================================
// Action lists
// ============================================================================

/// All actions for one file pair: the transfer (if any) first, then cleanup
///
/// For downloads a source whose newest version is a hide marker counts as
/// absent.
pub fn make_file_sync_actions(
    direction: SyncDirection,
    source: Option<&File>,
    dest: Option<&File>,
    settings: &PolicySettings,
    now_millis: i64,
) -> Result<Vec<SyncAction>, SyncError> {
    let source = match direction {
        SyncDirection::Download => source.filter(|f| is_visible(f.latest_version())),
        SyncDirection::Upload => source,
    };

    let mut actions = Vec::new();
    let transferred = should_transfer(source, dest, settings)?;
    if let Some(source) = source.filter(|_| transferred) {
        actions.push(make_transfer_action(direction, source));
    }

    match (direction, settings.retention) {
        (SyncDirection::Upload, RetentionMode::MirrorOnly) => {}
        (SyncDirection::Upload, RetentionMode::DeleteOldVersions) => {
            actions.extend(make_remote_delete_actions(source, dest, transferred));
        }
        (SyncDirection::Upload, RetentionMode::KeepDays(days)) => {
            actions.extend(make_remote_keep_days_actions(
                source,
                dest,
                transferred,
                days,
                now_millis,
            )?);
        }
        (SyncDirection::Download, RetentionMode::MirrorOnly)
        | (SyncDirection::Download, RetentionMode::DeleteOldVersions) => {
            if let (None, Some(dest)) = (source, dest) {
                actions.push(SyncAction::DeleteLocal {
                    name: dest.name().to_string(),
                    path: dest.latest_version().id().into(),
                });
            }
        }
        (SyncDirection::Download, RetentionMode::KeepDays(_)) => {}
    }

    Ok(actions)
}

fn is_visible(version: &FileVersion) -> bool {
    version.action() == VersionAction::Upload
}

fn make_transfer_action(direction: SyncDirection, source: &File) -> SyncAction {
    let latest = source.latest_version();
    match direction {
        SyncDirection::Upload => SyncAction::Upload {
            name: source.name().to_string(),
            mod_time: latest.mod_time(),
            size: latest.size(),
        },
        SyncDirection::Download => SyncAction::Download {
            name: source.name().to_string(),
            version_id: latest.id().to_string(),
            mod_time: latest.mod_time(),
            size: latest.size(),
        },
    }
}

fn delete_note(version: &FileVersion, index: usize, transferred: bool) -> DeleteNote {
    if version.action() == VersionAction::Hide {
        DeleteNote::HideMarker
    } else if transferred || index > 0 {
        DeleteNote::OldVersion
    } else {
        DeleteNote::None
    }
}

fn delete_version(dest: &File, version: &FileVersion, index: usize, transferred: bool) -> SyncAction {
    SyncAction::DeleteRemoteVersion {
        name: dest.name().to_string(),
        version_id: version.id().to_string(),
        note: delete_note(version, index, transferred),
    }
}

/// Deletes every remote version except the newest, which survives only when
/// the source still exists and was not just re-uploaded
pub fn make_remote_delete_actions(
    source: Option<&File>,
    dest: Option<&File>,
    transferred: bool,
) -> Vec<SyncAction> {
    let Some(dest) = dest else {
        return Vec::new();
    };

    dest.versions()
        .iter()
        .enumerate()
        .filter(|(index, _)| !(*index == 0 && source.is_some() && !transferred))
        .map(|(index, version)| delete_version(dest, version, index, transferred))
        .collect()
}

/// Keeps every version that was visible at some point in the last `keep_days`
///
/// Walking newest to oldest: a live newest version whose source vanished is
/// hidden; an expired hide marker is deleted along with everything older; the
/// first expired upload is kept and everything older is deleted.
///
/// # Errors
/// [`DomainError::VersionOrder`](bucketsync_core::domain::DomainError::VersionOrder)
/// when the destination's versions are not sorted newest first.
pub fn make_remote_keep_days_actions(
    source: Option<&File>,
    dest: Option<&File>,
    transferred: bool,
    keep_days: u32,
    now_millis: i64,
) -> Result<Vec<SyncAction>, SyncError> {
    let Some(dest) = dest else {
        return Ok(Vec::new());
    };
    dest.check_version_order()?;

    let keep_days = f64::from(keep_days);
    let mut actions = Vec::new();
    let mut deleting = false;

    for (index, version) in dest.versions().iter().enumerate() {
        let expired = version.age_days(now_millis) > keep_days;

        if index == 0 && source.is_none() && version.action() == VersionAction::Upload {
            actions.push(SyncAction::Hide {
                name: dest.name().to_string(),
            });
        }

        if version.action() == VersionAction::Hide && expired {
            deleting = true;
        }
        if deleting {
            actions.push(delete_version(dest, version, index, transferred));
        }
        if expired {
            deleting = true;
        }
    }

    Ok(actions)
}
