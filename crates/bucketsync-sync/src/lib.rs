//! Bucketsync Sync - Folder mirroring engine
//!
//! Provides:
//! - Sorted, policy-filtered scans of a local directory and a bucket prefix
//! - A merge-join pairing same-named files from both sides
//! - Per-file transfer and retention decisions
//! - Bounded, pipelined execution of the resulting actions
//!
//! ## Modules
//!
//! - [`scan_policy`] - Include/exclude rules applied while scanning
//! - [`folder`] - Local and remote folder scanners
//! - [`diff`] - Merge-join of two sorted file streams
//! - [`policy`] - Transfer/retention decision engine
//! - [`action`] - Executable actions (upload, download, hide, delete)
//! - [`executor`] - Permit-bounded task executor
//! - [`engine`] - The [`Synchronizer`](engine::Synchronizer) orchestrating a run
//! - [`report`] - Counter-based [`ISyncReporter`](bucketsync_core::ports::ISyncReporter) implementation
//! - [`simulator`] - In-memory versioned bucket implementing the storage port

pub mod action;
pub mod diff;
pub mod engine;
pub mod executor;
pub mod folder;
pub mod policy;
pub mod report;
pub mod scan_policy;
pub mod simulator;

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A local file name is not valid under the system encoding
    #[error(
        "File name {name} cannot be decoded with the system encoding. \
         Set a UTF-8 locale, for example: export LANG=en_US.UTF-8"
    )]
    EnvironmentEncoding {
        /// Lossy rendering of the offending name
        name: String,
    },

    /// A local file name contains a path separator
    #[error("Sync does not support file names that include '/': {name} in dir {}", .dir.display())]
    InvalidFileName {
        /// The offending entry name
        name: String,
        /// Directory containing the entry
        dir: PathBuf,
    },

    /// Options that cannot be combined
    #[error("Incompatible options: {0}")]
    IncompatibleOptions(String),

    /// A scan pattern failed to compile
    #[error("Invalid regex '{pattern}': {error}")]
    InvalidRegex {
        /// The pattern as configured
        pattern: String,
        /// Compiler error
        error: regex::Error,
    },

    /// The local source directory is empty or missing
    #[error("Directory {} is empty or missing. Use allow_empty_source to sync anyway", .0.display())]
    EmptyDirectory(PathBuf),

    /// The local folder path exists but is not a directory
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The local destination directory could not be created
    #[error("Unable to create directory {}", .0.display())]
    UnableToCreateDirectory(PathBuf),

    /// The destination holds a newer version than the source
    #[error(
        "Destination file is newer than source: {name} \
         (source {source_mod_time} ms, destination {dest_mod_time} ms)"
    )]
    DestFileNewer {
        /// Logical file name
        name: String,
        /// Modification time of the source's latest version
        source_mod_time: i64,
        /// Modification time of the destination's latest version
        dest_mod_time: i64,
    },

    /// Only local-to-bucket and bucket-to-local syncs are supported
    #[error("Sync from {from} to {to} is not supported")]
    UnsupportedSyncType {
        /// Source folder kind
        from: String,
        /// Destination folder kind
        to: String,
    },

    /// A storage client call failed while listing
    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    /// A domain-level error propagated from bucketsync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] bucketsync_core::domain::errors::DomainError),

    /// The executor no longer accepts tasks
    #[error("Executor is shut down")]
    ExecutorShutDown,

    /// One or more actions failed; everything else ran to completion
    #[error("Sync is incomplete: {failed} task(s) failed")]
    Incomplete {
        /// Number of failed tasks
        failed: usize,
    },
}
