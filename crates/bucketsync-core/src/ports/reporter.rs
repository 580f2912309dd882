//! Sync reporter port (driven/secondary port)
//!
//! This module defines the interface through which the sync engine reports
//! progress and problems to the user. Implementations may draw progress bars,
//! write log lines, or collect everything for later inspection.
//!
//! ## Design Notes
//!
//! - All methods are fire-and-forget; nothing they return is consumed.
//! - Methods take `&self` and are called concurrently from many actions,
//!   so implementations must be internally synchronized.
//! - A run goes through three phases: counting local files, comparing the
//!   two folders, and transferring. Each phase has its own counters.

use std::path::Path;

/// Port trait for sync progress and problem reporting
pub trait ISyncReporter: Send + Sync {
    /// More local files were counted
    fn update_local(&self, delta: u64);

    /// The local file count is final
    fn end_local(&self);

    /// More file pairs were compared
    fn update_compare(&self, delta: u64);

    /// Comparison finished; totals for the transfer phase are now known
    fn end_compare(&self, total_files: u64, total_bytes: u64);

    /// Files finished and bytes moved since the last update
    fn update_transferred(&self, file_delta: u64, byte_delta: u64);

    /// One action completed (e.g. `upload a.txt`)
    fn print_completion(&self, message: &str);

    /// An action failed
    fn report_error(&self, message: &str);

    /// A local entry could not be read and was skipped
    fn report_local_access_error(&self, path: &Path);
}
