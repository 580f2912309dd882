//! Sync report - counter-based progress reporting
//!
//! [`SyncReport`] implements [`ISyncReporter`] with atomic counters so it can
//! be shared by every running action. Completion lines and errors go to
//! `tracing`; local access problems are collected as warnings and logged
//! again when the report is closed.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use tracing::{error, info, warn};

use bucketsync_core::ports::ISyncReporter;

/// Point-in-time copy of the report counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub local_files: u64,
    pub local_done: bool,
    pub compared: u64,
    pub compare_done: bool,
    /// Planned actions, known once comparison is done
    pub total_files: u64,
    /// Planned bytes, known once comparison is done
    pub total_bytes: u64,
    pub transferred_files: u64,
    pub transferred_bytes: u64,
    pub errors: u64,
    pub local_access_errors: u64,
}

/// Thread-safe progress reporter backed by `tracing`
#[derive(Debug)]
pub struct SyncReport {
    start: Instant,
    local_files: AtomicU64,
    local_done: AtomicBool,
    compared: AtomicU64,
    compare_done: AtomicBool,
    total_files: AtomicU64,
    total_bytes: AtomicU64,
    transferred_files: AtomicU64,
    transferred_bytes: AtomicU64,
    errors: AtomicU64,
    warnings: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl Default for SyncReport {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncReport {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            local_files: AtomicU64::new(0),
            local_done: AtomicBool::new(false),
            compared: AtomicU64::new(0),
            compare_done: AtomicBool::new(false),
            total_files: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            transferred_files: AtomicU64::new(0),
            transferred_bytes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            warnings: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Warnings collected so far, in the order they were reported
    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            local_files: self.local_files.load(Ordering::Relaxed),
            local_done: self.local_done.load(Ordering::Relaxed),
            compared: self.compared.load(Ordering::Relaxed),
            compare_done: self.compare_done.load(Ordering::Relaxed),
            total_files: self.total_files.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            transferred_files: self.transferred_files.load(Ordering::Relaxed),
            transferred_bytes: self.transferred_bytes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            local_access_errors: self.warnings().len() as u64,
        }
    }

    /// Logs the final counters and every collected warning; idempotent
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let summary = self.summary();
        info!(
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            files = summary.transferred_files,
            bytes = summary.transferred_bytes,
            total_files = summary.total_files,
            errors = summary.errors,
            "Sync report closed"
        );
        for warning in self.warnings() {
            warn!("{warning}");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ISyncReporter for SyncReport {
    fn update_local(&self, delta: u64) {
        self.local_files.fetch_add(delta, Ordering::Relaxed);
    }

    fn end_local(&self) {
        self.local_done.store(true, Ordering::Relaxed);
        info!(
            files = self.local_files.load(Ordering::Relaxed),
            "Local file count done"
        );
    }

    fn update_compare(&self, delta: u64) {
        self.compared.fetch_add(delta, Ordering::Relaxed);
    }

    fn end_compare(&self, total_files: u64, total_bytes: u64) {
        self.total_files.store(total_files, Ordering::Relaxed);
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
        self.compare_done.store(true, Ordering::Relaxed);
        info!(total_files, total_bytes, "Compare done");
    }

    fn update_transferred(&self, file_delta: u64, byte_delta: u64) {
        self.transferred_files.fetch_add(file_delta, Ordering::Relaxed);
        self.transferred_bytes.fetch_add(byte_delta, Ordering::Relaxed);
    }

    fn print_completion(&self, message: &str) {
        if !self.is_closed() {
            info!("{message}");
        }
    }

    fn report_error(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        error!("{message}");
    }

    fn report_local_access_error(&self, path: &Path) {
        let warning = format!("WARNING: {}: could not be accessed (broken symlink?)", path.display());
        warn!(path = %path.display(), "Local file could not be accessed");
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let report = SyncReport::new();
        report.update_local(3);
        report.update_local(2);
        report.end_local();
        report.update_compare(4);
        report.end_compare(2, 100);
        report.update_transferred(0, 60);
        report.update_transferred(1, 40);
        report.update_transferred(1, 0);

        let summary = report.summary();
        assert_eq!(summary.local_files, 5);
        assert!(summary.local_done);
        assert_eq!(summary.compared, 4);
        assert!(summary.compare_done);
        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.total_bytes, 100);
        assert_eq!(summary.transferred_files, 2);
        assert_eq!(summary.transferred_bytes, 100);
    }

    #[test]
    fn test_errors_and_warnings() {
        let report = SyncReport::new();
        report.report_error("upload a.txt: boom");
        report.report_local_access_error(Path::new("/data/broken"));

        let summary = report.summary();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.local_access_errors, 1);
        assert_eq!(
            report.warnings(),
            vec!["WARNING: /data/broken: could not be accessed (broken symlink?)".to_string()]
        );
    }

    #[test]
    fn test_close_is_idempotent() {
        let report = SyncReport::new();
        assert!(!report.is_closed());
        report.close();
        report.close();
        assert!(report.is_closed());
    }

    #[tokio::test]
    async fn test_concurrent_updates() {
        let report = Arc::new(SyncReport::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let report = Arc::clone(&report);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        report.update_transferred(1, 10);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let summary = report.summary();
        assert_eq!(summary.transferred_files, 800);
        assert_eq!(summary.transferred_bytes, 8000);
    }
}
