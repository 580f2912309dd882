//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync engine
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IStorageClient`] - Versioned bucket operations (list, upload, download, hide, delete)
//! - [`ISyncReporter`] - Progress counters, completion lines and error reporting

pub mod reporter;
pub mod storage_client;

pub use reporter::ISyncReporter;
pub use storage_client::{
    IStorageClient, ListCursor, ListedAction, ListedVersion, ProgressCallback, VersionPage,
    SRC_LAST_MODIFIED_MILLIS,
};
