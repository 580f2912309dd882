//! Domain entities and business logic
//!
//! This module contains the core domain types for bucketsync:
//! - Files and their versions, as produced by folder scans
//! - Folder locations (local directory or bucket prefix)
//! - Domain-specific error types

pub mod errors;
pub mod file;
pub mod location;

// Re-export commonly used types
pub use errors::DomainError;
pub use file::{File, FileVersion, VersionAction, ONE_DAY_IN_MS};
pub use location::FolderLocation;
