//! Bucketsync Core - Domain types, configuration and ports
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `File`, `FileVersion`, `FolderLocation`
//! - **Configuration** - `SyncConfig`, loaded from YAML or built programmatically
//! - **Port definitions** - Traits for adapters: `StorageClient`, `SyncReporter`
//!
//! # Architecture
//!
//! The domain module contains pure data types with no I/O. Ports define
//! the trait interfaces through which the sync engine reaches the object
//! store and the user-facing progress display; their implementations live
//! outside this crate.

pub mod config;
pub mod domain;
pub mod ports;
