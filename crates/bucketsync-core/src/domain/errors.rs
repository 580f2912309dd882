//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures, malformed folder locations and
//! version histories that break the newest-first ordering.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid folder location (local path or bucket URI)
    #[error("Invalid folder location: {0}")]
    InvalidLocation(String),

    /// A File was built without any version
    #[error("File has no versions: {0}")]
    EmptyVersionList(String),

    /// Versions of a File are not ordered newest first
    #[error(
        "Versions of {name} are out of order: {newer_mod_time} is older than {older_mod_time}"
    )]
    VersionOrder {
        /// Logical name of the file
        name: String,
        /// Modification time of the version listed first
        newer_mod_time: i64,
        /// Modification time of the version listed after it
        older_mod_time: i64,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidLocation("b2://".to_string());
        assert_eq!(err.to_string(), "Invalid folder location: b2://");

        let err = DomainError::VersionOrder {
            name: "a.txt".to_string(),
            newer_mod_time: 100,
            older_mod_time: 200,
        };
        assert_eq!(
            err.to_string(),
            "Versions of a.txt are out of order: 100 is older than 200"
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidLocation("x".to_string());
        let err2 = DomainError::InvalidLocation("x".to_string());
        let err3 = DomainError::InvalidLocation("y".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
