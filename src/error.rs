//! Error types for cardex registry operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cardex operations.
pub type Result<T> = std::result::Result<T, CardexError>;

/// Errors that can occur during registry operations.
#[derive(Error, Debug)]
pub enum CardexError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization failed.
    #[error("TOML error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    /// Malformed version string.
    #[error("invalid version string: {0}")]
    InvalidVersion(String),

    /// Version collision or invalid increment/explicit-version combination.
    #[error("version error: {0}")]
    VersionConflict(String),

    /// A record with this uid is already registered.
    #[error("duplicate uid: {table} already contains '{uid}'")]
    DuplicateUid {
        /// Registry table.
        table: String,
        /// Offending uid.
        uid: String,
    },

    /// The `(name, repository, version)` triple is already registered.
    #[error("duplicate version: {table} already contains {repository}/{name} version {version}")]
    DuplicateVersion {
        /// Registry table.
        table: String,
        /// Card repository.
        repository: String,
        /// Card name.
        name: String,
        /// Colliding version.
        version: String,
    },

    /// Record or artifact not found.
    #[error("not found: {kind} '{id}'")]
    NotFound {
        /// Kind of thing looked up (table name, artifact, object).
        kind: String,
        /// Identifier used for the lookup.
        id: String,
    },

    /// Artifact storage backend failure.
    #[error("storage error at '{path}': {message}")]
    Storage {
        /// Remote path involved.
        path: String,
        /// Backend message.
        message: String,
    },

    /// Content hash mismatch.
    #[error("content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Expected hash.
        expected: String,
        /// Actual hash computed.
        actual: String,
    },

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(String),

    /// Registry not initialized.
    #[error("registry not initialized at {0}")]
    NotInitialized(PathBuf),
}

impl CardexError {
    /// Shorthand for a [`CardexError::NotFound`].
    pub(crate) fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Shorthand for a [`CardexError::Storage`].
    pub(crate) fn storage(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = CardexError::not_found("model_registry", "abc123");
        assert_eq!(err.to_string(), "not found: model_registry 'abc123'");
    }

    #[test]
    fn test_error_display_version_conflict() {
        let err = CardexError::VersionConflict("Version combination already exists".to_string());
        assert_eq!(
            err.to_string(),
            "version error: Version combination already exists"
        );
    }

    #[test]
    fn test_error_display_duplicate_version() {
        let err = CardexError::DuplicateVersion {
            table: "data_registry".to_string(),
            repository: "risk".to_string(),
            name: "transactions".to_string(),
            version: "1.0.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "duplicate version: data_registry already contains risk/transactions version 1.0.0"
        );
    }

    #[test]
    fn test_error_display_storage() {
        let err = CardexError::storage("model_registry/a/b/v1.0.0", "disk full");
        assert_eq!(
            err.to_string(),
            "storage error at 'model_registry/a/b/v1.0.0': disk full"
        );
    }
}
