// Fields below are read by the miette derive
#![allow(unused_assignments)]

use cadence_core::ResourceKey;
use miette::Diagnostic;
use thiserror::Error;

/// Store error type
#[derive(Error, Debug, Diagnostic)]
pub enum StoreError {
    /// Object does not exist
    #[error("Resource not found: {key}")]
    #[diagnostic(
        code(store::not_found),
        help("The object may have been deleted, possibly by owner garbage collection")
    )]
    NotFound { key: String },

    /// Object already exists on create
    #[error("Resource already exists: {key}")]
    #[diagnostic(
        code(store::already_exists),
        help("Fetch the existing object and update it instead of creating it")
    )]
    AlreadyExists { key: String },

    /// Concurrent modification detected
    #[error("Conflict on {key}: {message}")]
    #[diagnostic(
        code(store::conflict),
        help("Re-read the object and retry with its current resourceVersion")
    )]
    Conflict { key: String, message: String },

    /// The object cannot be addressed or stored
    #[error("Invalid object: {message}")]
    #[diagnostic(
        code(store::invalid_object),
        help("Objects need at least metadata.name to be stored")
    )]
    InvalidObject { message: String },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    #[diagnostic(
        code(store::serialization_error),
        help("The stored object may be corrupt or of a different kind than requested")
    )]
    Serialization(#[from] serde_json::Error),

    /// Storage backend error
    #[error("Storage error: {0}")]
    #[diagnostic(
        code(store::storage_error),
        help("Check the database file and that no other process holds it open")
    )]
    Storage(#[from] cadence_storage::StorageError),

    /// Commit log error
    #[error("Versioning error: {0}")]
    #[diagnostic(
        code(store::versioning_error),
        help("Check the underlying storage system")
    )]
    Versioning(#[from] cadence_versioning::VersioningError),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn not_found(key: &ResourceKey) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    pub fn already_exists(key: &ResourceKey) -> Self {
        Self::AlreadyExists {
            key: key.to_string(),
        }
    }

    pub fn conflict(key: &ResourceKey, message: impl Into<String>) -> Self {
        Self::Conflict {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_object(message: impl Into<String>) -> Self {
        Self::InvalidObject {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for both version conflicts and create collisions
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyExists { .. })
    }
}
