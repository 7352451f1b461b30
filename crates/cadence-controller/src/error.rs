// Fields below are read by the miette derive
#![allow(unused_assignments)]

use cadence_store::StoreError;
use miette::Diagnostic;
use std::fmt;
use thiserror::Error;

/// Classification of reconcile failures, used by the dispatcher to pick a
/// retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidSpec,
    Conflict,
    LinkConflict,
    TransientIO,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidSpec => "InvalidSpec",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::LinkConflict => "LinkConflict",
            ErrorKind::TransientIO => "TransientIO",
        };
        f.write_str(name)
    }
}

/// Reconcile error type
#[derive(Error, Debug, Diagnostic)]
pub enum ReconcileError {
    /// An object disappeared while the pass was writing
    #[error("Not found: {key}")]
    #[diagnostic(
        code(controller::not_found),
        help("The object was removed concurrently; the next pass starts from fresh state")
    )]
    NotFound { key: String },

    /// The desired state cannot be satisfied
    #[error("Invalid spec for {key}: {message}")]
    #[diagnostic(
        code(controller::invalid_spec),
        help("Fix the object's spec; it will not be retried until it changes")
    )]
    InvalidSpec { key: String, message: String },

    /// An owner has no uid, so no owner reference can point at it
    #[error("Owner {owner} has no uid")]
    #[diagnostic(
        code(controller::missing_owner_uid),
        help("Only objects read back from the store can own children")
    )]
    MissingOwnerUid { owner: String },

    /// Concurrent modification detected by the store
    #[error("Conflict on {key}: {message}")]
    #[diagnostic(
        code(controller::conflict),
        help("Retried from scratch by the dispatcher")
    )]
    Conflict { key: String, message: String },

    /// The child is controlled by a different owner
    #[error("{child} is controlled by {existing}, refusing to link it to {owner}")]
    #[diagnostic(
        code(controller::link_conflict),
        help("Rename one of the owners' children or delete the foreign object")
    )]
    LinkConflict {
        child: String,
        owner: String,
        existing: String,
    },

    /// The store could not be read or written
    #[error("Store unavailable: {message}")]
    #[diagnostic(
        code(controller::transient_io),
        help("Retried with backoff by the dispatcher")
    )]
    TransientIO { message: String },

    /// Controller configuration is unusable
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(controller::invalid_config), help("{suggestion}"))]
    InvalidConfig { message: String, suggestion: String },
}

/// Result type for reconcile operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

impl ReconcileError {
    pub fn invalid_spec(key: impl ToString, message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn missing_owner_uid(owner: impl Into<String>) -> Self {
        Self::MissingOwnerUid {
            owner: owner.into(),
        }
    }

    pub fn link_conflict(
        child: impl Into<String>,
        owner: impl Into<String>,
        existing: impl Into<String>,
    ) -> Self {
        Self::LinkConflict {
            child: child.into(),
            owner: owner.into(),
            existing: existing.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Taxonomy bucket of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidSpec { .. } | Self::MissingOwnerUid { .. } | Self::InvalidConfig { .. } => {
                ErrorKind::InvalidSpec
            }
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::LinkConflict { .. } => ErrorKind::LinkConflict,
            Self::TransientIO { .. } => ErrorKind::TransientIO,
        }
    }

    /// Whether the dispatcher should run the pass again after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::Conflict | ErrorKind::TransientIO
        )
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => Self::NotFound { key },
            StoreError::AlreadyExists { key } => Self::Conflict {
                key,
                message: "already exists".to_string(),
            },
            StoreError::Conflict { key, message } => Self::Conflict { key, message },
            StoreError::InvalidObject { message } => Self::InvalidSpec {
                key: "<unnamed>".to_string(),
                message,
            },
            other => Self::TransientIO {
                message: other.to_string(),
            },
        }
    }
}
